//! Per-avatar shared animation state.

use glam::Vec3;

use crate::rig::{BonePose, BoneRotation};

/// Mutable state shared by every controller of one avatar instance.
///
/// Controllers never keep their own copy of these values; the [`super::Animator`]
/// passes the context by `&mut` into each controller's tick.
#[derive(Debug, Clone)]
pub struct AnimationContext {
    /// Accumulated tick clock in seconds
    pub time: f32,
    /// Commanded base rotations (poses, commands, gestures, reactions)
    pub bone_targets: BonePose,
    /// Procedural offsets layered onto the base; rebuilt every tick
    pub bone_offsets: BonePose,
    /// Rest pose every target falls back to
    pub default_pose: BonePose,
    /// Current voice/audio level in [0, 1]
    pub audio_level: f32,
    /// Whether the driving engine (voice/AI session) is active
    pub engine_active: bool,
    pub camera_position: Vec3,
    /// Head world position at rest; offset by locomotion and posture
    pub head_rest_position: Vec3,
    /// Root (hips) world position produced by locomotion
    pub root_position: Vec3,
}

impl Default for AnimationContext {
    fn default() -> Self {
        Self {
            time: 0.0,
            bone_targets: BonePose::new(),
            bone_offsets: BonePose::new(),
            default_pose: BonePose::new(),
            audio_level: 0.0,
            engine_active: true,
            camera_position: Vec3::new(0.0, 1.5, 3.0),
            head_rest_position: Vec3::new(0.0, 1.5, 0.0),
            root_position: Vec3::ZERO,
        }
    }
}

impl AnimationContext {
    pub fn new(default_pose: BonePose) -> Self {
        Self {
            bone_targets: default_pose.clone(),
            default_pose,
            ..Default::default()
        }
    }

    /// Head world position including root motion.
    pub fn head_position(&self) -> Vec3 {
        self.head_rest_position + self.root_position
    }

    /// Distance from the camera to the avatar root.
    pub fn camera_distance(&self) -> f32 {
        self.camera_position.distance(self.root_position)
    }

    /// Current target for a bone, falling back to the rest pose.
    pub fn target(&self, bone: &str) -> BoneRotation {
        self.bone_targets
            .get(bone)
            .or_else(|| self.default_pose.get(bone))
            .copied()
            .unwrap_or(BoneRotation::ZERO)
    }

    /// Procedural offset accumulated for a bone this tick.
    pub fn offset(&self, bone: &str) -> BoneRotation {
        self.bone_offsets
            .get(bone)
            .copied()
            .unwrap_or(BoneRotation::ZERO)
    }

    /// Base target plus procedural offset.
    pub fn composed(&self, bone: &str) -> BoneRotation {
        self.target(bone).add(self.offset(bone))
    }

    /// Rest rotation for a bone.
    pub fn rest(&self, bone: &str) -> BoneRotation {
        self.default_pose
            .get(bone)
            .copied()
            .unwrap_or(BoneRotation::ZERO)
    }

    /// Whether the avatar should yield idle motion to reactive motion.
    pub fn is_busy(&self, audio_threshold: f32) -> bool {
        self.audio_level >= audio_threshold || !self.engine_active
    }

    pub fn set_target(&mut self, bone: &str, rotation: BoneRotation) {
        if rotation.is_finite() {
            self.bone_targets.insert(bone.to_string(), rotation);
        } else {
            tracing::warn!("Dropping non-finite rotation for bone '{}'", bone);
        }
    }

    /// Add a procedural offset; contributions to the same bone sum.
    pub fn add_offset(&mut self, bone: &str, offset: BoneRotation) {
        if !offset.is_finite() {
            tracing::warn!("Dropping non-finite offset for bone '{}'", bone);
            return;
        }
        let slot = self
            .bone_offsets
            .entry(bone.to_string())
            .or_insert(BoneRotation::ZERO);
        *slot = slot.add(offset);
    }

    /// Drop last tick's procedural offsets.
    pub fn clear_offsets(&mut self) {
        self.bone_offsets.clear();
    }

    /// Write every bone of a partial pose into the target map.
    pub fn apply_pose(&mut self, pose: &BonePose) {
        for (bone, &rotation) in pose {
            self.set_target(bone, rotation);
        }
    }

    /// Return all targets to the rest pose and clear runtime inputs.
    pub fn reset(&mut self) {
        self.time = 0.0;
        self.bone_targets = self.default_pose.clone();
        self.bone_offsets.clear();
        self.audio_level = 0.0;
        self.root_position = Vec3::ZERO;
    }
}
