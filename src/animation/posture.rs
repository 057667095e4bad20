//! Lean / engagement posture and the active/passive interaction mode.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::context::AnimationContext;
use crate::config::{CameraConfig, PostureConfig};
use crate::rig::BoneRotation;

const POSTURE_BONE: &str = "spine";

/// Interaction mode; controls how strongly the head follows the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    #[serde(alias = "ACTIVE")]
    Active,
    #[serde(alias = "PASSIVE")]
    Passive,
}

impl Mode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "passive" => Some(Self::Passive),
            _ => None,
        }
    }

    /// Camera tracking intensity for this mode.
    pub fn intensity(self, camera: &CameraConfig) -> f32 {
        match self {
            Self::Active => camera.active_intensity,
            Self::Passive => camera.passive_intensity,
        }
    }
}

/// Discrete body posture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Posture {
    #[default]
    Neutral,
    LeanForward,
    LeanBack,
    TowardCamera,
}

impl Posture {
    /// Map an emotion/posture label to a posture; unknown labels are neutral.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "joy" | "excited" | "emphatic" => Self::LeanForward,
            "thoughtful" | "listening" | "uncertain" => Self::LeanBack,
            "engaged" | "interested" => Self::TowardCamera,
            _ => Self::Neutral,
        }
    }
}

impl std::fmt::Display for Posture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Posture::Neutral => write!(f, "neutral"),
            Posture::LeanForward => write!(f, "lean-forward"),
            Posture::LeanBack => write!(f, "lean-back"),
            Posture::TowardCamera => write!(f, "toward-camera"),
        }
    }
}

/// Smoothly blends the upper body between postures.
#[derive(Debug)]
pub struct PostureController {
    config: PostureConfig,
    posture: Posture,
    mode: Mode,
    offset: Vec3,
    rotation: BoneRotation,
}

impl PostureController {
    pub fn new(config: &PostureConfig) -> Self {
        Self {
            config: config.clone(),
            posture: Posture::Neutral,
            mode: Mode::Active,
            offset: Vec3::ZERO,
            rotation: BoneRotation::ZERO,
        }
    }

    pub fn posture(&self) -> Posture {
        self.posture
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Current (smoothed) root offset
    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    /// Current (smoothed) spine rotation relative to rest
    pub fn rotation(&self) -> BoneRotation {
        self.rotation
    }

    pub fn update_posture(&mut self, label: &str) -> Posture {
        let posture = Posture::from_label(label);
        if posture != self.posture {
            tracing::debug!("Posture {} -> {} ('{}')", self.posture, posture, label);
        }
        self.posture = posture;
        posture
    }

    /// Switch mode and reset posture. Returns the camera intensity the mode
    /// calls for.
    pub fn set_mode(&mut self, mode: Mode, camera: &CameraConfig) -> f32 {
        if mode != self.mode {
            tracing::debug!("Mode {:?} -> {:?}", self.mode, mode);
        }
        self.mode = mode;
        self.posture = Posture::Neutral;
        mode.intensity(camera)
    }

    /// Target root offset and spine rotation for a posture. `camera_yaw` is
    /// the head's tracking yaw toward the camera.
    pub fn targets(&self, posture: Posture, camera_yaw: f32) -> (Vec3, BoneRotation) {
        let c = &self.config;
        match posture {
            Posture::Neutral => (Vec3::ZERO, BoneRotation::ZERO),
            Posture::LeanForward => (
                Vec3::new(0.0, 0.0, c.lean_offset),
                BoneRotation::new(c.lean_forward_deg.to_radians(), 0.0, 0.0),
            ),
            Posture::LeanBack => (
                Vec3::new(0.0, 0.0, -c.lean_offset),
                BoneRotation::new(-c.lean_back_deg.to_radians(), 0.0, 0.0),
            ),
            Posture::TowardCamera => (
                Vec3::ZERO,
                BoneRotation::new(0.0, camera_yaw * c.toward_camera_factor, 0.0),
            ),
        }
    }

    pub fn tick(&mut self, dt: f32, ctx: &mut AnimationContext, camera_yaw: f32) {
        let (target_offset, target_rotation) = self.targets(self.posture, camera_yaw);
        let t = (self.config.blend_rate * dt.max(0.0)).min(1.0);
        self.offset = self.offset.lerp(target_offset, t);
        self.rotation = self.rotation.lerp(target_rotation, t);

        ctx.root_position += self.offset;
        ctx.add_offset(POSTURE_BONE, self.rotation);
    }

    pub fn reset(&mut self) {
        self.posture = Posture::Neutral;
        self.mode = Mode::Active;
        self.offset = Vec3::ZERO;
        self.rotation = BoneRotation::ZERO;
    }
}
