//! Head tracking toward the camera.
//!
//! The applied head rotation is layered as quaternions, in order:
//! base head target (gestures, idle) · idle sway · reactive nod · smoothed
//! camera tracking · explicit head override.

use glam::{EulerRot, Quat, Vec3};
use std::f32::consts::TAU;

use super::context::AnimationContext;
use crate::config::CameraConfig;
use crate::rig::BoneRotation;

/// Nod envelope below which the nod is finished
const NOD_CUTOFF: f32 = 1e-3;

#[derive(Debug, Clone, Copy)]
struct Nod {
    elapsed: f32,
}

/// Computes and smooths the head look-at rotation for one avatar.
#[derive(Debug)]
pub struct CameraController {
    config: CameraConfig,
    enabled: bool,
    intensity: f32,
    target: Quat,
    tracking: Quat,
    override_target: Quat,
    override_current: Quat,
    nod: Option<Nod>,
}

impl CameraController {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            config: config.clone(),
            enabled: config.enabled,
            intensity: config.active_intensity,
            target: Quat::IDENTITY,
            tracking: Quat::IDENTITY,
            override_target: Quat::IDENTITY,
            override_current: Quat::IDENTITY,
            nod: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled != self.enabled {
            tracing::debug!("Camera tracking {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enabled = enabled;
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity = if intensity.is_finite() {
            intensity.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    /// Tracking rotation toward the camera for the given head position, before
    /// smoothing.
    pub fn tracking_rotation(&self, head: Vec3, camera: Vec3) -> BoneRotation {
        let dir = camera - head;
        if !dir.is_finite() || dir.length_squared() < 1e-8 {
            return BoneRotation::ZERO;
        }

        let arc = Quat::from_rotation_arc(Vec3::Z, dir.normalize());
        let (yaw, pitch, roll) = arc.to_euler(EulerRot::YXZ);
        let max_yaw = self.config.max_yaw_deg.to_radians();
        let max_pitch = self.config.max_pitch_deg.to_radians();

        BoneRotation::new(
            pitch.clamp(-max_pitch, max_pitch) * self.intensity,
            yaw.clamp(-max_yaw, max_yaw) * self.intensity,
            roll * self.intensity * self.config.roll_scale,
        )
    }

    /// One-shot look-at; replaced by tracking on the next tick unless
    /// tracking is disabled.
    pub fn look_at(&mut self, rotation: BoneRotation) {
        if rotation.is_finite() {
            self.target = rotation.to_quat();
        } else {
            tracing::warn!("Ignoring non-finite look-at rotation");
        }
    }

    /// Explicit head rotation layered on top of tracking.
    pub fn set_override(&mut self, rotation: BoneRotation) {
        if rotation.is_finite() {
            self.override_target = rotation.to_quat();
        } else {
            tracing::warn!("Ignoring non-finite head override");
        }
    }

    pub fn clear_override(&mut self) {
        self.override_target = Quat::IDENTITY;
    }

    /// Start a decaying nod (restarts one already running).
    pub fn nod(&mut self) {
        self.nod = Some(Nod { elapsed: 0.0 });
    }

    pub fn is_nodding(&self) -> bool {
        self.nod.is_some()
    }

    /// Current target as Euler angles
    pub fn target(&self) -> BoneRotation {
        BoneRotation::from_quat(self.target)
    }

    /// Smoothed tracking rotation as Euler angles
    pub fn tracking(&self) -> BoneRotation {
        BoneRotation::from_quat(self.tracking)
    }

    pub fn tick(&mut self, dt: f32, ctx: &AnimationContext) {
        let dt = dt.max(0.0);

        if self.enabled {
            self.target = self
                .tracking_rotation(ctx.head_position(), ctx.camera_position)
                .to_quat();
        }

        let t1 = (self.config.tracking_rate * dt).min(1.0);
        self.tracking = self.tracking.slerp(self.target, t1).normalize();
        let t2 = (self.config.override_rate * dt).min(1.0);
        self.override_current = self
            .override_current
            .slerp(self.override_target, t2)
            .normalize();

        if let Some(nod) = self.nod.as_mut() {
            nod.elapsed += dt;
            let envelope = self.config.nod_amplitude * (-self.config.nod_decay * nod.elapsed).exp();
            if envelope < NOD_CUTOFF {
                self.nod = None;
            }
        }
    }

    fn nod_rotation(&self) -> Quat {
        match self.nod {
            Some(nod) => {
                let envelope =
                    self.config.nod_amplitude * (-self.config.nod_decay * nod.elapsed).exp();
                let pitch = (TAU * self.config.nod_frequency * nod.elapsed).sin() * envelope;
                Quat::from_rotation_x(pitch)
            }
            None => Quat::IDENTITY,
        }
    }

    /// Final head rotation composed on top of a base head target and sway.
    pub fn compose(&self, base: BoneRotation, sway: BoneRotation) -> BoneRotation {
        let q = base.to_quat()
            * sway.to_quat()
            * self.nod_rotation()
            * self.tracking
            * self.override_current;
        BoneRotation::from_quat(q.normalize())
    }

    pub fn reset(&mut self) {
        self.target = Quat::IDENTITY;
        self.tracking = Quat::IDENTITY;
        self.override_target = Quat::IDENTITY;
        self.override_current = Quat::IDENTITY;
        self.nod = None;
    }
}
