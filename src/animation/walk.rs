//! Walking locomotion: position integration inside a bounded floor area,
//! speed-ramped vertical bob, and phase-driven leg and arm swing.

use glam::Vec3;
use std::f32::consts::{PI, TAU};

use super::context::AnimationContext;
use crate::config::{WalkBounds, WalkConfig};
use crate::rig::{BonePose, BoneRotation};

/// Upper bound of the bob multiplier
const MAX_BOB_MULTIPLIER: f32 = 1.5;

/// Requested walking direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WalkDirection {
    /// Toward the camera (+Z)
    Forward,
    Backward,
    StrafeLeft,
    StrafeRight,
    /// Explicit angle in degrees (0 = forward, 90 = strafe right)
    Custom(f32),
    /// Keep walking along the current heading
    Heading,
}

impl WalkDirection {
    /// Parse a direction name. Bare numbers are custom angles in degrees.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "forward" | "forwards" => Some(Self::Forward),
            "backward" | "backwards" | "back" => Some(Self::Backward),
            "strafe_left" | "strafeleft" | "left" => Some(Self::StrafeLeft),
            "strafe_right" | "straferight" | "right" => Some(Self::StrafeRight),
            "heading" | "current" | "face" => Some(Self::Heading),
            other => other
                .strip_prefix("custom:")
                .unwrap_or(other)
                .parse::<f32>()
                .ok()
                .filter(|deg| deg.is_finite())
                .map(Self::Custom),
        }
    }

    /// Resolve to an angle in degrees within [0, 360).
    pub fn angle(self, heading: f32) -> f32 {
        let deg = match self {
            Self::Forward => 0.0,
            Self::StrafeRight => 90.0,
            Self::Backward => 180.0,
            Self::StrafeLeft => 270.0,
            Self::Custom(deg) => deg,
            Self::Heading => heading,
        };
        normalize_degrees(deg)
    }
}

pub fn normalize_degrees(deg: f32) -> f32 {
    if !deg.is_finite() {
        return 0.0;
    }
    let d = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if d >= 360.0 {
        0.0
    } else {
        d
    }
}

/// Ground-plane unit vector for an angle in degrees.
pub fn angle_to_vector(deg: f32) -> Vec3 {
    let a = deg.to_radians();
    Vec3::new(a.sin(), 0.0, a.cos())
}

fn sign_or_zero(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Locomotion state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WalkMode {
    Stopped,
    Walking { angle: f32, speed: f32 },
}

/// Snapshot of the locomotion state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkState {
    pub speed: f32,
    pub angle: f32,
    pub position: Vec3,
    pub is_walking: bool,
}

/// Drives root motion and gait for one avatar.
#[derive(Debug)]
pub struct WalkController {
    config: WalkConfig,
    mode: WalkMode,
    heading: f32,
    position: Vec3,
    phase: f32,
    bob_multiplier: f32,
    bob: f32,
}

impl WalkController {
    pub fn new(config: &WalkConfig) -> Self {
        Self {
            config: config.clone(),
            mode: WalkMode::Stopped,
            heading: 0.0,
            position: Vec3::ZERO,
            phase: 0.0,
            bob_multiplier: 0.0,
            bob: 0.0,
        }
    }

    /// Start, redirect or stop walking. Non-positive or non-finite speeds stop.
    pub fn walk(&mut self, direction: WalkDirection, speed: f32) {
        if !speed.is_finite() || speed <= 0.0 {
            self.stop();
            return;
        }

        let speed = speed.min(self.config.max_speed);
        let angle = direction.angle(self.heading);
        tracing::debug!("Walking {:?} at {:.2} ({:.0} deg)", direction, speed, angle);
        self.mode = WalkMode::Walking { angle, speed };
    }

    pub fn stop(&mut self) {
        if self.is_walking() {
            tracing::debug!("Stopped walking at {:?}", self.position);
        }
        self.mode = WalkMode::Stopped;
    }

    pub fn mode(&self) -> WalkMode {
        self.mode
    }

    pub fn is_walking(&self) -> bool {
        matches!(self.mode, WalkMode::Walking { .. })
    }

    pub fn state(&self) -> WalkState {
        let (angle, speed) = match self.mode {
            WalkMode::Walking { angle, speed } => (angle, speed),
            WalkMode::Stopped => (self.heading, 0.0),
        };
        WalkState {
            speed,
            angle,
            position: self.position,
            is_walking: speed > 0.0,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Facing angle in degrees
    pub fn heading(&self) -> f32 {
        self.heading
    }

    pub fn set_heading(&mut self, deg: f32) {
        self.heading = normalize_degrees(deg);
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn bob(&self) -> f32 {
        self.bob
    }

    pub fn bob_multiplier(&self) -> f32 {
        self.bob_multiplier
    }

    fn clamp_to_bounds(position: Vec3, bounds: &WalkBounds) -> Vec3 {
        Vec3::new(
            position.x.clamp(bounds.min_x, bounds.max_x),
            position.y,
            position.z.clamp(bounds.min_z, bounds.max_z),
        )
    }

    /// Advance locomotion. `arms_free` is false while something else (a
    /// gesture) owns the arms.
    pub fn tick(&mut self, dt: f32, ctx: &mut AnimationContext, arms_free: bool) {
        let dt = dt.max(0.0);
        let t = ctx.time;

        let (bob_target, rate) = match self.mode {
            WalkMode::Walking { angle, speed } => {
                let dir = angle_to_vector(angle).normalize_or_zero();
                let step = dir * speed * self.config.move_scale * dt;
                self.position = Self::clamp_to_bounds(self.position + step, &self.config.bounds);
                self.heading = angle;
                self.phase = (t * speed * self.config.stride_frequency).rem_euclid(TAU);
                (
                    (speed * self.config.bob_speed_gain).min(MAX_BOB_MULTIPLIER),
                    self.config.bob_rise_rate,
                )
            }
            WalkMode::Stopped => (0.0, self.config.bob_decay_rate),
        };

        self.bob_multiplier += (bob_target - self.bob_multiplier) * (rate * dt).min(1.0);
        if bob_target == 0.0 && self.bob_multiplier < 1e-4 {
            self.bob_multiplier = 0.0;
        }
        self.bob = self.config.bob_amplitude * self.phase.sin() * self.bob_multiplier;
        ctx.root_position = self.position + Vec3::Y * self.bob;

        if let WalkMode::Walking { angle, .. } = self.mode {
            for (bone, offset) in self.gait_pose(self.phase, angle, arms_free) {
                ctx.add_offset(&bone, offset);
            }
        }
    }

    fn swings_arms(&self) -> bool {
        self.config.arm_swing && self.config.arm_sync
    }

    /// Direction sign and forward/back swing scale for a movement angle.
    fn gait_scale(&self, angle: f32) -> (f32, f32) {
        let c = angle.to_radians().cos();
        let sign = if c < -1e-4 { -1.0 } else { 1.0 };
        let residual = self.config.strafe_residual;
        (sign, residual + (1.0 - residual) * c.abs())
    }

    /// Upper-leg swing (left, right) in radians at a gait phase.
    pub fn leg_angles(&self, phase: f32, angle: f32) -> (f32, f32) {
        let (sign, scale) = self.gait_scale(angle);
        let amp = self.config.stride * sign * scale;
        (phase.sin() * amp, (phase + PI).sin() * amp)
    }

    /// Knee bend (left, right); never negative.
    pub fn knee_angles(&self, phase: f32) -> (f32, f32) {
        let bend = self.config.knee_bend;
        (phase.sin().max(0.0) * bend, (phase + PI).sin().max(0.0) * bend)
    }

    /// Offsets from the rest pose for the legs and, when free, the arms.
    pub fn gait_pose(&self, phase: f32, angle: f32, arms_free: bool) -> BonePose {
        let (left, right) = self.leg_angles(phase, angle);
        let (left_knee, right_knee) = self.knee_angles(phase);

        let mut pose = BonePose::new();
        pose.insert("leftUpperLeg".into(), BoneRotation::new(left, 0.0, 0.0));
        pose.insert("rightUpperLeg".into(), BoneRotation::new(right, 0.0, 0.0));
        pose.insert("leftLowerLeg".into(), BoneRotation::new(left_knee, 0.0, 0.0));
        pose.insert("rightLowerLeg".into(), BoneRotation::new(right_knee, 0.0, 0.0));

        if arms_free && self.swings_arms() {
            let intensity = self.config.arm_intensity;
            pose.insert(
                "leftUpperArm".into(),
                BoneRotation::new(-sign_or_zero(left) * intensity, 0.0, 0.0),
            );
            pose.insert(
                "rightUpperArm".into(),
                BoneRotation::new(-sign_or_zero(right) * intensity, 0.0, 0.0),
            );
        }
        pose
    }

    /// Return to the origin, stopped, with no bob.
    pub fn reset(&mut self) {
        self.mode = WalkMode::Stopped;
        self.heading = 0.0;
        self.position = Vec3::ZERO;
        self.phase = 0.0;
        self.bob_multiplier = 0.0;
        self.bob = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> WalkController {
        WalkController::new(&WalkConfig::default())
    }

    fn run(walk: &mut WalkController, ctx: &mut AnimationContext, ticks: usize, dt: f32) {
        for _ in 0..ticks {
            ctx.clear_offsets();
            ctx.time += dt;
            walk.tick(dt, ctx, true);
        }
    }

    #[test]
    fn test_zero_speed_stays_put() {
        let mut walk = controller();
        let mut ctx = AnimationContext::default();
        walk.walk(WalkDirection::Forward, 0.0);
        run(&mut walk, &mut ctx, 50, 0.1);

        let state = walk.state();
        assert!(!state.is_walking);
        assert_eq!(state.position, Vec3::ZERO);
    }

    #[test]
    fn test_non_finite_speed_stops() {
        let mut walk = controller();
        walk.walk(WalkDirection::Forward, 1.0);
        walk.walk(WalkDirection::Forward, f32::NAN);
        assert_eq!(walk.mode(), WalkMode::Stopped);
    }

    #[test]
    fn test_forward_walk_scenario() {
        let mut walk = controller();
        let mut ctx = AnimationContext::default();
        walk.walk(WalkDirection::parse("forward").unwrap(), 1.5);
        run(&mut walk, &mut ctx, 10, 0.1);

        let state = walk.state();
        let bounds = WalkBounds::default();
        assert!(state.is_walking);
        assert!(state.speed <= 2.0);
        assert!(state.position.z > 0.0, "should move toward the camera");
        assert!(state.position.x.abs() < 1e-5);
        assert!(state.position.z <= bounds.max_z);
        assert!((state.position.z - 0.75).abs() < 1e-3);
    }

    #[test]
    fn test_speed_clamped() {
        let mut walk = controller();
        walk.walk(WalkDirection::Forward, 9.0);
        assert_eq!(walk.state().speed, 2.0);
    }

    #[test]
    fn test_position_clamped_to_bounds() {
        let mut walk = controller();
        let mut ctx = AnimationContext::default();
        walk.walk(WalkDirection::StrafeRight, 2.0);
        run(&mut walk, &mut ctx, 200, 0.1);
        assert!((walk.position().x - 3.0).abs() < 1e-5);

        walk.walk(WalkDirection::Backward, 2.0);
        run(&mut walk, &mut ctx, 200, 0.1);
        assert!((walk.position().z + 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_legs_opposite_at_any_phase() {
        let walk = controller();
        for i in 0..64 {
            let phase = i as f32 * TAU / 64.0 + 0.01;
            for angle in [0.0, 45.0, 90.0, 180.0, 270.0] {
                let (l, r) = walk.leg_angles(phase, angle);
                assert!(l * r <= 0.0, "legs same sign at phase {} angle {}", phase, angle);
                if l.abs() > 1e-4 {
                    assert!(l.signum() != r.signum());
                }
            }
        }
    }

    #[test]
    fn test_knee_never_negative() {
        let walk = controller();
        for i in 0..100 {
            let (l, r) = walk.knee_angles(i as f32 * 0.173);
            assert!(l >= 0.0 && r >= 0.0);
        }
    }

    #[test]
    fn test_backward_inverts_swing() {
        let walk = controller();
        let phase = 1.0;
        let (fl, _) = walk.leg_angles(phase, WalkDirection::Forward.angle(0.0));
        let (bl, _) = walk.leg_angles(phase, WalkDirection::Backward.angle(0.0));
        assert!((fl + bl).abs() < 1e-5, "forward {} backward {}", fl, bl);
        assert!(fl > 0.0);
    }

    #[test]
    fn test_strafe_keeps_residual_gait() {
        let walk = controller();
        let (forward, _) = walk.leg_angles(1.0, 0.0);
        let (strafe, _) = walk.leg_angles(1.0, 90.0);
        assert!(strafe.abs() > 0.0);
        assert!((strafe / forward - 0.35).abs() < 1e-3);
    }

    #[test]
    fn test_arm_opposes_leg() {
        let walk = controller();
        let pose = walk.gait_pose(1.0, 0.0, true);
        let left_leg = pose["leftUpperLeg"].x;
        let left_arm = pose["leftUpperArm"].x;
        assert!(left_leg > 0.0);
        assert!((left_arm + 0.25).abs() < 1e-6);

        let pose = walk.gait_pose(0.0, 0.0, true);
        assert_eq!(pose["leftUpperArm"].x, 0.0);

        let pose = walk.gait_pose(1.0, 0.0, false);
        assert!(!pose.contains_key("leftUpperArm"));
    }

    #[test]
    fn test_bob_decays_after_stop() {
        let mut walk = controller();
        let mut ctx = AnimationContext::default();
        walk.walk(WalkDirection::Forward, 1.0);
        run(&mut walk, &mut ctx, 20, 0.05);
        assert!(walk.bob_multiplier() > 0.5);
        let phase = walk.phase();

        walk.stop();
        run(&mut walk, &mut ctx, 2, 0.05);
        assert!(walk.bob_multiplier() > 0.0, "bob should decay, not snap");
        assert_eq!(walk.phase(), phase, "phase held while stopped");

        run(&mut walk, &mut ctx, 60, 0.05);
        assert_eq!(walk.bob_multiplier(), 0.0);
        assert_eq!(ctx.offset("leftUpperLeg"), BoneRotation::ZERO);
    }

    #[test]
    fn test_gait_layers_onto_commanded_legs() {
        let mut walk = controller();
        let mut ctx = AnimationContext::default();
        let knee = BoneRotation::new(0.3, 0.0, 0.0);
        ctx.set_target("leftLowerLeg", knee);

        walk.walk(WalkDirection::Forward, 1.0);
        run(&mut walk, &mut ctx, 10, 0.05);
        assert_eq!(ctx.target("leftLowerLeg"), knee);
        assert_ne!(ctx.offset("leftUpperLeg"), BoneRotation::ZERO);

        walk.stop();
        run(&mut walk, &mut ctx, 1, 0.05);
        assert_eq!(ctx.target("leftLowerLeg"), knee, "stopping keeps the base");
        assert_eq!(ctx.offset("leftLowerLeg"), BoneRotation::ZERO);
    }

    #[test]
    fn test_direction_parse_and_normalize() {
        assert_eq!(WalkDirection::parse("strafe_left"), Some(WalkDirection::StrafeLeft));
        assert_eq!(WalkDirection::parse("-90"), Some(WalkDirection::Custom(-90.0)));
        assert_eq!(WalkDirection::Custom(-90.0).angle(0.0), 270.0);
        assert_eq!(WalkDirection::Heading.angle(450.0), 90.0);
        assert_eq!(WalkDirection::parse("sideways"), None);
    }

    #[test]
    fn test_heading_follows_movement() {
        let mut walk = controller();
        let mut ctx = AnimationContext::default();
        walk.walk(WalkDirection::Custom(45.0), 1.0);
        run(&mut walk, &mut ctx, 1, 0.1);
        walk.stop();
        walk.walk(WalkDirection::Heading, 1.0);
        assert_eq!(walk.state().angle, 45.0);
    }
}
