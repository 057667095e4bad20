//! Idle motion: breathing, blinking, eye saccades, head sway and the
//! time-sliced looping idle gestures selected by the activity state.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f32::consts::PI;
use std::sync::Arc;

use super::context::AnimationContext;
use super::expression::ExpressionBlender;
use super::gesture::{GestureDefinition, GestureSpec};
use crate::config::IdleConfig;
use crate::rig::{BonePose, BoneRotation};

/// Expression alias driven by the blink envelope
pub const BLINK_ALIAS: &str = "blink";

const EYE_BONES: [&str; 2] = ["leftEye", "rightEye"];
const BREATH_BONE: &str = "chest";

/// Activity state selecting the idle gesture rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleState {
    #[default]
    Idle,
    Talking,
    Listening,
    Thinking,
}

impl IdleState {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "talking" | "speaking" => Some(Self::Talking),
            "listening" => Some(Self::Listening),
            "thinking" => Some(Self::Thinking),
            _ => None,
        }
    }
}

impl std::fmt::Display for IdleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdleState::Idle => write!(f, "idle"),
            IdleState::Talking => write!(f, "talking"),
            IdleState::Listening => write!(f, "listening"),
            IdleState::Thinking => write!(f, "thinking"),
        }
    }
}

/// Idle gesture names looped per activity state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleSets {
    pub idle: Vec<String>,
    pub talking: Vec<String>,
    pub listening: Vec<String>,
    pub thinking: Vec<String>,
}

impl Default for IdleSets {
    fn default() -> Self {
        let names = |a: &str, b: &str| vec![a.to_string(), b.to_string()];
        Self {
            idle: names("weight_shift", "look_around"),
            talking: names("hand_wave", "shoulder_shrug"),
            listening: names("nod", "head_tilt"),
            thinking: names("look_up", "chin_stroke"),
        }
    }
}

impl IdleSets {
    pub fn for_state(&self, state: IdleState) -> &[String] {
        match state {
            IdleState::Idle => &self.idle,
            IdleState::Talking => &self.talking,
            IdleState::Listening => &self.listening,
            IdleState::Thinking => &self.thinking,
        }
    }

    fn for_state_mut(&mut self, state: IdleState) -> &mut Vec<String> {
        match state {
            IdleState::Idle => &mut self.idle,
            IdleState::Talking => &mut self.talking,
            IdleState::Listening => &mut self.listening,
            IdleState::Thinking => &mut self.thinking,
        }
    }
}

/// Audio-driven mouth opening
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LipSync {
    pub mouth_alias: String,
    /// Audio level above which the mouth opens
    pub threshold: f32,
    pub gain: f32,
}

impl Default for LipSync {
    fn default() -> Self {
        Self {
            mouth_alias: "aa".to_string(),
            threshold: 0.05,
            gain: 2.0,
        }
    }
}

/// Offsets (relative to the rest pose) of the stock idle gestures.
fn builtin_idle_gestures() -> Vec<GestureDefinition> {
    fn pose(entries: &[(&str, f32, f32, f32)]) -> BonePose {
        entries
            .iter()
            .map(|&(bone, x, y, z)| (bone.to_string(), BoneRotation::new(x, y, z)))
            .collect()
    }

    vec![
        GestureDefinition::new("weight_shift", 4.0, |t| {
            let shift = (t * 0.4 * PI).sin();
            pose(&[("hips", 0.0, 0.0, shift * 0.03), ("spine", 0.0, 0.0, -shift * 0.02)])
        }),
        GestureDefinition::new("look_around", 4.0, |t| {
            let yaw = (t * 0.5).sin() * 0.15;
            pose(&[("head", 0.0, yaw, 0.0), ("neck", 0.0, yaw * 0.3, 0.0)])
        }),
        GestureDefinition::new("hand_wave", 4.0, |t| {
            let swing = (t * 2.0 * PI).sin() * 0.15;
            pose(&[
                ("rightUpperArm", 0.0, 0.0, 0.25),
                ("rightLowerArm", 0.0, 0.0, 0.4 + swing),
            ])
        }),
        GestureDefinition::new("shoulder_shrug", 4.0, |t| {
            let lift = (t * PI).sin().max(0.0) * 0.12;
            pose(&[("leftShoulder", 0.0, 0.0, lift), ("rightShoulder", 0.0, 0.0, -lift)])
        }),
        GestureDefinition::new("nod", 4.0, |t| {
            pose(&[("head", (t * 2.0 * PI).sin() * 0.06, 0.0, 0.0)])
        }),
        GestureDefinition::new("head_tilt", 4.0, |t| {
            pose(&[("head", 0.0, 0.0, (t * 0.5 * PI).sin() * 0.1)])
        }),
        GestureDefinition::new("look_up", 4.0, |t| {
            pose(&[("head", -0.15 + (t * 0.3).sin() * 0.03, 0.0, 0.0)])
        }),
        GestureDefinition::new("chin_stroke", 4.0, |t| {
            let stroke = (t * 2.0).sin() * 0.05;
            pose(&[
                ("rightUpperArm", -0.6, 0.0, 0.3),
                ("rightLowerArm", 0.0, -1.4 + stroke, 0.0),
                ("head", 0.05, 0.0, 0.0),
            ])
        }),
    ]
}

/// Uniform sample from `[lo, hi]`; a degenerate window yields its midpoint.
fn sample(rng: &mut StdRng, lo: f32, hi: f32) -> f32 {
    if lo.is_finite() && hi.is_finite() && lo < hi {
        rng.random_range(lo..=hi)
    } else {
        let mid = (lo + hi) * 0.5;
        if mid.is_finite() {
            mid
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Blink {
    elapsed: f32,
}

/// Procedural idle motion for one avatar.
#[derive(Debug)]
pub struct IdleDriver {
    config: IdleConfig,
    state: IdleState,
    sets: IdleSets,
    library: HashMap<String, Arc<GestureDefinition>>,
    override_gesture: Option<String>,
    breath_alias: Option<String>,
    lipsync: Option<LipSync>,
    rng: StdRng,
    blink_timer: f32,
    blink: Option<Blink>,
    saccade_timer: f32,
    eye_offset: BoneRotation,
}

impl IdleDriver {
    pub fn new(config: &IdleConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let blink_timer = sample(&mut rng, config.blink_min, config.blink_max);
        let saccade_timer = sample(&mut rng, config.saccade_min, config.saccade_max);

        let library = builtin_idle_gestures()
            .into_iter()
            .map(|def| (def.name().to_string(), Arc::new(def)))
            .collect();

        Self {
            config: config.clone(),
            state: IdleState::Idle,
            sets: IdleSets::default(),
            library,
            override_gesture: None,
            breath_alias: None,
            lipsync: None,
            rng,
            blink_timer,
            blink: None,
            saccade_timer,
            eye_offset: BoneRotation::ZERO,
        }
    }

    pub fn with_breath_alias(mut self, alias: Option<String>) -> Self {
        self.breath_alias = alias.filter(|a| !a.is_empty());
        self
    }

    pub fn with_lipsync(mut self, lipsync: Option<LipSync>) -> Self {
        self.lipsync = lipsync;
        self
    }

    /// Add or replace data-driven idle gestures.
    pub fn with_gestures(mut self, specs: &[GestureSpec]) -> Self {
        for spec in specs {
            self.library
                .insert(spec.name.clone(), Arc::new(spec.to_definition()));
        }
        self
    }

    /// Replace the per-state rotations. Names with no idle gesture are dropped.
    pub fn with_sets(mut self, sets: IdleSets) -> Self {
        self.set_sets(sets);
        self
    }

    pub fn set_sets(&mut self, mut sets: IdleSets) {
        for state in [
            IdleState::Idle,
            IdleState::Talking,
            IdleState::Listening,
            IdleState::Thinking,
        ] {
            let library = &self.library;
            sets.for_state_mut(state).retain(|name| {
                let known = library.contains_key(name);
                if !known {
                    tracing::warn!("Unknown idle gesture '{}' in {} set, ignoring", name, state);
                }
                known
            });
        }
        self.sets = sets;
    }

    pub fn state(&self) -> IdleState {
        self.state
    }

    pub fn set_state(&mut self, state: IdleState) {
        if state != self.state {
            tracing::debug!("Idle state {} -> {}", self.state, state);
            self.state = state;
        }
    }

    /// Force a single idle gesture. `"none"` or an empty name clears the
    /// override; unknown names are ignored.
    pub fn set_override(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || name.eq_ignore_ascii_case("none") {
            self.override_gesture = None;
            return true;
        }
        if !self.library.contains_key(name) {
            tracing::warn!("Unknown idle gesture '{}', ignoring", name);
            return false;
        }
        self.override_gesture = Some(name.to_string());
        true
    }

    pub fn override_gesture(&self) -> Option<&str> {
        self.override_gesture.as_deref()
    }

    /// Idle gesture live at time `t`.
    pub fn current_gesture(&self, t: f32) -> Option<&str> {
        if let Some(name) = &self.override_gesture {
            return Some(name);
        }
        let set = self.sets.for_state(self.state);
        if set.is_empty() {
            return None;
        }
        let slice = (t.max(0.0) / self.config.slice_secs).floor() as usize;
        Some(set[slice % set.len()].as_str())
    }

    /// Breathing amount in [0, 1].
    pub fn breath(&self, t: f32) -> f32 {
        0.5 + 0.5 * (2.0 * PI * self.config.breath_rate * t).sin()
    }

    /// Low-frequency head sway layered under camera tracking.
    pub fn sway(&self, t: f32) -> BoneRotation {
        let amp = self.config.sway_amplitude;
        BoneRotation::new((t * 0.7).sin() * amp, (t * 0.5).sin() * amp * 0.7, 0.0)
    }

    pub fn is_blinking(&self) -> bool {
        self.blink.is_some()
    }

    pub fn eye_offset(&self) -> BoneRotation {
        self.eye_offset
    }

    pub fn tick(&mut self, dt: f32, ctx: &mut AnimationContext, expressions: &mut ExpressionBlender) {
        let t = ctx.time;

        let breath = self.breath(t);
        if let Some(alias) = &self.breath_alias {
            expressions.add_target(alias, breath);
        }
        ctx.add_offset(
            BREATH_BONE,
            BoneRotation::new(-breath * self.config.breath_pitch, 0.0, 0.0),
        );

        self.tick_blink(dt, expressions);
        self.tick_saccade(dt, ctx);

        if let Some(lipsync) = &self.lipsync {
            if ctx.audio_level > lipsync.threshold {
                expressions.add_target(&lipsync.mouth_alias, (ctx.audio_level * lipsync.gain).min(1.0));
            }
        }

        if ctx.is_busy(self.config.busy_audio_threshold) {
            return;
        }
        let pose = self
            .current_gesture(t)
            .and_then(|name| self.library.get(name))
            .map(|def| def.pose_at(t));
        for (bone, offset) in pose.unwrap_or_default() {
            ctx.add_offset(&bone, offset);
        }
    }

    fn tick_blink(&mut self, dt: f32, expressions: &mut ExpressionBlender) {
        if let Some(blink) = self.blink.as_mut() {
            blink.elapsed += dt;
            let u = blink.elapsed / self.config.blink_duration;
            if u >= 1.0 || !expressions.blink_allowed() {
                expressions.add_target(BLINK_ALIAS, 0.0);
                self.blink = None;
            } else {
                expressions.add_target(BLINK_ALIAS, 1.0 - (2.0 * u - 1.0).abs());
            }
        }

        self.blink_timer -= dt;
        if self.blink_timer <= 0.0 {
            self.blink_timer = sample(&mut self.rng, self.config.blink_min, self.config.blink_max);
            if self.blink.is_none() && expressions.blink_allowed() {
                self.blink = Some(Blink { elapsed: 0.0 });
                expressions.add_target(BLINK_ALIAS, 0.0);
            }
        }
    }

    fn tick_saccade(&mut self, dt: f32, ctx: &mut AnimationContext) {
        self.saccade_timer -= dt;
        if self.saccade_timer <= 0.0 {
            self.saccade_timer =
                sample(&mut self.rng, self.config.saccade_min, self.config.saccade_max);
            let yaw = self.config.saccade_yaw;
            let pitch = self.config.saccade_pitch;
            self.eye_offset = BoneRotation::new(
                sample(&mut self.rng, -pitch, pitch),
                sample(&mut self.rng, -yaw, yaw),
                0.0,
            );
        }
        for eye in EYE_BONES {
            ctx.add_offset(eye, self.eye_offset);
        }
    }

    /// Drop the override and any blink in flight.
    pub fn reset(&mut self) {
        self.override_gesture = None;
        self.state = IdleState::Idle;
        self.blink = None;
        self.eye_offset = BoneRotation::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> IdleConfig {
        IdleConfig {
            seed: Some(7),
            ..Default::default()
        }
    }

    fn blender() -> ExpressionBlender {
        ExpressionBlender::new(HashMap::new(), vec!["joy".to_string()])
    }

    #[test]
    fn test_time_sliced_rotation() {
        let driver = IdleDriver::new(&seeded());
        assert_eq!(driver.current_gesture(0.0), Some("weight_shift"));
        assert_eq!(driver.current_gesture(4.5), Some("look_around"));
        assert_eq!(driver.current_gesture(8.1), Some("weight_shift"));
    }

    #[test]
    fn test_state_selects_set() {
        let mut driver = IdleDriver::new(&seeded());
        driver.set_state(IdleState::Talking);
        assert_eq!(driver.current_gesture(0.0), Some("hand_wave"));
        assert_eq!(driver.current_gesture(5.0), Some("shoulder_shrug"));
        driver.set_state(IdleState::Thinking);
        assert_eq!(driver.current_gesture(0.0), Some("look_up"));
    }

    #[test]
    fn test_override_and_clear() {
        let mut driver = IdleDriver::new(&seeded());
        assert!(driver.set_override("head_tilt"));
        assert_eq!(driver.current_gesture(5.0), Some("head_tilt"));
        assert!(!driver.set_override("backflip"));
        assert_eq!(driver.override_gesture(), Some("head_tilt"));
        assert!(driver.set_override("none"));
        assert_eq!(driver.current_gesture(0.0), Some("weight_shift"));
    }

    #[test]
    fn test_unknown_set_entries_dropped() {
        let sets = IdleSets {
            idle: vec!["nod".into(), "cartwheel".into()],
            ..Default::default()
        };
        let driver = IdleDriver::new(&seeded()).with_sets(sets);
        assert_eq!(driver.current_gesture(0.0), Some("nod"));
        assert_eq!(driver.current_gesture(4.0), Some("nod"));
    }

    #[test]
    fn test_breath_range() {
        let driver = IdleDriver::new(&seeded());
        for i in 0..100 {
            let b = driver.breath(i as f32 * 0.13);
            assert!((0.0..=1.0).contains(&b), "breath {} out of range", b);
        }
    }

    #[test]
    fn test_blink_happens_within_window() {
        let config = seeded();
        let mut driver = IdleDriver::new(&config);
        let mut ctx = AnimationContext::default();
        let mut expr = blender();

        let mut saw_blink = false;
        for _ in 0..((config.blink_max / 0.02) as usize + 20) {
            ctx.time += 0.02;
            driver.tick(0.02, &mut ctx, &mut expr);
            if driver.is_blinking() && expr.alias_target(BLINK_ALIAS) > 0.5 {
                saw_blink = true;
                break;
            }
        }
        assert!(saw_blink, "no blink within the maximum interval");
    }

    #[test]
    fn test_blink_suppressed_when_not_allowed() {
        let mut driver = IdleDriver::new(&seeded());
        let mut ctx = AnimationContext::default();
        let mut expr = blender();

        for _ in 0..400 {
            expr.add_target("joy", 1.0);
            ctx.time += 0.02;
            driver.tick(0.02, &mut ctx, &mut expr);
            assert!(!driver.is_blinking(), "blinked while suppressed");
        }
    }

    #[test]
    fn test_idle_pose_yields_when_busy() {
        let mut driver = IdleDriver::new(&seeded());
        driver.set_override("look_up");
        let mut ctx = AnimationContext::default();
        let mut expr = blender();

        driver.tick(0.02, &mut ctx, &mut expr);
        assert!(ctx.offset("head").x < -0.05, "look_up should pitch the head");
        assert_eq!(ctx.target("head"), BoneRotation::ZERO, "base stays untouched");

        ctx.clear_offsets();
        ctx.audio_level = 0.9;
        driver.tick(0.02, &mut ctx, &mut expr);
        assert_eq!(ctx.offset("head"), BoneRotation::ZERO);

        ctx.clear_offsets();
        ctx.audio_level = 0.0;
        ctx.engine_active = false;
        driver.tick(0.02, &mut ctx, &mut expr);
        assert_eq!(ctx.offset("head"), BoneRotation::ZERO);
    }

    #[test]
    fn test_idle_motion_keeps_commanded_base() {
        let mut driver = IdleDriver::new(&seeded());
        let mut ctx = AnimationContext::default();
        let mut expr = blender();
        let commanded = BoneRotation::new(0.5, 0.0, 0.0);
        ctx.set_target("chest", commanded);
        ctx.set_target("leftEye", commanded);

        for _ in 0..50 {
            ctx.clear_offsets();
            ctx.time += 0.05;
            driver.tick(0.05, &mut ctx, &mut expr);
        }
        assert_eq!(ctx.target("chest"), commanded);
        assert_eq!(ctx.target("leftEye"), commanded);
        assert_ne!(ctx.offset("chest"), BoneRotation::ZERO, "breathing still layers on");
    }

    #[test]
    fn test_saccades_stay_in_range() {
        let config = seeded();
        let mut driver = IdleDriver::new(&config);
        let mut ctx = AnimationContext::default();
        let mut expr = blender();
        for _ in 0..500 {
            ctx.clear_offsets();
            ctx.time += 0.05;
            driver.tick(0.05, &mut ctx, &mut expr);
            let eye = ctx.offset("leftEye");
            assert!(eye.y.abs() <= config.saccade_yaw + 1e-6);
            assert!(eye.x.abs() <= config.saccade_pitch + 1e-6);
        }
        assert_ne!(driver.eye_offset(), BoneRotation::ZERO);
    }

    #[test]
    fn test_lipsync_opens_mouth() {
        let mut driver = IdleDriver::new(&seeded()).with_lipsync(Some(LipSync::default()));
        let mut ctx = AnimationContext::default();
        let mut expr = blender();
        ctx.audio_level = 0.3;
        driver.tick(0.02, &mut ctx, &mut expr);
        assert!((expr.alias_target("aa") - 0.6).abs() < 1e-5);
    }

    #[test]
    fn test_breath_alias_fed() {
        let mut driver = IdleDriver::new(&seeded()).with_breath_alias(Some("Breath".into()));
        let mut ctx = AnimationContext::default();
        let mut expr = blender();
        ctx.time = 1.0;
        driver.tick(0.02, &mut ctx, &mut expr);
        assert!((expr.alias_target("Breath") - driver.breath(1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_windows_never_panic() {
        let config = IdleConfig {
            blink_max: f32::NAN,
            saccade_yaw: -0.1,
            saccade_pitch: 0.0,
            ..seeded()
        };
        let mut driver = IdleDriver::new(&config);
        let mut ctx = AnimationContext::default();
        let mut expr = blender();
        for _ in 0..100 {
            ctx.clear_offsets();
            ctx.time += 0.05;
            driver.tick(0.05, &mut ctx, &mut expr);
        }
        assert!(driver.eye_offset().is_finite());
        assert_eq!(driver.eye_offset().x, 0.0);
    }

    #[test]
    fn test_parse_state() {
        assert_eq!(IdleState::parse("Listening"), Some(IdleState::Listening));
        assert_eq!(IdleState::parse("dancing"), None);
    }
}
