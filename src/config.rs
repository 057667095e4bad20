//! Engine configuration parsing and management for Marionette
//!
//! These are tuning values shared by every avatar instance. Per-character
//! data (aliases, gestures, reactions) lives in [`crate::avatar::CharacterProfile`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::animation::easing::Easing;
use crate::animation::lod::{LodLevel, ShadowQuality};
use crate::error::{ConfigError, MarionetteError};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub expression: ExpressionConfig,
    pub bones: BoneConfig,
    pub gesture: GestureConfig,
    pub idle: IdleConfig,
    pub walk: WalkConfig,
    pub camera: CameraConfig,
    pub posture: PostureConfig,
    pub reaction: ReactionConfig,
    pub lod: LodConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MarionetteError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn from_str(s: &str) -> Result<Self, MarionetteError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Load configuration from default paths
    pub fn load() -> Result<Self, MarionetteError> {
        let paths = [
            PathBuf::from("marionette.toml"),
            PathBuf::from("config/marionette.toml"),
            dirs_path().join("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), MarionetteError> {
        positive("expression.blend_rate", self.expression.blend_rate)?;
        non_negative("expression.frame_decay_rate", self.expression.frame_decay_rate)?;
        positive("bones.blend_rate", self.bones.blend_rate)?;
        non_negative("gesture.transition_speed", self.gesture.transition_speed)?;

        positive("idle.slice_secs", self.idle.slice_secs)?;
        finite("idle.breath_rate", self.idle.breath_rate)?;
        finite("idle.breath_pitch", self.idle.breath_pitch)?;
        positive("idle.blink_min", self.idle.blink_min)?;
        positive("idle.blink_max", self.idle.blink_max)?;
        positive("idle.blink_duration", self.idle.blink_duration)?;
        if self.idle.blink_max < self.idle.blink_min {
            return Err(invalid("idle.blink_max", "must be >= idle.blink_min"));
        }
        positive("idle.saccade_min", self.idle.saccade_min)?;
        positive("idle.saccade_max", self.idle.saccade_max)?;
        if self.idle.saccade_max < self.idle.saccade_min {
            return Err(invalid("idle.saccade_max", "must be >= idle.saccade_min"));
        }
        non_negative("idle.saccade_yaw", self.idle.saccade_yaw)?;
        non_negative("idle.saccade_pitch", self.idle.saccade_pitch)?;
        finite("idle.sway_amplitude", self.idle.sway_amplitude)?;
        finite("idle.busy_audio_threshold", self.idle.busy_audio_threshold)?;

        positive("walk.max_speed", self.walk.max_speed)?;
        positive("walk.bob_rise_rate", self.walk.bob_rise_rate)?;
        positive("walk.bob_decay_rate", self.walk.bob_decay_rate)?;
        unit("walk.strafe_residual", self.walk.strafe_residual)?;
        for (field, value) in [
            ("walk.move_scale", self.walk.move_scale),
            ("walk.bob_amplitude", self.walk.bob_amplitude),
            ("walk.bob_speed_gain", self.walk.bob_speed_gain),
            ("walk.stride", self.walk.stride),
            ("walk.knee_bend", self.walk.knee_bend),
            ("walk.stride_frequency", self.walk.stride_frequency),
            ("walk.arm_intensity", self.walk.arm_intensity),
        ] {
            finite(field, value)?;
        }
        let b = &self.walk.bounds;
        if !(b.min_x < b.max_x && b.min_z < b.max_z) {
            return Err(invalid("walk.bounds", "min must be below max on both axes"));
        }

        positive("camera.tracking_rate", self.camera.tracking_rate)?;
        positive("camera.override_rate", self.camera.override_rate)?;
        unit("camera.active_intensity", self.camera.active_intensity)?;
        unit("camera.passive_intensity", self.camera.passive_intensity)?;
        non_negative("camera.max_yaw_deg", self.camera.max_yaw_deg)?;
        non_negative("camera.max_pitch_deg", self.camera.max_pitch_deg)?;
        finite("camera.roll_scale", self.camera.roll_scale)?;
        finite("camera.nod_amplitude", self.camera.nod_amplitude)?;
        finite("camera.nod_frequency", self.camera.nod_frequency)?;
        non_negative("camera.nod_decay", self.camera.nod_decay)?;
        positive("posture.blend_rate", self.posture.blend_rate)?;

        if self.lod.levels.is_empty() {
            return Err(invalid("lod.levels", "at least one level is required"));
        }
        for (i, level) in self.lod.levels.iter().enumerate() {
            if !(level.distance.is_finite() && level.distance >= 0.0) {
                return Err(invalid(
                    &format!("lod.levels[{}].distance", i),
                    "must be a finite distance >= 0",
                ));
            }
            unit(&format!("lod.levels[{}].particle_multiplier", i), level.particle_multiplier)?;
        }
        non_negative("lod.transition_secs", self.lod.transition_secs)?;

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> MarionetteError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

fn positive(field: &str, value: f32) -> Result<(), MarionetteError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, "must be greater than 0"))
    }
}

fn finite(field: &str, value: f32) -> Result<(), MarionetteError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, "must be a finite number"))
    }
}

fn non_negative(field: &str, value: f32) -> Result<(), MarionetteError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, "must not be negative"))
    }
}

fn unit(field: &str, value: f32) -> Result<(), MarionetteError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, "must be between 0.0 and 1.0"))
    }
}

/// Expression blending
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionConfig {
    /// Fraction of the remaining distance covered per second
    pub blend_rate: f32,
    /// Linear fall-off (per second) of frame targets that were not refreshed
    pub frame_decay_rate: f32,
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self {
            blend_rate: 8.0,
            frame_decay_rate: 2.0,
        }
    }
}

/// Bone target smoothing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoneConfig {
    pub blend_rate: f32,
}

impl Default for BoneConfig {
    fn default() -> Self {
        Self { blend_rate: 10.0 }
    }
}

/// How a new gesture replaces the previous bone targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionStyle {
    /// Targets jump to the gesture pose
    #[default]
    Instant,
    /// Eased interpolation from the captured pose over `transition_speed`
    Eased,
}

/// Gesture playback
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub transition: TransitionStyle,
    /// Seconds spent easing into a gesture (eased style only)
    pub transition_speed: f32,
    pub easing: Easing,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            transition: TransitionStyle::Instant,
            transition_speed: 0.25,
            easing: Easing::QuadInOut,
        }
    }
}

/// Idle motion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Seconds each idle gesture plays before rotating to the next
    pub slice_secs: f32,
    /// Breaths per second
    pub breath_rate: f32,
    /// Spine pitch at full inhale (radians)
    pub breath_pitch: f32,
    pub blink_min: f32,
    pub blink_max: f32,
    pub blink_duration: f32,
    pub saccade_min: f32,
    pub saccade_max: f32,
    /// Max eye yaw offset (radians)
    pub saccade_yaw: f32,
    /// Max eye pitch offset (radians)
    pub saccade_pitch: f32,
    /// Head sway amplitude fed to camera composition (radians)
    pub sway_amplitude: f32,
    /// Audio level at which idle gestures yield to reactive motion
    pub busy_audio_threshold: f32,
    /// Fixed RNG seed; entropy when absent
    pub seed: Option<u64>,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            slice_secs: 4.0,
            breath_rate: 0.25,
            breath_pitch: 0.012,
            blink_min: 2.0,
            blink_max: 6.0,
            blink_duration: 0.2,
            saccade_min: 0.6,
            saccade_max: 2.4,
            saccade_yaw: 0.08,
            saccade_pitch: 0.04,
            sway_amplitude: 0.015,
            busy_audio_threshold: 0.15,
            seed: None,
        }
    }
}

/// Walkable rectangle on the ground plane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WalkBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_z: f32,
    pub max_z: f32,
}

impl Default for WalkBounds {
    fn default() -> Self {
        Self {
            min_x: -3.0,
            max_x: 3.0,
            min_z: -3.0,
            max_z: 2.0,
        }
    }
}

/// Locomotion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    pub max_speed: f32,
    /// World units per second at speed 1.0
    pub move_scale: f32,
    pub bounds: WalkBounds,
    pub bob_amplitude: f32,
    pub bob_speed_gain: f32,
    pub bob_rise_rate: f32,
    pub bob_decay_rate: f32,
    /// Upper-leg swing amplitude (radians)
    pub stride: f32,
    /// Knee bend amplitude (radians)
    pub knee_bend: f32,
    /// Gait cycles (radians of phase) per second per unit of speed
    pub stride_frequency: f32,
    /// Forward/back swing kept while strafing
    pub strafe_residual: f32,
    pub arm_swing: bool,
    pub arm_sync: bool,
    pub arm_intensity: f32,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            max_speed: 2.0,
            move_scale: 0.5,
            bounds: WalkBounds::default(),
            bob_amplitude: 0.03,
            bob_speed_gain: 1.0,
            bob_rise_rate: 4.0,
            bob_decay_rate: 10.0,
            stride: 0.45,
            knee_bend: 0.6,
            stride_frequency: 4.0,
            strafe_residual: 0.35,
            arm_swing: true,
            arm_sync: true,
            arm_intensity: 0.25,
        }
    }
}

/// Head tracking toward the camera
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub enabled: bool,
    /// r1: tracking blend rate
    pub tracking_rate: f32,
    /// r2: explicit override blend rate
    pub override_rate: f32,
    pub active_intensity: f32,
    pub passive_intensity: f32,
    pub max_yaw_deg: f32,
    pub max_pitch_deg: f32,
    /// Multiplier on the roll component of the tracking rotation
    pub roll_scale: f32,
    pub nod_amplitude: f32,
    /// Nod oscillations per second
    pub nod_frequency: f32,
    /// Exponential decay of the nod envelope (per second)
    pub nod_decay: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tracking_rate: 5.0,
            override_rate: 8.0,
            active_intensity: 0.8,
            passive_intensity: 0.3,
            max_yaw_deg: 70.0,
            max_pitch_deg: 35.0,
            roll_scale: 0.3,
            nod_amplitude: 0.08,
            nod_frequency: 2.0,
            nod_decay: 3.0,
        }
    }
}

/// Lean / engagement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostureConfig {
    pub blend_rate: f32,
    pub lean_forward_deg: f32,
    pub lean_back_deg: f32,
    /// Root offset along Z for a full lean (world units)
    pub lean_offset: f32,
    /// Fraction of the camera yaw the upper body turns when engaged
    pub toward_camera_factor: f32,
}

impl Default for PostureConfig {
    fn default() -> Self {
        Self {
            blend_rate: 3.0,
            lean_forward_deg: 8.0,
            lean_back_deg: 6.0,
            lean_offset: 0.04,
            toward_camera_factor: 0.35,
        }
    }
}

/// Reaction playback
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionConfig {
    /// Seconds the legacy single-shot expressions are held
    pub legacy_hold: f32,
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self { legacy_hold: 1.5 }
    }
}

/// Distance-based quality tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    pub levels: Vec<LodLevel>,
    pub transition_secs: f32,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            levels: vec![
                LodLevel::new(0.0, ShadowQuality::High, 1.0),
                LodLevel::new(8.0, ShadowQuality::Medium, 0.75),
                LodLevel::new(16.0, ShadowQuality::Low, 0.5),
                LodLevel::new(30.0, ShadowQuality::None, 0.2),
            ],
            transition_secs: 0.5,
        }
    }
}

/// Get the platform-specific configuration directory
fn dirs_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        if let Some(config_dir) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(config_dir).join("marionette");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".config/marionette");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join("Library/Application Support/marionette");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("marionette");
        }
    }

    PathBuf::from(".")
}
