//! Distance-based level of detail.
//!
//! The camera-to-subject distance picks a discrete quality tier; tier changes
//! are animated over a short transition and only pushed to the renderer when
//! the result differs meaningfully from what was last applied.

use serde::{Deserialize, Serialize};

use crate::config::LodConfig;

/// Minimum particle multiplier change worth re-applying
const MULTIPLIER_EPSILON: f32 = 0.05;

/// Shadow rendering quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowQuality {
    High,
    Medium,
    Low,
    None,
}

/// One tier of the distance table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LodLevel {
    /// Minimum distance (inclusive) at which this tier applies
    pub distance: f32,
    pub shadow_quality: ShadowQuality,
    pub particle_multiplier: f32,
}

impl LodLevel {
    pub fn new(distance: f32, shadow_quality: ShadowQuality, particle_multiplier: f32) -> Self {
        Self {
            distance,
            shadow_quality,
            particle_multiplier,
        }
    }

    pub fn settings(&self) -> LodSettings {
        LodSettings {
            shadow_quality: self.shadow_quality,
            particle_multiplier: self.particle_multiplier,
        }
    }
}

/// Quality values handed to the renderer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodSettings {
    pub shadow_quality: ShadowQuality,
    pub particle_multiplier: f32,
}

impl LodSettings {
    /// Blend toward `to`. Shadow quality switches at the halfway point.
    pub fn interpolate(&self, to: &LodSettings, t: f32) -> LodSettings {
        let t = t.clamp(0.0, 1.0);
        LodSettings {
            shadow_quality: if t < 0.5 {
                self.shadow_quality
            } else {
                to.shadow_quality
            },
            particle_multiplier: self.particle_multiplier
                + (to.particle_multiplier - self.particle_multiplier) * t,
        }
    }

    fn differs_from(&self, other: &LodSettings) -> bool {
        self.shadow_quality != other.shadow_quality
            || (self.particle_multiplier - other.particle_multiplier).abs() > MULTIPLIER_EPSILON
    }
}

#[derive(Debug, Clone, Copy)]
struct LodTransition {
    from: LodSettings,
    to: LodSettings,
    elapsed: f32,
    duration: f32,
}

impl LodTransition {
    fn tick(&mut self, dt: f32) -> LodSettings {
        self.elapsed += dt;
        let t = if self.duration > 0.0 {
            self.elapsed / self.duration
        } else {
            1.0
        };
        self.from.interpolate(&self.to, t)
    }

    fn is_done(&self) -> bool {
        self.elapsed >= self.duration
    }
}

/// Tracks the active tier and the settings last applied.
#[derive(Debug)]
pub struct LodController {
    levels: Vec<LodLevel>,
    transition_secs: f32,
    level: usize,
    current: LodSettings,
    applied: Option<LodSettings>,
    transition: Option<LodTransition>,
}

impl LodController {
    /// Build from a level table; levels are sorted by distance.
    /// An empty table falls back to the default one.
    pub fn new(config: &LodConfig) -> Self {
        let mut levels = if config.levels.is_empty() {
            LodConfig::default().levels
        } else {
            config.levels.clone()
        };
        levels.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        let current = levels[0].settings();
        Self {
            levels,
            transition_secs: config.transition_secs.max(0.0),
            level: 0,
            current,
            applied: None,
            transition: None,
        }
    }

    pub fn levels(&self) -> &[LodLevel] {
        &self.levels
    }

    /// Index of the highest threshold not above `distance`.
    pub fn select(&self, distance: f32) -> usize {
        let distance = sanitize_distance(distance);
        self.levels
            .iter()
            .rposition(|level| level.distance <= distance)
            .unwrap_or(0)
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn current(&self) -> LodSettings {
        self.current
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    /// Feed the latest distance. Returns settings only when they should be
    /// re-applied.
    pub fn update(&mut self, distance: f32, dt: f32) -> Option<LodSettings> {
        let selected = self.select(distance);
        if selected != self.level {
            tracing::debug!(
                "LOD level {} -> {} at {:.2}m",
                self.level,
                selected,
                sanitize_distance(distance)
            );
            self.level = selected;
            self.transition = Some(LodTransition {
                from: self.current,
                to: self.levels[selected].settings(),
                elapsed: 0.0,
                duration: self.transition_secs,
            });
        }

        if let Some(transition) = self.transition.as_mut() {
            self.current = transition.tick(dt.max(0.0));
            if transition.is_done() {
                self.current = transition.to;
                self.transition = None;
            }
        }

        let apply = match &self.applied {
            None => true,
            Some(applied) => self.current.differs_from(applied),
        };
        if apply {
            self.applied = Some(self.current);
            Some(self.current)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.level = 0;
        self.current = self.levels[0].settings();
        self.applied = None;
        self.transition = None;
    }
}

fn sanitize_distance(distance: f32) -> f32 {
    if distance.is_finite() {
        distance.max(0.0)
    } else {
        0.0
    }
}
