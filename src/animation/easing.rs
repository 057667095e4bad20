//! Easing curves for pose transitions.

use serde::{Deserialize, Serialize};

/// Easing function applied to a normalized transition factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    Linear,
    #[default]
    QuadInOut,
    CubicOut,
    CubicIn,
}

impl Easing {
    /// Evaluate the easing function at t in [0, 1].
    pub fn ease(&self, t: f32) -> f32 {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        match self {
            Self::Linear => t,
            Self::QuadInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Self::CubicOut => 1.0 - (1.0 - t).powi(3),
            Self::CubicIn => t * t * t,
        }
    }
}
