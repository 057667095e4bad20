//! Observable avatar state snapshot

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::animation::idle::IdleState;
use crate::animation::lod::ShadowQuality;
use crate::animation::posture::Mode;

/// Point-in-time view of one avatar, for logging and status surfaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvatarState {
    /// Tick clock in seconds
    time: f32,
    idle_state: IdleState,
    mode: Mode,
    posture: String,
    /// Active gesture (if any)
    gesture: Option<String>,
    queued_gestures: usize,
    /// Reaction with steps still pending (if any)
    reaction: Option<String>,
    is_walking: bool,
    position: [f32; 3],
    /// Strongest expression channels, highest first
    expressions: Vec<(String, f32)>,
    shadow_quality: ShadowQuality,
    particle_multiplier: f32,
}

impl Default for AvatarState {
    fn default() -> Self {
        Self {
            time: 0.0,
            idle_state: IdleState::Idle,
            mode: Mode::Active,
            posture: "neutral".to_string(),
            gesture: None,
            queued_gestures: 0,
            reaction: None,
            is_walking: false,
            position: [0.0; 3],
            expressions: Vec::new(),
            shadow_quality: ShadowQuality::High,
            particle_multiplier: 1.0,
        }
    }
}

impl AvatarState {
    pub fn new(time: f32) -> Self {
        Self {
            time,
            ..Default::default()
        }
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn idle_state(&self) -> IdleState {
        self.idle_state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn posture(&self) -> &str {
        &self.posture
    }

    pub fn gesture(&self) -> Option<&str> {
        self.gesture.as_deref()
    }

    pub fn queued_gestures(&self) -> usize {
        self.queued_gestures
    }

    pub fn reaction(&self) -> Option<&str> {
        self.reaction.as_deref()
    }

    pub fn is_walking(&self) -> bool {
        self.is_walking
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn expressions(&self) -> &[(String, f32)] {
        &self.expressions
    }

    pub fn shadow_quality(&self) -> ShadowQuality {
        self.shadow_quality
    }

    pub fn particle_multiplier(&self) -> f32 {
        self.particle_multiplier
    }

    pub fn with_idle(mut self, idle_state: IdleState, mode: Mode, posture: &str) -> Self {
        self.idle_state = idle_state;
        self.mode = mode;
        self.posture = posture.to_string();
        self
    }

    pub fn with_gesture(mut self, gesture: Option<&str>, queued: usize) -> Self {
        self.gesture = gesture.map(str::to_string);
        self.queued_gestures = queued;
        self
    }

    pub fn with_reaction(mut self, reaction: Option<&str>) -> Self {
        self.reaction = reaction.map(str::to_string);
        self
    }

    pub fn with_walk(mut self, is_walking: bool, position: Vec3) -> Self {
        self.is_walking = is_walking;
        self.position = position.to_array();
        self
    }

    pub fn with_expressions(mut self, expressions: Vec<(String, f32)>) -> Self {
        self.expressions = expressions;
        self
    }

    pub fn with_lod(mut self, shadow_quality: ShadowQuality, particle_multiplier: f32) -> Self {
        self.shadow_quality = shadow_quality;
        self.particle_multiplier = particle_multiplier;
        self
    }

    /// One-line summary for periodic logging
    pub fn summary(&self) -> String {
        let expressions: Vec<String> = self
            .expressions
            .iter()
            .map(|(name, v)| format!("{}={:.2}", name, v))
            .collect();
        format!(
            "t={:.1}s state={} mode={:?} posture={} gesture={} reaction={} walking={} pos=({:.2}, {:.2}, {:.2}) expr=[{}]",
            self.time,
            self.idle_state,
            self.mode,
            self.posture,
            self.gesture.as_deref().unwrap_or("-"),
            self.reaction.as_deref().unwrap_or("-"),
            self.is_walking,
            self.position[0],
            self.position[1],
            self.position[2],
            expressions.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = AvatarState::default();
        assert_eq!(state.idle_state(), IdleState::Idle);
        assert!(state.gesture().is_none());
        assert!(!state.is_walking());
    }

    #[test]
    fn test_builders() {
        let state = AvatarState::new(2.5)
            .with_idle(IdleState::Talking, Mode::Passive, "lean-forward")
            .with_gesture(Some("wave"), 2)
            .with_walk(true, Vec3::new(0.0, 0.0, 1.0))
            .with_expressions(vec![("Fcl_ALL_Joy".into(), 0.8)]);

        assert_eq!(state.time(), 2.5);
        assert_eq!(state.mode(), Mode::Passive);
        assert_eq!(state.gesture(), Some("wave"));
        assert_eq!(state.queued_gestures(), 2);
        assert_eq!(state.position().z, 1.0);
        assert!(state.summary().contains("Fcl_ALL_Joy=0.80"));
    }

    #[test]
    fn test_serializes_to_json() {
        let state = AvatarState::new(1.0).with_reaction(Some("cheer"));
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"reaction\":\"cheer\""));
        assert!(json.contains("\"idle_state\":\"idle\""));
    }
}
