//! Multi-step emotional reactions.
//!
//! A reaction is a list of timed steps plus optional single-shot fields that
//! apply the moment it is triggered. Steps are turned into a scheduled-event
//! list checked against the accumulated tick clock; nothing here touches the
//! rig directly. Each tick yields [`ReactionEffect`]s that the animator routes
//! to the owning controllers.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::posture::Mode;
use crate::config::ReactionConfig;
use crate::rig::{pose_from_degrees, BonePose, BoneRotation};

/// Slack for comparing fire times against the accumulated clock
const CLOCK_EPSILON: f32 = 1e-4;

/// What a step does when it fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepAction {
    /// Body bone rotations in degrees
    Body { bones: HashMap<String, [f32; 3]> },
    /// Hand/finger bone rotations in degrees
    Hands { bones: HashMap<String, [f32; 3]> },
    /// Transient expression targets held for the step duration
    Facial {
        #[serde(default)]
        expressions: HashMap<String, f32>,
        #[serde(default)]
        mouth: HashMap<String, f32>,
        #[serde(default)]
        eyes: HashMap<String, f32>,
    },
    /// Queue a gesture; a positive step duration overrides its length
    Gesture { name: String },
    /// Persistent expression
    Expression {
        name: String,
        #[serde(default = "full_intensity")]
        value: f32,
    },
}

fn full_intensity() -> f32 {
    1.0
}

/// One timed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionStep {
    #[serde(flatten)]
    pub action: StepAction,
    /// Seconds after the previous step ends
    #[serde(default)]
    pub delay: f32,
    #[serde(default)]
    pub duration: f32,
}

impl ReactionStep {
    pub fn new(action: StepAction, delay: f32, duration: f32) -> Self {
        Self {
            action,
            delay,
            duration,
        }
    }
}

fn non_negative(v: f32) -> f32 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}

fn default_enabled() -> bool {
    true
}

/// A named reaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionDefinition {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub steps: Vec<ReactionStep>,

    #[serde(default)]
    pub expressions: HashMap<String, f32>,
    #[serde(default)]
    pub gestures: Vec<String>,
    #[serde(default)]
    pub posture: Option<String>,
    /// Head look-at in degrees
    #[serde(default)]
    pub look_at: Option<[f32; 3]>,
    #[serde(default)]
    pub idle_gesture: Option<String>,
    #[serde(default)]
    pub mode: Option<Mode>,
}

impl ReactionDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            steps: Vec::new(),
            expressions: HashMap::new(),
            gestures: Vec::new(),
            posture: None,
            look_at: None,
            idle_gesture: None,
            mode: None,
        }
    }

    pub fn with_step(mut self, step: ReactionStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Fire time of each step relative to the trigger.
    ///
    /// Step `i` fires after every delay up to and including its own and every
    /// earlier step's duration.
    pub fn step_schedule(&self) -> Vec<f32> {
        let mut t = 0.0;
        self.steps
            .iter()
            .map(|step| {
                t += non_negative(step.delay);
                let fire = t;
                t += non_negative(step.duration);
                fire
            })
            .collect()
    }

    /// Whether the definition carries any single-shot fields.
    pub fn has_legacy_fields(&self) -> bool {
        !self.expressions.is_empty()
            || !self.gestures.is_empty()
            || self.posture.is_some()
            || self.look_at.is_some()
            || self.idle_gesture.is_some()
            || self.mode.is_some()
    }
}

/// Side effect for the animator to route to a controller
#[derive(Debug, Clone, PartialEq)]
pub enum ReactionEffect {
    /// Bone targets in radians
    Bones(BonePose),
    /// Expression frame targets
    Facial(HashMap<String, f32>),
    Gesture { name: String, duration: Option<f32> },
    Persistent { name: String, value: f32 },
    Posture(String),
    LookAt(BoneRotation),
    IdleGesture(String),
    Mode(Mode),
}

#[derive(Debug)]
struct ScheduledEvent {
    fire_at: f32,
    definition: Arc<ReactionDefinition>,
    step: usize,
}

#[derive(Debug)]
struct FacialHold {
    targets: HashMap<String, f32>,
    until: f32,
}

/// Plays reactions against the tick clock.
#[derive(Debug)]
pub struct ReactionSequencer {
    library: HashMap<String, Arc<ReactionDefinition>>,
    legacy_hold: f32,
    clock: f32,
    active: Option<String>,
    events: VecDeque<ScheduledEvent>,
    holds: Vec<FacialHold>,
}

impl ReactionSequencer {
    pub fn new(definitions: Vec<ReactionDefinition>, config: &ReactionConfig) -> Self {
        let mut sequencer = Self {
            library: HashMap::new(),
            legacy_hold: non_negative(config.legacy_hold),
            clock: 0.0,
            active: None,
            events: VecDeque::new(),
            holds: Vec::new(),
        };
        sequencer.set_library(definitions);
        sequencer
    }

    /// Replace every definition. Pending events keep the definitions they
    /// were scheduled from.
    pub fn set_library(&mut self, definitions: Vec<ReactionDefinition>) {
        self.library = definitions
            .into_iter()
            .map(|def| (def.name.clone(), Arc::new(def)))
            .collect();
        tracing::debug!("Loaded {} reaction(s)", self.library.len());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.library.contains_key(name)
    }

    pub fn clock(&self) -> f32 {
        self.clock
    }

    /// Name of the reaction whose events are still pending
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn pending(&self) -> usize {
        self.events.len()
    }

    /// Start a reaction, cancelling whatever the previous one still had
    /// scheduled. Returns the single-shot effects to apply now.
    pub fn trigger(&mut self, name: &str) -> Vec<ReactionEffect> {
        let Some(definition) = self.library.get(name).cloned() else {
            tracing::warn!("Unknown reaction '{}', ignoring", name);
            return Vec::new();
        };
        if !definition.enabled {
            tracing::warn!("Reaction '{}' is disabled, ignoring", name);
            return Vec::new();
        }

        self.cancel();
        tracing::debug!(
            "Triggered reaction {} ({} step(s))",
            definition.name,
            definition.steps.len()
        );

        let mut effects = Vec::new();
        if !definition.expressions.is_empty() {
            effects.push(ReactionEffect::Facial(definition.expressions.clone()));
            if self.legacy_hold > 0.0 {
                self.holds.push(FacialHold {
                    targets: definition.expressions.clone(),
                    until: self.clock + self.legacy_hold,
                });
            }
        }
        for gesture in &definition.gestures {
            effects.push(ReactionEffect::Gesture {
                name: gesture.clone(),
                duration: None,
            });
        }
        if let Some(posture) = &definition.posture {
            effects.push(ReactionEffect::Posture(posture.clone()));
        }
        if let Some(look_at) = definition.look_at {
            effects.push(ReactionEffect::LookAt(BoneRotation::from_degrees(look_at)));
        }
        if let Some(idle) = &definition.idle_gesture {
            effects.push(ReactionEffect::IdleGesture(idle.clone()));
        }
        if let Some(mode) = definition.mode {
            effects.push(ReactionEffect::Mode(mode));
        }

        for (step, offset) in definition.step_schedule().into_iter().enumerate() {
            self.events.push_back(ScheduledEvent {
                fire_at: self.clock + offset,
                definition: Arc::clone(&definition),
                step,
            });
        }
        self.active = Some(definition.name.clone());

        effects
    }

    /// Advance the clock and collect the effects due this tick.
    pub fn tick(&mut self, dt: f32) -> Vec<ReactionEffect> {
        self.clock += non_negative(dt);
        let now = self.clock;
        let mut effects = Vec::new();

        self.holds.retain(|hold| now < hold.until);
        for hold in &self.holds {
            effects.push(ReactionEffect::Facial(hold.targets.clone()));
        }

        while self
            .events
            .front()
            .is_some_and(|event| event.fire_at <= now + CLOCK_EPSILON)
        {
            let Some(event) = self.events.pop_front() else {
                break;
            };
            let Some(step) = event.definition.steps.get(event.step) else {
                continue;
            };
            tracing::debug!(
                "Reaction {} step {} fired at {:.3}",
                event.definition.name,
                event.step + 1,
                now
            );
            self.fire(step, event.fire_at, &mut effects);
        }

        if self.events.is_empty() {
            self.active = None;
        }
        effects
    }

    fn fire(&mut self, step: &ReactionStep, fire_at: f32, effects: &mut Vec<ReactionEffect>) {
        match &step.action {
            StepAction::Body { bones } | StepAction::Hands { bones } => {
                effects.push(ReactionEffect::Bones(pose_from_degrees(bones)));
            }
            StepAction::Facial {
                expressions,
                mouth,
                eyes,
            } => {
                let targets: HashMap<String, f32> = expressions
                    .iter()
                    .chain(mouth)
                    .chain(eyes)
                    .map(|(k, &v)| (k.clone(), v))
                    .collect();
                effects.push(ReactionEffect::Facial(targets.clone()));
                let duration = non_negative(step.duration);
                if duration > 0.0 {
                    self.holds.push(FacialHold {
                        targets,
                        until: fire_at + duration,
                    });
                }
            }
            StepAction::Gesture { name } => {
                let duration = non_negative(step.duration);
                effects.push(ReactionEffect::Gesture {
                    name: name.clone(),
                    duration: (duration > 0.0).then_some(duration),
                });
            }
            StepAction::Expression { name, value } => {
                effects.push(ReactionEffect::Persistent {
                    name: name.clone(),
                    value: *value,
                });
            }
        }
    }

    fn cancel(&mut self) {
        if let Some(previous) = self.active.take() {
            if !self.events.is_empty() {
                tracing::debug!(
                    "Cancelled {} pending step(s) of {}",
                    self.events.len(),
                    previous
                );
            }
        }
        self.events.clear();
        self.holds.clear();
    }

    /// Cancel everything and restart the clock.
    pub fn clear(&mut self) {
        self.cancel();
        self.clock = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gesture_step(name: &str, delay: f32, duration: f32) -> ReactionStep {
        ReactionStep::new(
            StepAction::Gesture {
                name: name.to_string(),
            },
            delay,
            duration,
        )
    }

    fn three_step() -> ReactionDefinition {
        ReactionDefinition::new("greet")
            .with_step(gesture_step("wave", 0.0, 1.0))
            .with_step(gesture_step("nod", 0.2, 0.5))
            .with_step(gesture_step("fist", 0.1, 0.5))
    }

    fn fired_gestures(effects: &[ReactionEffect]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|e| match e {
                ReactionEffect::Gesture { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_step_schedule() {
        let schedule = three_step().step_schedule();
        let expected = [0.0, 1.2, 1.8];
        for (got, want) in schedule.iter().zip(expected) {
            assert!((got - want).abs() < 1e-5, "got {:?}", schedule);
        }
    }

    #[test]
    fn test_schedule_non_decreasing_with_bad_values() {
        let def = ReactionDefinition::new("odd")
            .with_step(gesture_step("a", -1.0, 0.3))
            .with_step(gesture_step("b", 0.0, f32::NAN))
            .with_step(gesture_step("c", f32::INFINITY, -2.0))
            .with_step(gesture_step("d", 0.4, 0.0));
        let schedule = def.step_schedule();
        for pair in schedule.windows(2) {
            assert!(pair[1] >= pair[0], "schedule {:?} decreases", schedule);
        }
    }

    #[test]
    fn test_third_step_fires_at_1_8() {
        let mut seq = ReactionSequencer::new(vec![three_step()], &ReactionConfig::default());
        seq.trigger("greet");

        let mut fired = Vec::new();
        for _ in 0..30 {
            for name in fired_gestures(&seq.tick(0.1)) {
                fired.push((name, seq.clock()));
            }
        }

        assert_eq!(fired.len(), 3);
        assert_eq!(fired[2].0, "fist");
        assert!((fired[2].1 - 1.8).abs() < 1e-3, "fired at {}", fired[2].1);
        assert!((fired[1].1 - 1.2).abs() < 1e-3, "fired at {}", fired[1].1);
    }

    #[test]
    fn test_quarter_ticks_fire_on_boundary() {
        let mut seq = ReactionSequencer::new(vec![three_step()], &ReactionConfig::default());
        seq.trigger("greet");
        let mut fist_at = None;
        for _ in 0..12 {
            if fired_gestures(&seq.tick(0.25)).contains(&"fist".to_string()) {
                fist_at = Some(seq.clock());
            }
        }
        assert_eq!(fist_at, Some(2.0));
    }

    #[test]
    fn test_unknown_and_disabled_are_noops() {
        let mut disabled = three_step();
        disabled.name = "off".into();
        disabled.enabled = false;
        let mut seq = ReactionSequencer::new(vec![disabled], &ReactionConfig::default());

        assert!(seq.trigger("missing").is_empty());
        assert!(seq.trigger("off").is_empty());
        assert_eq!(seq.pending(), 0);
        assert!(seq.tick(1.0).is_empty());
    }

    #[test]
    fn test_retrigger_cancels_previous() {
        let other = ReactionDefinition::new("other").with_step(gesture_step("shrug", 5.0, 0.0));
        let mut seq =
            ReactionSequencer::new(vec![three_step(), other], &ReactionConfig::default());
        seq.trigger("greet");
        seq.tick(0.1);
        seq.trigger("other");
        assert_eq!(seq.pending(), 1);
        assert_eq!(seq.active(), Some("other"));

        let mut names = Vec::new();
        for _ in 0..60 {
            names.extend(fired_gestures(&seq.tick(0.1)));
        }
        assert_eq!(names, vec!["shrug".to_string()]);
    }

    #[test]
    fn test_facial_step_reasserted_for_duration() {
        let facial = StepAction::Facial {
            expressions: [("joy".to_string(), 0.8)].into_iter().collect(),
            mouth: HashMap::new(),
            eyes: HashMap::new(),
        };
        let def = ReactionDefinition::new("smile").with_step(ReactionStep::new(facial, 0.0, 0.5));
        let mut seq = ReactionSequencer::new(vec![def], &ReactionConfig::default());
        seq.trigger("smile");

        let mut facial_ticks = 0;
        for _ in 0..10 {
            let effects = seq.tick(0.1);
            if effects.iter().any(|e| matches!(e, ReactionEffect::Facial(_))) {
                facial_ticks += 1;
            }
        }
        // fires at 0.1, then held through ticks strictly before 0.5
        assert!((4..=5).contains(&facial_ticks), "facial for {} ticks", facial_ticks);
    }

    #[test]
    fn test_legacy_fields_apply_at_trigger() {
        let mut def = ReactionDefinition::new("surprised");
        def.expressions.insert("surprised".into(), 1.0);
        def.gestures.push("open_palms".into());
        def.posture = Some("excited".into());
        def.look_at = Some([0.0, 20.0, 0.0]);
        def.idle_gesture = Some("none".into());
        def.mode = Some(Mode::Active);
        assert!(def.has_legacy_fields());

        let mut seq = ReactionSequencer::new(vec![def], &ReactionConfig { legacy_hold: 0.3 });
        let effects = seq.trigger("surprised");
        assert_eq!(effects.len(), 6);
        assert!(effects.contains(&ReactionEffect::Posture("excited".into())));
        assert!(effects.contains(&ReactionEffect::Mode(Mode::Active)));

        let held = |e: &Vec<ReactionEffect>| e.iter().any(|x| matches!(x, ReactionEffect::Facial(_)));
        assert!(held(&seq.tick(0.1)));
        assert!(held(&seq.tick(0.1)));
        assert!(!held(&seq.tick(0.2)));
    }

    #[test]
    fn test_body_step_converts_degrees() {
        let body = StepAction::Body {
            bones: [("spine".to_string(), [90.0, 0.0, 0.0])].into_iter().collect(),
        };
        let def = ReactionDefinition::new("bow").with_step(ReactionStep::new(body, 0.0, 1.0));
        let mut seq = ReactionSequencer::new(vec![def], &ReactionConfig::default());
        seq.trigger("bow");
        let effects = seq.tick(0.016);
        match &effects[0] {
            ReactionEffect::Bones(pose) => {
                assert!((pose["spine"].x - std::f32::consts::FRAC_PI_2).abs() < 1e-5)
            }
            other => panic!("expected bones, got {:?}", other),
        }
    }

    #[test]
    fn test_reload_keeps_scheduled_steps() {
        let mut seq = ReactionSequencer::new(vec![three_step()], &ReactionConfig::default());
        seq.trigger("greet");
        seq.set_library(Vec::new());
        assert!(!seq.contains("greet"));

        let mut names = Vec::new();
        for _ in 0..25 {
            names.extend(fired_gestures(&seq.tick(0.1)));
        }
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn test_parse_steps_from_toml() {
        let def: ReactionDefinition = toml::from_str(
            r#"
            name = "cheer"
            gestures = ["wave"]

            [[steps]]
            type = "gesture"
            name = "thumbs_up"
            delay = 0.2
            duration = 1.0

            [[steps]]
            type = "facial"
            duration = 0.5
            expressions = { joy = 1.0 }
            "#,
        )
        .unwrap();
        assert!(def.enabled);
        assert_eq!(def.steps.len(), 2);
        assert!(matches!(def.steps[1].action, StepAction::Facial { .. }));
        assert!((def.step_schedule()[1] - 1.2).abs() < 1e-6);
    }
}
