//! Discrete hand/body gestures played one at a time from a FIFO queue.
//!
//! A gesture is a pure function from a continuous phase (wall time in
//! seconds) to a partial pose. Definitions are immutable and shared by `Arc`,
//! so queued entries keep the definition they were enqueued with even if the
//! library is replaced mid-playback.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::f32::consts::TAU;
use std::fmt;
use std::sync::Arc;

use super::context::AnimationContext;
use super::easing::Easing;
use crate::config::{GestureConfig, TransitionStyle};
use crate::rig::{interpolate_pose, BonePose, BoneRotation};

type PoseFn = dyn Fn(f32) -> BonePose + Send + Sync;

/// An immutable gesture: name, default duration and pose function.
pub struct GestureDefinition {
    name: String,
    duration: f32,
    pose: Box<PoseFn>,
}

impl fmt::Debug for GestureDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GestureDefinition")
            .field("name", &self.name)
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

impl GestureDefinition {
    pub fn new<F>(name: &str, duration: f32, pose: F) -> Self
    where
        F: Fn(f32) -> BonePose + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            duration: duration.max(0.05),
            pose: Box::new(pose),
        }
    }

    /// A gesture whose pose does not change over time.
    pub fn fixed(name: &str, duration: f32, pose: BonePose) -> Self {
        Self::new(name, duration, move |_| pose.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn pose_at(&self, phase: f32) -> BonePose {
        (self.pose)(phase)
    }

    /// Pose at phase zero, applied the instant the gesture is promoted.
    pub fn static_pose(&self) -> BonePose {
        self.pose_at(0.0)
    }
}

/// Rotation axis for a data-driven oscillation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Sinusoidal motion layered on one bone of a data-driven gesture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Oscillation {
    pub bone: String,
    pub axis: Axis,
    pub amplitude_deg: f32,
    /// Cycles per second
    pub frequency: f32,
}

/// Gesture described in a character profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureSpec {
    pub name: String,
    #[serde(default = "default_gesture_duration")]
    pub duration: f32,
    /// Bone name → Euler angles in degrees
    #[serde(default)]
    pub bones: HashMap<String, [f32; 3]>,
    #[serde(default)]
    pub oscillation: Option<Oscillation>,
}

fn default_gesture_duration() -> f32 {
    1.0
}

impl GestureSpec {
    pub fn to_definition(&self) -> GestureDefinition {
        let base = crate::rig::pose_from_degrees(&self.bones);
        match self.oscillation.clone() {
            None => GestureDefinition::fixed(&self.name, self.duration, base),
            Some(osc) => {
                let amplitude = osc.amplitude_deg.to_radians();
                GestureDefinition::new(&self.name, self.duration, move |phase| {
                    let mut pose = base.clone();
                    let offset = (phase * osc.frequency * TAU).sin() * amplitude;
                    let rot = pose.entry(osc.bone.clone()).or_default();
                    match osc.axis {
                        Axis::X => rot.x += offset,
                        Axis::Y => rot.y += offset,
                        Axis::Z => rot.z += offset,
                    }
                    pose
                })
            }
        }
    }
}

fn deg_pose(entries: &[(&str, [f32; 3])]) -> BonePose {
    entries
        .iter()
        .map(|(bone, deg)| (bone.to_string(), BoneRotation::from_degrees(*deg)))
        .collect()
}

/// Named gesture definitions available to a player.
#[derive(Debug, Clone, Default)]
pub struct GestureLibrary {
    gestures: HashMap<String, Arc<GestureDefinition>>,
}

impl GestureLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library of the stock gestures every character gets.
    pub fn builtin() -> Self {
        let mut lib = Self::new();

        lib.insert(GestureDefinition::new("wave", 1.5, |phase| {
            let mut pose = deg_pose(&[
                ("rightUpperArm", [0.0, 0.0, 75.0]),
                ("rightLowerArm", [0.0, -20.0, 35.0]),
                ("rightHand", [0.0, 0.0, 0.0]),
            ]);
            let swing = (phase * 2.0 * TAU).sin() * 20f32.to_radians();
            if let Some(hand) = pose.get_mut("rightLowerArm") {
                hand.z += swing;
            }
            pose
        }));
        lib.insert(GestureDefinition::fixed(
            "fist",
            1.0,
            deg_pose(&[
                ("rightLowerArm", [0.0, 0.0, 60.0]),
                ("rightIndexProximal", [0.0, 0.0, 80.0]),
                ("rightThumbProximal", [0.0, 40.0, 0.0]),
            ]),
        ));
        lib.insert(GestureDefinition::fixed(
            "point",
            1.2,
            deg_pose(&[
                ("rightUpperArm", [-60.0, 0.0, 10.0]),
                ("rightLowerArm", [0.0, 0.0, 5.0]),
                ("rightThumbProximal", [0.0, 30.0, 0.0]),
            ]),
        ));
        lib.insert(GestureDefinition::fixed(
            "thumbs_up",
            1.2,
            deg_pose(&[
                ("rightLowerArm", [0.0, 0.0, 80.0]),
                ("rightIndexProximal", [0.0, 0.0, 85.0]),
                ("rightThumbProximal", [0.0, -20.0, 0.0]),
            ]),
        ));
        lib.insert(GestureDefinition::fixed(
            "shrug",
            1.0,
            deg_pose(&[
                ("leftShoulder", [0.0, 0.0, 12.0]),
                ("rightShoulder", [0.0, 0.0, -12.0]),
                ("leftLowerArm", [0.0, 30.0, 0.0]),
                ("rightLowerArm", [0.0, -30.0, 0.0]),
                ("head", [0.0, 0.0, 6.0]),
            ]),
        ));
        lib.insert(GestureDefinition::new("nod", 1.0, |phase| {
            let pitch = (phase * 2.5 * TAU).sin().max(0.0) * 14f32.to_radians();
            let mut pose = BonePose::new();
            pose.insert("head".to_string(), BoneRotation::new(pitch, 0.0, 0.0));
            pose
        }));
        lib.insert(GestureDefinition::fixed(
            "open_palms",
            1.2,
            deg_pose(&[
                ("leftLowerArm", [0.0, 40.0, -20.0]),
                ("rightLowerArm", [0.0, -40.0, 20.0]),
                ("leftHand", [0.0, 0.0, -25.0]),
                ("rightHand", [0.0, 0.0, 25.0]),
            ]),
        ));

        lib
    }

    /// Built-ins plus profile gestures (profile entries win on name clashes).
    pub fn with_specs(specs: &[GestureSpec]) -> Self {
        let mut lib = Self::builtin();
        for spec in specs {
            lib.insert(spec.to_definition());
        }
        lib
    }

    pub fn insert(&mut self, definition: GestureDefinition) {
        self.gestures
            .insert(definition.name().to_string(), Arc::new(definition));
    }

    pub fn get(&self, name: &str) -> Option<Arc<GestureDefinition>> {
        self.gestures
            .get(name)
            .or_else(|| self.gestures.get(&name.to_lowercase()))
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.gestures.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.gestures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gestures.is_empty()
    }
}

#[derive(Debug, Clone)]
struct QueueEntry {
    definition: Arc<GestureDefinition>,
    duration: f32,
}

#[derive(Debug)]
struct ActiveGesture {
    entry: QueueEntry,
    elapsed: f32,
    /// Targets of the touched bones captured at promotion
    from: BonePose,
    /// Targets this gesture wrote most recently
    written: BonePose,
    /// Bones another writer took over during playback
    released: HashSet<String>,
}

/// Tolerance for deciding a target still holds what the gesture wrote
const OWNED_EPSILON: f32 = 1e-6;

impl ActiveGesture {
    fn owns(&self, bone: &str, ctx: &AnimationContext) -> bool {
        if self.released.contains(bone) {
            return false;
        }
        match self.written.get(bone) {
            Some(&written) => ctx.target(bone).max_abs_diff(written) <= OWNED_EPSILON,
            None => true,
        }
    }

    /// Write a pose, skipping bones something else has written since our
    /// last write.
    fn apply(&mut self, pose: &BonePose, ctx: &mut AnimationContext) {
        for (bone, &rotation) in pose {
            if !self.owns(bone, ctx) {
                if self.released.insert(bone.clone()) {
                    tracing::debug!(
                        "Gesture {} released '{}'",
                        self.entry.definition.name(),
                        bone
                    );
                }
                continue;
            }
            ctx.set_target(bone, rotation);
            self.written.insert(bone.clone(), rotation);
        }
    }

    /// Restore captured targets on bones the gesture still owns.
    fn restore(self, ctx: &mut AnimationContext) {
        for (bone, rotation) in &self.from {
            if self.owns(bone, ctx) {
                ctx.set_target(bone, *rotation);
            }
        }
    }
}

/// Observable player state
#[derive(Debug, Clone, PartialEq)]
pub enum GestureState {
    Idle,
    Playing {
        name: String,
        elapsed: f32,
        duration: f32,
    },
}

/// FIFO gesture player; at most one gesture is live at a time.
#[derive(Debug)]
pub struct GesturePlayer {
    library: GestureLibrary,
    queue: VecDeque<QueueEntry>,
    active: Option<ActiveGesture>,
    transition: TransitionStyle,
    transition_speed: f32,
    easing: Easing,
}

impl GesturePlayer {
    pub fn new(library: GestureLibrary, config: &GestureConfig) -> Self {
        Self {
            library,
            queue: VecDeque::new(),
            active: None,
            transition: config.transition,
            transition_speed: config.transition_speed.max(0.0),
            easing: config.easing,
        }
    }

    /// Replace the gesture library. Queued and active entries keep their
    /// captured definitions.
    pub fn set_library(&mut self, library: GestureLibrary) {
        self.library = library;
    }

    pub fn library(&self) -> &GestureLibrary {
        &self.library
    }

    /// Queue a gesture. Unknown names are logged and ignored. A missing or
    /// invalid duration falls back to the definition's default.
    pub fn enqueue(
        &mut self,
        name: &str,
        duration: Option<f32>,
        ctx: &mut AnimationContext,
    ) -> bool {
        let Some(definition) = self.library.get(name) else {
            tracing::warn!("Unknown gesture '{}', ignoring", name);
            return false;
        };

        let duration = match duration {
            Some(d) if d.is_finite() && d > 0.0 => d,
            _ => definition.duration(),
        };

        tracing::debug!("Queued gesture {} ({:.2}s)", definition.name(), duration);
        self.queue.push_back(QueueEntry {
            definition,
            duration,
        });

        if self.active.is_none() {
            self.promote(ctx);
        }
        true
    }

    fn promote(&mut self, ctx: &mut AnimationContext) {
        let Some(entry) = self.queue.pop_front() else {
            return;
        };

        let to = entry.definition.static_pose();
        let from: BonePose = to
            .keys()
            .map(|bone| (bone.clone(), ctx.target(bone)))
            .collect();

        let mut active = ActiveGesture {
            entry,
            elapsed: 0.0,
            from,
            written: BonePose::new(),
            released: HashSet::new(),
        };
        if self.transition == TransitionStyle::Instant || self.transition_speed <= 0.0 {
            active.apply(&to, ctx);
        }

        tracing::debug!("Playing gesture {}", active.entry.definition.name());
        self.active = Some(active);
    }

    /// Advance the active gesture and write its pose to the bone targets.
    pub fn tick(&mut self, dt: f32, ctx: &mut AnimationContext) {
        let Some(active) = self.active.as_mut() else {
            return;
        };

        active.elapsed += dt.max(0.0);
        if active.elapsed >= active.entry.duration {
            if let Some(finished) = self.active.take() {
                tracing::debug!("Gesture {} finished", finished.entry.definition.name());
                finished.restore(ctx);
            }
            self.promote(ctx);
            return;
        }

        let to = active.entry.definition.pose_at(ctx.time);
        let easing_in = self.transition == TransitionStyle::Eased
            && self.transition_speed > 0.0
            && active.elapsed < self.transition_speed;

        if easing_in {
            let t = self.easing.ease(active.elapsed / self.transition_speed);
            let pose = interpolate_pose(&active.from, &to, t);
            active.apply(&pose, ctx);
        } else {
            active.apply(&to, ctx);
        }
    }

    pub fn state(&self) -> GestureState {
        match &self.active {
            None => GestureState::Idle,
            Some(a) => GestureState::Playing {
                name: a.entry.definition.name().to_string(),
                elapsed: a.elapsed,
                duration: a.entry.duration,
            },
        }
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.entry.definition.name())
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// Cancel the active gesture and every queued entry.
    pub fn clear(&mut self) {
        if !self.queue.is_empty() || self.active.is_some() {
            tracing::debug!(
                "Cancelled {} queued gesture(s)",
                self.queue.len() + usize::from(self.active.is_some())
            );
        }
        self.queue.clear();
        self.active = None;
    }
}
