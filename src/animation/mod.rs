//! Animation core
//!
//! [`Animator`] owns one [`AnimationContext`] and every controller of a single
//! avatar. Commands mutate target state; [`Animator::tick`] advances all
//! controllers in a fixed order and writes the blended result to the rig.

pub mod camera;
pub mod context;
pub mod easing;
pub mod expression;
pub mod gesture;
pub mod idle;
pub mod lod;
pub mod posture;
pub mod reaction;
pub mod walk;

pub use camera::CameraController;
pub use context::AnimationContext;
pub use easing::Easing;
pub use expression::ExpressionBlender;
pub use gesture::{GestureDefinition, GestureLibrary, GesturePlayer, GestureSpec, GestureState};
pub use idle::{IdleDriver, IdleSets, IdleState, LipSync};
pub use lod::{LodController, LodLevel, LodSettings, ShadowQuality};
pub use posture::{Mode, Posture, PostureController};
pub use reaction::{ReactionDefinition, ReactionEffect, ReactionSequencer, ReactionStep, StepAction};
pub use walk::{WalkController, WalkDirection, WalkMode, WalkState};

use std::collections::HashSet;

use crate::avatar::{AvatarState, CharacterProfile};
use crate::command::{Command, CommandInbox, CommandSender};
use crate::config::Config;
use crate::error::Result;
use crate::rig::{BoneRotation, ExpressionChannel, Rig};

const HEAD_BONE: &str = "head";
/// Expression channels reported in status snapshots
const STATUS_EXPRESSIONS: usize = 3;

/// Drives every animation controller of one avatar instance.
#[derive(Debug)]
pub struct Animator {
    config: Config,
    profile: CharacterProfile,
    ctx: AnimationContext,
    inbox: CommandInbox,
    expressions: ExpressionBlender,
    gestures: GesturePlayer,
    idle: IdleDriver,
    walk: WalkController,
    camera: CameraController,
    posture: PostureController,
    reactions: ReactionSequencer,
    lod: LodController,
    lod_settings: Option<LodSettings>,
    /// Bones the rig lacks (logged once each)
    unknown_bones: HashSet<String>,
}

fn build_idle(config: &Config, profile: &CharacterProfile) -> IdleDriver {
    IdleDriver::new(&config.idle)
        .with_gestures(&profile.idle_poses)
        .with_sets(profile.idle_gestures.clone())
        .with_breath_alias(profile.breath_alias.clone())
        .with_lipsync(profile.lipsync.clone())
}

impl Animator {
    /// Create an animator. Fails only on invalid configuration or profile data.
    pub fn new(config: Config, profile: CharacterProfile) -> Result<Self> {
        config.validate()?;
        profile.validate()?;

        let ctx = AnimationContext::new(profile.rest_pose());
        let expressions =
            ExpressionBlender::new(profile.aliases.clone(), profile.blink_suppressors.clone());
        let gestures =
            GesturePlayer::new(GestureLibrary::with_specs(&profile.gestures), &config.gesture);
        let idle = build_idle(&config, &profile);
        let walk = WalkController::new(&config.walk);
        let mut camera = CameraController::new(&config.camera);
        camera.set_intensity(Mode::Active.intensity(&config.camera));
        let posture = PostureController::new(&config.posture);
        let reactions = ReactionSequencer::new(profile.reactions.clone(), &config.reaction);
        let lod = LodController::new(&config.lod);

        tracing::info!(
            "Animator ready for '{}' ({} gestures, {} reactions)",
            profile.name,
            gestures.library().len(),
            profile.reactions.len()
        );

        Ok(Self {
            config,
            profile,
            ctx,
            inbox: CommandInbox::new(),
            expressions,
            gestures,
            idle,
            walk,
            camera,
            posture,
            reactions,
            lod,
            lod_settings: None,
            unknown_bones: HashSet::new(),
        })
    }

    /// Handle for submitting commands from any thread.
    pub fn command_sender(&self) -> CommandSender {
        self.inbox.sender()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn profile(&self) -> &CharacterProfile {
        &self.profile
    }

    pub fn context(&self) -> &AnimationContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut AnimationContext {
        &mut self.ctx
    }

    pub fn expressions(&self) -> &ExpressionBlender {
        &self.expressions
    }

    pub fn gestures(&self) -> &GesturePlayer {
        &self.gestures
    }

    pub fn idle(&self) -> &IdleDriver {
        &self.idle
    }

    pub fn walk(&self) -> &WalkController {
        &self.walk
    }

    pub fn camera(&self) -> &CameraController {
        &self.camera
    }

    pub fn posture(&self) -> &PostureController {
        &self.posture
    }

    pub fn reactions(&self) -> &ReactionSequencer {
        &self.reactions
    }

    /// Settings most recently returned by the LOD controller
    pub fn lod_settings(&self) -> Option<LodSettings> {
        self.lod_settings
    }

    pub fn set_camera_position(&mut self, position: glam::Vec3) {
        if position.is_finite() {
            self.ctx.camera_position = position;
        }
    }

    /// Reset runtime state and adopt the rig's expression catalog. Must be
    /// called before a different rig is ticked.
    pub fn attach<R: Rig>(&mut self, rig: &R) {
        self.reset();
        let groups = rig.groups();
        tracing::info!("Attached rig with {} expression group(s)", groups.len());
        self.expressions.set_groups(groups);
    }

    /// Cancel all queued gestures and reaction events, clear persistent
    /// expressions, bone targets and pending commands.
    pub fn reset(&mut self) {
        let dropped = self.inbox.clear();
        if dropped > 0 {
            tracing::debug!("Dropped {} pending command(s) on reset", dropped);
        }
        self.gestures.clear();
        self.reactions.clear();
        self.expressions.clear();
        self.idle.reset();
        self.walk.reset();
        self.camera.reset();
        self.camera
            .set_intensity(Mode::Active.intensity(&self.config.camera));
        self.posture.reset();
        self.lod.reset();
        self.lod_settings = None;
        self.ctx.reset();
        self.unknown_bones.clear();
    }

    /// Swap in a new profile. Gestures and reactions already queued keep the
    /// definitions they captured.
    pub fn reload(&mut self, profile: CharacterProfile) -> Result<()> {
        profile.validate()?;

        self.gestures
            .set_library(GestureLibrary::with_specs(&profile.gestures));
        self.reactions.set_library(profile.reactions.clone());
        self.expressions
            .set_aliases(profile.aliases.clone(), profile.blink_suppressors.clone());

        let state = self.idle.state();
        let override_gesture = self.idle.override_gesture().map(str::to_string);
        self.idle = build_idle(&self.config, &profile);
        self.idle.set_state(state);
        if let Some(name) = override_gesture {
            self.idle.set_override(&name);
        }

        self.ctx.default_pose = profile.rest_pose();
        tracing::info!("Reloaded profile '{}'", profile.name);
        self.profile = profile;
        Ok(())
    }

    /// Route one command to the controller that owns it.
    pub fn dispatch<R: Rig>(&mut self, command: Command, rig: &mut R) {
        tracing::debug!("Dispatching {}", command.kind());
        match command {
            Command::Expression {
                name,
                value,
                persistent,
            } => {
                if persistent {
                    self.expressions.set_persistent(&name, value, rig);
                } else {
                    self.expressions.add_target(&name, value);
                }
            }
            Command::BoneRot { bone, rotation } => {
                let rotation = BoneRotation::from_degrees(rotation);
                if bone == HEAD_BONE {
                    if rotation == BoneRotation::ZERO {
                        self.camera.clear_override();
                    } else {
                        self.camera.set_override(rotation);
                    }
                } else {
                    self.ctx.set_target(&bone, rotation);
                }
            }
            Command::Lookat { rotation } => {
                self.camera.look_at(BoneRotation::from_degrees(rotation));
            }
            Command::Pose { name } => match self.profile.pose(&name) {
                Some(pose) => self.ctx.apply_pose(&pose),
                None => tracing::warn!("Unknown pose '{}', ignoring", name),
            },
            Command::Gesture { name, duration } => {
                self.gestures.enqueue(&name, duration, &mut self.ctx);
            }
            Command::IdleGesture { name } => {
                self.idle.set_override(&name);
            }
            Command::Posture { label } => {
                self.posture.update_posture(&label);
            }
            Command::Walk { direction, speed } => match WalkDirection::parse(&direction) {
                Some(direction) => self.walk.walk(direction, speed),
                None => tracing::warn!("Unknown walk direction '{}', ignoring", direction),
            },
            Command::Mode { mode } => self.set_mode(mode),
            Command::Emotion { name } => {
                self.posture.update_posture(&name);
                if self.reactions.contains(&name) {
                    let effects = self.reactions.trigger(&name);
                    self.apply_effects(effects, rig);
                } else {
                    tracing::debug!("No reaction for emotion '{}'", name);
                }
            }
            Command::Activity { state } => {
                if state == IdleState::Talking && self.idle.state() != IdleState::Talking {
                    self.camera.nod();
                }
                self.idle.set_state(state);
            }
            Command::Audio { level, active } => {
                self.ctx.audio_level = if level.is_finite() {
                    level.clamp(0.0, 1.0)
                } else {
                    0.0
                };
                if let Some(active) = active {
                    self.ctx.engine_active = active;
                }
            }
        }
    }

    fn set_mode(&mut self, mode: Mode) {
        let intensity = self.posture.set_mode(mode, &self.config.camera);
        self.camera.set_intensity(intensity);
    }

    fn apply_effects(&mut self, effects: Vec<ReactionEffect>, sink: &mut dyn ExpressionChannel) {
        for effect in effects {
            match effect {
                ReactionEffect::Bones(pose) => self.ctx.apply_pose(&pose),
                ReactionEffect::Facial(targets) => {
                    for (alias, value) in targets {
                        self.expressions.add_target(&alias, value);
                    }
                }
                ReactionEffect::Gesture { name, duration } => {
                    self.gestures.enqueue(&name, duration, &mut self.ctx);
                }
                ReactionEffect::Persistent { name, value } => {
                    self.expressions.set_persistent(&name, value, sink);
                }
                ReactionEffect::Posture(label) => {
                    self.posture.update_posture(&label);
                }
                ReactionEffect::LookAt(rotation) => self.camera.look_at(rotation),
                ReactionEffect::IdleGesture(name) => {
                    self.idle.set_override(&name);
                }
                ReactionEffect::Mode(mode) => self.set_mode(mode),
            }
        }
    }

    /// Advance one frame and write the result to the rig.
    pub fn tick<R: Rig>(&mut self, dt: f32, rig: &mut R) {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        for command in self.inbox.drain() {
            self.dispatch(command, rig);
        }

        self.ctx.time += dt;

        let effects = self.reactions.tick(dt);
        self.apply_effects(effects, rig);

        self.ctx.clear_offsets();
        self.idle.tick(dt, &mut self.ctx, &mut self.expressions);
        self.gestures.tick(dt, &mut self.ctx);
        self.walk.tick(dt, &mut self.ctx, self.gestures.is_idle());
        self.posture.tick(dt, &mut self.ctx, self.camera.tracking().y);
        self.camera.tick(dt, &self.ctx);

        if let Some(settings) = self.lod.update(self.ctx.camera_distance(), dt) {
            tracing::debug!(
                "LOD settings: shadows {:?}, particles {:.2}",
                settings.shadow_quality,
                settings.particle_multiplier
            );
            self.lod_settings = Some(settings);
        }

        self.expressions.tick(
            dt,
            self.config.expression.blend_rate,
            self.config.expression.frame_decay_rate,
            rig,
        );
        self.blend_bones(dt, rig);
    }

    /// Ease every rig bone toward its base target plus procedural offset;
    /// the head also gets the camera layers.
    fn blend_bones<R: Rig>(&mut self, dt: f32, rig: &mut R) {
        let rate = self.config.bones.blend_rate;

        let offset_only = self
            .ctx
            .bone_offsets
            .keys()
            .filter(|bone| !self.ctx.bone_targets.contains_key(*bone));
        let bones: Vec<String> = self
            .ctx
            .bone_targets
            .keys()
            .chain(offset_only)
            .filter(|bone| bone.as_str() != HEAD_BONE)
            .cloned()
            .collect();

        for bone in bones {
            let target = self.ctx.composed(&bone);
            match rig.bone_mut(&bone) {
                Some(current) => *current = current.approach(target, rate, dt),
                None => {
                    if self.unknown_bones.insert(bone.clone()) {
                        tracing::warn!("Rig has no bone '{}', ignoring", bone);
                    }
                }
            }
        }

        let head = self
            .camera
            .compose(self.ctx.composed(HEAD_BONE), self.idle.sway(self.ctx.time));
        if let Some(current) = rig.bone_mut(HEAD_BONE) {
            *current = current.approach(head, rate, dt);
        }
    }

    /// Snapshot of the observable state
    pub fn status(&self) -> AvatarState {
        let walk = self.walk.state();
        let lod = self.lod.current();
        AvatarState::new(self.ctx.time)
            .with_idle(
                self.idle.state(),
                self.posture.mode(),
                &self.posture.posture().to_string(),
            )
            .with_gesture(self.gestures.active_name(), self.gestures.queued())
            .with_reaction(self.reactions.active())
            .with_walk(walk.is_walking, walk.position)
            .with_expressions(self.expressions.strongest(STATUS_EXPRESSIONS))
            .with_lod(lod.shadow_quality, lod.particle_multiplier)
    }
}
