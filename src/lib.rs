//! Marionette - real-time procedural animation for humanoid avatars
//!
//! A modular animation core that:
//! - Blends facial expressions from rig-independent aliases
//! - Plays queued gestures, idle motion, locomotion and multi-step reactions
//! - Tracks the camera with the head and scales quality by distance
//! - Accepts commands from any thread and applies them once per tick

pub mod animation;
pub mod avatar;
pub mod command;
pub mod config;
pub mod error;
pub mod rig;

pub use animation::Animator;
pub use avatar::{AvatarState, CharacterProfile};
pub use command::{Command, CommandSender};
pub use config::Config;
pub use error::{MarionetteError, Result};
pub use rig::{BonePose, BoneRotation, ExpressionChannel, Rig, Skeleton};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
