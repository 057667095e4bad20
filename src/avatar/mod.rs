//! Per-character data and avatar state snapshots

pub mod profile;
pub mod state;

pub use profile::{CharacterProfile, DegreePose};
pub use state::AvatarState;
