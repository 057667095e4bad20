//! Output boundary toward the rendered rig.
//!
//! The animation core never touches a scene graph directly. It writes bone
//! rotations through [`Skeleton`] and expression weights through
//! [`ExpressionChannel`]; the renderer supplies an adapter implementing both.

pub mod memory;
pub mod pose;

pub use memory::MemoryRig;
pub use pose::{interpolate_pose, pose_from_degrees, BonePose, BoneRotation};

use serde::{Deserialize, Serialize};

/// A named expression group exposed by a rig (e.g. a VRM blend shape group).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressionGroup {
    /// Channel name used with [`ExpressionChannel::set_value`]
    pub name: String,
    /// Declared preset name, if the rig format has one ("joy", "blink", ...)
    #[serde(default)]
    pub preset: Option<String>,
}

impl ExpressionGroup {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            preset: None,
        }
    }

    pub fn with_preset(mut self, preset: &str) -> Self {
        self.preset = Some(preset.to_string());
        self
    }
}

/// Mutable access to the rig's joints.
pub trait Skeleton {
    /// Local rotation of the named bone, or `None` when the rig lacks it.
    fn bone_mut(&mut self, name: &str) -> Option<&mut BoneRotation>;
}

/// Facial expression channels of the rig.
pub trait ExpressionChannel {
    /// Set a channel weight. Returns `false` for unknown channel names;
    /// implementations must never panic here.
    fn set_value(&mut self, name: &str, value: f32) -> bool;

    /// Declared expression groups, used for alias resolution.
    fn groups(&self) -> Vec<ExpressionGroup> {
        Vec::new()
    }
}

/// Everything the animator writes to.
pub trait Rig: Skeleton + ExpressionChannel {}

impl<T: Skeleton + ExpressionChannel> Rig for T {}
