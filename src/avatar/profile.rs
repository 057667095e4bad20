//! Per-character animation data
//!
//! A profile is plain data supplied by whatever loads the character: rest
//! pose, named poses, expression aliases, idle sets, gestures and reactions.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::animation::gesture::GestureSpec;
use crate::animation::idle::{IdleSets, LipSync};
use crate::animation::reaction::ReactionDefinition;
use crate::error::{MarionetteError, ProfileError};
use crate::rig::{pose_from_degrees, BonePose};

/// Bone name → Euler angles in degrees
pub type DegreePose = HashMap<String, [f32; 3]>;

/// Everything character-specific the animator needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterProfile {
    pub name: String,
    /// Rest pose every bone target falls back to
    pub default_pose: DegreePose,
    /// Named poses applied by the POSE command
    pub poses: HashMap<String, DegreePose>,
    /// Alias → rig channels, used verbatim
    pub aliases: HashMap<String, Vec<String>>,
    /// Aliases that close the eyes; automatic blinking pauses while they are active
    pub blink_suppressors: Vec<String>,
    pub breath_alias: Option<String>,
    pub lipsync: Option<LipSync>,
    pub idle_gestures: IdleSets,
    /// Extra data-driven idle gestures
    pub idle_poses: Vec<GestureSpec>,
    pub gestures: Vec<GestureSpec>,
    pub reactions: Vec<ReactionDefinition>,
}

impl Default for CharacterProfile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            default_pose: DegreePose::new(),
            poses: HashMap::new(),
            aliases: HashMap::new(),
            blink_suppressors: vec!["joy".to_string(), "fun".to_string()],
            breath_alias: None,
            lipsync: Some(LipSync::default()),
            idle_gestures: IdleSets::default(),
            idle_poses: Vec::new(),
            gestures: Vec::new(),
            reactions: Vec::new(),
        }
    }
}

impl CharacterProfile {
    /// Load a profile from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MarionetteError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ProfileError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        let profile = Self::from_str(&contents)?;
        tracing::info!(
            "Loaded profile '{}' from {} ({} gestures, {} reactions)",
            profile.name,
            path.as_ref().display(),
            profile.gestures.len(),
            profile.reactions.len()
        );
        Ok(profile)
    }

    /// Parse a profile from a TOML string
    pub fn from_str(s: &str) -> Result<Self, MarionetteError> {
        toml::from_str(s).map_err(|e| ProfileError::Parse(e.to_string()).into())
    }

    /// Check for data the animator cannot use
    pub fn validate(&self) -> Result<(), MarionetteError> {
        check_pose("default_pose", &self.default_pose)?;
        for (name, pose) in &self.poses {
            check_pose(&format!("poses.{}", name), pose)?;
        }

        for (alias, channels) in &self.aliases {
            if channels.is_empty() {
                return Err(invalid(
                    &format!("aliases.{}", alias),
                    "must map to at least one channel",
                ));
            }
        }

        let mut seen = HashSet::new();
        for gesture in &self.gestures {
            if gesture.name.is_empty() {
                return Err(invalid("gestures", "gesture name must not be empty"));
            }
            if !seen.insert(gesture.name.as_str()) {
                return Err(invalid(
                    &format!("gestures.{}", gesture.name),
                    "duplicate gesture name",
                ));
            }
            check_pose(&format!("gestures.{}", gesture.name), &gesture.bones)?;
        }

        let mut seen = HashSet::new();
        for reaction in &self.reactions {
            if !seen.insert(reaction.name.as_str()) {
                return Err(invalid(
                    &format!("reactions.{}", reaction.name),
                    "duplicate reaction name",
                ));
            }
        }

        if let Some(lipsync) = &self.lipsync {
            if !(lipsync.gain.is_finite() && lipsync.gain > 0.0) {
                return Err(invalid("lipsync.gain", "must be greater than 0"));
            }
        }

        Ok(())
    }

    /// Rest pose in radians
    pub fn rest_pose(&self) -> BonePose {
        pose_from_degrees(&self.default_pose)
    }

    /// Named pose in radians
    pub fn pose(&self, name: &str) -> Option<BonePose> {
        self.poses.get(name).map(pose_from_degrees)
    }
}

fn invalid(field: &str, message: &str) -> MarionetteError {
    ProfileError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

fn check_pose(field: &str, pose: &DegreePose) -> Result<(), MarionetteError> {
    for (bone, deg) in pose {
        if deg.iter().any(|v| !v.is_finite()) {
            return Err(invalid(&format!("{}.{}", field, bone), "angles must be finite"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"
        name = "mika"
        blink_suppressors = ["joy"]
        breath_alias = "Breath"

        [default_pose]
        leftUpperArm = [0.0, 0.0, -70.0]
        rightUpperArm = [0.0, 0.0, 70.0]

        [poses.arms_up]
        leftUpperArm = [0.0, 0.0, 10.0]

        [aliases]
        joy = ["Joy_A", "Joy_B"]

        [lipsync]
        mouth_alias = "aa"
        threshold = 0.1
        gain = 3.0

        [idle_gestures]
        talking = ["hand_wave"]

        [[gestures]]
        name = "salute"
        duration = 1.2
        bones = { rightUpperArm = [0.0, 0.0, 120.0] }

        [[reactions]]
        name = "cheer"
        posture = "excited"

        [[reactions.steps]]
        type = "gesture"
        name = "wave"
        duration = 1.0
    "#;

    #[test]
    fn test_parse_profile() {
        let profile = CharacterProfile::from_str(PROFILE).unwrap();
        assert_eq!(profile.name, "mika");
        assert_eq!(profile.aliases["joy"], vec!["Joy_A", "Joy_B"]);
        assert_eq!(profile.idle_gestures.talking, vec!["hand_wave"]);
        // unspecified sets keep their defaults
        assert_eq!(profile.idle_gestures.thinking.len(), 2);
        assert_eq!(profile.gestures[0].name, "salute");
        assert_eq!(profile.reactions[0].steps.len(), 1);
        assert_eq!(profile.lipsync.as_ref().unwrap().gain, 3.0);
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_rest_pose_in_radians() {
        let profile = CharacterProfile::from_str(PROFILE).unwrap();
        let rest = profile.rest_pose();
        assert!((rest["rightUpperArm"].z - 70f32.to_radians()).abs() < 1e-6);
        assert!(profile.pose("arms_up").is_some());
        assert!(profile.pose("missing").is_none());
    }

    #[test]
    fn test_empty_profile_defaults() {
        let profile = CharacterProfile::from_str("").unwrap();
        assert_eq!(profile, CharacterProfile::default());
    }

    #[test]
    fn test_rejects_empty_alias() {
        let mut profile = CharacterProfile::default();
        profile.aliases.insert("joy".into(), Vec::new());
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_gesture() {
        let spec: GestureSpec = toml::from_str("name = \"x\"").unwrap();
        let mut profile = CharacterProfile::default();
        profile.gestures = vec![spec.clone(), spec];
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_parse_error() {
        let err = CharacterProfile::from_str("name = [").unwrap_err();
        assert!(matches!(err, MarionetteError::Profile(ProfileError::Parse(_))));
    }
}
