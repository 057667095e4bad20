//! In-memory rig used by the CLI and tests.

use std::collections::HashMap;

use super::{BoneRotation, ExpressionChannel, ExpressionGroup, Skeleton};

/// Humanoid bone names populated by [`MemoryRig::humanoid`].
pub const HUMANOID_BONES: &[&str] = &[
    "hips",
    "spine",
    "chest",
    "upperChest",
    "neck",
    "head",
    "leftEye",
    "rightEye",
    "leftShoulder",
    "rightShoulder",
    "leftUpperArm",
    "rightUpperArm",
    "leftLowerArm",
    "rightLowerArm",
    "leftHand",
    "rightHand",
    "leftUpperLeg",
    "rightUpperLeg",
    "leftLowerLeg",
    "rightLowerLeg",
    "leftFoot",
    "rightFoot",
    "leftIndexProximal",
    "rightIndexProximal",
    "leftThumbProximal",
    "rightThumbProximal",
];

/// A rig held entirely in memory: bone rotations plus a flat weight array.
#[derive(Debug, Clone, Default)]
pub struct MemoryRig {
    bones: HashMap<String, BoneRotation>,
    groups: Vec<ExpressionGroup>,
    /// Expression channel name → index in `weights`
    name_to_index: HashMap<String, usize>,
    weights: Vec<f32>,
    /// Channel names that were written but do not exist
    rejected: Vec<String>,
}

impl MemoryRig {
    pub fn new(bone_names: &[&str], groups: Vec<ExpressionGroup>) -> Self {
        let bones = bone_names
            .iter()
            .map(|name| (name.to_string(), BoneRotation::ZERO))
            .collect();
        let name_to_index = groups
            .iter()
            .enumerate()
            .map(|(i, g)| (g.name.clone(), i))
            .collect();

        Self {
            bones,
            weights: vec![0.0; groups.len()],
            groups,
            name_to_index,
            rejected: Vec::new(),
        }
    }

    /// A standard humanoid skeleton with VRM-style preset expression groups.
    pub fn humanoid() -> Self {
        let groups = vec![
            ExpressionGroup::new("Fcl_ALL_Joy").with_preset("joy"),
            ExpressionGroup::new("Fcl_ALL_Angry").with_preset("angry"),
            ExpressionGroup::new("Fcl_ALL_Sorrow").with_preset("sorrow"),
            ExpressionGroup::new("Fcl_ALL_Fun").with_preset("fun"),
            ExpressionGroup::new("Fcl_ALL_Surprised").with_preset("surprised"),
            ExpressionGroup::new("Fcl_EYE_Close").with_preset("blink"),
            ExpressionGroup::new("Fcl_EYE_Close_L").with_preset("blinkLeft"),
            ExpressionGroup::new("Fcl_EYE_Close_R").with_preset("blinkRight"),
            ExpressionGroup::new("Fcl_MTH_A").with_preset("aa"),
            ExpressionGroup::new("Fcl_MTH_I").with_preset("ih"),
            ExpressionGroup::new("Fcl_MTH_U").with_preset("ou"),
            ExpressionGroup::new("Fcl_MTH_E").with_preset("ee"),
            ExpressionGroup::new("Fcl_MTH_O").with_preset("oh"),
            ExpressionGroup::new("Breath"),
        ];
        Self::new(HUMANOID_BONES, groups)
    }

    pub fn bone(&self, name: &str) -> Option<BoneRotation> {
        self.bones.get(name).copied()
    }

    pub fn value(&self, name: &str) -> Option<f32> {
        self.name_to_index.get(name).map(|&i| self.weights[i])
    }

    /// Channels in declaration order with their current weights.
    pub fn weights(&self) -> impl Iterator<Item = (&str, f32)> {
        self.groups
            .iter()
            .zip(self.weights.iter())
            .map(|(g, &w)| (g.name.as_str(), w))
    }

    pub fn rejected(&self) -> &[String] {
        &self.rejected
    }
}

impl Skeleton for MemoryRig {
    fn bone_mut(&mut self, name: &str) -> Option<&mut BoneRotation> {
        self.bones.get_mut(name)
    }
}

impl ExpressionChannel for MemoryRig {
    fn set_value(&mut self, name: &str, value: f32) -> bool {
        match self.name_to_index.get(name) {
            Some(&idx) => {
                self.weights[idx] = value.clamp(0.0, 1.0);
                true
            }
            None => {
                if !self.rejected.iter().any(|n| n == name) {
                    self.rejected.push(name.to_string());
                }
                false
            }
        }
    }

    fn groups(&self) -> Vec<ExpressionGroup> {
        self.groups.clone()
    }
}
