//! Bone rotations and partial poses.

use glam::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Local rotation of a single joint, Euler angles in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoneRotation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Partial pose: bone name to desired rotation. Bones not present are untouched.
pub type BonePose = HashMap<String, BoneRotation>;

impl BoneRotation {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Build from Euler angles given in degrees.
    pub fn from_degrees(deg: [f32; 3]) -> Self {
        Self {
            x: deg[0].to_radians(),
            y: deg[1].to_radians(),
            z: deg[2].to_radians(),
        }
    }

    pub fn to_degrees(self) -> [f32; 3] {
        [self.x.to_degrees(), self.y.to_degrees(), self.z.to_degrees()]
    }

    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn from_vec3(v: Vec3) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }

    /// Quaternion for this rotation (YXZ order: yaw, then pitch, then roll).
    pub fn to_quat(self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.y, self.x, self.z)
    }

    pub fn from_quat(q: Quat) -> Self {
        let (y, x, z) = q.to_euler(EulerRot::YXZ);
        Self { x, y, z }
    }

    pub fn scaled(self, k: f32) -> Self {
        Self {
            x: self.x * k,
            y: self.y * k,
            z: self.z * k,
        }
    }

    pub fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }

    /// Component-wise linear interpolation.
    pub fn lerp(self, to: Self, t: f32) -> Self {
        Self {
            x: self.x + (to.x - self.x) * t,
            y: self.y + (to.y - self.y) * t,
            z: self.z + (to.z - self.z) * t,
        }
    }

    /// Move toward `target` by `min(1, rate * dt)` of the remaining distance.
    pub fn approach(self, target: Self, rate: f32, dt: f32) -> Self {
        self.lerp(target, (rate * dt).clamp(0.0, 1.0))
    }

    pub fn max_abs_diff(self, other: Self) -> f32 {
        (self.x - other.x)
            .abs()
            .max((self.y - other.y).abs())
            .max((self.z - other.z).abs())
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Interpolate two partial poses.
///
/// Bones present in only one pose are treated as zero rotation in the other.
/// The endpoints are exact: `t <= 0` yields `from`, `t >= 1` yields `to`.
pub fn interpolate_pose(from: &BonePose, to: &BonePose, t: f32) -> BonePose {
    if t.is_nan() || t <= 0.0 {
        return from.clone();
    }
    if t >= 1.0 {
        return to.clone();
    }

    let mut out = BonePose::with_capacity(from.len().max(to.len()));
    for (name, &a) in from {
        let b = to.get(name).copied().unwrap_or(BoneRotation::ZERO);
        out.insert(name.clone(), a.lerp(b, t));
    }
    for (name, &b) in to {
        if !from.contains_key(name) {
            out.insert(name.clone(), BoneRotation::ZERO.lerp(b, t));
        }
    }
    out
}

/// Convert a degree-valued pose table into radians.
pub fn pose_from_degrees(table: &HashMap<String, [f32; 3]>) -> BonePose {
    table
        .iter()
        .map(|(name, &deg)| (name.clone(), BoneRotation::from_degrees(deg)))
        .collect()
}
