//! Pose - bone rotations of the character rig
//!
//! Y-up, right-handed: yaw turns about Y, pitch nods about X.

use serde::{Deserialize, Serialize};

/// Bones the animator drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bone {
    Head,
    Spine,
    LeftUpperArm,
    RightUpperArm,
    LeftForearm,
    RightForearm,
}

/// Arm bones that receive the idle pose correction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmBone {
    LeftUpperArm,
    RightUpperArm,
    LeftForearm,
    RightForearm,
}

impl ArmBone {
    pub fn all() -> &'static [ArmBone] {
        &[
            ArmBone::LeftUpperArm,
            ArmBone::RightUpperArm,
            ArmBone::LeftForearm,
            ArmBone::RightForearm,
        ]
    }
}

impl From<ArmBone> for Bone {
    fn from(arm: ArmBone) -> Self {
        match arm {
            ArmBone::LeftUpperArm => Bone::LeftUpperArm,
            ArmBone::RightUpperArm => Bone::RightUpperArm,
            ArmBone::LeftForearm => Bone::LeftForearm,
            ArmBone::RightForearm => Bone::RightForearm,
        }
    }
}

/// Unit quaternion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation3D {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Rotation3D {
    fn default() -> Self {
        Self::identity()
    }
}

impl Rotation3D {
    pub fn identity() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Rotation of `angle` radians about a unit `axis`
    pub fn from_axis_angle(axis: [f32; 3], angle: f32) -> Self {
        let (s, c) = (angle * 0.5).sin_cos();
        Self {
            w: c,
            x: axis[0] * s,
            y: axis[1] * s,
            z: axis[2] * s,
        }
    }

    /// Intrinsic X, then Y, then Z
    pub fn from_euler(x: f32, y: f32, z: f32) -> Self {
        Self::from_axis_angle([1.0, 0.0, 0.0], x)
            .compose(&Self::from_axis_angle([0.0, 1.0, 0.0], y))
            .compose(&Self::from_axis_angle([0.0, 0.0, 1.0], z))
    }

    /// Head-style offset: yaw about Y, then pitch about X
    pub fn from_yaw_pitch(yaw: f32, pitch: f32) -> Self {
        Self::from_axis_angle([0.0, 1.0, 0.0], yaw)
            .compose(&Self::from_axis_angle([1.0, 0.0, 0.0], pitch))
    }

    /// `self` followed by `other` in the local frame (Hamilton product)
    pub fn compose(&self, other: &Rotation3D) -> Rotation3D {
        Rotation3D {
            w: self.w * other.w - self.x * other.x - self.y * other.y - self.z * other.z,
            x: self.w * other.x + self.x * other.w + self.y * other.z - self.z * other.y,
            y: self.w * other.y - self.x * other.z + self.y * other.w + self.z * other.x,
            z: self.w * other.z + self.x * other.y - self.y * other.x + self.z * other.w,
        }
    }

    /// Angle between two orientations, radians
    pub fn angle_to(&self, other: &Rotation3D) -> f32 {
        let dot = (self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z)
            .abs()
            .min(1.0);
        2.0 * dot.acos()
    }
}

/// Corrective rotation for one arm bone, XYZ euler radians
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoneCorrection {
    pub bone: ArmBone,
    pub euler: [f32; 3],
}

impl BoneCorrection {
    pub fn rotation(&self) -> Rotation3D {
        Rotation3D::from_euler(self.euler[0], self.euler[1], self.euler[2])
    }
}

/// Idle arm pose: lowers the arms out of the rig's bind pose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdlePoseConfig {
    pub corrections: Vec<BoneCorrection>,
}

impl Default for IdlePoseConfig {
    fn default() -> Self {
        Self {
            corrections: vec![
                BoneCorrection {
                    bone: ArmBone::LeftUpperArm,
                    euler: [0.0, 0.0, -1.2],
                },
                BoneCorrection {
                    bone: ArmBone::RightUpperArm,
                    euler: [0.0, 0.0, 1.2],
                },
                BoneCorrection {
                    bone: ArmBone::LeftForearm,
                    euler: [0.0, 0.0, -0.2],
                },
                BoneCorrection {
                    bone: ArmBone::RightForearm,
                    euler: [0.0, 0.0, 0.2],
                },
            ],
        }
    }
}

impl IdlePoseConfig {
    /// No correction; the bind pose is used as is
    pub fn none() -> Self {
        Self {
            corrections: Vec::new(),
        }
    }

    pub fn correction(&self, bone: ArmBone) -> Rotation3D {
        self.corrections
            .iter()
            .find(|c| c.bone == bone)
            .map(BoneCorrection::rotation)
            .unwrap_or_default()
    }
}

/// Character capabilities and resting orientations
#[derive(Debug, Clone)]
pub struct CharacterRig {
    /// Rig exposes viseme morph channels
    pub has_visemes: bool,

    /// Rig exposes blink morph channels
    pub has_blink: bool,

    rest: Vec<(Bone, Rotation3D)>,
}

impl CharacterRig {
    /// Full-fidelity rig with identity rest pose
    pub fn full() -> Self {
        Self {
            has_visemes: true,
            has_blink: true,
            rest: Vec::new(),
        }
    }

    /// Rig without morph channels (head scale fallback for talking)
    pub fn basic() -> Self {
        Self {
            has_visemes: false,
            has_blink: false,
            rest: Vec::new(),
        }
    }

    pub fn with_rest(mut self, bone: Bone, rotation: Rotation3D) -> Self {
        self.rest.retain(|(b, _)| *b != bone);
        self.rest.push((bone, rotation));
        self
    }

    pub fn rest_rotation(&self, bone: Bone) -> Rotation3D {
        self.rest
            .iter()
            .find(|(b, _)| *b == bone)
            .map(|(_, r)| *r)
            .unwrap_or_default()
    }
}

impl Default for CharacterRig {
    fn default() -> Self {
        Self::full()
    }
}

/// Per-frame bone targets for the renderer
#[derive(Debug, Clone, PartialEq)]
pub struct RigPose {
    pub head: Rotation3D,
    pub head_scale: f32,
    pub spine_scale: f32,
    pub arms: [(ArmBone, Rotation3D); 4],
}

impl RigPose {
    pub fn arm(&self, bone: ArmBone) -> Rotation3D {
        self.arms
            .iter()
            .find(|(b, _)| *b == bone)
            .map(|(_, r)| *r)
            .unwrap_or_default()
    }
}
