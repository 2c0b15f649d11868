use bytemuck::{Pod, Zeroable};
use glam::Quat;

use crate::physics::body_properties::RigidPose;

use super::shape::IShape;
use super::typed_index::TypedIndex;

/// Shape and pose of a child within a compound shape.
#[derive(Debug, Clone, Copy)]
pub struct CompoundChild {
    /// Pose of the child relative to the compound's origin.
    pub local_pose: RigidPose,
    /// Index of the shape within the shape registry that holds the compound's child shape data.
    pub shape_index: TypedIndex,
}

impl CompoundChild {
    pub fn new(local_pose: RigidPose, shape_index: TypedIndex) -> Self {
        Self {
            local_pose,
            shape_index,
        }
    }
}

/// Compound shape made of other shapes.
///
/// The compound itself only stores a range into the registry's compound child list, so its raw bytes
/// have a fixed size no matter how many children it has.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Compound {
    pub child_start: u32,
    pub child_count: u32,
}

impl Compound {
    /// Computes a child's pose rotated into the parent's orientation. The position is the world space
    /// offset from the compound's origin to the child.
    #[inline(always)]
    pub fn get_rotated_child_pose(local_pose: &RigidPose, orientation: Quat) -> RigidPose {
        RigidPose {
            orientation: orientation * local_pose.orientation,
            position: orientation * local_pose.position,
        }
    }
}

impl IShape for Compound {
    const TYPE_ID: i32 = 6;
}
