use glam::{Quat, Vec3};

/// Represents a rigid transformation.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidPose {
    /// Orientation of the pose.
    pub orientation: Quat,
    /// Position of the pose.
    pub position: Vec3,
}

impl Default for RigidPose {
    #[inline(always)]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl RigidPose {
    /// Returns a pose with a position at (0,0,0) and identity orientation.
    pub const IDENTITY: Self = Self {
        orientation: Quat::IDENTITY,
        position: Vec3::ZERO,
    };

    /// Creates a rigid pose with the given position and orientation.
    #[inline(always)]
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Creates a rigid pose with the given position and identity orientation.
    #[inline(always)]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
        }
    }

    /// Transforms a vector by the rigid pose: v * pose.Orientation + pose.Position.
    #[inline(always)]
    pub fn transform(&self, v: Vec3) -> Vec3 {
        self.orientation * v + self.position
    }

    /// Concatenates one rigid transform with another. The resulting transform is equivalent
    /// to performing transform a followed by transform b.
    #[inline(always)]
    pub fn multiply(a: &RigidPose, b: &RigidPose) -> RigidPose {
        RigidPose {
            orientation: b.orientation * a.orientation,
            position: b.orientation * a.position + b.position,
        }
    }
}

impl From<Vec3> for RigidPose {
    fn from(position: Vec3) -> Self {
        Self::from_position(position)
    }
}
