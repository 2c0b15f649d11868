use bytemuck::{Pod, Zeroable};

use super::shape::IShape;

/// Collision shape representing a sphere-expanded line segment.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Capsule {
    /// Spherical expansion applied to the internal line segment.
    pub radius: f32,
    /// Half of the length of the internal line segment. Oriented along the local Y axis.
    pub half_length: f32,
}

impl Capsule {
    /// Creates a capsule shape.
    #[inline(always)]
    pub fn new(radius: f32, length: f32) -> Self {
        Self {
            radius,
            half_length: length * 0.5,
        }
    }
}

impl IShape for Capsule {
    const TYPE_ID: i32 = 1;
}
