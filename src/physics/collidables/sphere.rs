use bytemuck::{Pod, Zeroable};

use super::shape::IShape;

/// Collision shape representing a sphere.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Sphere {
    /// Radius of the sphere.
    pub radius: f32,
}

impl Sphere {
    #[inline(always)]
    pub fn new(radius: f32) -> Self {
        Self { radius }
    }
}

impl IShape for Sphere {
    const TYPE_ID: i32 = 0;
}
