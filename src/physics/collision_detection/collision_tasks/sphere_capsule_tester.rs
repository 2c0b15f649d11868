use glam::{Quat, Vec3};

use super::convex_collision_task::IPairTester;
use crate::physics::collidables::capsule::Capsule;
use crate::physics::collidables::sphere::Sphere;
use crate::physics::collision_detection::contact_manifold::{ConvexContact, ConvexContactManifold};

/// Pair tester for sphere vs capsule collisions.
pub struct SphereCapsuleTester;

impl IPairTester<Sphere, Capsule> for SphereCapsuleTester {
    const BATCH_SIZE: i32 = 32;

    #[inline(always)]
    fn test(
        a: &Sphere,
        b: &Capsule,
        speculative_margin: f32,
        offset_b: Vec3,
        _orientation_a: Quat,
        orientation_b: Quat,
        manifold: &mut ConvexContactManifold,
    ) {
        // The contact is based on the closest point of the sphere center to the capsule's internal line segment.
        let x = orientation_b * Vec3::X;
        let y = orientation_b * Vec3::Y;
        let t = (-y.dot(offset_b)).clamp(-b.half_length, b.half_length);
        let sphere_to_internal = offset_b + y * t;
        let internal_distance = sphere_to_internal.length();
        // Normal points from B to A. If the sphere center is on the segment, use a direction perpendicular to the axis.
        manifold.normal = if internal_distance > 0.0 {
            sphere_to_internal / -internal_distance
        } else {
            x
        };
        let depth = a.radius + b.radius - internal_distance;
        if depth > -speculative_margin {
            let offset = manifold.normal * (depth * 0.5 - a.radius);
            manifold.add(ConvexContact::new(offset, depth, 0));
        }
    }
}
