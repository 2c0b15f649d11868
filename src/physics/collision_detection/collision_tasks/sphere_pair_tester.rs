use glam::{Quat, Vec3};

use super::convex_collision_task::IPairTester;
use crate::physics::collidables::sphere::Sphere;
use crate::physics::collision_detection::contact_manifold::{ConvexContact, ConvexContactManifold};

/// Pair tester for sphere vs sphere collisions.
pub struct SpherePairTester;

impl IPairTester<Sphere, Sphere> for SpherePairTester {
    const BATCH_SIZE: i32 = 32;

    #[inline(always)]
    fn test(
        a: &Sphere,
        b: &Sphere,
        speculative_margin: f32,
        offset_b: Vec3,
        _orientation_a: Quat,
        _orientation_b: Quat,
        manifold: &mut ConvexContactManifold,
    ) {
        let center_distance = offset_b.length();
        // By convention, the normal points from B to A.
        // Arbitrarily choose (0,1,0) if the two spheres are in the same position.
        manifold.normal = if center_distance > 0.0 {
            offset_b / -center_distance
        } else {
            Vec3::Y
        };
        let depth = a.radius + b.radius - center_distance;
        if depth > -speculative_margin {
            // The contact position relative to object A is the average of the extreme points.
            let offset = manifold.normal * (depth * 0.5 - a.radius);
            manifold.add(ConvexContact::new(offset, depth, 0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn overlapping_spheres_generate_a_midpoint_contact() {
        let mut manifold = ConvexContactManifold::default();
        SpherePairTester::test(
            &Sphere::new(1.0),
            &Sphere::new(0.5),
            0.1,
            Vec3::new(1.25, 0.0, 0.0),
            Quat::IDENTITY,
            Quat::IDENTITY,
            &mut manifold,
        );
        assert_eq!(manifold.count, 1);
        assert_eq!(manifold.normal, Vec3::new(-1.0, 0.0, 0.0));
        assert_relative_eq!(manifold.contacts[0].depth, 0.25);
        assert_relative_eq!(manifold.contacts[0].offset.x, 0.875);
    }

    #[test]
    fn coincident_spheres_pick_an_arbitrary_normal() {
        let mut manifold = ConvexContactManifold::default();
        SpherePairTester::test(
            &Sphere::new(1.0),
            &Sphere::new(1.0),
            0.0,
            Vec3::ZERO,
            Quat::IDENTITY,
            Quat::IDENTITY,
            &mut manifold,
        );
        assert_eq!(manifold.normal, Vec3::Y);
        assert_relative_eq!(manifold.contacts[0].depth, 2.0);
    }

    #[test]
    fn distant_spheres_outside_the_margin_have_no_contacts() {
        let mut manifold = ConvexContactManifold::default();
        SpherePairTester::test(
            &Sphere::new(1.0),
            &Sphere::new(1.0),
            0.5,
            Vec3::new(0.0, 0.0, 2.6),
            Quat::IDENTITY,
            Quat::IDENTITY,
            &mut manifold,
        );
        assert_eq!(manifold.count, 0);
    }
}
