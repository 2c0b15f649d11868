use std::marker::PhantomData;

use glam::{Quat, Vec3};

use crate::physics::collidables::shape::IShape;
use crate::physics::collision_detection::collision_batcher::{CollisionBatch, ICollisionBatcher};
use crate::physics::collision_detection::collision_task_registry::CollisionTask;
use crate::physics::collision_detection::contact_manifold::ConvexContactManifold;

/// Trait for pair testers that perform a collision test between two convex shapes.
pub trait IPairTester<TShapeA, TShapeB> {
    /// Gets the number of pairs which would ideally be gathered together before executing the test.
    const BATCH_SIZE: i32;

    /// Computes contacts in the frame of shape A. Normals point from B to A and contact offsets are
    /// relative to A's position. Contacts separated by more than the speculative margin are omitted.
    fn test(
        a: &TShapeA,
        b: &TShapeB,
        speculative_margin: f32,
        offset_b: Vec3,
        orientation_a: Quat,
        orientation_b: Quat,
        manifold: &mut ConvexContactManifold,
    );
}

/// Collision task for a pair of convex shape types tested by a pair tester.
pub struct ConvexCollisionTask<TShapeA, TShapeB, TPairTester> {
    _marker: PhantomData<fn() -> (TShapeA, TShapeB, TPairTester)>,
}

impl<TShapeA, TShapeB, TPairTester> ConvexCollisionTask<TShapeA, TShapeB, TPairTester> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<TShapeA, TShapeB, TPairTester> Default for ConvexCollisionTask<TShapeA, TShapeB, TPairTester> {
    fn default() -> Self {
        Self::new()
    }
}

impl<TShapeA, TShapeB, TPairTester> CollisionTask
    for ConvexCollisionTask<TShapeA, TShapeB, TPairTester>
where
    TShapeA: IShape,
    TShapeB: IShape,
    TPairTester: IPairTester<TShapeA, TShapeB>,
{
    fn batch_size(&self) -> i32 {
        TPairTester::BATCH_SIZE
    }

    fn shape_type_index_a(&self) -> i32 {
        TShapeA::TYPE_ID
    }

    fn shape_type_index_b(&self) -> i32 {
        TShapeB::TYPE_ID
    }

    fn execute_batch<'a>(&self, batch: &CollisionBatch, batcher: &mut dyn ICollisionBatcher<'a>) {
        for pair in batch.iter() {
            let a = TShapeA::from_bytes(pair.shape_a);
            let b = TShapeB::from_bytes(pair.shape_b);
            let offset_b = pair.offset_b();
            let mut manifold = ConvexContactManifold::default();
            TPairTester::test(
                &a,
                &b,
                pair.speculative_margin,
                offset_b,
                pair.pose_a.orientation,
                pair.pose_b.orientation,
                &mut manifold,
            );
            manifold.offset_b = offset_b;
            if pair.flipped() {
                // The test ran with the shapes swapped; report in the submitter's order.
                manifold.flip();
            }
            batcher.process_convex_result(&mut manifold, &pair.continuation);
        }
    }
}
