use std::marker::PhantomData;

use glam::Vec3;

use crate::physics::body_properties::RigidPose;
use crate::physics::collidables::compound::Compound;
use crate::physics::collidables::shape::IShape;
use crate::physics::collision_detection::collision_batcher::{CollisionBatch, ICollisionBatcher};
use crate::physics::collision_detection::collision_batcher_continuations::{
    CollisionContinuationType, PairContinuation,
};
use crate::physics::collision_detection::collision_task_registry::CollisionTask;

/// Collision task for a convex shape against a compound. Each compound child is submitted back into
/// the batcher as its own pair and the child results are merged by a nonconvex reduction.
///
/// Compound pairs must be submitted with direct continuations; the merged result is reported to
/// `on_pair_completed` for the pair id.
pub struct ConvexCompoundCollisionTask<TConvex> {
    subtask_type_pairs: Vec<(i32, i32)>,
    _marker: PhantomData<fn() -> TConvex>,
}

impl<TConvex: IShape> ConvexCompoundCollisionTask<TConvex> {
    pub const BATCH_SIZE: i32 = 16;

    /// Creates a task for compounds whose children may have any of the given shape types.
    pub fn new(child_type_ids: &[i32]) -> Self {
        Self {
            subtask_type_pairs: child_type_ids
                .iter()
                .map(|&child_type_id| (TConvex::TYPE_ID, child_type_id))
                .collect(),
            _marker: PhantomData,
        }
    }

    fn declares_child_type(&self, child_type_id: i32) -> bool {
        self.subtask_type_pairs
            .iter()
            .any(|&(_, declared)| declared == child_type_id)
    }
}

impl<TConvex: IShape> CollisionTask for ConvexCompoundCollisionTask<TConvex> {
    fn batch_size(&self) -> i32 {
        Self::BATCH_SIZE
    }

    fn shape_type_index_a(&self) -> i32 {
        TConvex::TYPE_ID
    }

    fn shape_type_index_b(&self) -> i32 {
        Compound::TYPE_ID
    }

    fn subtask_type_pairs(&self) -> &[(i32, i32)] {
        &self.subtask_type_pairs
    }

    fn execute_batch<'a>(&self, batch: &CollisionBatch, batcher: &mut dyn ICollisionBatcher<'a>) {
        let shapes = batcher.shapes();
        for pair in batch.iter() {
            debug_assert!(
                pair.continuation.continuation_type() == CollisionContinuationType::Direct,
                "Compound pairs cannot be nested in other continuations."
            );
            let compound = Compound::from_bytes(pair.shape_b);
            let children = shapes.compound_children(&compound);
            if children.is_empty() {
                batcher.process_empty_result(&pair.continuation);
                continue;
            }
            let pair_id = pair.continuation.pair_id;
            let flipped = pair.flipped();
            let convex_pose = pair.pose_a;
            let compound_pose = pair.pose_b;
            let orientation = compound_pose.orientation;

            // Every child's frame must be known before any child is submitted; a submission can
            // fill a batch and complete children immediately.
            let (reduction_index, reduction) =
                batcher.create_nonconvex_reduction(children.len() as i32);
            for (i, child) in children.iter().enumerate() {
                debug_assert!(
                    self.declares_child_type(child.shape_index.type_id()),
                    "Compound child type {} was not declared when the task was created.",
                    child.shape_index.type_id()
                );
                let offset =
                    Compound::get_rotated_child_pose(&child.local_pose, orientation).position;
                if flipped {
                    reduction.configure_child(i as i32, offset, Vec3::ZERO);
                } else {
                    reduction.configure_child(i as i32, Vec3::ZERO, offset);
                }
            }

            for (i, child) in children.iter().enumerate() {
                let i = i as i32;
                // Child labels follow the submitter's order, not the task's.
                let (child_a, child_b) = if flipped { (i, 0) } else { (0, i) };
                let continuation = PairContinuation::new(
                    pair_id,
                    child_a,
                    child_b,
                    CollisionContinuationType::NonconvexReduction,
                    reduction_index,
                    i,
                );
                if !batcher.allow_collision_testing(pair_id, child_a, child_b) {
                    batcher.process_untested_subpair_convex_result(&continuation);
                    continue;
                }
                let rotated = Compound::get_rotated_child_pose(&child.local_pose, orientation);
                let child_pose = RigidPose::new(
                    compound_pose.position + rotated.position,
                    rotated.orientation,
                );
                let child_type = child.shape_index.type_id();
                let child_shape = shapes.get_shape_data(child.shape_index);
                if flipped {
                    batcher.add_directly(
                        child_type,
                        TConvex::TYPE_ID,
                        child_shape,
                        pair.shape_a,
                        &child_pose,
                        &convex_pose,
                        pair.speculative_margin,
                        &continuation,
                    );
                } else {
                    batcher.add_directly(
                        TConvex::TYPE_ID,
                        child_type,
                        pair.shape_a,
                        child_shape,
                        &convex_pose,
                        &child_pose,
                        pair.speculative_margin,
                        &continuation,
                    );
                }
            }
        }
    }
}
