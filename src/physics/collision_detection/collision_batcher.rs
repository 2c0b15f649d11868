use std::mem::size_of;

use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};
use log::{debug, trace};

use super::collision_batcher_continuations::{
    BatcherContinuations, CollisionContinuationType, PairContinuation,
};
use super::collision_task_registry::{CollisionTaskReference, CollisionTaskRegistry};
use super::contact_manifold::{ConvexContactManifold, IContactManifold};
use super::nonconvex_reduction::{FlushResult, NonconvexReduction};
use super::untyped_list::UntypedList;
use crate::physics::body_properties::RigidPose;
use crate::physics::collidables::shapes::Shapes;
use crate::physics::collidables::typed_index::TypedIndex;
use crate::utilities::memory::buffer::Buffer;
use crate::utilities::memory::buffer_pool::BufferPool;

/// Initial allocation sizes for a collision batcher.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionBatcherAllocationSizes {
    /// The number of nonconvex reductions to allocate space for when the first one is created.
    pub nonconvex_reductions: i32,
}

impl Default for CollisionBatcherAllocationSizes {
    fn default() -> Self {
        Self {
            nonconvex_reductions:
                BatcherContinuations::<NonconvexReduction>::DEFAULT_INITIAL_CAPACITY,
        }
    }
}

/// Fixed layout data stored after the shape bytes of every batch record.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
struct PairTrailer {
    flip_mask: i32,
    position_a: [f32; 3],
    orientation_a: [f32; 4],
    position_b: [f32; 3],
    orientation_b: [f32; 4],
    speculative_margin: f32,
    continuation: PairContinuation,
}

/// Collision pair fed to collision tasks, read out of a batch record.
#[derive(Debug, Clone, Copy)]
pub struct CollisionPair<'a> {
    pub shape_a: &'a [u8],
    pub shape_b: &'a [u8],
    /// -1 if the pair was swapped into the task's expected type order, 0 otherwise.
    pub flip_mask: i32,
    pub pose_a: RigidPose,
    pub pose_b: RigidPose,
    pub speculative_margin: f32,
    pub continuation: PairContinuation,
}

impl CollisionPair<'_> {
    /// Offset from the position of shape A to the position of shape B.
    #[inline(always)]
    pub fn offset_b(&self) -> Vec3 {
        self.pose_b.position - self.pose_a.position
    }

    /// Whether the shapes were swapped relative to the order in which they were submitted.
    #[inline(always)]
    pub fn flipped(&self) -> bool {
        self.flip_mask != 0
    }
}

/// Pending pairs for a single collision task. Every record in a batch has the same shape sizes.
#[derive(Default)]
pub struct CollisionBatch {
    pairs: UntypedList,
    shape_a_size: usize,
    shape_b_size: usize,
}

impl CollisionBatch {
    fn new(
        shape_a_size: usize,
        shape_b_size: usize,
        batch_size: i32,
        pool: &mut BufferPool,
    ) -> Self {
        let element_size = shape_a_size + shape_b_size + size_of::<PairTrailer>();
        Self {
            pairs: UntypedList::new(element_size as i32, batch_size, pool),
            shape_a_size,
            shape_b_size,
        }
    }

    #[inline(always)]
    pub fn count(&self) -> i32 {
        self.pairs.count
    }

    #[inline(always)]
    fn allocated(&self) -> bool {
        self.pairs.buffer.allocated()
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        shape_a: &[u8],
        shape_b: &[u8],
        flip_mask: i32,
        pose_a: &RigidPose,
        pose_b: &RigidPose,
        speculative_margin: f32,
        continuation: &PairContinuation,
    ) {
        debug_assert!(
            shape_a.len() == self.shape_a_size && shape_b.len() == self.shape_b_size,
            "All pairs in a batch must share shape sizes."
        );
        let trailer = PairTrailer {
            flip_mask,
            position_a: pose_a.position.to_array(),
            orientation_a: pose_a.orientation.to_array(),
            position_b: pose_b.position.to_array(),
            orientation_b: pose_b.orientation.to_array(),
            speculative_margin,
            continuation: *continuation,
        };
        let record = self.pairs.allocate_slot();
        let (a_bytes, rest) = record.split_at_mut(shape_a.len());
        a_bytes.copy_from_slice(shape_a);
        let (b_bytes, trailer_bytes) = rest.split_at_mut(shape_b.len());
        b_bytes.copy_from_slice(shape_b);
        trailer_bytes.copy_from_slice(bytemuck::bytes_of(&trailer));
    }

    /// Reads the pair at the given index.
    pub fn pair(&self, index: i32) -> CollisionPair<'_> {
        let record = self.pairs.element(index);
        let (shape_a, rest) = record.split_at(self.shape_a_size);
        let (shape_b, trailer_bytes) = rest.split_at(self.shape_b_size);
        // Records have an arbitrary stride, so the trailer is not necessarily aligned.
        let trailer: PairTrailer = bytemuck::pod_read_unaligned(trailer_bytes);
        CollisionPair {
            shape_a,
            shape_b,
            flip_mask: trailer.flip_mask,
            pose_a: RigidPose::new(
                Vec3::from_array(trailer.position_a),
                Quat::from_array(trailer.orientation_a),
            ),
            pose_b: RigidPose::new(
                Vec3::from_array(trailer.position_b),
                Quat::from_array(trailer.orientation_b),
            ),
            speculative_margin: trailer.speculative_margin,
            continuation: trailer.continuation,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = CollisionPair<'_>> + '_ {
        (0..self.count()).map(move |index| self.pair(index))
    }

    fn reset(&mut self) {
        self.pairs.reset();
    }

    fn dispose(&mut self, pool: &mut BufferPool) {
        self.pairs.dispose(pool);
    }
}

/// Callbacks interface for collision batcher results.
pub trait ICollisionCallbacks {
    /// Called when a pair submitted to a collision batcher has finished collision detection.
    fn on_pair_completed<TManifold: IContactManifold>(
        &mut self,
        pair_id: i32,
        manifold: &mut TManifold,
    );

    /// Called when a child pair of a multi-child pair completes, whether or not it produced
    /// contacts.
    fn on_child_pair_completed(
        &mut self,
        pair_id: i32,
        child_a: i32,
        child_b: i32,
        manifold: &mut ConvexContactManifold,
    );

    /// Checks whether a child pair should be tested at all.
    fn allow_collision_testing(&self, _pair_id: i32, _child_a: i32, _child_b: i32) -> bool {
        true
    }
}

/// The batcher operations available to collision tasks while they execute.
pub trait ICollisionBatcher<'a> {
    fn pool(&mut self) -> &mut BufferPool;

    fn shapes(&self) -> &'a Shapes;

    /// Submits a pair of shapes given as raw bytes.
    #[allow(clippy::too_many_arguments)]
    fn add_directly(
        &mut self,
        shape_type_a: i32,
        shape_type_b: i32,
        shape_a: &[u8],
        shape_b: &[u8],
        pose_a: &RigidPose,
        pose_b: &RigidPose,
        speculative_margin: f32,
        continuation: &PairContinuation,
    );

    fn process_convex_result(
        &mut self,
        manifold: &mut ConvexContactManifold,
        continuation: &PairContinuation,
    );

    fn process_empty_result(&mut self, continuation: &PairContinuation);

    fn process_untested_subpair_convex_result(&mut self, continuation: &PairContinuation);

    fn allow_collision_testing(&self, pair_id: i32, child_a: i32, child_b: i32) -> bool;

    /// Allocates a reduction that merges the results of the given number of child pairs.
    fn create_nonconvex_reduction(&mut self, child_count: i32) -> (i32, &mut NonconvexReduction);
}

/// Batches collision tests and manages post-processing continuations.
///
/// A batcher is used by one thread at a time. Parallel narrowphases create one batcher per worker,
/// each with its own pool, sharing the registry and shapes.
pub struct CollisionBatcher<'a, TCallbacks: ICollisionCallbacks> {
    pool: &'a mut BufferPool,
    shapes: &'a Shapes,
    type_matrix: &'a CollisionTaskRegistry,
    pub callbacks: TCallbacks,

    minimum_batch_index: i32,
    maximum_batch_index: i32,
    batches: Buffer<CollisionBatch>,
    pub nonconvex_reductions: BatcherContinuations<NonconvexReduction>,
}

impl<'a, TCallbacks: ICollisionCallbacks> CollisionBatcher<'a, TCallbacks> {
    pub fn new(
        pool: &'a mut BufferPool,
        shapes: &'a Shapes,
        collision_type_matrix: &'a CollisionTaskRegistry,
        callbacks: TCallbacks,
    ) -> Self {
        Self::with_allocation_sizes(
            pool,
            shapes,
            collision_type_matrix,
            callbacks,
            CollisionBatcherAllocationSizes::default(),
        )
    }

    pub fn with_allocation_sizes(
        pool: &'a mut BufferPool,
        shapes: &'a Shapes,
        collision_type_matrix: &'a CollisionTaskRegistry,
        callbacks: TCallbacks,
        allocation_sizes: CollisionBatcherAllocationSizes,
    ) -> Self {
        let task_count = collision_type_matrix.task_count() as i32;
        // Default batches are unallocated, which marks them as not yet created.
        let batches = pool.take(task_count);
        Self {
            pool,
            shapes,
            type_matrix: collision_type_matrix,
            callbacks,
            minimum_batch_index: task_count,
            maximum_batch_index: -1,
            batches,
            nonconvex_reductions: BatcherContinuations::with_initial_capacity(
                allocation_sizes.nonconvex_reductions,
            ),
        }
    }

    /// Number of pairs waiting in the batch of the given task.
    #[inline(always)]
    pub fn pending_pair_count(&self, task_index: i32) -> i32 {
        if task_index >= 0 && task_index < self.batches.len() {
            self.batches.get(task_index).count()
        } else {
            0
        }
    }

    /// Submits a pair of registered shapes.
    #[inline(always)]
    pub fn add(
        &mut self,
        shape_index_a: TypedIndex,
        shape_index_b: TypedIndex,
        pose_a: &RigidPose,
        pose_b: &RigidPose,
        speculative_margin: f32,
        continuation: &PairContinuation,
    ) {
        let shapes = self.shapes;
        self.add_directly(
            shape_index_a.type_id(),
            shape_index_b.type_id(),
            shapes.get_shape_data(shape_index_a),
            shapes.get_shape_data(shape_index_b),
            pose_a,
            pose_b,
            speculative_margin,
            continuation,
        );
    }

    /// Submits a pair of shapes given as raw bytes. Pairs with no registered task complete
    /// immediately with no contacts.
    #[allow(clippy::too_many_arguments)]
    pub fn add_directly(
        &mut self,
        shape_type_a: i32,
        shape_type_b: i32,
        shape_a: &[u8],
        shape_b: &[u8],
        pose_a: &RigidPose,
        pose_b: &RigidPose,
        speculative_margin: f32,
        continuation: &PairContinuation,
    ) {
        let reference = self.type_matrix.get_task_reference(shape_type_a, shape_type_b);
        if !reference.exists() {
            debug!(
                "No collision task for shape types ({}, {}); pair {} has no contacts.",
                shape_type_a,
                shape_type_b,
                continuation.pair_id
            );
            self.process_empty_result(continuation);
            return;
        }
        if shape_type_a != reference.expected_first_type_id {
            self.add_internal(
                &reference,
                -1,
                shape_b,
                shape_a,
                pose_b,
                pose_a,
                speculative_margin,
                continuation,
            );
        } else {
            self.add_internal(
                &reference,
                0,
                shape_a,
                shape_b,
                pose_a,
                pose_b,
                speculative_margin,
                continuation,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn add_internal(
        &mut self,
        reference: &CollisionTaskReference,
        flip_mask: i32,
        shape_a: &[u8],
        shape_b: &[u8],
        pose_a: &RigidPose,
        pose_b: &RigidPose,
        speculative_margin: f32,
        continuation: &PairContinuation,
    ) {
        let task_index = reference.task_index;
        let batch = self.batches.get_mut(task_index);
        if !batch.allocated() {
            *batch = CollisionBatch::new(
                shape_a.len(),
                shape_b.len(),
                reference.batch_size,
                self.pool,
            );
            self.minimum_batch_index = self.minimum_batch_index.min(task_index);
            self.maximum_batch_index = self.maximum_batch_index.max(task_index);
        }
        batch.push(shape_a, shape_b, flip_mask, pose_a, pose_b, speculative_margin, continuation);
        if batch.count() == reference.batch_size {
            self.execute_batch(task_index);
        }
    }

    fn execute_batch(&mut self, task_index: i32) {
        // The batch is moved out while its task runs so the task can submit subpairs into other
        // batches.
        let mut batch = std::mem::take(self.batches.get_mut(task_index));
        trace!("Executing {} pairs for collision task {}.", batch.count(), task_index);
        let type_matrix = self.type_matrix;
        type_matrix.get_task(task_index).execute_batch(&batch, self);
        batch.reset();
        let slot = self.batches.get_mut(task_index);
        debug_assert!(
            !slot.allocated(),
            "A collision task must not submit pairs into its own batch."
        );
        *slot = batch;
    }

    /// Reports the result of a convex collision test to the callbacks and, if necessary, to any
    /// continuations for postprocessing.
    pub fn process_convex_result(
        &mut self,
        manifold: &mut ConvexContactManifold,
        continuation: &PairContinuation,
    ) {
        match continuation.continuation_type() {
            CollisionContinuationType::Direct => {
                // This result concerns a pair which had no higher level owner.
                self.callbacks.on_pair_completed(continuation.pair_id, manifold);
            }
            CollisionContinuationType::NonconvexReduction => {
                // The submitter hears about the subpair before it is folded into the parent.
                self.callbacks.on_child_pair_completed(
                    continuation.pair_id,
                    continuation.child_a,
                    continuation.child_b,
                    manifold,
                );
                let slot = self.nonconvex_reductions.get_mut(continuation.index());
                slot.on_child_completed(continuation, manifold);
                if let Some(flush_result) = slot.try_flush(self.pool) {
                    self.report_flush_result(continuation, flush_result);
                }
            }
        }
    }

    fn report_flush_result(&mut self, continuation: &PairContinuation, flush_result: FlushResult) {
        match flush_result {
            FlushResult::Nonconvex(mut manifold) => {
                self.callbacks.on_pair_completed(continuation.pair_id, &mut manifold);
            }
            FlushResult::Convex(mut manifold) => {
                self.callbacks.on_pair_completed(continuation.pair_id, &mut manifold);
            }
        }
        self.nonconvex_reductions.return_continuation(continuation.index(), self.pool);
    }

    /// Reports a result with no contacts.
    pub fn process_empty_result(&mut self, continuation: &PairContinuation) {
        let mut manifold = ConvexContactManifold::default();
        self.process_convex_result(&mut manifold, continuation);
    }

    /// Submits a subpair whose testing was blocked by the callbacks as complete to its
    /// continuation.
    /// Does not invoke `on_child_pair_completed`; that is only called for children that were
    /// actually tested. A direct pair has no owner to fold into and completes with no contacts.
    pub fn process_untested_subpair_convex_result(&mut self, continuation: &PairContinuation) {
        match continuation.continuation_type() {
            CollisionContinuationType::Direct => {
                let mut manifold = ConvexContactManifold::default();
                self.callbacks.on_pair_completed(continuation.pair_id, &mut manifold);
            }
            CollisionContinuationType::NonconvexReduction => {
                let slot = self.nonconvex_reductions.get_mut(continuation.index());
                slot.on_untested_child_completed(continuation);
                if let Some(flush_result) = slot.try_flush(self.pool) {
                    self.report_flush_result(continuation, flush_result);
                }
            }
        }
    }

    /// Executes every remaining partial batch, releases all batcher memory and hands back the
    /// callbacks.
    pub fn flush(mut self) -> TCallbacks {
        // Subtask generators sort before the tasks they feed, so a single forward pass drains
        // everything.
        // The maximum is reread every iteration because executing a batch can create later batches.
        let mut executed_count = 0;
        let mut i = self.minimum_batch_index;
        while i <= self.maximum_batch_index {
            if self.batches.get(i).count() > 0 {
                self.execute_batch(i);
                executed_count += 1;
            }
            i += 1;
        }
        for (task_index, batch) in self.batches.iter_mut().enumerate() {
            debug_assert!(
                batch.count() == 0,
                "Batch {} still holds {} pairs after the flush pass; undeclared subpairs?",
                task_index,
                batch.count()
            );
            if batch.allocated() {
                batch.dispose(self.pool);
            }
        }
        self.pool.return_buffer(&mut self.batches);
        self.nonconvex_reductions.dispose(self.pool);
        debug!("Flushed collision batcher; executed {} partial batches.", executed_count);
        self.callbacks
    }
}

impl<'a, TCallbacks: ICollisionCallbacks> ICollisionBatcher<'a>
    for CollisionBatcher<'a, TCallbacks>
{
    #[inline(always)]
    fn pool(&mut self) -> &mut BufferPool {
        &mut *self.pool
    }

    #[inline(always)]
    fn shapes(&self) -> &'a Shapes {
        self.shapes
    }

    #[inline(always)]
    fn add_directly(
        &mut self,
        shape_type_a: i32,
        shape_type_b: i32,
        shape_a: &[u8],
        shape_b: &[u8],
        pose_a: &RigidPose,
        pose_b: &RigidPose,
        speculative_margin: f32,
        continuation: &PairContinuation,
    ) {
        CollisionBatcher::add_directly(
            self,
            shape_type_a,
            shape_type_b,
            shape_a,
            shape_b,
            pose_a,
            pose_b,
            speculative_margin,
            continuation,
        );
    }

    #[inline(always)]
    fn process_convex_result(
        &mut self,
        manifold: &mut ConvexContactManifold,
        continuation: &PairContinuation,
    ) {
        CollisionBatcher::process_convex_result(self, manifold, continuation);
    }

    #[inline(always)]
    fn process_empty_result(&mut self, continuation: &PairContinuation) {
        CollisionBatcher::process_empty_result(self, continuation);
    }

    #[inline(always)]
    fn process_untested_subpair_convex_result(&mut self, continuation: &PairContinuation) {
        CollisionBatcher::process_untested_subpair_convex_result(self, continuation);
    }

    #[inline(always)]
    fn allow_collision_testing(&self, pair_id: i32, child_a: i32, child_b: i32) -> bool {
        self.callbacks.allow_collision_testing(pair_id, child_a, child_b)
    }

    fn create_nonconvex_reduction(&mut self, child_count: i32) -> (i32, &mut NonconvexReduction) {
        self.nonconvex_reductions.create_continuation(child_count, self.pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::collidables::capsule::Capsule;
    use crate::physics::collidables::shape::IShape;
    use crate::physics::collidables::sphere::Sphere;
    use crate::physics::collision_detection::collision_task_registry::CollisionTask;
    use crate::physics::collision_detection::collision_tasks::{
        convex_collision_task::ConvexCollisionTask, sphere_capsule_tester::SphereCapsuleTester,
        sphere_pair_tester::SpherePairTester,
    };
    use crate::physics::collision_detection::contact_manifold::ConvexContact;
    use crate::physics::collision_detection::test_callbacks::{Completion, RecordingCallbacks};
    use approx::assert_relative_eq;
    use glam::Quat;

    const NONCONVEX: CollisionContinuationType = CollisionContinuationType::NonconvexReduction;

    /// Leaf task that counts executions and reports a fixed manifold per pair.
    struct ScriptedTask {
        a: i32,
        b: i32,
        batch_size: i32,
        contacts_per_pair: i32,
    }

    impl CollisionTask for ScriptedTask {
        fn batch_size(&self) -> i32 {
            self.batch_size
        }
        fn shape_type_index_a(&self) -> i32 {
            self.a
        }
        fn shape_type_index_b(&self) -> i32 {
            self.b
        }
        fn execute_batch<'a>(
            &self,
            batch: &CollisionBatch,
            batcher: &mut dyn ICollisionBatcher<'a>,
        ) {
            for pair in batch.iter() {
                let mut manifold = ConvexContactManifold {
                    offset_b: pair.offset_b(),
                    normal: Vec3::Y,
                    ..Default::default()
                };
                for i in 0..self.contacts_per_pair {
                    manifold.add(ConvexContact::new(Vec3::new(i as f32, 0.0, 0.0), 0.5, i));
                }
                batcher.process_convex_result(&mut manifold, &pair.continuation);
            }
        }
    }

    /// Resubmits every pair as a (0, 0) pair without declaring that it does so.
    struct UndeclaredForwardingTask;

    impl CollisionTask for UndeclaredForwardingTask {
        fn batch_size(&self) -> i32 {
            8
        }
        fn shape_type_index_a(&self) -> i32 {
            1
        }
        fn shape_type_index_b(&self) -> i32 {
            1
        }
        fn execute_batch<'a>(
            &self,
            batch: &CollisionBatch,
            batcher: &mut dyn ICollisionBatcher<'a>,
        ) {
            for pair in batch.iter() {
                batcher.add_directly(
                    0,
                    0,
                    pair.shape_a,
                    pair.shape_b,
                    &pair.pose_a,
                    &pair.pose_b,
                    pair.speculative_margin,
                    &pair.continuation,
                );
            }
        }
    }

    fn sphere_registry() -> CollisionTaskRegistry {
        let mut registry = CollisionTaskRegistry::default();
        registry
            .register(Box::new(ConvexCollisionTask::<Sphere, Sphere, SpherePairTester>::new()))
            .unwrap();
        registry
            .register(Box::new(ConvexCollisionTask::<Sphere, Capsule, SphereCapsuleTester>::new()))
            .unwrap();
        registry
    }

    fn pose(x: f32) -> RigidPose {
        RigidPose::from_position(Vec3::new(x, 0.0, 0.0))
    }

    #[test]
    fn unsupported_pairs_complete_immediately_without_batching() {
        let mut pool = BufferPool::new();
        let mut shapes = Shapes::new();
        let capsule = shapes.add(&Capsule::new(0.5, 1.0));
        let registry = sphere_registry();
        let mut batcher =
            CollisionBatcher::new(&mut pool, &shapes, &registry, RecordingCallbacks::default());
        batcher.add(capsule, capsule, &pose(0.0), &pose(0.5), 0.1, &PairContinuation::direct(42));
        for task_index in 0..registry.task_count() as i32 {
            assert_eq!(batcher.pending_pair_count(task_index), 0);
        }
        assert_eq!(batcher.callbacks.completions.len(), 1);
        let callbacks = batcher.flush();
        assert_eq!(
            callbacks.completions,
            vec![Completion {
                pair_id: 42,
                convex: true,
                contacts: Vec::new(),
                offset_b: Vec3::ZERO,
            }]
        );
        assert_eq!(pool.outstanding_buffer_count(), 0);
    }

    #[test]
    fn full_batches_dispatch_and_restart() {
        let mut pool = BufferPool::new();
        let shapes = Shapes::new();
        let mut registry = CollisionTaskRegistry::default();
        let task_index = registry
            .register(Box::new(ScriptedTask {
                a: 0,
                b: 0,
                batch_size: 3,
                contacts_per_pair: 1,
            }))
            .unwrap() as i32;
        let sphere = Sphere::new(1.0);
        let mut batcher =
            CollisionBatcher::new(&mut pool, &shapes, &registry, RecordingCallbacks::default());
        for pair_id in 0..2 {
            batcher.add_directly(
                0,
                0,
                sphere.as_bytes(),
                sphere.as_bytes(),
                &pose(0.0),
                &pose(1.0),
                0.1,
                &PairContinuation::direct(pair_id),
            );
        }
        assert_eq!(batcher.pending_pair_count(task_index), 2);
        assert!(batcher.callbacks.completions.is_empty());

        batcher.add_directly(
            0,
            0,
            sphere.as_bytes(),
            sphere.as_bytes(),
            &pose(0.0),
            &pose(1.0),
            0.1,
            &PairContinuation::direct(2),
        );
        assert_eq!(batcher.pending_pair_count(task_index), 0);
        assert_eq!(batcher.callbacks.pair_ids(), vec![0, 1, 2]);

        batcher.add_directly(
            0,
            0,
            sphere.as_bytes(),
            sphere.as_bytes(),
            &pose(0.0),
            &pose(1.0),
            0.1,
            &PairContinuation::direct(3),
        );
        assert_eq!(batcher.pending_pair_count(task_index), 1);
        let callbacks = batcher.flush();
        assert_eq!(callbacks.pair_ids(), vec![0, 1, 2, 3]);
        assert_eq!(pool.outstanding_buffer_count(), 0);
    }

    #[test]
    fn flush_drains_each_partial_batch_once_and_releases_memory() {
        let mut pool = BufferPool::new();
        let mut shapes = Shapes::new();
        let small = shapes.add(&Sphere::new(0.5));
        let large = shapes.add(&Sphere::new(1.0));
        let capsule = shapes.add(&Capsule::new(0.25, 2.0));
        let registry = sphere_registry();
        let mut batcher =
            CollisionBatcher::new(&mut pool, &shapes, &registry, RecordingCallbacks::default());
        batcher.add(small, large, &pose(0.0), &pose(1.0), 0.1, &PairContinuation::direct(0));
        batcher.add(capsule, small, &pose(0.0), &pose(0.5), 0.1, &PairContinuation::direct(1));
        batcher.add(large, large, &pose(0.0), &pose(10.0), 0.1, &PairContinuation::direct(2));
        assert!(batcher.callbacks.completions.is_empty());
        let callbacks = batcher.flush();
        let mut ids = callbacks.pair_ids();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(callbacks.completion(0).contacts.len(), 1);
        assert_eq!(callbacks.completion(1).contacts.len(), 1);
        // Separated beyond the margin.
        assert!(callbacks.completion(2).contacts.is_empty());
        assert_eq!(pool.outstanding_buffer_count(), 0);
    }

    #[test]
    fn swapped_submissions_produce_flipped_manifolds() {
        let mut pool = BufferPool::new();
        let mut shapes = Shapes::new();
        let sphere = shapes.add(&Sphere::new(0.5));
        let capsule = shapes.add(&Capsule::new(0.25, 2.0));
        let registry = sphere_registry();
        let sphere_pose = RigidPose::new(Vec3::new(0.3, 0.6, 0.1), Quat::IDENTITY);
        let capsule_pose = RigidPose::new(Vec3::new(0.0, 0.2, 0.0), Quat::from_rotation_z(0.7));

        let mut batcher =
            CollisionBatcher::new(&mut pool, &shapes, &registry, RecordingCallbacks::default());
        batcher.add(
            sphere,
            capsule,
            &sphere_pose,
            &capsule_pose,
            0.1,
            &PairContinuation::direct(0),
        );
        batcher.add(
            capsule,
            sphere,
            &capsule_pose,
            &sphere_pose,
            0.1,
            &PairContinuation::direct(1),
        );
        let callbacks = batcher.flush();

        let forward = callbacks.completion(0);
        let backward = callbacks.completion(1);
        assert_eq!(forward.contacts.len(), 1);
        assert_eq!(backward.contacts.len(), 1);
        assert!(forward.offset_b.abs_diff_eq(capsule_pose.position - sphere_pose.position, 1e-6));
        assert!(backward.offset_b.abs_diff_eq(-forward.offset_b, 1e-6));
        let (f, b) = (&forward.contacts[0], &backward.contacts[0]);
        assert!(b.normal.abs_diff_eq(-f.normal, 1e-6));
        assert!(b.offset.abs_diff_eq(f.offset - forward.offset_b, 1e-6));
        assert_relative_eq!(b.depth, f.depth);
        assert_eq!(b.feature_id, f.feature_id);
        assert_eq!(pool.outstanding_buffer_count(), 0);
    }

    #[test]
    fn single_child_reduction_with_no_contacts_reports_once_and_frees_the_slot() {
        let mut pool = BufferPool::new();
        let shapes = Shapes::new();
        let registry = CollisionTaskRegistry::default();
        let mut batcher =
            CollisionBatcher::new(&mut pool, &shapes, &registry, RecordingCallbacks::default());
        let (slot, _) = batcher.create_nonconvex_reduction(1);
        assert_eq!(batcher.nonconvex_reductions.active_count(), 1);
        let child = PairContinuation::new(7, 0, 0, NONCONVEX, slot, 0);
        batcher.process_empty_result(&child);
        assert_eq!(batcher.nonconvex_reductions.active_count(), 0);
        assert_eq!(batcher.callbacks.child_completions.len(), 1);
        let callbacks = batcher.flush();
        assert_eq!(callbacks.completions.len(), 1);
        let completion = callbacks.completion(7);
        assert!(completion.convex);
        assert!(completion.contacts.is_empty());
        assert_eq!(pool.outstanding_buffer_count(), 0);
    }

    #[test]
    #[should_panic]
    fn contributing_to_a_freed_slot_panics() {
        let mut pool = BufferPool::new();
        let shapes = Shapes::new();
        let registry = CollisionTaskRegistry::default();
        let mut batcher =
            CollisionBatcher::new(&mut pool, &shapes, &registry, RecordingCallbacks::default());
        let (slot, _) = batcher.create_nonconvex_reduction(1);
        let child = PairContinuation::new(7, 0, 0, NONCONVEX, slot, 0);
        batcher.process_empty_result(&child);
        batcher.process_empty_result(&child);
    }

    #[test]
    fn one_populated_child_of_three_takes_the_convex_path() {
        let mut pool = BufferPool::new();
        let shapes = Shapes::new();
        let registry = CollisionTaskRegistry::default();
        let mut batcher =
            CollisionBatcher::new(&mut pool, &shapes, &registry, RecordingCallbacks::default());
        let (slot, reduction) = batcher.create_nonconvex_reduction(3);
        let child_offset = Vec3::new(0.0, 0.0, 2.0);
        for i in 0..3 {
            reduction.configure_child(i, child_offset, Vec3::ZERO);
        }
        let child = |i| PairContinuation::new(3, i, 0, NONCONVEX, slot, i);

        batcher.process_empty_result(&child(0));
        let mut populated = ConvexContactManifold {
            offset_b: Vec3::new(1.0, 0.0, -2.0),
            normal: Vec3::X,
            ..Default::default()
        };
        populated.add(ConvexContact::new(Vec3::new(0.5, 0.0, 0.0), 0.1, 4));
        batcher.process_convex_result(&mut populated, &child(1));
        assert!(batcher.callbacks.completions.is_empty());
        batcher.process_empty_result(&child(2));

        let callbacks = batcher.flush();
        assert_eq!(callbacks.child_completions, vec![(3, 0, 0, 0), (3, 1, 0, 1), (3, 2, 0, 0)]);
        assert_eq!(callbacks.completions.len(), 1);
        let completion = callbacks.completion(3);
        assert!(completion.convex);
        assert_eq!(completion.contacts.len(), 1);
        assert_eq!(completion.contacts[0].offset, Vec3::new(0.5, 0.0, 2.0));
        assert_eq!(completion.contacts[0].feature_id, 4);
        assert_eq!(completion.offset_b, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(pool.outstanding_buffer_count(), 0);
    }

    #[test]
    fn many_populated_children_merge_into_a_capped_nonconvex_manifold() {
        let mut pool = BufferPool::new();
        let shapes = Shapes::new();
        let registry = CollisionTaskRegistry::default();
        let mut batcher =
            CollisionBatcher::new(&mut pool, &shapes, &registry, RecordingCallbacks::default());
        let (slot, _) = batcher.create_nonconvex_reduction(3);
        for i in 0..3 {
            let mut manifold = ConvexContactManifold {
                normal: Vec3::Y,
                ..Default::default()
            };
            for j in 0..ConvexContactManifold::MAXIMUM_CONTACT_COUNT {
                manifold.add(ConvexContact::new(Vec3::ZERO, 0.1, j));
            }
            let continuation = PairContinuation::new(9, 0, i, NONCONVEX, slot, i);
            batcher.process_convex_result(&mut manifold, &continuation);
        }
        let callbacks = batcher.flush();
        let completion = callbacks.completion(9);
        assert!(!completion.convex);
        assert_eq!(completion.contacts.len(), 8);
        let ids: Vec<i32> = completion.contacts.iter().map(|contact| contact.feature_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 256, 257, 258, 259]);
        assert_eq!(pool.outstanding_buffer_count(), 0);
    }

    #[test]
    fn untested_children_complete_without_child_callbacks() {
        let mut pool = BufferPool::new();
        let shapes = Shapes::new();
        let registry = CollisionTaskRegistry::default();
        let mut batcher =
            CollisionBatcher::new(&mut pool, &shapes, &registry, RecordingCallbacks::default());
        let (slot, _) = batcher.create_nonconvex_reduction(2);
        for i in 0..2 {
            let continuation = PairContinuation::new(5, 0, i, NONCONVEX, slot, i);
            batcher.process_untested_subpair_convex_result(&continuation);
        }
        let callbacks = batcher.flush();
        assert!(callbacks.child_completions.is_empty());
        assert!(callbacks.completion(5).contacts.is_empty());
        assert_eq!(pool.outstanding_buffer_count(), 0);
    }

    #[test]
    fn flush_reclaims_reductions_that_never_completed() {
        let mut pool = BufferPool::new();
        let shapes = Shapes::new();
        let registry = CollisionTaskRegistry::default();
        let mut batcher = CollisionBatcher::with_allocation_sizes(
            &mut pool,
            &shapes,
            &registry,
            RecordingCallbacks::default(),
            CollisionBatcherAllocationSizes { nonconvex_reductions: 1 },
        );
        for _ in 0..3 {
            batcher.create_nonconvex_reduction(4);
        }
        assert_eq!(batcher.nonconvex_reductions.active_count(), 3);
        assert!(batcher.pool().outstanding_buffer_count() > 0);
        let callbacks = batcher.flush();
        assert!(callbacks.completions.is_empty());
        assert_eq!(pool.outstanding_buffer_count(), 0);
    }

    #[test]
    fn one_batcher_per_worker_shares_the_registry_and_shapes() {
        let mut shapes = Shapes::new();
        let a = shapes.add(&Sphere::new(0.5));
        let b = shapes.add(&Sphere::new(0.75));
        let registry = sphere_registry();
        let results = crossbeam_utils::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|worker| {
                    let (shapes, registry) = (&shapes, &registry);
                    scope.spawn(move |_| {
                        let mut pool = BufferPool::new();
                        let callbacks = RecordingCallbacks::default();
                        let mut batcher =
                            CollisionBatcher::new(&mut pool, shapes, registry, callbacks);
                        for i in 0..100 {
                            let continuation = PairContinuation::direct(worker * 1000 + i);
                            batcher.add(a, b, &pose(0.0), &pose(1.0), 0.1, &continuation);
                        }
                        let callbacks = batcher.flush();
                        (callbacks.completions.len(), pool.outstanding_buffer_count())
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect::<Vec<_>>()
        })
        .unwrap();
        assert_eq!(results, vec![(100, 0); 4]);
    }

    #[test]
    fn untested_direct_pairs_complete_without_contacts() {
        let mut pool = BufferPool::new();
        let shapes = Shapes::new();
        let registry = CollisionTaskRegistry::default();
        let mut batcher =
            CollisionBatcher::new(&mut pool, &shapes, &registry, RecordingCallbacks::default());
        batcher.process_untested_subpair_convex_result(&PairContinuation::direct(9));
        let callbacks = batcher.flush();
        assert_eq!(callbacks.pair_ids(), vec![9]);
        assert!(callbacks.completion(9).contacts.is_empty());
        assert!(callbacks.child_completions.is_empty());
        assert_eq!(pool.outstanding_buffer_count(), 0);
    }

    #[test]
    #[should_panic(expected = "after the flush pass")]
    fn flush_detects_pairs_submitted_into_an_already_drained_batch() {
        let mut pool = BufferPool::new();
        let shapes = Shapes::new();
        let mut registry = CollisionTaskRegistry::default();
        registry
            .register(Box::new(ScriptedTask {
                a: 0,
                b: 0,
                batch_size: 8,
                contacts_per_pair: 1,
            }))
            .unwrap();
        registry.register(Box::new(UndeclaredForwardingTask)).unwrap();
        let forwarding = registry.get_task_reference(1, 1).task_index;
        assert!(forwarding > registry.get_task_reference(0, 0).task_index);
        let sphere = Sphere::new(1.0);
        let mut batcher =
            CollisionBatcher::new(&mut pool, &shapes, &registry, RecordingCallbacks::default());
        batcher.add_directly(
            1,
            1,
            sphere.as_bytes(),
            sphere.as_bytes(),
            &pose(0.0),
            &pose(1.0),
            0.1,
            &PairContinuation::direct(0),
        );
        batcher.flush();
    }
}
