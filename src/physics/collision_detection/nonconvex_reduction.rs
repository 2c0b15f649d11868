use glam::Vec3;

use super::collision_batcher_continuations::{ICollisionTestContinuation, PairContinuation};
use super::contact_manifold::{ConvexContactManifold, NonconvexContactManifold};
use crate::utilities::memory::buffer::Buffer;
use crate::utilities::memory::buffer_pool::BufferPool;

/// Child of a nonconvex reduction containing a convex manifold and child metadata.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NonconvexReductionChild {
    pub manifold: ConvexContactManifold,
    /// Offset from the origin of the first shape's parent to the child in world space.
    /// Zero if the first shape has no parent.
    pub offset_a: Vec3,
    /// Offset from the origin of the second shape's parent to the child in world space.
    pub offset_b: Vec3,
}

/// Result of flushing a nonconvex reduction.
#[derive(Debug, Clone, Copy)]
pub enum FlushResult {
    /// Multiple child manifolds produced a nonconvex manifold.
    Nonconvex(NonconvexContactManifold),
    /// At most one child manifold had contacts; it is reported directly as convex.
    Convex(ConvexContactManifold),
}

/// Accumulates child manifolds and merges them into a single manifold once every child has
/// reported.
#[derive(Debug, Default)]
pub struct NonconvexReduction {
    pub child_count: i32,
    pub completed_child_count: i32,
    pub children: Buffer<NonconvexReductionChild>,
}

impl ICollisionTestContinuation for NonconvexReduction {
    fn create(&mut self, child_manifold_count: i32, pool: &mut BufferPool) {
        debug_assert!(child_manifold_count > 0, "A reduction needs at least one child.");
        self.child_count = child_manifold_count;
        self.completed_child_count = 0;
        self.children = pool.take(child_manifold_count);
    }

    fn dispose(&mut self, pool: &mut BufferPool) {
        if self.children.allocated() {
            pool.return_buffer(&mut self.children);
        }
    }
}

impl NonconvexReduction {
    /// Sets the frame data for one child. Must be called before the child's result arrives.
    #[inline(always)]
    pub fn configure_child(&mut self, child_index: i32, offset_a: Vec3, offset_b: Vec3) {
        let child = self.children.get_mut(child_index);
        child.offset_a = offset_a;
        child.offset_b = offset_b;
    }

    #[inline(always)]
    fn validate_contribution(&self, continuation: &PairContinuation) {
        debug_assert!(
            self.children.allocated(),
            "Reduction slot {} is not allocated; was it already flushed?",
            continuation.index()
        );
        debug_assert!(
            self.completed_child_count < self.child_count,
            "Reduction slot {} received more children than it expected.",
            continuation.index()
        );
        debug_assert!(continuation.child_index() < self.child_count);
    }

    /// Records a completed child manifold.
    #[inline(always)]
    pub fn on_child_completed(
        &mut self,
        continuation: &PairContinuation,
        manifold: &ConvexContactManifold,
    ) {
        self.validate_contribution(continuation);
        self.children.get_mut(continuation.child_index()).manifold = *manifold;
        self.completed_child_count += 1;
    }

    /// Records a child whose test never ran as having no contacts.
    #[inline(always)]
    pub fn on_untested_child_completed(&mut self, continuation: &PairContinuation) {
        self.validate_contribution(continuation);
        self.children.get_mut(continuation.child_index()).manifold.count = 0;
        self.completed_child_count += 1;
    }

    #[inline(always)]
    pub fn is_complete(&self) -> bool {
        self.completed_child_count == self.child_count
    }

    /// Merges the children if every expected child has reported. The child storage is returned to
    /// the pool on success.
    pub fn try_flush(&mut self, pool: &mut BufferPool) -> Option<FlushResult> {
        if self.is_complete() {
            Some(self.flush(pool))
        } else {
            None
        }
    }

    fn flush(&mut self, pool: &mut BufferPool) -> FlushResult {
        debug_assert!(self.child_count > 0);
        let mut populated_child_manifolds = 0;
        let mut sample_populated_child_index = 0;
        for (i, child) in self.children.iter().enumerate() {
            if child.manifold.count > 0 {
                populated_child_manifolds += 1;
                sample_populated_child_index = i;
            }
        }
        let sample_child = &self.children[sample_populated_child_index];
        // Re-anchor the sample's offset so it runs from the parent of A to the parent of B.
        let offset_b =
            sample_child.manifold.offset_b - sample_child.offset_b + sample_child.offset_a;

        let result = if populated_child_manifolds > 1 {
            let mut reduced_manifold = NonconvexContactManifold {
                offset_b,
                ..Default::default()
            };
            // First come, first served; later contacts are dropped once the manifold is full.
            'children: for (i, child) in self.children.iter().enumerate() {
                for contact in child.manifold.contacts() {
                    if reduced_manifold.is_full() {
                        break 'children;
                    }
                    let mut contact = *contact;
                    contact.offset += child.offset_a;
                    contact.feature_id ^= (i as i32) << 8;
                    reduced_manifold.add(child.manifold.normal, &contact);
                }
            }
            FlushResult::Nonconvex(reduced_manifold)
        } else {
            let mut manifold = sample_child.manifold;
            manifold.offset_b = offset_b;
            let offset_a = sample_child.offset_a;
            for contact in manifold.contacts_mut() {
                contact.offset += offset_a;
            }
            FlushResult::Convex(manifold)
        };

        pool.return_buffer(&mut self.children);
        #[cfg(debug_assertions)]
        {
            self.child_count = -1;
            self.completed_child_count = -1;
        }
        result
    }
}
