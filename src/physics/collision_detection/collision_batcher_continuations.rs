use bytemuck::{Pod, Zeroable};
use log::debug;

use crate::utilities::memory::buffer::Buffer;
use crate::utilities::memory::buffer_pool::BufferPool;
use crate::utilities::memory::id_pool::IdPool;

/// Describes the flow control to apply to a convex-convex pair report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CollisionContinuationType {
    /// Requires no further processing before being reported to user callbacks.
    Direct = 0,
    /// Part of a set of a higher (potentially multi-manifold) pair, potentially requiring contact
    /// reduction.
    NonconvexReduction = 1,
}

/// Describes the continuation of a collision pair after initial processing.
///
/// `child_a` and `child_b` are labels assigned by the submitter; they are never swapped when the
/// batcher reorders a pair into its canonical type order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct PairContinuation {
    pub pair_id: i32,
    pub child_a: i32,
    pub child_b: i32,
    packed: u32,
    child_index: u32,
}

impl PairContinuation {
    pub const CONTINUATION_INDEX_BITS: u32 = 23;
    /// Exclusive upper bound on the slot index a continuation can refer to.
    pub const EXCLUSIVE_MAXIMUM_CONTINUATION_INDEX: i32 = 1 << Self::CONTINUATION_INDEX_BITS;

    const TYPE_SHIFT: u32 = 24;
    const INDEX_MASK: u32 = (1 << Self::CONTINUATION_INDEX_BITS) - 1;

    /// Creates a continuation that routes a child result into the given slot.
    ///
    /// Panics if `continuation_index` does not fit in the slot index range.
    #[inline(always)]
    pub fn new(
        pair_id: i32,
        child_a: i32,
        child_b: i32,
        continuation_type: CollisionContinuationType,
        continuation_index: i32,
        continuation_child_index: i32,
    ) -> Self {
        assert!(
            (0..Self::EXCLUSIVE_MAXIMUM_CONTINUATION_INDEX).contains(&continuation_index),
            "Continuation index {} is outside the addressable slot range.",
            continuation_index
        );
        debug_assert!(continuation_child_index >= 0);
        Self {
            pair_id,
            child_a,
            child_b,
            packed: ((continuation_type as u32) << Self::TYPE_SHIFT) | continuation_index as u32,
            child_index: continuation_child_index as u32,
        }
    }

    /// Creates a continuation whose result goes straight to the pair callback.
    #[inline(always)]
    pub fn direct(pair_id: i32) -> Self {
        Self {
            pair_id,
            ..Self::default()
        }
    }

    #[inline(always)]
    pub fn continuation_type(&self) -> CollisionContinuationType {
        match self.packed >> Self::TYPE_SHIFT {
            0 => CollisionContinuationType::Direct,
            1 => CollisionContinuationType::NonconvexReduction,
            other => unreachable!("Corrupt continuation type {}.", other),
        }
    }

    /// Index of the continuation slot that owns this result.
    #[inline(always)]
    pub fn index(&self) -> i32 {
        (self.packed & Self::INDEX_MASK) as i32
    }

    /// Index of the child within its continuation slot.
    #[inline(always)]
    pub fn child_index(&self) -> i32 {
        self.child_index as i32
    }
}

/// Defines a type which includes information necessary to apply some form of post processing to
/// a collision test result.
pub trait ICollisionTestContinuation: Default {
    /// Creates a collision test continuation with the given number of slots for subpairs.
    fn create(&mut self, slots: i32, pool: &mut BufferPool);

    /// Returns any resources held by a continuation that never completed.
    fn dispose(&mut self, pool: &mut BufferPool);
}

/// Manages a pool of collision test continuations.
pub struct BatcherContinuations<T: ICollisionTestContinuation + 'static> {
    continuations: Buffer<T>,
    id_pool: IdPool,
    initial_capacity: i32,
    active_count: i32,
}

impl<T: ICollisionTestContinuation + 'static> BatcherContinuations<T> {
    pub const DEFAULT_INITIAL_CAPACITY: i32 = 64;

    /// Creates an empty set of continuations. Storage is taken from the pool on first use.
    pub fn new() -> Self {
        Self::with_initial_capacity(Self::DEFAULT_INITIAL_CAPACITY)
    }

    pub fn with_initial_capacity(initial_capacity: i32) -> Self {
        Self {
            continuations: Buffer::default(),
            id_pool: IdPool::default(),
            initial_capacity: initial_capacity.max(1),
            active_count: 0,
        }
    }

    /// Number of continuations created and not yet returned.
    #[inline(always)]
    pub fn active_count(&self) -> i32 {
        self.active_count
    }

    #[inline(always)]
    pub fn allocated(&self) -> bool {
        self.continuations.allocated()
    }

    /// Allocates a continuation with room for the given number of subpairs.
    pub fn create_continuation(
        &mut self,
        slots_in_continuation: i32,
        pool: &mut BufferPool,
    ) -> (i32, &mut T) {
        if !self.continuations.allocated() {
            self.continuations = pool.take_at_least(self.initial_capacity);
            self.id_pool = IdPool::new(self.initial_capacity, pool);
        }
        let index = self.id_pool.take();
        if index >= self.continuations.len() {
            let copy_count = self.continuations.len();
            pool.resize_to_at_least(&mut self.continuations, index + 1, copy_count);
            debug!(
                "Grew continuation storage to {} slots for index {}.",
                self.continuations.len(),
                index
            );
        }
        self.active_count += 1;
        let continuation = self.continuations.get_mut(index);
        continuation.create(slots_in_continuation, pool);
        (index, continuation)
    }

    #[inline(always)]
    pub fn get_mut(&mut self, index: i32) -> &mut T {
        debug_assert!(
            self.continuations.allocated(),
            "No continuations exist; was this already disposed?"
        );
        self.continuations.get_mut(index)
    }

    /// Returns a completed continuation's id so a later `create_continuation` can reuse it.
    #[inline(always)]
    pub fn return_continuation(&mut self, index: i32, pool: &mut BufferPool) {
        debug_assert!(self.active_count > 0);
        self.active_count -= 1;
        self.id_pool.return_id(index, pool);
    }

    /// Returns all continuation storage to the pool, including the resources of continuations that
    /// never completed.
    pub fn dispose(&mut self, pool: &mut BufferPool) {
        if self.continuations.allocated() {
            if self.active_count > 0 {
                debug!("Reclaiming {} continuations that never completed.", self.active_count);
            }
            for continuation in self.continuations.iter_mut() {
                continuation.dispose(pool);
            }
            pool.return_buffer(&mut self.continuations);
            self.id_pool.dispose(pool);
        }
        self.active_count = 0;
    }
}

impl<T: ICollisionTestContinuation + 'static> Default for BatcherContinuations<T> {
    fn default() -> Self {
        Self::new()
    }
}
