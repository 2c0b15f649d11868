use std::ops::{Deref, DerefMut, Index, IndexMut};
use std::slice::SliceIndex;

/// Represents a span of pooled memory.
///
/// A buffer is taken from a [`BufferPool`](super::buffer_pool::BufferPool) and must be handed back to it.
/// Returning a buffer leaves the handle unallocated and empty, so any later element access panics.
#[derive(Debug)]
pub struct Buffer<T> {
    memory: Vec<T>,
    id: i32,
}

impl<T> Buffer<T> {
    /// Wraps storage handed out by a pool.
    #[inline]
    pub(crate) fn from_pooled(memory: Vec<T>, id: i32) -> Self {
        Self { memory, id }
    }

    /// Releases the storage and id, leaving this buffer unallocated.
    #[inline]
    pub(crate) fn take_memory(&mut self) -> (Vec<T>, i32) {
        let id = self.id;
        self.id = -1;
        (std::mem::take(&mut self.memory), id)
    }

    /// Returns the length of the buffer in typed elements.
    #[inline(always)]
    pub fn len(&self) -> i32 {
        self.memory.len() as i32
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Gets the id of the pool allocation backing this buffer, or -1 if unallocated.
    #[inline(always)]
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Gets whether the buffer refers to pool memory.
    #[inline(always)]
    pub fn allocated(&self) -> bool {
        self.id >= 0
    }

    #[inline(always)]
    pub fn get(&self, index: i32) -> &T {
        debug_assert!(
            index >= 0 && index < self.len(),
            "Index {} out of buffer bounds [0, {}).",
            index,
            self.len()
        );
        &self.memory[index as usize]
    }

    #[inline(always)]
    pub fn get_mut(&mut self, index: i32) -> &mut T {
        debug_assert!(
            index >= 0 && index < self.len(),
            "Index {} out of buffer bounds [0, {}).",
            index,
            self.len()
        );
        &mut self.memory[index as usize]
    }
}

impl<T: Default> Buffer<T> {
    /// Moves buffer data into another buffer, leaving default values behind in the source region.
    pub fn move_to(
        &mut self,
        source_start: i32,
        target: &mut Buffer<T>,
        target_start: i32,
        count: i32,
    ) {
        debug_assert!(source_start + count <= self.len(), "Source region out of bounds.");
        debug_assert!(target_start + count <= target.len(), "Target region out of bounds.");
        let source = &mut self.memory[source_start as usize..(source_start + count) as usize];
        let target = &mut target.memory[target_start as usize..(target_start + count) as usize];
        for (from, to) in source.iter_mut().zip(target.iter_mut()) {
            *to = std::mem::take(from);
        }
    }
}

impl<T> Default for Buffer<T> {
    fn default() -> Self {
        Self {
            memory: Vec::new(),
            id: -1,
        }
    }
}

impl<T, I: SliceIndex<[T]>> Index<I> for Buffer<T> {
    type Output = I::Output;

    #[inline(always)]
    fn index(&self, index: I) -> &Self::Output {
        &self.memory[index]
    }
}

impl<T, I: SliceIndex<[T]>> IndexMut<I> for Buffer<T> {
    #[inline(always)]
    fn index_mut(&mut self, index: I) -> &mut Self::Output {
        &mut self.memory[index]
    }
}

impl<T> Deref for Buffer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.memory
    }
}

impl<T> DerefMut for Buffer<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.memory
    }
}
