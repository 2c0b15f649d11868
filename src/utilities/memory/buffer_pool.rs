use std::any::{Any, TypeId};
use std::collections::HashMap;
#[cfg(debug_assertions)]
use std::collections::HashSet;

use super::buffer::Buffer;

/// Largest power of two element capacity a single buffer may have.
pub const MAXIMUM_SPAN_SIZE_POWER: u32 = 30;

/// Unmanaged-style memory pool that recycles storage by element type and power-of-two capacity.
///
/// Every buffer taken from the pool is tracked until it is returned, which lets owners of pooled
/// resources verify that teardown released everything.
pub struct BufferPool {
    /// Free storage, keyed by element type and capacity power. Each entry holds `Vec<T>`s.
    pools: HashMap<(TypeId, u32), Vec<Box<dyn Any>>>,
    next_slot: u32,
    outstanding_count: usize,
    #[cfg(debug_assertions)]
    outstanding_ids: HashSet<i32>,
}

impl BufferPool {
    const ID_POWER_SHIFT: u32 = 26;
    const SLOT_MASK: u32 = (1 << Self::ID_POWER_SHIFT) - 1;

    pub fn new() -> Self {
        Self {
            pools: HashMap::new(),
            next_slot: 0,
            outstanding_count: 0,
            #[cfg(debug_assertions)]
            outstanding_ids: HashSet::new(),
        }
    }

    /// Gets the capacity of a buffer that would be returned by the pool if a given element count was requested from `take_at_least`.
    #[inline]
    pub fn get_capacity_for_count<T>(count: i32) -> i32 {
        1 << Self::power_for_count(count)
    }

    #[inline]
    fn power_for_count(count: i32) -> u32 {
        let count = count.max(1) as u32;
        let power = count.next_power_of_two().trailing_zeros();
        assert!(
            power <= MAXIMUM_SPAN_SIZE_POWER,
            "Requested {} elements, which exceeds the largest pooled span.",
            count
        );
        power
    }

    fn take_for_power<T: Default + 'static>(&mut self, power: u32, length: usize) -> Buffer<T> {
        let mut memory = self
            .pools
            .get_mut(&(TypeId::of::<T>(), power))
            .and_then(|free| free.pop())
            .and_then(|boxed| boxed.downcast::<Vec<T>>().ok())
            .map(|boxed| *boxed)
            .unwrap_or_else(|| Vec::with_capacity(1 << power));
        memory.clear();
        memory.resize_with(length, T::default);

        let slot = self.next_slot;
        self.next_slot = (self.next_slot + 1) & Self::SLOT_MASK;
        let id = ((power << Self::ID_POWER_SHIFT) | slot) as i32;
        self.outstanding_count += 1;
        #[cfg(debug_assertions)]
        {
            self.outstanding_ids.insert(id);
        }
        Buffer::from_pooled(memory, id)
    }

    /// Takes a buffer large enough to contain a number of elements of a given type. Capacity may be larger than requested.
    #[inline]
    pub fn take_at_least<T: Default + 'static>(&mut self, count: i32) -> Buffer<T> {
        let power = Self::power_for_count(count);
        self.take_for_power(power, 1 << power)
    }

    /// Takes a typed buffer of exactly the requested length from the pool.
    #[inline]
    pub fn take<T: Default + 'static>(&mut self, count: i32) -> Buffer<T> {
        debug_assert!(count >= 0);
        let power = Self::power_for_count(count);
        self.take_for_power(power, count.max(0) as usize)
    }

    /// Returns a buffer to the pool. The buffer is left unallocated.
    pub fn return_buffer<T: 'static>(&mut self, buffer: &mut Buffer<T>) {
        debug_assert!(
            buffer.allocated(),
            "Cannot return a buffer that was never taken from a pool."
        );
        if !buffer.allocated() {
            return;
        }
        let (memory, id) = buffer.take_memory();
        #[cfg(debug_assertions)]
        {
            assert!(
                self.outstanding_ids.remove(&id),
                "This buffer id must have been taken from the pool previously."
            );
        }
        self.outstanding_count -= 1;
        let power = (id as u32) >> Self::ID_POWER_SHIFT;
        self.pools
            .entry((TypeId::of::<T>(), power))
            .or_default()
            .push(Box::new(memory));
    }

    /// Resizes a typed buffer to the smallest size available in the pool which contains the target size.
    /// Moves the first `copy_count` elements into the new buffer.
    pub fn resize_to_at_least<T: Default + 'static>(
        &mut self,
        buffer: &mut Buffer<T>,
        target_size: i32,
        copy_count: i32,
    ) {
        let target_size = Self::get_capacity_for_count::<T>(target_size);
        if !buffer.allocated() {
            *buffer = self.take_at_least(target_size);
        } else if buffer.len() != target_size {
            let mut new_buffer = self.take_at_least::<T>(target_size);
            debug_assert!(copy_count <= buffer.len() && copy_count <= new_buffer.len());
            buffer.move_to(0, &mut new_buffer, 0, copy_count);
            self.return_buffer(buffer);
            *buffer = new_buffer;
        }
    }

    /// Gets the number of buffers taken from the pool that have not yet been returned.
    #[inline]
    pub fn outstanding_buffer_count(&self) -> usize {
        self.outstanding_count
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}
