use super::buffer::Buffer;
use super::buffer_pool::BufferPool;

/// Manages a pool of identifier values. Grabbing an id from the pool picks a number that has been
/// picked and returned before, or if none of those are available, the minimum value greater
/// than any existing id.
pub struct IdPool {
    next_index: i32,
    available_id_count: i32,
    available_ids: Buffer<i32>,
}

impl IdPool {
    /// Creates a new IdPool with the given initial capacity.
    pub fn new(initial_capacity: i32, pool: &mut BufferPool) -> Self {
        IdPool {
            next_index: 0,
            available_id_count: 0,
            available_ids: pool.take_at_least(initial_capacity),
        }
    }

    /// Gets the number of previously returned ids waiting in the pool.
    #[inline(always)]
    pub fn available_id_count(&self) -> i32 {
        self.available_id_count
    }

    #[inline(always)]
    pub fn allocated(&self) -> bool {
        self.available_ids.allocated()
    }

    /// Takes an id from the pool.
    #[inline(always)]
    pub fn take(&mut self) -> i32 {
        debug_assert!(self.available_ids.allocated());
        if self.available_id_count > 0 {
            self.available_id_count -= 1;
            *self.available_ids.get(self.available_id_count)
        } else {
            let id = self.next_index;
            self.next_index += 1;
            id
        }
    }

    /// Returns an id to the pool, resizing the internal buffer if necessary.
    #[inline(always)]
    pub fn return_id(&mut self, id: i32, pool: &mut BufferPool) {
        debug_assert!(self.available_ids.allocated());
        debug_assert!(id >= 0 && id < self.next_index, "Returned id {} was never taken.", id);
        if self.available_id_count == self.available_ids.len() {
            let copy_count = self.available_id_count;
            pool.resize_to_at_least(&mut self.available_ids, (copy_count * 2).max(1), copy_count);
        }
        *self.available_ids.get_mut(self.available_id_count) = id;
        self.available_id_count += 1;
    }

    /// Resets the IdPool.
    pub fn clear(&mut self) {
        self.next_index = 0;
        self.available_id_count = 0;
    }

    /// Returns underlying memory to the pool.
    pub fn dispose(&mut self, pool: &mut BufferPool) {
        if self.available_ids.allocated() {
            pool.return_buffer(&mut self.available_ids);
        }
        self.clear();
    }
}

impl Default for IdPool {
    fn default() -> Self {
        Self {
            next_index: 0,
            available_id_count: 0,
            available_ids: Buffer::default(),
        }
    }
}
