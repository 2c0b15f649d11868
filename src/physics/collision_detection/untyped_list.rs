use crate::utilities::memory::buffer::Buffer;
use crate::utilities::memory::buffer_pool::BufferPool;

/// A type-erased list storing fixed-size elements as raw bytes.
///
/// The element stride and capacity are fixed at creation; elements are appended whole and never
/// partially visible.
#[derive(Default)]
pub struct UntypedList {
    pub buffer: Buffer<u8>,
    pub count: i32,
    pub byte_count: i32,
    pub element_size_in_bytes: i32,
}

impl UntypedList {
    /// Creates a new untyped list with the given element size and initial capacity.
    pub fn new(
        element_size_in_bytes: i32,
        initial_capacity_in_elements: i32,
        pool: &mut BufferPool,
    ) -> Self {
        debug_assert!(element_size_in_bytes > 0);
        let buffer =
            pool.take_at_least(initial_capacity_in_elements.max(1) * element_size_in_bytes);
        Self {
            buffer,
            count: 0,
            byte_count: 0,
            element_size_in_bytes,
        }
    }

    /// Number of whole elements the current buffer can hold.
    #[inline(always)]
    pub fn capacity(&self) -> i32 {
        if self.element_size_in_bytes == 0 {
            0
        } else {
            self.buffer.len() / self.element_size_in_bytes
        }
    }

    /// Appends one zeroed element and returns its bytes for the caller to fill.
    #[inline(always)]
    pub fn allocate_slot(&mut self) -> &mut [u8] {
        debug_assert!(
            self.byte_count + self.element_size_in_bytes <= self.buffer.len(),
            "The list must have room for another element; capacity should be ensured ahead of time."
        );
        let start = self.byte_count as usize;
        self.byte_count += self.element_size_in_bytes;
        self.count += 1;
        let slot = &mut self.buffer[start..self.byte_count as usize];
        slot.fill(0);
        slot
    }

    /// Gets the bytes of the element at the given index.
    #[inline(always)]
    pub fn element(&self, index: i32) -> &[u8] {
        debug_assert!(index >= 0 && index < self.count);
        let start = (index * self.element_size_in_bytes) as usize;
        &self.buffer[start..start + self.element_size_in_bytes as usize]
    }

    /// Empties the list without releasing its buffer.
    #[inline(always)]
    pub fn reset(&mut self) {
        self.count = 0;
        self.byte_count = 0;
    }

    pub fn dispose(&mut self, pool: &mut BufferPool) {
        if self.buffer.allocated() {
            pool.return_buffer(&mut self.buffer);
        }
        self.reset();
    }
}
