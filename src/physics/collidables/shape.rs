use bytemuck::Pod;

/// Defines a type usable as a shape by collidables.
///
/// Shapes are plain data: the registry stores them as raw bytes and collision tasks read them back
/// with unaligned reads, so every shape must be `Pod`.
pub trait IShape: Pod {
    /// Unique type id for this shape type.
    const TYPE_ID: i32;

    /// Gets the raw bytes of the shape as stored in shape batches and collision batches.
    #[inline(always)]
    fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Reads a shape back from raw shape bytes. The bytes need not be aligned.
    #[inline(always)]
    fn from_bytes(bytes: &[u8]) -> Self {
        debug_assert!(
            bytes.len() == std::mem::size_of::<Self>(),
            "Shape data for type {} should be {} bytes, got {}.",
            Self::TYPE_ID,
            std::mem::size_of::<Self>(),
            bytes.len()
        );
        bytemuck::pod_read_unaligned(bytes)
    }
}
