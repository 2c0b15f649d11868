use std::fmt;

/// A shape type id and an index within that type's storage, packed into a single integer.
///
/// From least to most significant: 24 bits index, 7 bits type id, 1 bit 'exists' flag.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TypedIndex {
    pub packed: u32,
}

impl TypedIndex {
    /// Exclusive upper bound on shape type ids.
    pub const EXCLUSIVE_MAXIMUM_TYPE_ID: i32 = 1 << 7;
    /// Exclusive upper bound on per-type indices.
    pub const EXCLUSIVE_MAXIMUM_INDEX: i32 = 1 << 24;

    #[inline(always)]
    pub fn new(type_id: i32, index: i32) -> Self {
        debug_assert!(
            (0..Self::EXCLUSIVE_MAXIMUM_TYPE_ID).contains(&type_id),
            "Do you really have that many type indices, or is the index corrupt?"
        );
        debug_assert!(
            (0..Self::EXCLUSIVE_MAXIMUM_INDEX).contains(&index),
            "Do you really have that many instances, or is the index corrupt?"
        );
        // A default constructed index has a zero in the MSB, which marks it as referring to nothing.
        Self {
            packed: ((type_id as u32) << 24) | (index as u32) | (1u32 << 31),
        }
    }

    #[inline(always)]
    pub fn type_id(&self) -> i32 {
        ((self.packed & 0x7F00_0000) >> 24) as i32
    }

    #[inline(always)]
    pub fn index(&self) -> i32 {
        (self.packed & 0x00FF_FFFF) as i32
    }

    /// Gets whether this index actually refers to anything. The type id and index should only be used if this is true.
    #[inline(always)]
    pub fn exists(&self) -> bool {
        self.packed & (1 << 31) != 0
    }
}

impl fmt::Display for TypedIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<{}, {}>", self.type_id(), self.index())
    }
}
