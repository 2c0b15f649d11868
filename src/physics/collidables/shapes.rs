use super::compound::{Compound, CompoundChild};
use super::shape::IShape;
use super::typed_index::TypedIndex;

/// Fixed-stride raw storage for every shape of one type.
pub struct ShapeBatch {
    shape_data_size: usize,
    data: Vec<u8>,
}

impl ShapeBatch {
    fn new(shape_data_size: usize) -> Self {
        Self {
            shape_data_size,
            data: Vec::new(),
        }
    }

    /// Gets the number of shapes stored in the batch.
    #[inline(always)]
    pub fn count(&self) -> i32 {
        (self.data.len() / self.shape_data_size.max(1)) as i32
    }

    fn add_raw(&mut self, shape_data: &[u8]) -> i32 {
        debug_assert!(shape_data.len() == self.shape_data_size);
        let index = self.count();
        self.data.extend_from_slice(shape_data);
        index
    }

    /// Gets the raw bytes of the shape at the given index.
    #[inline(always)]
    pub fn get_shape_data(&self, shape_index: i32) -> &[u8] {
        let start = shape_index as usize * self.shape_data_size;
        &self.data[start..start + self.shape_data_size]
    }
}

/// Shape registry mapping typed shape handles to raw shape bytes.
///
/// Each shape type gets its own batch. Compound children live in a shared list that compounds
/// refer into by range.
#[derive(Default)]
pub struct Shapes {
    batches: Vec<Option<ShapeBatch>>,
    compound_children: Vec<CompoundChild>,
}

impl Shapes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a shape to the registry, creating its type batch on first use.
    pub fn add<TShape: IShape>(&mut self, shape: &TShape) -> TypedIndex {
        let type_id = TShape::TYPE_ID;
        let slot = type_id as usize;
        if self.batches.len() <= slot {
            self.batches.resize_with(slot + 1, || None);
        }
        let batch = self.batches[slot]
            .get_or_insert_with(|| ShapeBatch::new(std::mem::size_of::<TShape>()));
        let index = batch.add_raw(shape.as_bytes());
        TypedIndex::new(type_id, index)
    }

    /// Adds a compound made of the given children.
    pub fn add_compound(&mut self, children: &[CompoundChild]) -> TypedIndex {
        let compound = Compound {
            child_start: self.compound_children.len() as u32,
            child_count: children.len() as u32,
        };
        self.compound_children.extend_from_slice(children);
        self.add(&compound)
    }

    /// Gets the batch holding shapes of the given type, if any shape of that type was added.
    #[inline(always)]
    pub fn get_batch(&self, type_id: i32) -> Option<&ShapeBatch> {
        self.batches.get(type_id as usize).and_then(|batch| batch.as_ref())
    }

    /// Gets the raw bytes of a shape. The slice length is the shape type's data size.
    #[inline(always)]
    pub fn get_shape_data(&self, shape_index: TypedIndex) -> &[u8] {
        debug_assert!(shape_index.exists(), "Cannot look up a shape index that refers to nothing.");
        let batch = self
            .get_batch(shape_index.type_id())
            .unwrap_or_else(|| panic!("No shapes of type {} exist.", shape_index.type_id()));
        batch.get_shape_data(shape_index.index())
    }

    /// Reads a copy of a shape of a known type.
    #[inline(always)]
    pub fn get_shape<TShape: IShape>(&self, shape_index: i32) -> TShape {
        TShape::from_bytes(self.get_shape_data(TypedIndex::new(TShape::TYPE_ID, shape_index)))
    }

    /// Gets the children of a compound.
    #[inline(always)]
    pub fn compound_children(&self, compound: &Compound) -> &[CompoundChild] {
        let start = compound.child_start as usize;
        &self.compound_children[start..start + compound.child_count as usize]
    }
}
