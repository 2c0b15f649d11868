pub mod typed_index;
pub mod shape;

// Convex shape primitives
pub mod sphere;
pub mod capsule;

// Compound shapes
pub mod compound;

// Shape batch management
pub mod shapes;
