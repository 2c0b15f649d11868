//! Memory management utilities for the collision pipeline.
//!
//! Pooled buffers keep per-step allocations recyclable and let owners verify that every
//! buffer they took was handed back.

pub mod buffer;
pub mod buffer_pool;
pub mod id_pool;

pub use buffer::Buffer;
pub use buffer_pool::BufferPool;
pub use id_pool::IdPool;
