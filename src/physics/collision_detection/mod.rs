//! Narrowphase pair batching, dispatch and manifold reduction.
//!
//! Pairs are submitted to a [`CollisionBatcher`](collision_batcher::CollisionBatcher), grouped by
//! shape type pair and handed to the [`CollisionTask`](collision_task_registry::CollisionTask)
//! registered for that pair. Results flow back through continuations, either straight to the
//! callbacks or through a nonconvex reduction that merges child manifolds.

pub mod collision_batcher;
pub mod collision_batcher_continuations;
pub mod collision_task_registry;
pub mod collision_tasks;
pub mod contact_manifold;
pub mod nonconvex_reduction;
pub mod untyped_list;

#[cfg(test)]
pub(crate) mod test_callbacks;
