//! Narrowphase collision pair batching and manifold reduction for rigid body physics.
//!
//! Candidate shape pairs are grouped by shape type pair into fixed capacity batches, each batch is
//! tested by the task registered for its pair, and the resulting contact manifolds are reported to
//! user callbacks either directly or after merging the manifolds of a multi-child pair.

pub mod physics;
pub mod utilities;

pub use physics::body_properties::RigidPose;
pub use physics::collidables::shapes::Shapes;
pub use physics::collidables::typed_index::TypedIndex;
pub use physics::collision_detection::collision_batcher::{
    CollisionBatcher, CollisionBatcherAllocationSizes, ICollisionBatcher, ICollisionCallbacks,
};
pub use physics::collision_detection::collision_batcher_continuations::{
    CollisionContinuationType, PairContinuation,
};
pub use physics::collision_detection::collision_task_registry::{
    CollisionTask, CollisionTaskRegistry, CollisionTaskRegistryError,
};
pub use physics::collision_detection::contact_manifold::{
    Contact, ConvexContact, ConvexContactManifold, IContactManifold, NonconvexContactManifold,
};
pub use utilities::memory::BufferPool;
