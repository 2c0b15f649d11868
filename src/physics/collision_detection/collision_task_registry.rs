use std::cmp::Reverse;
use std::collections::BinaryHeap;

use log::info;

use super::collision_batcher::{CollisionBatch, ICollisionBatcher};
use crate::physics::collidables::typed_index::TypedIndex;

/// Indicates why a collision task could not be registered.
#[derive(thiserror::Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum CollisionTaskRegistryError {
    /// Shape type ids must fit in a typed index.
    #[error("shape type id {0} is outside the supported range [0, 128).")]
    InvalidShapeType(i32),
    /// Tasks must batch at least one pair.
    #[error("batch size {batch_size} for the task handling ({a}, {b}) must be positive.")]
    InvalidBatchSize {
        /// First shape type of the rejected task.
        a: i32,
        /// Second shape type of the rejected task.
        b: i32,
        /// The rejected batch size.
        batch_size: i32,
    },
    /// Every unordered shape type pair is handled by at most one task.
    #[error("the shape type pair ({0}, {1}) already has a registered task.")]
    DuplicatePair(i32, i32),
    /// Subtask generation must form an acyclic graph so a single forward flush drains every batch.
    #[error("registering the task for ({0}, {1}) would create a subtask dependency cycle.")]
    DependencyCycle(i32, i32),
}

/// Parent type of tasks which handle collision tests between batches of shapes of a particular
/// type.
///
/// Tasks are shared by every batcher using a registry, so they must be thread safe.
pub trait CollisionTask: Send + Sync {
    /// Gets the number of tasks to batch together before executing this task.
    fn batch_size(&self) -> i32;
    /// Gets the first shape type index associated with the task.
    fn shape_type_index_a(&self) -> i32;
    /// Gets the second shape type index associated with the task.
    fn shape_type_index_b(&self) -> i32;
    /// Gets the shape type pairs this task may submit back into the batcher while executing.
    /// Leaf tests generate nothing.
    fn subtask_type_pairs(&self) -> &[(i32, i32)] {
        &[]
    }
    /// Executes the task on the given input.
    fn execute_batch<'a>(&self, batch: &CollisionBatch, batcher: &mut dyn ICollisionBatcher<'a>);
}

/// Metadata about a collision task.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionTaskReference {
    /// Index of the task in the registry, or -1 if no task handles the pair.
    pub task_index: i32,
    /// Number of pairs to accumulate in a batch before dispatching tests.
    pub batch_size: i32,
    /// The type id that is expected to come first in the collision pair.
    pub expected_first_type_id: i32,
}

impl CollisionTaskReference {
    pub const NOT_FOUND: Self = Self {
        task_index: -1,
        batch_size: 0,
        expected_first_type_id: -1,
    };

    #[inline(always)]
    pub fn exists(&self) -> bool {
        self.task_index >= 0
    }
}

impl Default for CollisionTaskReference {
    fn default() -> Self {
        Self::NOT_FOUND
    }
}

/// Registry of collision tasks used to handle various shape pair types.
///
/// Tasks are kept in dependency order: a task that submits subpairs always has a lower index than
/// the tasks that handle those subpairs.
pub struct CollisionTaskRegistry {
    top_level_matrix: Vec<Vec<CollisionTaskReference>>,
    tasks: Vec<Box<dyn CollisionTask>>,
}

impl CollisionTaskRegistry {
    /// Creates a new collision task registry.
    pub fn new(initial_shape_count: usize) -> Self {
        let mut registry = Self {
            top_level_matrix: Vec::new(),
            tasks: Vec::new(),
        };
        registry.resize_matrix(initial_shape_count);
        registry
    }

    fn resize_matrix(&mut self, new_size: usize) {
        self.top_level_matrix.resize_with(new_size, Vec::new);
        for row in self.top_level_matrix.iter_mut() {
            row.resize(new_size, CollisionTaskReference::NOT_FOUND);
        }
    }

    #[inline(always)]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    #[inline(always)]
    pub fn get_task(&self, task_index: i32) -> &dyn CollisionTask {
        self.tasks[task_index as usize].as_ref()
    }

    fn handles(task: &dyn CollisionTask, a: i32, b: i32) -> bool {
        let (ta, tb) = (task.shape_type_index_a(), task.shape_type_index_b());
        (ta == a && tb == b) || (ta == b && tb == a)
    }

    /// Orders tasks so every subtask generator precedes the handlers of its subpairs.
    /// Ties keep registration order. Returns `None` if the dependencies contain a cycle.
    fn sorted_order(tasks: &[Box<dyn CollisionTask>]) -> Option<Vec<usize>> {
        let count = tasks.len();
        let mut dependents = vec![Vec::new(); count];
        let mut incoming = vec![0usize; count];
        for (i, task) in tasks.iter().enumerate() {
            for &(a, b) in task.subtask_type_pairs() {
                for (j, handler) in tasks.iter().enumerate() {
                    if Self::handles(handler.as_ref(), a, b) {
                        dependents[i].push(j);
                        incoming[j] += 1;
                    }
                }
            }
        }
        let mut ready: BinaryHeap<Reverse<usize>> =
            (0..count).filter(|&i| incoming[i] == 0).map(Reverse).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &j in &dependents[i] {
                incoming[j] -= 1;
                if incoming[j] == 0 {
                    ready.push(Reverse(j));
                }
            }
        }
        (order.len() == count).then_some(order)
    }

    /// Registers a collision task. Returns the index of the task in the registry.
    ///
    /// Registration can move existing tasks to keep the dependency order, so task indices obtained
    /// before a registration should be looked up again.
    pub fn register(
        &mut self,
        task: Box<dyn CollisionTask>,
    ) -> Result<usize, CollisionTaskRegistryError> {
        let a = task.shape_type_index_a();
        let b = task.shape_type_index_b();
        for type_id in [a, b] {
            if !(0..TypedIndex::EXCLUSIVE_MAXIMUM_TYPE_ID).contains(&type_id) {
                return Err(CollisionTaskRegistryError::InvalidShapeType(type_id));
            }
        }
        if task.batch_size() <= 0 {
            return Err(CollisionTaskRegistryError::InvalidBatchSize {
                a,
                b,
                batch_size: task.batch_size(),
            });
        }
        if self.tasks.iter().any(|existing| Self::handles(existing.as_ref(), a, b)) {
            return Err(CollisionTaskRegistryError::DuplicatePair(a, b));
        }

        self.tasks.push(task);
        let Some(order) = Self::sorted_order(&self.tasks) else {
            self.tasks.pop();
            return Err(CollisionTaskRegistryError::DependencyCycle(a, b));
        };
        let new_task_slot = self.tasks.len() - 1;
        let mut slots: Vec<Option<Box<dyn CollisionTask>>> =
            self.tasks.drain(..).map(Some).collect();
        self.tasks = order
            .iter()
            .filter_map(|&slot| slots[slot].take())
            .collect();
        let index = order
            .iter()
            .position(|&slot| slot == new_task_slot)
            .unwrap_or(new_task_slot);

        self.rebuild_matrix();
        info!(
            "Registered collision task for shape types ({}, {}) at index {} with batch size {}.",
            a,
            b,
            index,
            self.tasks[index].batch_size()
        );
        Ok(index)
    }

    fn rebuild_matrix(&mut self) {
        let highest = self
            .tasks
            .iter()
            .map(|task| task.shape_type_index_a().max(task.shape_type_index_b()) as usize + 1)
            .max()
            .unwrap_or(0);
        if highest > self.top_level_matrix.len() {
            self.resize_matrix(highest);
        }
        for row in self.top_level_matrix.iter_mut() {
            row.fill(CollisionTaskReference::NOT_FOUND);
        }
        for (index, task) in self.tasks.iter().enumerate() {
            let a = task.shape_type_index_a() as usize;
            let b = task.shape_type_index_b() as usize;
            let task_info = CollisionTaskReference {
                task_index: index as i32,
                batch_size: task.batch_size(),
                expected_first_type_id: task.shape_type_index_a(),
            };
            self.top_level_matrix[a][b] = task_info;
            self.top_level_matrix[b][a] = task_info;
        }
    }

    /// Gets the task reference for a pair of shape types. The lookup is symmetric; the reference's
    /// `expected_first_type_id` tells the caller which order the task expects.
    #[inline(always)]
    pub fn get_task_reference(&self, type_id_a: i32, type_id_b: i32) -> CollisionTaskReference {
        if type_id_a < 0 || type_id_b < 0 {
            return CollisionTaskReference::NOT_FOUND;
        }
        self.top_level_matrix
            .get(type_id_a as usize)
            .and_then(|row| row.get(type_id_b as usize))
            .copied()
            .unwrap_or(CollisionTaskReference::NOT_FOUND)
    }
}

impl Default for CollisionTaskRegistry {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullTask {
        a: i32,
        b: i32,
        batch_size: i32,
        subtasks: Vec<(i32, i32)>,
    }

    impl NullTask {
        fn boxed(a: i32, b: i32, subtasks: &[(i32, i32)]) -> Box<dyn CollisionTask> {
            Box::new(Self {
                a,
                b,
                batch_size: 8,
                subtasks: subtasks.to_vec(),
            })
        }
    }

    impl CollisionTask for NullTask {
        fn batch_size(&self) -> i32 {
            self.batch_size
        }
        fn shape_type_index_a(&self) -> i32 {
            self.a
        }
        fn shape_type_index_b(&self) -> i32 {
            self.b
        }
        fn subtask_type_pairs(&self) -> &[(i32, i32)] {
            &self.subtasks
        }
        fn execute_batch<'a>(
            &self,
            _batch: &CollisionBatch,
            _batcher: &mut dyn ICollisionBatcher<'a>,
        ) {
        }
    }

    #[test]
    fn lookups_are_symmetric() {
        let mut registry = CollisionTaskRegistry::new(2);
        registry.register(NullTask::boxed(0, 1, &[])).unwrap();
        let forward = registry.get_task_reference(0, 1);
        let backward = registry.get_task_reference(1, 0);
        assert_eq!(forward, backward);
        assert_eq!(forward.expected_first_type_id, 0);
        assert_eq!(forward.batch_size, 8);
        assert!(!registry.get_task_reference(1, 1).exists());
        assert!(!registry.get_task_reference(50, 0).exists());
        assert!(!registry.get_task_reference(-1, 0).exists());
    }

    #[test]
    fn generators_are_ordered_before_their_subtasks() {
        let mut registry = CollisionTaskRegistry::default();
        registry.register(NullTask::boxed(0, 0, &[])).unwrap();
        registry.register(NullTask::boxed(0, 1, &[])).unwrap();
        let generator = registry.register(NullTask::boxed(0, 6, &[(0, 0), (1, 0)])).unwrap();
        assert_eq!(generator, 0);
        let generator_index = registry.get_task_reference(6, 0).task_index;
        let sphere_pair_index = registry.get_task_reference(0, 0).task_index;
        assert!(generator_index < sphere_pair_index);
        assert!(generator_index < registry.get_task_reference(1, 0).task_index);
        // Unrelated tasks keep their relative order.
        assert!(sphere_pair_index < registry.get_task_reference(0, 1).task_index);
        assert_eq!(registry.task_count(), 3);
    }

    #[test]
    fn handlers_registered_after_generators_still_sort_after_them() {
        let mut registry = CollisionTaskRegistry::default();
        registry.register(NullTask::boxed(0, 0, &[])).unwrap();
        registry.register(NullTask::boxed(0, 6, &[(1, 1)])).unwrap();
        let handler = registry.register(NullTask::boxed(1, 1, &[])).unwrap();
        assert_eq!(handler, 2);
        assert!(registry.get_task_reference(6, 0).task_index < handler as i32);
    }

    #[test]
    fn cycles_are_rejected_without_changing_the_registry() {
        let mut registry = CollisionTaskRegistry::default();
        registry.register(NullTask::boxed(0, 6, &[(1, 6)])).unwrap();
        assert_eq!(
            registry.register(NullTask::boxed(1, 6, &[(6, 0)])),
            Err(CollisionTaskRegistryError::DependencyCycle(1, 6))
        );
        assert_eq!(registry.task_count(), 1);
        assert!(!registry.get_task_reference(1, 6).exists());
        assert_eq!(
            registry.register(NullTask::boxed(6, 6, &[(6, 6)])),
            Err(CollisionTaskRegistryError::DependencyCycle(6, 6))
        );
    }

    #[test]
    fn invalid_registrations_are_reported() {
        let mut registry = CollisionTaskRegistry::default();
        registry.register(NullTask::boxed(0, 1, &[])).unwrap();
        assert_eq!(
            registry.register(NullTask::boxed(1, 0, &[])),
            Err(CollisionTaskRegistryError::DuplicatePair(1, 0))
        );
        assert_eq!(
            registry.register(NullTask::boxed(0, 200, &[])),
            Err(CollisionTaskRegistryError::InvalidShapeType(200))
        );
        let zero_batch = Box::new(NullTask {
            a: 2,
            b: 2,
            batch_size: 0,
            subtasks: Vec::new(),
        });
        assert!(matches!(
            registry.register(zero_batch),
            Err(CollisionTaskRegistryError::InvalidBatchSize { batch_size: 0, .. })
        ));
    }
}
