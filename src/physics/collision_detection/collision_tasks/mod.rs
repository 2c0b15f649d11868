pub mod convex_collision_task;
pub mod convex_compound_collision_task;
pub mod sphere_capsule_tester;
pub mod sphere_pair_tester;
