use glam::Vec3;

use super::collision_batcher::ICollisionCallbacks;
use super::contact_manifold::{Contact, ConvexContactManifold, IContactManifold};

/// A completed pair as seen by the callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub pair_id: i32,
    pub convex: bool,
    pub contacts: Vec<Contact>,
    pub offset_b: Vec3,
}

/// Callbacks that record everything the batcher reports.
#[derive(Debug, Default)]
pub struct RecordingCallbacks {
    pub completions: Vec<Completion>,
    /// (pair id, child a, child b, contact count) per completed child.
    pub child_completions: Vec<(i32, i32, i32, i32)>,
    /// (child a, child b) labels that must not be tested.
    pub vetoed_children: Vec<(i32, i32)>,
}

impl RecordingCallbacks {
    pub fn pair_ids(&self) -> Vec<i32> {
        self.completions.iter().map(|completion| completion.pair_id).collect()
    }

    pub fn completion(&self, pair_id: i32) -> &Completion {
        self.completions
            .iter()
            .find(|completion| completion.pair_id == pair_id)
            .unwrap_or_else(|| panic!("Pair {} never completed.", pair_id))
    }
}

impl ICollisionCallbacks for RecordingCallbacks {
    fn on_pair_completed<TManifold: IContactManifold>(
        &mut self,
        pair_id: i32,
        manifold: &mut TManifold,
    ) {
        self.completions.push(Completion {
            pair_id,
            convex: manifold.convex(),
            contacts: (0..manifold.count()).map(|i| manifold.get_contact(i)).collect(),
            offset_b: manifold.offset_b(),
        });
    }

    fn on_child_pair_completed(
        &mut self,
        pair_id: i32,
        child_a: i32,
        child_b: i32,
        manifold: &mut ConvexContactManifold,
    ) {
        self.child_completions
            .push((pair_id, child_a, child_b, manifold.count));
    }

    fn allow_collision_testing(&self, _pair_id: i32, child_a: i32, child_b: i32) -> bool {
        !self.vetoed_children.contains(&(child_a, child_b))
    }
}
