use glam::Vec3;

/// Information about a single contact.
/// This type contains a field for the normal; it can be used to represent contacts within nonconvex contact manifolds or convex manifolds.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Contact {
    /// Offset from the position of collidable A to the contact position.
    pub offset: Vec3,
    /// Penetration depth between the two collidables at this contact. Negative values represent separation.
    pub depth: f32,
    /// Surface basis of the contact. Points from collidable B to collidable A.
    pub normal: Vec3,
    /// Id of the features involved in the collision that generated this contact.
    pub feature_id: i32,
}

/// Information about a single contact in a convex collidable pair.
/// Convex collidable pairs share one surface basis across the manifold.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConvexContact {
    /// Offset from the position of collidable A to the contact position.
    pub offset: Vec3,
    /// Penetration depth between the two collidables at this contact. Negative values represent separation.
    pub depth: f32,
    /// Id of the features involved in the collision that generated this contact.
    pub feature_id: i32,
}

impl ConvexContact {
    #[inline(always)]
    pub fn new(offset: Vec3, depth: f32, feature_id: i32) -> Self {
        Self {
            offset,
            depth,
            feature_id,
        }
    }
}

/// Read access shared by convex and nonconvex manifolds.
pub trait IContactManifold {
    /// Gets the number of contacts in the manifold.
    fn count(&self) -> i32;

    /// Gets whether the contact manifold was created by a pair of convex objects.
    fn convex(&self) -> bool;

    /// Gets the offset from collidable A to collidable B.
    fn offset_b(&self) -> Vec3;

    fn get_feature_id(&self, contact_index: i32) -> i32;

    fn get_depth(&self, contact_index: i32) -> f32;

    /// Gets a contact's normal. Points from collidable B to collidable A.
    fn get_normal(&self, contact_index: i32) -> Vec3;

    /// Gets the offset from collidable A to the requested contact.
    fn get_offset(&self, contact_index: i32) -> Vec3;

    /// Gets a copy of a contact's data.
    fn get_contact(&self, contact_index: i32) -> Contact;
}

/// Contains the data associated with a convex contact manifold.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConvexContactManifold {
    /// Offset from collidable A to collidable B.
    pub offset_b: Vec3,
    pub count: i32,
    /// Surface normal shared by all contacts. Points from collidable B to collidable A.
    pub normal: Vec3,
    pub contacts: [ConvexContact; 4],
}

impl ConvexContactManifold {
    /// The maximum number of contacts that can exist within a convex manifold.
    pub const MAXIMUM_CONTACT_COUNT: i32 = 4;

    #[inline(always)]
    fn validate_index(&self, contact_index: i32) {
        debug_assert!(
            contact_index >= 0 && contact_index < self.count,
            "Contact index must be within the contact count."
        );
    }

    /// Gets the live contacts of the manifold.
    #[inline(always)]
    pub fn contacts(&self) -> &[ConvexContact] {
        &self.contacts[..self.count as usize]
    }

    #[inline(always)]
    pub fn contacts_mut(&mut self) -> &mut [ConvexContact] {
        &mut self.contacts[..self.count as usize]
    }

    /// Appends a contact.
    #[inline(always)]
    pub fn add(&mut self, contact: ConvexContact) {
        debug_assert!(self.count < Self::MAXIMUM_CONTACT_COUNT);
        self.contacts[self.count as usize] = contact;
        self.count += 1;
    }

    /// Re-expresses a manifold that was computed with A and B swapped in terms of the original order.
    ///
    /// Contact offsets become relative to the new A (`offset -= offset_b`), the normal is negated so it
    /// still points from B to A, and `offset_b` is negated.
    #[inline(always)]
    pub fn flip(&mut self) {
        let offset_b = self.offset_b;
        for contact in self.contacts_mut() {
            contact.offset -= offset_b;
        }
        self.normal = -self.normal;
        self.offset_b = -offset_b;
    }
}

impl IContactManifold for ConvexContactManifold {
    #[inline(always)]
    fn count(&self) -> i32 {
        self.count
    }

    #[inline(always)]
    fn convex(&self) -> bool {
        true
    }

    #[inline(always)]
    fn offset_b(&self) -> Vec3 {
        self.offset_b
    }

    #[inline(always)]
    fn get_feature_id(&self, contact_index: i32) -> i32 {
        self.validate_index(contact_index);
        self.contacts[contact_index as usize].feature_id
    }

    #[inline(always)]
    fn get_depth(&self, contact_index: i32) -> f32 {
        self.validate_index(contact_index);
        self.contacts[contact_index as usize].depth
    }

    #[inline(always)]
    fn get_normal(&self, _contact_index: i32) -> Vec3 {
        self.normal
    }

    #[inline(always)]
    fn get_offset(&self, contact_index: i32) -> Vec3 {
        self.validate_index(contact_index);
        self.contacts[contact_index as usize].offset
    }

    fn get_contact(&self, contact_index: i32) -> Contact {
        self.validate_index(contact_index);
        let contact = &self.contacts[contact_index as usize];
        Contact {
            offset: contact.offset,
            depth: contact.depth,
            normal: self.normal,
            feature_id: contact.feature_id,
        }
    }
}

/// Contains the data associated with a nonconvex contact manifold.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NonconvexContactManifold {
    /// Offset from collidable A to collidable B.
    pub offset_b: Vec3,
    pub count: i32,
    pub contacts: [Contact; 8],
}

impl NonconvexContactManifold {
    /// The maximum number of contacts that can exist within a nonconvex manifold.
    pub const MAXIMUM_CONTACT_COUNT: i32 = 8;

    #[inline(always)]
    fn validate_index(&self, contact_index: i32) {
        debug_assert!(
            contact_index >= 0 && contact_index < self.count,
            "Contact index must be within the contact count."
        );
    }

    #[inline(always)]
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts[..self.count as usize]
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.count == Self::MAXIMUM_CONTACT_COUNT
    }

    /// Adds a contact to the manifold from a convex contact and a normal.
    #[inline(always)]
    pub fn add(&mut self, normal: Vec3, convex_contact: &ConvexContact) {
        debug_assert!(self.count < Self::MAXIMUM_CONTACT_COUNT);
        self.contacts[self.count as usize] = Contact {
            offset: convex_contact.offset,
            depth: convex_contact.depth,
            normal,
            feature_id: convex_contact.feature_id,
        };
        self.count += 1;
    }
}

impl IContactManifold for NonconvexContactManifold {
    #[inline(always)]
    fn count(&self) -> i32 {
        self.count
    }

    #[inline(always)]
    fn convex(&self) -> bool {
        false
    }

    #[inline(always)]
    fn offset_b(&self) -> Vec3 {
        self.offset_b
    }

    #[inline(always)]
    fn get_feature_id(&self, contact_index: i32) -> i32 {
        self.validate_index(contact_index);
        self.contacts[contact_index as usize].feature_id
    }

    #[inline(always)]
    fn get_depth(&self, contact_index: i32) -> f32 {
        self.validate_index(contact_index);
        self.contacts[contact_index as usize].depth
    }

    #[inline(always)]
    fn get_normal(&self, contact_index: i32) -> Vec3 {
        self.validate_index(contact_index);
        self.contacts[contact_index as usize].normal
    }

    #[inline(always)]
    fn get_offset(&self, contact_index: i32) -> Vec3 {
        self.validate_index(contact_index);
        self.contacts[contact_index as usize].offset
    }

    fn get_contact(&self, contact_index: i32) -> Contact {
        self.validate_index(contact_index);
        self.contacts[contact_index as usize]
    }
}
