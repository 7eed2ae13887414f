//! World objects as seen by posture matching and validation
//!
//! The runtime only needs a thin slice of the world: parenting, slot
//! placement, part ownership and a few capability flags.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ids::ObjectId;

/// Named attachment point type on a surface
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotType(pub String);

impl SlotType {
    /// Create a slot type
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// A world object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldObject {
    /// Object id
    pub id: ObjectId,
    /// Object this one is parented to (a surface, a carrier)
    pub parent: Option<ObjectId>,
    /// Slot type this object occupies on its parent
    pub slot: Option<SlotType>,
    /// Owner when this object is a part (a seat of a sofa)
    pub part_owner: Option<ObjectId>,
    /// Whether an actor can pick this object up
    pub carryable: bool,
    /// Whether entering a posture on this object needs a clearance probe
    pub requires_clearance: bool,
}

impl WorldObject {
    /// A free-standing, non-carryable object
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            parent: None,
            slot: None,
            part_owner: None,
            carryable: false,
            requires_clearance: false,
        }
    }

    /// Mark as carryable
    pub fn carryable(mut self) -> Self {
        self.carryable = true;
        self
    }

    /// Make this object a part of `owner`
    pub fn part_of(mut self, owner: ObjectId) -> Self {
        self.part_owner = Some(owner);
        self
    }

    /// Place this object in a slot on `parent`
    pub fn in_slot(mut self, parent: ObjectId, slot: SlotType) -> Self {
        self.parent = Some(parent);
        self.slot = Some(slot);
        self
    }

    /// Require a clearance probe before entering postures on this object
    pub fn requiring_clearance(mut self) -> Self {
        self.requires_clearance = true;
        self
    }
}

/// Read-only object lookups used by matching and validation
pub trait ObjectIndex {
    /// Look up an object
    fn object(&self, id: ObjectId) -> Option<&WorldObject>;

    /// Whether the object exists
    fn contains(&self, id: ObjectId) -> bool {
        self.object(id).is_some()
    }

    /// Parent of an object
    fn parent(&self, id: ObjectId) -> Option<ObjectId> {
        self.object(id).and_then(|o| o.parent)
    }

    /// Owner of an object if it is a part
    fn part_owner(&self, id: ObjectId) -> Option<ObjectId> {
        self.object(id).and_then(|o| o.part_owner)
    }

    /// Whether `part` is a part of `owner`
    fn is_part_of(&self, part: ObjectId, owner: ObjectId) -> bool {
        self.part_owner(part) == Some(owner)
    }

    /// Whether two targets are the same object or one is a part of the other
    fn overlaps(&self, a: ObjectId, b: ObjectId) -> bool {
        a == b || self.is_part_of(a, b) || self.is_part_of(b, a)
    }
}

/// Object arena
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectTable {
    objects: HashMap<ObjectId, WorldObject>,
}

impl ObjectTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object
    pub fn insert(&mut self, object: WorldObject) -> ObjectId {
        let id = object.id;
        self.objects.insert(id, object);
        id
    }

    /// Remove an object
    pub fn remove(&mut self, id: ObjectId) -> Option<WorldObject> {
        self.objects.remove(&id)
    }

    /// Mutable access to an object
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut WorldObject> {
        self.objects.get_mut(&id)
    }

    /// Number of objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectIndex for ObjectTable {
    fn object(&self, id: ObjectId) -> Option<&WorldObject> {
        self.objects.get(&id)
    }
}
