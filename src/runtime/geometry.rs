//! Constraint algebra and spatial queries
//!
//! Geometry is an external collaborator: the runtime only intersects
//! constraints and asks whether the result is valid or tentative. `Area` is
//! a small grid-based implementation used by tests and the CLI.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::ids::ObjectId;
use super::objects::SlotType;
use super::posture::PostureNode;

/// Stable key identifying a constraint in memo tables
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstraintKey(pub [u8; 32]);

impl fmt::Debug for ConstraintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConstraintKey(")?;
        for byte in &self.0[..6] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// Opaque geometric region an actor must satisfy
///
/// Implementations must keep intersection associative, make any
/// intersection with an invalid constraint invalid, and never turn an
/// invalid constraint valid through intersection.
pub trait Constraint: Clone + fmt::Debug {
    /// The constraint satisfied everywhere
    fn unconstrained() -> Self;

    /// The constraint satisfied nowhere
    fn impossible() -> Self;

    /// Intersect two constraints
    fn intersect(&self, other: &Self) -> Self;

    /// Whether the region is non-empty
    fn valid(&self) -> bool;

    /// Whether the region is not final yet
    fn tentative(&self) -> bool;

    /// Re-anchor the constraint on the actor's current posture
    fn apply_posture_state(&self, _posture: &PostureNode) -> Self {
        self.clone()
    }

    /// The constraint with carried-object requirements relaxed
    fn holstered(&self) -> Self {
        self.clone()
    }

    /// Memo key
    fn cache_key(&self) -> ConstraintKey;
}

/// Inclusive rectangle in tile coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    /// Minimum x
    pub min_x: i32,
    /// Minimum y
    pub min_y: i32,
    /// Maximum x
    pub max_x: i32,
    /// Maximum y
    pub max_y: i32,
}

impl Rect {
    /// Create a rectangle
    pub fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Overlap of two rectangles
    pub fn overlap(&self, other: &Rect) -> Option<Rect> {
        let rect = Rect {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        };
        (rect.min_x <= rect.max_x && rect.min_y <= rect.max_y).then_some(rect)
    }
}

/// Spatial extent of an `Area`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bounds {
    /// No spatial restriction
    Anywhere,
    /// Empty region
    Nowhere,
    /// A rectangle of tiles
    Rect(Rect),
}

/// What the actor's hands must be doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarryRequirement {
    /// No requirement
    Any,
    /// Hands must be free
    FreeHands,
    /// A specific object must be held
    Holding(ObjectId),
    /// Requirements that cannot be met together
    Conflict,
}

impl CarryRequirement {
    fn meet(self, other: CarryRequirement) -> CarryRequirement {
        use CarryRequirement::*;
        match (self, other) {
            (Any, x) | (x, Any) => x,
            (FreeHands, FreeHands) => FreeHands,
            (Holding(a), Holding(b)) if a == b => Holding(a),
            _ => Conflict,
        }
    }
}

/// Grid constraint: where the actor may stand and what it must hold
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Area {
    /// Spatial extent
    pub bounds: Bounds,
    /// Hand requirement
    pub carry: CarryRequirement,
    /// Not final yet
    #[serde(default)]
    pub tentative: bool,
}

impl Area {
    /// Rectangle with no hand requirement
    pub fn rect(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self {
            bounds: Bounds::Rect(Rect::new(min_x, min_y, max_x, max_y)),
            carry: CarryRequirement::Any,
            tentative: false,
        }
    }

    /// Builder: hand requirement
    pub fn with_carry(mut self, carry: CarryRequirement) -> Self {
        self.carry = carry;
        self
    }

    /// Builder: mark tentative
    pub fn provisional(mut self) -> Self {
        self.tentative = true;
        self
    }
}

impl Constraint for Area {
    fn unconstrained() -> Self {
        Self {
            bounds: Bounds::Anywhere,
            carry: CarryRequirement::Any,
            tentative: false,
        }
    }

    fn impossible() -> Self {
        Self {
            bounds: Bounds::Nowhere,
            carry: CarryRequirement::Any,
            tentative: false,
        }
    }

    fn intersect(&self, other: &Self) -> Self {
        let bounds = match (self.bounds, other.bounds) {
            (Bounds::Nowhere, _) | (_, Bounds::Nowhere) => Bounds::Nowhere,
            (Bounds::Anywhere, b) | (b, Bounds::Anywhere) => b,
            (Bounds::Rect(a), Bounds::Rect(b)) => a.overlap(&b).map_or(Bounds::Nowhere, Bounds::Rect),
        };
        Self {
            bounds,
            carry: self.carry.meet(other.carry),
            tentative: self.tentative || other.tentative,
        }
    }

    fn valid(&self) -> bool {
        self.bounds != Bounds::Nowhere && self.carry != CarryRequirement::Conflict
    }

    fn tentative(&self) -> bool {
        self.tentative
    }

    fn holstered(&self) -> Self {
        Self {
            carry: CarryRequirement::Any,
            ..self.clone()
        }
    }

    fn cache_key(&self) -> ConstraintKey {
        let mut hasher = blake3::Hasher::new();
        match self.bounds {
            Bounds::Anywhere => {
                hasher.update(b"anywhere");
            }
            Bounds::Nowhere => {
                hasher.update(b"nowhere");
            }
            Bounds::Rect(rect) => {
                hasher.update(b"rect");
                for v in [rect.min_x, rect.min_y, rect.max_x, rect.max_y] {
                    hasher.update(&v.to_le_bytes());
                }
            }
        }
        match self.carry {
            CarryRequirement::Any => {
                hasher.update(b"any");
            }
            CarryRequirement::FreeHands => {
                hasher.update(b"free");
            }
            CarryRequirement::Holding(id) => {
                hasher.update(b"holding");
                hasher.update(id.0.as_bytes());
            }
            CarryRequirement::Conflict => {
                hasher.update(b"conflict");
            }
        }
        hasher.update(&[self.tentative as u8]);
        ConstraintKey(*hasher.finalize().as_bytes())
    }
}

/// Spatial probes used while validating posture operations
pub trait SpatialQuery<C: Constraint> {
    /// Whether a line-of-sight probe from an offset point to `target` is blocked
    fn clearance_blocked(&self, actor: ObjectId, target: ObjectId) -> bool;

    /// Constraint for reaching `target` from the given posture
    fn reach_constraint(&self, posture: &PostureNode, target: ObjectId) -> C;

    /// Constraint for placing an object in a slot
    fn slot_constraint(&self, surface: ObjectId, slot_type: &SlotType) -> C;
}

/// Open world: nothing blocks unless explicitly registered
#[derive(Debug, Clone, Default)]
pub struct OpenSpace {
    blocked: HashSet<ObjectId>,
    unreachable: HashSet<ObjectId>,
    full_slots: HashSet<(ObjectId, SlotType)>,
}

impl OpenSpace {
    /// Create an open space
    pub fn new() -> Self {
        Self::default()
    }

    /// Block the clearance probe toward `target`
    pub fn block_clearance(mut self, target: ObjectId) -> Self {
        self.blocked.insert(target);
        self
    }

    /// Make `target` unreachable from stationary postures
    pub fn unreachable(mut self, target: ObjectId) -> Self {
        self.unreachable.insert(target);
        self
    }

    /// Mark a slot as unable to take another object
    pub fn fill_slot(mut self, surface: ObjectId, slot_type: SlotType) -> Self {
        self.full_slots.insert((surface, slot_type));
        self
    }
}

impl<C: Constraint> SpatialQuery<C> for OpenSpace {
    fn clearance_blocked(&self, _actor: ObjectId, target: ObjectId) -> bool {
        self.blocked.contains(&target)
    }

    fn reach_constraint(&self, _posture: &PostureNode, target: ObjectId) -> C {
        if self.unreachable.contains(&target) {
            C::impossible()
        } else {
            C::unconstrained()
        }
    }

    fn slot_constraint(&self, surface: ObjectId, slot_type: &SlotType) -> C {
        if self.full_slots.contains(&(surface, slot_type.clone())) {
            C::impossible()
        } else {
            C::unconstrained()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disjoint_rects_are_invalid() {
        let a = Area::rect(0, 0, 2, 2);
        let b = Area::rect(5, 5, 6, 6);
        assert!(!a.intersect(&b).valid());
        assert!(a.intersect(&Area::rect(1, 1, 4, 4)).valid());
    }

    #[test]
    fn test_invalid_absorbs() {
        let x = Area::rect(0, 0, 2, 2);
        let nowhere = Area::impossible();
        assert_eq!(x.intersect(&nowhere).valid(), false);
        assert_eq!(nowhere.intersect(&Area::unconstrained()).valid(), false);
    }

    #[test]
    fn test_intersection_is_associative() {
        let a = Area::rect(0, 0, 5, 5).with_carry(CarryRequirement::FreeHands);
        let b = Area::rect(2, 2, 8, 8);
        let c = Area::rect(3, 0, 4, 9).provisional();

        assert_eq!(a.intersect(&b).intersect(&c), a.intersect(&b.intersect(&c)));
    }

    #[test]
    fn test_carry_conflict_and_holster() {
        let cup = ObjectId::new();
        let holding = Area::unconstrained().with_carry(CarryRequirement::Holding(cup));
        let free = Area::unconstrained().with_carry(CarryRequirement::FreeHands);

        assert!(!holding.intersect(&free).valid());
        assert!(holding.holstered().intersect(&free).valid());
    }

    #[test]
    fn test_cache_key_is_stable() {
        let a = Area::rect(0, 0, 2, 2);
        assert_eq!(a.cache_key(), a.clone().cache_key());
        assert_ne!(a.cache_key(), Area::rect(0, 0, 2, 3).cache_key());
    }

    #[test]
    fn test_open_space_slots() {
        let counter = ObjectId::new();
        let slot = SlotType::new("slot_small");
        let space = OpenSpace::new().fill_slot(counter, slot.clone());

        let full: Area = space.slot_constraint(counter, &slot);
        let open: Area = space.slot_constraint(ObjectId::new(), &slot);
        assert!(!full.valid());
        assert!(open.valid());
    }
}
