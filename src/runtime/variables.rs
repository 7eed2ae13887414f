//! Placeholder tokens and variable-aware matching
//!
//! Templates stand in for objects, slots and hands that are not known yet.
//! A token matches a concrete value only through an explicit binding map,
//! except `Anything`, which matches everything.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::ids::ObjectId;
use super::objects::{ObjectIndex, SlotType};
use super::posture::Hand;

/// Closed set of placeholder tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PostureSpecVariable {
    /// Matches any value, bound or not
    Anything,
    /// The target of the requesting interaction
    InteractionTarget,
    /// The object anchoring the body posture
    BodyTarget,
    /// The object to carry
    CarryTarget,
    /// The surface being addressed
    SurfaceTarget,
    /// The object occupying (or to occupy) a slot
    SlotTarget,
    /// The slot type on the surface
    Slot,
    /// The hand holding the carried object
    Hand,
}

impl fmt::Display for PostureSpecVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Anything => "ANYTHING",
            Self::InteractionTarget => "INTERACTION_TARGET",
            Self::BodyTarget => "BODY_TARGET",
            Self::CarryTarget => "CARRY_TARGET",
            Self::SurfaceTarget => "SURFACE_TARGET",
            Self::SlotTarget => "SLOT_TARGET",
            Self::Slot => "SLOT",
            Self::Hand => "HAND",
        };
        f.write_str(name)
    }
}

/// A concrete value a variable can be bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Binding {
    /// An object (target, surface, slot occupant)
    Object(ObjectId),
    /// A slot type
    Slot(SlotType),
    /// A hand
    Hand(Hand),
}

/// Variable binding map
pub type VarMap = HashMap<PostureSpecVariable, Binding>;

/// Values that can appear in a template position
pub trait Bindable: Clone + PartialEq {
    /// Extract a value of this type from a binding
    fn from_binding(binding: &Binding) -> Option<Self>;

    /// Owner/part equivalence; only objects have parts
    fn owner_matches(_a: &Self, _b: &Self, _objects: &dyn ObjectIndex) -> bool {
        false
    }
}

impl Bindable for ObjectId {
    fn from_binding(binding: &Binding) -> Option<Self> {
        match binding {
            Binding::Object(id) => Some(*id),
            _ => None,
        }
    }

    fn owner_matches(a: &Self, b: &Self, objects: &dyn ObjectIndex) -> bool {
        objects.is_part_of(*a, *b) || objects.is_part_of(*b, *a)
    }
}

impl Bindable for SlotType {
    fn from_binding(binding: &Binding) -> Option<Self> {
        match binding {
            Binding::Slot(slot) => Some(slot.clone()),
            _ => None,
        }
    }
}

impl Bindable for Hand {
    fn from_binding(binding: &Binding) -> Option<Self> {
        match binding {
            Binding::Hand(hand) => Some(*hand),
            _ => None,
        }
    }
}

/// A template position: concrete, placeholder, or explicitly empty
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecValue<T> {
    /// Explicitly nothing
    None,
    /// A placeholder token
    Var(PostureSpecVariable),
    /// A concrete value
    Is(T),
}

impl<T> Default for SpecValue<T> {
    fn default() -> Self {
        Self::None
    }
}

impl<T> From<T> for SpecValue<T> {
    fn from(value: T) -> Self {
        Self::Is(value)
    }
}

impl<T> SpecValue<T> {
    /// The `Anything` wildcard
    pub const fn anything() -> Self {
        Self::Var(PostureSpecVariable::Anything)
    }

    /// Whether this is the `Anything` wildcard
    pub fn is_anything(&self) -> bool {
        matches!(self, Self::Var(PostureSpecVariable::Anything))
    }

    /// Whether this is explicitly empty
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Whether this is a concrete value
    pub fn is_concrete(&self) -> bool {
        matches!(self, Self::Is(_))
    }

    /// Concrete value, if any
    pub fn concrete(&self) -> Option<&T> {
        match self {
            Self::Is(value) => Some(value),
            _ => None,
        }
    }

    /// Placeholder token, if any
    pub fn variable(&self) -> Option<PostureSpecVariable> {
        match self {
            Self::Var(var) => Some(*var),
            _ => None,
        }
    }
}

impl<T: Bindable> SpecValue<T> {
    /// Substitute a bound variable; unbound variables stay as they are
    pub fn resolve(&self, var_map: &VarMap) -> SpecValue<T> {
        match self {
            Self::Var(var) => var_map
                .get(var)
                .and_then(T::from_binding)
                .map(SpecValue::Is)
                .unwrap_or(Self::Var(*var)),
            other => other.clone(),
        }
    }
}

impl<T: fmt::Display> fmt::Display for SpecValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Var(var) => write!(f, "{var}"),
            Self::Is(value) => write!(f, "{value}"),
        }
    }
}

/// Variable-aware equality between two template positions
///
/// Total and side-effect free. Identical values match, `Anything` matches
/// everything, a placeholder matches a concrete value only once the binding
/// map resolves it, and an owner matches its parts (in either direction)
/// when `allow_owner_to_match_parts` is set.
pub fn variables_match<T: Bindable>(
    a: &SpecValue<T>,
    b: &SpecValue<T>,
    var_map: &VarMap,
    allow_owner_to_match_parts: bool,
    objects: &dyn ObjectIndex,
) -> bool {
    if a == b || a.is_anything() || b.is_anything() {
        return true;
    }

    match (a.resolve(var_map), b.resolve(var_map)) {
        (SpecValue::Is(x), SpecValue::Is(y)) => {
            x == y || (allow_owner_to_match_parts && T::owner_matches(&x, &y, objects))
        }
        (SpecValue::Var(x), SpecValue::Var(y)) => x == y,
        (SpecValue::None, SpecValue::None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::objects::{ObjectTable, WorldObject};

    #[test]
    fn test_anything_matches_everything() {
        let objects = ObjectTable::new();
        let id = ObjectId::new();
        let map = VarMap::new();

        assert!(variables_match(&SpecValue::anything(), &SpecValue::Is(id), &map, true, &objects));
        assert!(variables_match(&SpecValue::<ObjectId>::None, &SpecValue::anything(), &map, true, &objects));
    }

    #[test]
    fn test_unbound_variable_does_not_match_concrete() {
        let objects = ObjectTable::new();
        let id = ObjectId::new();
        let var = SpecValue::Var(PostureSpecVariable::CarryTarget);

        assert!(!variables_match(&var, &SpecValue::Is(id), &VarMap::new(), true, &objects));

        let mut map = VarMap::new();
        map.insert(PostureSpecVariable::CarryTarget, Binding::Object(id));
        assert!(variables_match(&var, &SpecValue::Is(id), &map, true, &objects));
    }

    #[test]
    fn test_binding_of_wrong_kind_is_ignored() {
        let objects = ObjectTable::new();
        let mut map = VarMap::new();
        map.insert(PostureSpecVariable::Slot, Binding::Object(ObjectId::new()));

        let slot = SpecValue::Var(PostureSpecVariable::Slot);
        assert_eq!(slot.resolve(&map), slot);
        assert!(!variables_match(&slot, &SpecValue::Is(SlotType::new("deco")), &map, true, &objects));
    }

    #[test]
    fn test_owner_matches_parts_only_when_allowed() {
        let mut objects = ObjectTable::new();
        let sofa = objects.insert(WorldObject::new(ObjectId::new()));
        let seat = objects.insert(WorldObject::new(ObjectId::new()).part_of(sofa));
        let map = VarMap::new();

        assert!(variables_match(&SpecValue::Is(sofa), &SpecValue::Is(seat), &map, true, &objects));
        assert!(!variables_match(&SpecValue::Is(sofa), &SpecValue::Is(seat), &map, false, &objects));
    }

    #[test]
    fn test_none_matches_only_none_or_anything() {
        let objects = ObjectTable::new();
        let map = VarMap::new();
        assert!(variables_match(&SpecValue::<ObjectId>::None, &SpecValue::None, &map, true, &objects));
        assert!(!variables_match(&SpecValue::None, &SpecValue::Is(ObjectId::new()), &map, true, &objects));
    }
}
