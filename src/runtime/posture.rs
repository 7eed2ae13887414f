//! Posture nodes and template matching
//!
//! A `PostureNode` is an actor's physical configuration split into three
//! aspects: body, carry and surface. Concrete nodes describe where an actor
//! is; templates (aspects left unconstrained or filled with placeholders)
//! describe where an interaction needs it to be. Nodes are values: they are
//! never mutated in place, only cloned with one aspect replaced.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::actor::Age;
use super::error::{PostureError, PostureResult};
use super::ids::ObjectId;
use super::objects::{ObjectIndex, SlotType};
use super::variables::{SpecValue, VarMap, variables_match};

/// Hand used to carry an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Hand {
    /// Left hand
    Left,
    /// Right hand
    Right,
    /// Both hands (large objects)
    Both,
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hand::Left => "left",
            Hand::Right => "right",
            Hand::Both => "both",
        };
        f.write_str(name)
    }
}

/// Tuning for a body or carry posture
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostureType {
    /// Tuning name; postures compare by every field but are keyed by name
    pub name: String,
    /// The actor can move freely while in this posture
    pub mobile: bool,
    /// The posture involves more than one actor
    pub multi_actor: bool,
    /// Objects can be carried while in this posture
    pub allows_carry: bool,
    /// Ages that may not enter this posture
    #[serde(default)]
    pub disallowed_ages: Vec<Age>,
}

impl PostureType {
    /// A stationary, single-actor posture that allows carrying
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mobile: false,
            multi_actor: false,
            allows_carry: true,
            disallowed_ages: Vec::new(),
        }
    }

    /// Builder: mark mobile
    pub fn mobile(mut self) -> Self {
        self.mobile = true;
        self
    }

    /// Builder: mark multi-actor
    pub fn multi_actor(mut self) -> Self {
        self.multi_actor = true;
        self
    }

    /// Builder: forbid carrying
    pub fn without_carry(mut self) -> Self {
        self.allows_carry = false;
        self
    }

    /// Builder: forbid an age
    pub fn disallow_age(mut self, age: Age) -> Self {
        self.disallowed_ages.push(age);
        self
    }

    /// Default mobile posture
    pub fn stand() -> Self {
        Self::new("stand").mobile()
    }

    /// Carry posture meaning "holding nothing"
    pub fn carry_nothing() -> Self {
        Self::new("carry_nothing").mobile()
    }

    /// Carry posture for a held object
    pub fn carry_object() -> Self {
        Self::new("carry_object").mobile()
    }
}

impl fmt::Display for PostureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Body stance and the object anchoring it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BodyAspect {
    /// Body posture
    pub posture_type: PostureType,
    /// Anchoring object
    pub target: SpecValue<ObjectId>,
}

impl BodyAspect {
    /// Create a body aspect
    pub fn new(posture_type: PostureType, target: impl Into<SpecValue<ObjectId>>) -> Self {
        Self {
            posture_type,
            target: target.into(),
        }
    }

    /// Body aspect with no anchoring object
    pub fn untargeted(posture_type: PostureType) -> Self {
        Self {
            posture_type,
            target: SpecValue::None,
        }
    }
}

/// What is held, and in which hand
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CarryAspect {
    /// Carry posture
    pub posture_type: PostureType,
    /// Held object
    pub target: SpecValue<ObjectId>,
    /// Holding hand
    pub hand: SpecValue<Hand>,
}

impl CarryAspect {
    /// Carrying nothing
    pub fn nothing() -> Self {
        Self {
            posture_type: PostureType::carry_nothing(),
            target: SpecValue::None,
            hand: SpecValue::None,
        }
    }

    /// Carrying `target` in `hand`
    pub fn holding(
        posture_type: PostureType,
        target: impl Into<SpecValue<ObjectId>>,
        hand: impl Into<SpecValue<Hand>>,
    ) -> Self {
        Self {
            posture_type,
            target: target.into(),
            hand: hand.into(),
        }
    }

    /// Whether something (bound or not) is held
    pub fn is_carrying(&self) -> bool {
        !self.target.is_none()
    }
}

/// Surface being addressed and the slot occupied on it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceAspect {
    /// Surface object
    pub target: SpecValue<ObjectId>,
    /// Slot type on the surface
    pub slot_type: SpecValue<SlotType>,
    /// Object in the slot
    pub slot_target: SpecValue<ObjectId>,
}

impl SurfaceAspect {
    /// No surface
    pub fn none() -> Self {
        Self {
            target: SpecValue::None,
            slot_type: SpecValue::None,
            slot_target: SpecValue::None,
        }
    }

    /// Surface without slot membership
    pub fn on(target: impl Into<SpecValue<ObjectId>>) -> Self {
        Self {
            target: target.into(),
            slot_type: SpecValue::None,
            slot_target: SpecValue::None,
        }
    }

    /// Surface with slot membership
    pub fn slot(
        target: impl Into<SpecValue<ObjectId>>,
        slot_type: impl Into<SpecValue<SlotType>>,
        slot_target: impl Into<SpecValue<ObjectId>>,
    ) -> Self {
        Self {
            target: target.into(),
            slot_type: slot_type.into(),
            slot_target: slot_target.into(),
        }
    }

    /// Whether a surface (bound or not) is set
    pub fn is_set(&self) -> bool {
        !self.target.is_none()
    }

    fn check(&self) -> PostureResult<()> {
        if !self.slot_type.is_none() && self.target.is_none() {
            return Err(PostureError::SlotWithoutSurface);
        }
        Ok(())
    }
}

/// An actor's physical configuration, or a template for one
///
/// `None` aspects are unconstrained and only appear in templates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostureNode {
    body: Option<BodyAspect>,
    carry: Option<CarryAspect>,
    surface: Option<SurfaceAspect>,
}

impl PostureNode {
    /// Create a concrete node
    ///
    /// A missing surface means "no surface".
    pub fn new(
        body: BodyAspect,
        carry: CarryAspect,
        surface: Option<SurfaceAspect>,
    ) -> PostureResult<Self> {
        let surface = surface.unwrap_or_else(SurfaceAspect::none);
        surface.check()?;
        Ok(Self {
            body: Some(body),
            carry: Some(carry),
            surface: Some(surface),
        })
    }

    /// Create a template; any aspect may be left unconstrained
    pub fn template(
        body: Option<BodyAspect>,
        carry: Option<CarryAspect>,
        surface: Option<SurfaceAspect>,
    ) -> PostureResult<Self> {
        if let Some(surface) = &surface {
            surface.check()?;
        }
        Ok(Self {
            body,
            carry,
            surface,
        })
    }

    /// Origin node: untargeted body posture, carrying nothing, no surface
    pub fn origin(body_posture: PostureType) -> Self {
        Self {
            body: Some(BodyAspect::untargeted(body_posture)),
            carry: Some(CarryAspect::nothing()),
            surface: Some(SurfaceAspect::none()),
        }
    }

    /// Body aspect
    pub fn body(&self) -> Option<&BodyAspect> {
        self.body.as_ref()
    }

    /// Carry aspect
    pub fn carry(&self) -> Option<&CarryAspect> {
        self.carry.as_ref()
    }

    /// Surface aspect
    pub fn surface(&self) -> Option<&SurfaceAspect> {
        self.surface.as_ref()
    }

    /// Body posture type, if constrained
    pub fn body_posture(&self) -> Option<&PostureType> {
        self.body.as_ref().map(|b| &b.posture_type)
    }

    /// Body target, if concrete
    pub fn body_target(&self) -> Option<ObjectId> {
        self.body.as_ref().and_then(|b| b.target.concrete().copied())
    }

    /// Surface target, if concrete
    pub fn surface_target(&self) -> Option<ObjectId> {
        self.surface.as_ref().and_then(|s| s.target.concrete().copied())
    }

    /// Carried object, if concrete
    pub fn carry_target(&self) -> Option<ObjectId> {
        self.carry.as_ref().and_then(|c| c.target.concrete().copied())
    }

    /// Whether the body posture is mobile
    pub fn is_mobile(&self) -> bool {
        self.body_posture().is_some_and(|p| p.mobile)
    }

    /// Whether anything is held
    pub fn is_carrying(&self) -> bool {
        self.carry.as_ref().is_some_and(CarryAspect::is_carrying)
    }

    /// Whether a surface is set
    pub fn has_surface(&self) -> bool {
        self.surface.as_ref().is_some_and(SurfaceAspect::is_set)
    }

    /// Clone with a new body aspect
    pub fn with_body(&self, body: BodyAspect) -> Self {
        Self {
            body: Some(body),
            ..self.clone()
        }
    }

    /// Clone with a new carry aspect
    pub fn with_carry(&self, carry: CarryAspect) -> Self {
        Self {
            carry: Some(carry),
            ..self.clone()
        }
    }

    /// Clone with a new surface aspect
    pub fn with_surface(&self, surface: SurfaceAspect) -> PostureResult<Self> {
        surface.check()?;
        Ok(Self {
            surface: Some(surface),
            ..self.clone()
        })
    }
}

impl fmt::Display for PostureNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            Some(body) => write!(f, "{}@{}", body.posture_type, body.target)?,
            None => f.write_str("*")?,
        }
        match &self.carry {
            Some(carry) => write!(f, " / {}:{}({})", carry.posture_type, carry.target, carry.hand)?,
            None => f.write_str(" / *")?,
        }
        match &self.surface {
            Some(surface) => write!(
                f,
                " / {}[{}]={}",
                surface.target, surface.slot_type, surface.slot_target
            ),
            None => f.write_str(" / *"),
        }
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Is `node` an acceptable instance of the (possibly wildcarded) `spec`?
///
/// Total and side-effect free.
pub fn node_matches_spec(
    node: &PostureNode,
    spec: &PostureNode,
    var_map: &VarMap,
    allow_owner_to_match_parts: bool,
    objects: &dyn ObjectIndex,
) -> bool {
    let vm = |a: &SpecValue<ObjectId>, b: &SpecValue<ObjectId>| {
        variables_match(a, b, var_map, allow_owner_to_match_parts, objects)
    };

    let Some(node_body) = node.body() else {
        return spec.body.is_none();
    };
    let none_surface = SurfaceAspect::none();
    let node_surface = node.surface().unwrap_or(&none_surface);

    if let Some(spec_body) = spec.body() {
        if node_body.posture_type != spec_body.posture_type {
            return false;
        }
        if !vm(&node_body.target, &spec_body.target) {
            return false;
        }
    }

    let body_wild = spec.body().is_none_or(|b| b.target.is_anything());
    let surface_wild = spec.surface().is_none_or(|s| s.target.is_anything());
    if body_wild && surface_wild {
        if node_body.posture_type.mobile {
            // A mobile actor anchored somewhere keeps that anchor unless a
            // surface pins it.
            if node_body.target.is_concrete() && !node_surface.target.is_concrete() {
                return false;
            }
        } else if node_surface.target.is_concrete() {
            return false;
        }
    }

    if let Some(spec_carry) = spec.carry() {
        let Some(node_carry) = node.carry() else {
            return false;
        };
        if node_carry.posture_type != spec_carry.posture_type {
            return false;
        }
        if !vm(&node_carry.target, &spec_carry.target) {
            return false;
        }
        if !variables_match(&node_carry.hand, &spec_carry.hand, var_map, false, objects) {
            return false;
        }
    }

    if let Some(spec_surface) = spec.surface() {
        if !vm(&node_surface.target, &spec_surface.target) {
            return false;
        }
        if !variables_match(
            &node_surface.slot_type,
            &spec_surface.slot_type,
            var_map,
            false,
            objects,
        ) {
            return false;
        }
        if !vm(&node_surface.slot_target, &spec_surface.slot_target) {
            return false;
        }
    }

    true
}
