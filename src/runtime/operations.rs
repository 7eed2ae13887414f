//! Posture transition edges
//!
//! A planner walks a graph whose nodes are `PostureNode`s and whose edges are
//! `PostureOperation`s. Each operation has three faces:
//! - `apply`: pure node transformer; `None` means "does not apply here"
//! - `cost`: pure function of the source node, so edges can be ordered
//!   before paying for validation
//! - `validate`: context-dependent feasibility (ages, clearance, slots),
//!   only run once a planner has picked an edge

use serde::{Deserialize, Serialize};
use std::fmt;

use super::PostureTuning;
use super::actor::Age;
use super::geometry::{Constraint, SpatialQuery};
use super::ids::ObjectId;
use super::objects::{ObjectIndex, SlotType};
use super::posture::{BodyAspect, CarryAspect, PostureNode, PostureType, SurfaceAspect};
use super::variables::{PostureSpecVariable, SpecValue, VarMap};

/// One edge in the posture graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PostureOperation {
    /// Change body posture
    BodyTransition {
        /// Destination posture
        posture_type: PostureType,
        /// Destination anchor
        target: SpecValue<ObjectId>,
    },
    /// Pick an object up
    PickUpObject {
        /// Carry posture to enter
        posture_type: PostureType,
        /// Object to pick up
        target: SpecValue<ObjectId>,
    },
    /// Put the held object down anywhere
    PutDownObject {
        /// Carry posture being left
        posture_type: PostureType,
    },
    /// Put the held object into a slot
    PutDownObjectOnSurface {
        /// Carry posture being left
        posture_type: PostureType,
        /// Destination surface
        surface: SpecValue<ObjectId>,
        /// Destination slot type
        slot_type: SpecValue<SlotType>,
        /// Object being placed
        slot_target: SpecValue<ObjectId>,
    },
    /// Adopt a surface whose slot already holds the target
    TargetAlreadyInSlot {
        /// Object already in the slot
        slot_target: SpecValue<ObjectId>,
        /// Surface holding it
        surface: SpecValue<ObjectId>,
        /// Slot type it occupies
        slot_type: SpecValue<SlotType>,
    },
    /// Stop addressing the current surface
    ForgetSurface,
}

/// Live context needed by `validate`
pub struct ValidationContext<'a, C: Constraint> {
    /// Acting actor
    pub actor: ObjectId,
    /// Actor's age
    pub age: Age,
    /// Variable bindings for the plan being validated
    pub var_map: &'a VarMap,
    /// World objects
    pub objects: &'a dyn ObjectIndex,
    /// Spatial probes
    pub spatial: &'a dyn SpatialQuery<C>,
}

impl PostureOperation {
    /// Body transition edge
    pub fn body_transition(posture_type: PostureType, target: impl Into<SpecValue<ObjectId>>) -> Self {
        Self::BodyTransition {
            posture_type,
            target: target.into(),
        }
    }

    /// Pick-up edge
    pub fn pick_up(posture_type: PostureType, target: impl Into<SpecValue<ObjectId>>) -> Self {
        Self::PickUpObject {
            posture_type,
            target: target.into(),
        }
    }

    /// Put-down edge
    pub fn put_down(posture_type: PostureType) -> Self {
        Self::PutDownObject { posture_type }
    }

    /// Apply to a node
    pub fn apply(&self, node: &PostureNode) -> Option<PostureNode> {
        match self {
            Self::BodyTransition {
                posture_type,
                target,
            } => apply_body_transition(node, posture_type, target),

            Self::PickUpObject {
                posture_type,
                target,
            } => {
                if node.is_carrying() || !node.body_posture()?.allows_carry {
                    return None;
                }
                let surface = node
                    .surface()
                    .map(|s| SurfaceAspect::on(s.target.clone()))
                    .unwrap_or_else(SurfaceAspect::none);
                let carry = CarryAspect::holding(
                    posture_type.clone(),
                    target.clone(),
                    SpecValue::Var(PostureSpecVariable::Hand),
                );
                node.with_carry(carry).with_surface(surface).ok()
            }

            Self::PutDownObject { posture_type } => match node.carry() {
                Some(carry) if carry.is_carrying() => {
                    if carry.posture_type != *posture_type {
                        return None;
                    }
                    Some(node.with_carry(CarryAspect::nothing()))
                }
                _ => Some(node.clone()),
            },

            Self::PutDownObjectOnSurface {
                posture_type,
                surface,
                slot_type,
                slot_target,
            } => {
                let carry = node.carry().filter(|c| c.is_carrying())?;
                if carry.posture_type != *posture_type {
                    return None;
                }
                if let Some(current) = node.surface() {
                    if current.target.is_concrete() && surface.is_concrete() && current.target != *surface {
                        return None;
                    }
                    if current.slot_target.is_concrete() {
                        return None;
                    }
                }
                if !node.is_mobile() && surface.is_concrete() && !node.has_surface() {
                    let anchor = node.body().map(|b| &b.target);
                    if anchor != Some(surface) {
                        return None;
                    }
                }
                let placed = if slot_target.is_none() {
                    carry.target.clone()
                } else {
                    slot_target.clone()
                };
                node.with_carry(CarryAspect::nothing())
                    .with_surface(SurfaceAspect::slot(surface.clone(), slot_type.clone(), placed))
                    .ok()
            }

            Self::TargetAlreadyInSlot {
                slot_target,
                surface,
                slot_type,
            } => {
                if node.is_carrying() || node.has_surface() {
                    return None;
                }
                node.with_surface(SurfaceAspect::slot(
                    surface.clone(),
                    slot_type.clone(),
                    slot_target.clone(),
                ))
                .ok()
            }

            Self::ForgetSurface => {
                if node.has_surface() {
                    node.with_surface(SurfaceAspect::none()).ok()
                } else {
                    Some(node.clone())
                }
            }
        }
    }

    /// Nominal cost of taking this edge from `node`
    pub fn cost(&self, node: &PostureNode, tuning: &PostureTuning) -> f32 {
        let surcharge = if node.is_mobile() {
            0.0
        } else {
            tuning.non_mobile_surcharge
        };

        match self {
            Self::BodyTransition {
                posture_type,
                target,
            } => {
                let Some(source) = node.body() else {
                    return tuning.default_transition_cost;
                };
                let mut cost = tuning.transition_cost(&source.posture_type.name, &posture_type.name);
                if source.posture_type.mobile != posture_type.mobile {
                    cost += tuning.mobility_change_penalty;
                }
                if !source.posture_type.mobile && !posture_type.mobile && source.target == *target {
                    cost += tuning.same_target_penalty;
                }
                if posture_type.multi_actor {
                    cost += tuning.multi_actor_penalty;
                }
                cost
            }
            Self::PickUpObject { .. }
            | Self::PutDownObject { .. }
            | Self::PutDownObjectOnSurface { .. } => tuning.standard_cost + surcharge,
            Self::TargetAlreadyInSlot { .. } | Self::ForgetSurface => tuning.negligible_cost,
        }
    }

    /// Check feasibility against the live world
    pub fn validate<C: Constraint>(&self, node: &PostureNode, ctx: &ValidationContext<'_, C>) -> bool {
        match self {
            Self::BodyTransition {
                posture_type,
                target,
            } => {
                if posture_type.disallowed_ages.contains(&ctx.age) {
                    return false;
                }
                match target.resolve(ctx.var_map) {
                    SpecValue::Is(target) => match ctx.objects.object(target) {
                        Some(object) if object.requires_clearance => {
                            !ctx.spatial.clearance_blocked(ctx.actor, target)
                        }
                        Some(_) => true,
                        None => false,
                    },
                    _ => true,
                }
            }

            Self::PickUpObject { target, .. } => {
                let SpecValue::Is(target) = target.resolve(ctx.var_map) else {
                    return false;
                };
                let Some(object) = ctx.objects.object(target) else {
                    return false;
                };
                if !object.carryable {
                    return false;
                }
                if node.is_mobile() {
                    return true;
                }
                let Some(parent) = object.parent else {
                    return false;
                };
                let body_target = node.body_target();
                let anchored = node.surface_target() == Some(parent)
                    || body_target == Some(parent)
                    || body_target.and_then(|b| ctx.objects.parent(b)) == Some(parent);
                anchored && ctx.spatial.reach_constraint(node, target).valid()
            }

            Self::PutDownObjectOnSurface {
                surface, slot_type, ..
            } => {
                let (SpecValue::Is(surface), SpecValue::Is(slot_type)) =
                    (surface.resolve(ctx.var_map), slot_type.resolve(ctx.var_map))
                else {
                    return false;
                };
                ctx.spatial.slot_constraint(surface, &slot_type).valid()
            }

            Self::TargetAlreadyInSlot {
                slot_target,
                surface,
                slot_type,
            } => {
                let SpecValue::Is(occupant) = slot_target.resolve(ctx.var_map) else {
                    return true;
                };
                let Some(object) = ctx.objects.object(occupant) else {
                    return false;
                };
                let parent_ok = match surface.resolve(ctx.var_map) {
                    SpecValue::Is(surface) => object.parent == Some(surface),
                    _ => object.parent.is_some(),
                };
                let slot_ok = match slot_type.resolve(ctx.var_map) {
                    SpecValue::Is(slot_type) => object.slot.as_ref() == Some(&slot_type),
                    _ => object.slot.is_some(),
                };
                parent_ok && slot_ok
            }

            Self::PutDownObject { .. } | Self::ForgetSurface => true,
        }
    }
}

fn apply_body_transition(
    node: &PostureNode,
    posture_type: &PostureType,
    target: &SpecValue<ObjectId>,
) -> Option<PostureNode> {
    let source = node.body()?;
    if source.posture_type == *posture_type && source.target == *target {
        return None;
    }
    if node.is_carrying() && !posture_type.allows_carry {
        return None;
    }
    // Stationary to stationary only on the same anchor; anything else goes
    // through a mobile posture first.
    if !source.posture_type.mobile && !posture_type.mobile && source.target != *target {
        return None;
    }

    let surface = if !posture_type.mobile && source.target == *target {
        node.surface().cloned().unwrap_or_else(SurfaceAspect::none)
    } else {
        SurfaceAspect::none()
    };

    node.with_body(BodyAspect::new(posture_type.clone(), target.clone()))
        .with_surface(surface)
        .ok()
}

impl fmt::Display for PostureOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BodyTransition {
                posture_type,
                target,
            } => write!(f, "BodyTransition({posture_type}, {target})"),
            Self::PickUpObject {
                posture_type,
                target,
            } => write!(f, "PickUpObject({posture_type}, {target})"),
            Self::PutDownObject { posture_type } => write!(f, "PutDownObject({posture_type})"),
            Self::PutDownObjectOnSurface {
                surface, slot_type, ..
            } => write!(f, "PutDownObjectOnSurface({surface}, {slot_type})"),
            Self::TargetAlreadyInSlot {
                slot_target,
                surface,
                ..
            } => write!(f, "TargetAlreadyInSlot({slot_target} on {surface})"),
            Self::ForgetSurface => f.write_str("ForgetSurface"),
        }
    }
}

/// A sequence of operations with the nodes it passes through
///
/// Plans are only built by applying operations, so every node is the
/// image of its predecessor under the operation between them.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    source: PostureNode,
    steps: Vec<(PostureOperation, PostureNode)>,
    cost: f32,
}

impl TransitionPlan {
    /// Apply `operations` in order starting from `start`
    ///
    /// Returns `None` if any operation does not apply to the node it meets.
    pub fn from_operations(
        start: &PostureNode,
        operations: Vec<PostureOperation>,
        tuning: &PostureTuning,
    ) -> Option<Self> {
        let mut steps: Vec<(PostureOperation, PostureNode)> = Vec::with_capacity(operations.len());
        let mut cost = 0.0;
        for operation in operations {
            let current = steps.last().map_or(start, |(_, node)| node);
            cost += operation.cost(current, tuning);
            let next = operation.apply(current)?;
            steps.push((operation, next));
        }
        Some(Self {
            source: start.clone(),
            steps,
            cost,
        })
    }

    /// Source node
    pub fn source(&self) -> &PostureNode {
        &self.source
    }

    /// Final node
    pub fn destination(&self) -> &PostureNode {
        self.steps.last().map_or(&self.source, |(_, node)| node)
    }

    /// Operations in order
    pub fn operations(&self) -> impl Iterator<Item = &PostureOperation> {
        self.steps.iter().map(|(operation, _)| operation)
    }

    /// Every node visited, starting with the source
    pub fn nodes(&self) -> impl Iterator<Item = &PostureNode> {
        std::iter::once(&self.source).chain(self.steps.iter().map(|(_, node)| node))
    }

    /// Number of operations
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// No operations: the destination is the source
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Summed nominal cost
    pub fn cost(&self) -> f32 {
        self.cost
    }

    /// Validate every step against its own source node
    pub fn validate<C: Constraint>(&self, ctx: &ValidationContext<'_, C>) -> bool {
        self.operations()
            .zip(self.nodes())
            .all(|(operation, node)| operation.validate(node, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::posture::Hand;

    fn sit() -> PostureType {
        PostureType::new("sit")
    }

    #[test]
    fn test_pick_up_while_carrying_is_inapplicable() {
        let cup = ObjectId::new();
        let node = PostureNode::origin(PostureType::stand())
            .with_carry(CarryAspect::holding(PostureType::carry_object(), cup, Hand::Left));
        let op = PostureOperation::pick_up(PostureType::carry_object(), ObjectId::new());
        assert_eq!(op.apply(&node), None);
    }

    #[test]
    fn test_put_down_nothing_is_identity() {
        let node = PostureNode::origin(PostureType::stand());
        let op = PostureOperation::put_down(PostureType::carry_object());
        assert_eq!(op.apply(&node), Some(node));
    }

    #[test]
    fn test_stationary_to_stationary_needs_same_anchor() {
        let chair = ObjectId::new();
        let bed = ObjectId::new();
        let seated = PostureNode::origin(PostureType::stand()).with_body(BodyAspect::new(sit(), chair));

        let lie_on_bed = PostureOperation::body_transition(PostureType::new("lie"), bed);
        assert_eq!(lie_on_bed.apply(&seated), None);

        let slouch = PostureOperation::body_transition(PostureType::new("slouch"), chair);
        assert!(slouch.apply(&seated).is_some());
    }

    #[test]
    fn test_standing_up_clears_surface() {
        let chair = ObjectId::new();
        let table = ObjectId::new();
        let seated = PostureNode::origin(PostureType::stand())
            .with_body(BodyAspect::new(sit(), chair))
            .with_surface(SurfaceAspect::on(table))
            .unwrap();

        let stand = PostureOperation::body_transition(PostureType::stand(), SpecValue::None);
        let standing = stand.apply(&seated).unwrap();
        assert!(standing.is_mobile());
        assert!(!standing.has_surface());
    }

    #[test]
    fn test_transition_cost_components() {
        let tuning = PostureTuning::default();
        let origin = PostureNode::origin(PostureType::stand());
        let chair = ObjectId::new();

        let sit_down = PostureOperation::body_transition(sit(), chair);
        assert_eq!(
            sit_down.cost(&origin, &tuning),
            tuning.default_transition_cost + tuning.mobility_change_penalty
        );

        let cuddle = PostureOperation::body_transition(PostureType::new("cuddle").multi_actor(), chair);
        let seated = origin.with_body(BodyAspect::new(sit(), chair));
        assert_eq!(
            cuddle.cost(&seated, &tuning),
            tuning.default_transition_cost + tuning.same_target_penalty + tuning.multi_actor_penalty
        );
    }

    #[test]
    fn test_forget_surface() {
        let counter = ObjectId::new();
        let at_counter = PostureNode::origin(PostureType::stand())
            .with_surface(SurfaceAspect::on(counter))
            .unwrap();

        let forgotten = PostureOperation::ForgetSurface.apply(&at_counter).unwrap();
        assert!(!forgotten.has_surface());
        assert_eq!(PostureOperation::ForgetSurface.apply(&forgotten), Some(forgotten.clone()));
    }

    #[test]
    fn test_plan_accumulates_cost() {
        let tuning = PostureTuning::default();
        let cup = ObjectId::new();
        let origin = PostureNode::origin(PostureType::stand());
        let plan = TransitionPlan::from_operations(
            &origin,
            vec![
                PostureOperation::pick_up(PostureType::carry_object(), cup),
                PostureOperation::put_down(PostureType::carry_object()),
            ],
            &tuning,
        )
        .unwrap();

        assert_eq!(plan.nodes().count(), 3);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.cost(), 2.0 * tuning.standard_cost);
        assert_eq!(plan.destination(), &origin);
    }
}
