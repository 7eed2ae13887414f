//! Super interactions, affordances and the priority displacement rule
//!
//! Interactions live in the runtime's arena (the task queue); interaction
//! state sets only hold their ids. Behaviour that belongs to the concrete
//! gameplay interaction (what happens when it is displaced, how it tears
//! down) is reached through `InteractionHooks`.

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use super::geometry::Constraint;
use super::ids::{AffordanceId, GroupId, ObjectId, TaskId};
use super::operations::TransitionPlan;
use super::posture::PostureNode;
use super::variables::VarMap;

/// Interaction priority; larger wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Priority(pub i32);

impl Priority {
    /// Autonomous, idle-level work
    pub const LOW: Priority = Priority(0);
    /// Player-directed work
    pub const HIGH: Priority = Priority(5);
    /// Must not be interrupted by ordinary work
    pub const CRITICAL: Priority = Priority(10);
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Can an interaction at `new` displace one at `existing`?
///
/// Strictly higher priority displaces; equal priority displaces only when
/// clobbering is allowed. No priority never displaces anything, and an
/// existing interaction without a priority is displaced by any priority.
pub fn can_priority_displace(
    new: Option<Priority>,
    existing: Option<Priority>,
    allow_clobber: bool,
) -> bool {
    let Some(new) = new else {
        return false;
    };
    match existing {
        None => true,
        Some(existing) if allow_clobber => new >= existing,
        Some(existing) => new > existing,
    }
}

/// Role under which an interaction is tracked in a state set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The set's owner is running the interaction
    Actor,
    /// The set's owner is the interaction's target
    TargetSim,
}

/// Where an interaction came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractionSource {
    /// Picked by autonomy
    Autonomy,
    /// Queued by the player
    Player,
    /// Pushed by a script or another system
    Script,
    /// Pushed by a social partner
    Social,
}

/// Lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractionPhase {
    /// Created, not admitted
    Queued,
    /// Admitted, preparing (routing, transitioning)
    Staging,
    /// Running its core action
    Performing,
    /// Exiting or cancelled
    Finishing,
}

/// Affordance tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affordance {
    /// Tuning key
    pub id: AffordanceId,
    /// Several interactions may share the same target
    #[serde(default)]
    pub allow_target_share: bool,
    /// Mutually exclusive affordances
    #[serde(default)]
    pub linked: BTreeSet<AffordanceId>,
}

impl Affordance {
    /// Create an affordance
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: AffordanceId::new(id),
            allow_target_share: false,
            linked: BTreeSet::new(),
        }
    }

    /// Builder: allow target sharing
    pub fn shareable(mut self) -> Self {
        self.allow_target_share = true;
        self
    }

    /// Builder: declare a link
    pub fn linked_to(mut self, other: impl Into<String>) -> Self {
        self.linked.insert(AffordanceId::new(other));
        self
    }

    /// Whether either side declares the other as linked
    pub fn is_linked_to(&self, other: &Affordance) -> bool {
        self.linked.contains(&other.id) || other.linked.contains(&self.id)
    }
}

/// How an exit sequence ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitOutcome {
    /// Exit ran to completion
    Completed,
    /// Exit was cut short
    Interrupted,
}

/// Gameplay-side callbacks of an interaction
pub trait InteractionHooks: Send + Sync {
    /// Called when `by` displaces `task`; return `false` to refuse
    fn on_displaced(&self, _task: TaskId, _by: TaskId) -> bool {
        true
    }

    /// Exit sequence; may suspend until teardown animations finish
    fn exit(&self, _task: TaskId) -> BoxFuture<'static, ExitOutcome> {
        futures::future::ready(ExitOutcome::Completed).boxed()
    }
}

/// Hooks that accept displacement and exit immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl InteractionHooks for NoHooks {}

/// Request to create an interaction
pub struct NewInteraction<C: Constraint> {
    /// Acting actor
    pub actor: ObjectId,
    /// Affordance tuning
    pub affordance: Arc<Affordance>,
    /// Target object (possibly another actor)
    pub target: Option<ObjectId>,
    /// Priority
    pub priority: Option<Priority>,
    /// Group; defaults to a fresh group
    pub group_id: Option<GroupId>,
    /// Source
    pub source: InteractionSource,
    /// Promoted to the protected tier
    pub guaranteed: bool,
    /// Zero-footprint interaction
    pub immediate: bool,
    /// Carried-object conflicts may be holstered away
    pub can_holster: bool,
    /// Depends on the actor's current posture
    pub uses_posture: bool,
    /// May displace equal priority
    pub allow_clobber: bool,
    /// Constraint on the actor
    pub constraint: C,
    /// Constraint on the target actor
    pub target_constraint: Option<C>,
    /// Posture the interaction needs
    pub posture_spec: Option<PostureNode>,
    /// Bindings for `posture_spec`
    pub bindings: VarMap,
    /// Gameplay callbacks
    pub hooks: Arc<dyn InteractionHooks>,
}

impl<C: Constraint> NewInteraction<C> {
    /// Unconstrained, non-guaranteed interaction
    pub fn new(actor: ObjectId, affordance: Arc<Affordance>) -> Self {
        Self {
            actor,
            affordance,
            target: None,
            priority: Some(Priority::LOW),
            group_id: None,
            source: InteractionSource::Autonomy,
            guaranteed: false,
            immediate: false,
            can_holster: false,
            uses_posture: false,
            allow_clobber: false,
            constraint: C::unconstrained(),
            target_constraint: None,
            posture_spec: None,
            bindings: VarMap::new(),
            hooks: Arc::new(NoHooks),
        }
    }

    /// Builder: target
    pub fn target(mut self, target: ObjectId) -> Self {
        self.target = Some(target);
        self
    }

    /// Builder: priority
    pub fn priority(mut self, priority: impl Into<Option<Priority>>) -> Self {
        self.priority = priority.into();
        self
    }

    /// Builder: group
    pub fn group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    /// Builder: source
    pub fn source(mut self, source: InteractionSource) -> Self {
        self.source = source;
        self
    }

    /// Builder: guaranteed
    pub fn guaranteed(mut self) -> Self {
        self.guaranteed = true;
        self
    }

    /// Builder: immediate
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    /// Builder: holster carried objects on conflict
    pub fn holster(mut self) -> Self {
        self.can_holster = true;
        self
    }

    /// Builder: depends on posture
    pub fn uses_posture(mut self) -> Self {
        self.uses_posture = true;
        self
    }

    /// Builder: clobber equal priority
    pub fn clobber(mut self) -> Self {
        self.allow_clobber = true;
        self
    }

    /// Builder: actor constraint
    pub fn constraint(mut self, constraint: C) -> Self {
        self.constraint = constraint;
        self
    }

    /// Builder: target constraint
    pub fn target_constraint(mut self, constraint: C) -> Self {
        self.target_constraint = Some(constraint);
        self
    }

    /// Builder: required posture
    pub fn posture_spec(mut self, spec: PostureNode, bindings: VarMap) -> Self {
        self.posture_spec = Some(spec);
        self.bindings = bindings;
        self
    }

    /// Builder: hooks
    pub fn hooks(mut self, hooks: Arc<dyn InteractionHooks>) -> Self {
        self.hooks = hooks;
        self
    }
}

/// An admitted or queued interaction
pub struct SuperInteraction<C: Constraint> {
    /// Id (also creation order)
    pub id: TaskId,
    /// Acting actor
    pub actor: ObjectId,
    /// Affordance tuning
    pub affordance: Arc<Affordance>,
    /// Target object
    pub target: Option<ObjectId>,
    /// Priority
    pub priority: Option<Priority>,
    /// Group
    pub group_id: GroupId,
    /// Source
    pub source: InteractionSource,
    /// Promoted to the protected tier
    pub guaranteed: bool,
    /// Zero-footprint interaction
    pub immediate: bool,
    /// Carried-object conflicts may be holstered away
    pub can_holster: bool,
    /// Depends on the actor's current posture
    pub uses_posture: bool,
    /// May displace equal priority
    pub allow_clobber: bool,
    /// Constraint on the actor
    pub constraint: C,
    /// Constraint on the target actor
    pub target_constraint: Option<C>,
    /// Posture the interaction needs
    pub posture_spec: Option<PostureNode>,
    /// Bindings for `posture_spec`
    pub bindings: VarMap,
    /// Lifecycle phase
    pub phase: InteractionPhase,
    /// In-flight transition toward `posture_spec`
    pub transition: Option<TransitionPlan>,
    /// Gameplay callbacks
    pub hooks: Arc<dyn InteractionHooks>,
}

impl<C: Constraint> SuperInteraction<C> {
    pub(crate) fn from_request(id: TaskId, request: NewInteraction<C>) -> Self {
        Self {
            id,
            actor: request.actor,
            affordance: request.affordance,
            target: request.target,
            priority: request.priority,
            group_id: request.group_id.unwrap_or(GroupId(id.0)),
            source: request.source,
            guaranteed: request.guaranteed,
            immediate: request.immediate,
            can_holster: request.can_holster,
            uses_posture: request.uses_posture,
            allow_clobber: request.allow_clobber,
            constraint: request.constraint,
            target_constraint: request.target_constraint,
            posture_spec: request.posture_spec,
            bindings: request.bindings,
            phase: InteractionPhase::Queued,
            transition: None,
            hooks: request.hooks,
        }
    }

    /// Protected tier
    pub fn is_guaranteed(&self) -> bool {
        self.guaranteed
    }

    /// Exiting or cancelled
    pub fn is_finishing(&self) -> bool {
        self.phase == InteractionPhase::Finishing
    }

    /// Admitted and still preparing
    pub fn is_staging(&self) -> bool {
        self.phase == InteractionPhase::Staging
    }

    /// Constraint contributed under `role`
    pub fn constraint_for(&self, role: Role) -> C {
        match role {
            Role::Actor => self.constraint.clone(),
            Role::TargetSim => self
                .target_constraint
                .clone()
                .unwrap_or_else(C::unconstrained),
        }
    }
}

impl<C: Constraint> fmt::Debug for SuperInteraction<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuperInteraction")
            .field("id", &self.id)
            .field("actor", &self.actor)
            .field("affordance", &self.affordance.id)
            .field("target", &self.target)
            .field("priority", &self.priority)
            .field("group_id", &self.group_id)
            .field("guaranteed", &self.guaranteed)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

/// Arena of interactions keyed by id
pub type InteractionArena<C> = HashMap<TaskId, SuperInteraction<C>>;
