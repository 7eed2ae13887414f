//! Runtime orchestrator and public API
//!
//! `Runtime` is the arena that owns actors, world objects, interactions and
//! affordance tuning. Interaction state sets hold ids into it, so every
//! cross-reference is a lookup that can fail gracefully instead of a
//! pointer that can dangle.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

// Submodules
pub mod actor;
pub mod control;
pub mod error;
pub mod geometry;
pub mod ids;
pub mod interaction;
pub mod objects;
pub mod operations;
pub mod posture;
pub mod snapshot;
pub mod state;
pub mod storage;
pub mod variables;

use actor::{Actor, Age};
use error::{InteractionError, InteractionResult, invariant_violation};
use geometry::{Constraint, OpenSpace, SpatialQuery};
use ids::{AffordanceId, GroupId, ObjectId, TaskId, WatcherId};
use interaction::{
    Affordance, ExitOutcome, InteractionArena, InteractionPhase, NewInteraction, Priority, Role,
    SuperInteraction,
};
use objects::{ObjectTable, WorldObject};
use operations::{TransitionPlan, ValidationContext};
use posture::{PostureNode, node_matches_spec};
use state::{ChangeKind, InteractionChange, SetView, TestResult, Watcher};

/// Cost override for one body-posture pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionCost {
    /// Source posture name
    pub from: String,
    /// Destination posture name
    pub to: String,
    /// Cost of the transition
    pub cost: f32,
}

/// Cost tuning for posture operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostureTuning {
    /// Cost of carry and surface operations
    pub standard_cost: f32,

    /// Added to carry and surface operations from a stationary posture
    pub non_mobile_surcharge: f32,

    /// Cost of bookkeeping-only operations
    pub negligible_cost: f32,

    /// Added when a body transition changes mobility
    pub mobility_change_penalty: f32,

    /// Added when moving between stationary postures on the same target
    pub same_target_penalty: f32,

    /// Added when entering a posture shared with another actor
    pub multi_actor_penalty: f32,

    /// Body transition cost when no pair override exists
    pub default_transition_cost: f32,

    /// Per-pair body transition costs
    pub transition_costs: Vec<TransitionCost>,
}

impl Default for PostureTuning {
    fn default() -> Self {
        Self {
            standard_cost: 1.0,
            non_mobile_surcharge: 0.5,
            negligible_cost: 0.01,
            mobility_change_penalty: 1.0,
            same_target_penalty: 2.0,
            multi_actor_penalty: 3.0,
            default_transition_cost: 1.0,
            transition_costs: Vec::new(),
        }
    }
}

impl PostureTuning {
    /// Base cost of a body transition between two posture types
    pub fn transition_cost(&self, from: &str, to: &str) -> f32 {
        self.transition_costs
            .iter()
            .find(|entry| entry.from == from && entry.to == to)
            .map_or(self.default_transition_cost, |entry| entry.cost)
    }
}

/// Configuration for the posture runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Operation cost tuning
    pub tuning: PostureTuning,

    /// Whether owner objects match their parts in posture matching
    pub allow_owner_to_match_parts: bool,

    /// Memoize combined constraints per actor
    pub cache_constraints: bool,

    /// Panic on invariant violations instead of logging and continuing
    pub strict_invariants: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tuning: PostureTuning::default(),
            allow_owner_to_match_parts: true,
            cache_constraints: true,
            strict_invariants: cfg!(debug_assertions),
        }
    }
}

impl RuntimeConfig {
    /// Reject tuning that would make plan costs meaningless
    pub fn validate(&self) -> error::Result<()> {
        let t = &self.tuning;
        let named = [
            ("standard_cost", t.standard_cost),
            ("non_mobile_surcharge", t.non_mobile_surcharge),
            ("negligible_cost", t.negligible_cost),
            ("mobility_change_penalty", t.mobility_change_penalty),
            ("same_target_penalty", t.same_target_penalty),
            ("multi_actor_penalty", t.multi_actor_penalty),
            ("default_transition_cost", t.default_transition_cost),
        ];
        let overrides = t
            .transition_costs
            .iter()
            .map(|entry| ("transition_costs", entry.cost));
        for (name, cost) in named.into_iter().chain(overrides) {
            if !cost.is_finite() || cost < 0.0 {
                return Err(error::RuntimeError::Config(format!(
                    "{name} must be a non-negative number, got {cost}"
                )));
            }
        }
        Ok(())
    }
}

/// Interactions displaced while resolving a candidate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Displaced interactions, in the order their hooks ran
    pub displaced: Vec<TaskId>,
}

/// Result of a removal request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoveOutcome {
    /// Exit ran and the interaction left every set
    Removed,
    /// Another removal is already in flight
    AlreadyRemoving,
    /// The interaction is not tracked anywhere
    NotTracked,
    /// The interaction is running its core action
    StillPerforming,
}

/// Exit sequence of an interaction being removed
///
/// Membership is unchanged until the future resolves and the result is
/// handed to `Runtime::complete_removal`. A pending removal that is dropped
/// instead must be handed back through `Runtime::abort_removal`.
pub struct PendingRemoval {
    task: TaskId,
    exit: BoxFuture<'static, ExitOutcome>,
}

impl PendingRemoval {
    /// Interaction being removed
    pub fn task(&self) -> TaskId {
        self.task
    }
}

impl Future for PendingRemoval {
    type Output = RemovalReady;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let task = this.task;
        this.exit
            .as_mut()
            .poll(cx)
            .map(|outcome| RemovalReady { task, outcome })
    }
}

/// Aborts an in-flight removal if `Runtime::remove` is dropped mid-exit
struct RemovalGuard<'a, C: Constraint> {
    runtime: &'a mut Runtime<C>,
    task: TaskId,
    armed: bool,
}

impl<C: Constraint> Drop for RemovalGuard<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.runtime.abort_removal(self.task);
        }
    }
}

/// A finished exit sequence, ready to be committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalReady {
    /// Interaction being removed
    pub task: TaskId,
    /// How the exit ended
    pub outcome: ExitOutcome,
}

/// The main runtime orchestrator
pub struct Runtime<C: Constraint> {
    config: RuntimeConfig,
    objects: ObjectTable,
    actors: HashMap<ObjectId, Actor<C>>,
    tasks: InteractionArena<C>,
    affordances: HashMap<AffordanceId, Arc<Affordance>>,
    next_task: TaskId,
    spatial: Box<dyn SpatialQuery<C> + Send + Sync>,
}

impl<C: Constraint> Runtime<C> {
    /// Create a runtime in an open world
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_spatial(config, Box::new(OpenSpace::new()))
    }

    /// Create a runtime with a custom spatial collaborator
    pub fn with_spatial(config: RuntimeConfig, spatial: Box<dyn SpatialQuery<C> + Send + Sync>) -> Self {
        Self {
            config,
            objects: ObjectTable::new(),
            actors: HashMap::new(),
            tasks: InteractionArena::new(),
            affordances: HashMap::new(),
            next_task: TaskId(1),
            spatial,
        }
    }

    /// Get the current configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    // ========== World ==========

    /// World objects
    pub fn objects(&self) -> &ObjectTable {
        &self.objects
    }

    /// Add a world object
    pub fn add_object(&mut self, object: WorldObject) -> ObjectId {
        self.objects.insert(object)
    }

    /// Create an actor; the actor is also registered as a world object
    pub fn spawn_actor(&mut self, age: Age, posture: PostureNode) -> ObjectId {
        let id = self.objects.insert(WorldObject::new(ObjectId::new()));
        self.actors
            .insert(id, Actor::new(id, age, posture, self.config.cache_constraints));
        tracing::debug!(actor = %id, ?age, "actor spawned");
        id
    }

    /// Look up an actor
    pub fn actor(&self, id: ObjectId) -> Option<&Actor<C>> {
        self.actors.get(&id)
    }

    /// Actor ids in a stable order
    pub fn actor_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<_> = self.actors.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Register affordance tuning
    pub fn register_affordance(&mut self, affordance: Affordance) -> Arc<Affordance> {
        let affordance = Arc::new(affordance);
        self.affordances
            .insert(affordance.id.clone(), affordance.clone());
        affordance
    }

    /// Look up affordance tuning
    pub fn affordance(&self, id: &AffordanceId) -> Option<Arc<Affordance>> {
        self.affordances.get(id).cloned()
    }

    // ========== Interactions ==========

    /// Queue a new interaction; it is not admitted until `add`
    pub fn create_interaction(&mut self, request: NewInteraction<C>) -> InteractionResult<TaskId> {
        if !self.actors.contains_key(&request.actor) {
            return Err(InteractionError::UnknownActor(request.actor));
        }
        let id = self.next_task;
        self.next_task = id.next();
        self.tasks.insert(id, SuperInteraction::from_request(id, request));
        Ok(id)
    }

    /// Look up an interaction
    pub fn interaction(&self, id: TaskId) -> Option<&SuperInteraction<C>> {
        self.tasks.get(&id)
    }

    fn task(&self, id: TaskId) -> InteractionResult<&SuperInteraction<C>> {
        self.tasks.get(&id).ok_or(InteractionError::UnknownTask(id))
    }

    fn actor_entry(&self, id: ObjectId) -> InteractionResult<&Actor<C>> {
        self.actors.get(&id).ok_or(InteractionError::UnknownActor(id))
    }

    fn view<'a>(&'a self, actor: &'a Actor<C>) -> SetView<'a, C> {
        SetView {
            interactions: &self.tasks,
            objects: &self.objects,
            posture: &actor.posture_state,
            posture_source: actor.posture_source,
        }
    }

    /// Sets a task belongs in: the actor's, then the target's when the
    /// target is another actor
    fn participants(&self, task: &SuperInteraction<C>) -> InteractionResult<Vec<(ObjectId, Role)>> {
        if !self.actors.contains_key(&task.actor) {
            return Err(InteractionError::UnknownActor(task.actor));
        }
        let mut participants = vec![(task.actor, Role::Actor)];
        if let Some(target) = task.target {
            if target != task.actor && self.actors.contains_key(&target) {
                participants.push((target, Role::TargetSim));
            }
        }
        Ok(participants)
    }

    fn role_in(task: &SuperInteraction<C>, actor: ObjectId) -> Role {
        if task.actor == actor {
            Role::Actor
        } else {
            Role::TargetSim
        }
    }

    // ========== Queries ==========

    /// Can `task` join `actor`'s set at the given priority and group?
    pub fn is_compatible(
        &self,
        actor: ObjectId,
        task: TaskId,
        priority: Option<Priority>,
        group_id: Option<GroupId>,
    ) -> InteractionResult<TestResult> {
        let candidate = self.task(task)?;
        let actor = self.actor_entry(actor)?;
        let role = Self::role_in(candidate, actor.id);
        Ok(actor
            .si_state
            .is_compatible(candidate, priority, group_id, role, &self.view(actor)))
    }

    /// Combined constraint of `actor`'s set
    pub fn get_combined_constraint(
        &self,
        actor: ObjectId,
        priority: Option<Priority>,
        group_id: Option<GroupId>,
        existing_task: Option<TaskId>,
        include_inertial: bool,
    ) -> InteractionResult<(C, Vec<TaskId>)> {
        let actor = self.actor_entry(actor)?;
        Ok(actor.si_state.get_combined_constraint(
            priority,
            group_id,
            existing_task,
            include_inertial,
            &self.view(actor),
        ))
    }

    /// Interactions of `actor` that would have to go to admit `task`
    pub fn get_incompatible(&self, actor: ObjectId, task: TaskId) -> InteractionResult<Vec<TaskId>> {
        let candidate = self.task(task)?;
        let actor = self.actor_entry(actor)?;
        let role = Self::role_in(candidate, actor.id);
        Ok(actor
            .si_state
            .get_incompatible(candidate, role, &self.view(actor)))
    }

    /// Does `actor`'s posture satisfy `spec` under `var_map`?
    pub fn posture_matches(
        &self,
        actor: ObjectId,
        spec: &PostureNode,
        var_map: &variables::VarMap,
    ) -> InteractionResult<bool> {
        let actor = self.actor_entry(actor)?;
        Ok(node_matches_spec(
            &actor.posture_state,
            spec,
            var_map,
            self.config.allow_owner_to_match_parts,
            &self.objects,
        ))
    }

    // ========== Admission ==========

    /// Test compatibility (unless `must_add`) and displace whatever the
    /// candidate's constraints evict
    ///
    /// Displacement hooks run synchronously; their effects are applied by the
    /// time this returns. A refusing hook fails the resolution, but earlier
    /// displacements stand.
    pub fn resolve(&mut self, task: TaskId, must_add: bool) -> InteractionResult<ResolveReport> {
        let candidate = self.task(task)?;
        let participants = self.participants(candidate)?;

        if !must_add {
            for (actor_id, role) in &participants {
                let actor = self.actor_entry(*actor_id)?;
                let result = actor.si_state.is_compatible(
                    candidate,
                    candidate.priority,
                    Some(candidate.group_id),
                    *role,
                    &self.view(actor),
                );
                if let TestResult::Incompatible { reason, blocking } = result {
                    tracing::debug!(%task, actor = %actor_id, ?reason, ?blocking, "candidate refused");
                    return Err(InteractionError::IncompatibleTask { task, blocking });
                }
            }
        }

        let mut victims = Vec::new();
        for (actor_id, role) in &participants {
            let actor = self.actor_entry(*actor_id)?;
            for victim in actor
                .si_state
                .displacement_targets(candidate, *role, &self.view(actor))
            {
                if !victims.contains(&victim) {
                    victims.push(victim);
                }
            }
        }

        let mut report = ResolveReport::default();
        for victim in victims {
            if self.displace(victim, task)? {
                report.displaced.push(victim);
            }
        }
        Ok(report)
    }

    /// Resolve and admit `task` into every set it belongs in
    pub fn add(&mut self, task: TaskId) -> InteractionResult<ResolveReport> {
        self.admit(task, false)
    }

    /// Admit `task` without the compatibility test; displacement still runs
    pub fn force_add(&mut self, task: TaskId) -> InteractionResult<ResolveReport> {
        self.admit(task, true)
    }

    fn admit(&mut self, task: TaskId, must_add: bool) -> InteractionResult<ResolveReport> {
        let participants = self.participants(self.task(task)?)?;
        for (actor_id, _) in &participants {
            if self.actor_entry(*actor_id)?.si_state.contains(task) {
                return Err(InteractionError::AlreadyTracked(task));
            }
        }

        let report = self.resolve(task, must_add)?;

        let strict = self.config.strict_invariants;
        let mut inserted: Vec<ObjectId> = Vec::new();
        for (actor_id, role) in &participants {
            let result = match self.actors.get_mut(actor_id) {
                Some(actor) => actor.si_state.insert(task, *role, strict),
                None => Err(InteractionError::UnknownActor(*actor_id)),
            };
            if let Err(err) = result {
                for rollback in &inserted {
                    if let Some(actor) = self.actors.get_mut(rollback) {
                        actor.si_state.discard(task);
                    }
                }
                return Err(err);
            }
            inserted.push(*actor_id);
        }

        if let Some(admitted) = self.tasks.get_mut(&task) {
            admitted.phase = InteractionPhase::Staging;
        }

        for (actor_id, role) in &participants {
            if let Some(actor) = self.actors.get(actor_id) {
                actor.si_state.notify(InteractionChange {
                    actor: *actor_id,
                    task,
                    role: *role,
                    kind: ChangeKind::Added,
                });
            }
        }

        // Queued work of these actors was planned against the old state.
        for queued in self.tasks.values_mut() {
            if queued.id != task
                && queued.phase == InteractionPhase::Queued
                && participants.iter().any(|(actor, _)| *actor == queued.actor)
            {
                queued.transition = None;
            }
        }

        tracing::debug!(%task, displaced = ?report.displaced, "interaction admitted");
        Ok(report)
    }

    /// Evict `victim` on behalf of `by`; returns whether it was evicted
    fn displace(&mut self, victim: TaskId, by: TaskId) -> InteractionResult<bool> {
        let Some(task) = self.tasks.get(&victim) else {
            return Ok(false);
        };
        if task.is_finishing() {
            return Ok(false);
        }
        let hooks = task.hooks.clone();
        if !hooks.on_displaced(victim, by) {
            tracing::debug!(%victim, %by, "displacement refused");
            return Err(InteractionError::DisplacementFailed {
                task: by,
                refused_by: victim,
            });
        }
        tracing::debug!(%victim, %by, "interaction displaced");
        self.detach(victim, ChangeKind::Displaced);
        self.tasks.remove(&victim);
        Ok(true)
    }

    /// Drop `task` from every set, actor side first
    fn detach(&mut self, task: TaskId, kind: ChangeKind) {
        let Some(interaction) = self.tasks.get_mut(&task) else {
            return;
        };
        interaction.phase = InteractionPhase::Finishing;
        interaction.transition = None;

        let mut owners = vec![interaction.actor];
        if let Some(target) = interaction.target {
            if target != interaction.actor {
                owners.push(target);
            }
        }

        for owner in owners {
            let Some(actor) = self.actors.get_mut(&owner) else {
                continue;
            };
            if actor.posture_source == Some(task) {
                actor.posture_source = None;
                actor.si_state.invalidate_cache();
            }
            if let Some(role) = actor.si_state.discard(task) {
                actor.si_state.notify(InteractionChange {
                    actor: owner,
                    task,
                    role,
                    kind,
                });
            }
        }
    }

    // ========== Removal ==========

    /// Start removing `task`: mark it removing and hand back its exit sequence
    ///
    /// Membership is committed only by `complete_removal`.
    pub fn begin_removal(&mut self, task: TaskId) -> Result<PendingRemoval, RemoveOutcome> {
        let Some(interaction) = self.tasks.get(&task) else {
            return Err(RemoveOutcome::NotTracked);
        };
        let owners: Vec<ObjectId> = self
            .actors
            .values()
            .filter(|actor| actor.si_state.contains(task))
            .map(|actor| actor.id)
            .collect();
        if owners.is_empty() {
            return Err(RemoveOutcome::NotTracked);
        }
        if interaction.phase == InteractionPhase::Performing {
            return Err(RemoveOutcome::StillPerforming);
        }
        if owners
            .iter()
            .any(|owner| self.actors.get(owner).is_some_and(|a| a.si_state.is_removing(task)))
        {
            return Err(RemoveOutcome::AlreadyRemoving);
        }

        let exit = interaction.hooks.exit(task);
        for owner in owners {
            if let Some(actor) = self.actors.get_mut(&owner) {
                actor.si_state.mark_removing(task);
                actor.si_state.invalidate_cache();
            }
        }
        tracing::debug!(%task, "removal started");
        Ok(PendingRemoval { task, exit })
    }

    /// Commit a finished exit: discard from every set and notify watchers
    pub fn complete_removal(&mut self, ready: RemovalReady) -> RemoveOutcome {
        if !self.tasks.contains_key(&ready.task) {
            return RemoveOutcome::NotTracked;
        }
        self.detach(ready.task, ChangeKind::Removed);
        self.tasks.remove(&ready.task);
        tracing::debug!(task = %ready.task, outcome = ?ready.outcome, "removal committed");
        RemoveOutcome::Removed
    }

    /// Give up on an in-flight removal whose exit will never be committed
    ///
    /// The task constrains its sets again and can be removed later. Returns
    /// false if no removal of `task` was in flight.
    pub fn abort_removal(&mut self, task: TaskId) -> bool {
        let mut aborted = false;
        for actor in self.actors.values_mut() {
            if actor.si_state.unmark_removing(task) {
                actor.si_state.invalidate_cache();
                aborted = true;
            }
        }
        if aborted {
            tracing::debug!(%task, "removal aborted");
        }
        aborted
    }

    /// Remove `task`, suspending while its exit sequence runs
    ///
    /// Removing a task that is performing, already removing or not tracked
    /// is a no-op reported through the outcome. Dropping the returned future
    /// before it finishes aborts the removal.
    pub async fn remove(&mut self, task: TaskId) -> RemoveOutcome {
        let pending = match self.begin_removal(task) {
            Ok(pending) => pending,
            Err(outcome) => return outcome,
        };
        let mut guard = RemovalGuard {
            runtime: self,
            task,
            armed: true,
        };
        let ready = pending.await;
        guard.armed = false;
        guard.runtime.complete_removal(ready)
    }

    // ========== Lifecycle ==========

    /// Move an admitted interaction into its core action
    pub fn begin_core_action(&mut self, task: TaskId) -> InteractionResult<()> {
        let interaction = self
            .tasks
            .get_mut(&task)
            .ok_or(InteractionError::UnknownTask(task))?;
        interaction.phase = InteractionPhase::Performing;
        let actor = interaction.actor;
        self.invalidate_caches_of(task, actor);
        Ok(())
    }

    /// Finish the core action; the interaction can now be removed
    pub fn end_core_action(&mut self, task: TaskId) -> InteractionResult<()> {
        let interaction = self
            .tasks
            .get_mut(&task)
            .ok_or(InteractionError::UnknownTask(task))?;
        interaction.phase = InteractionPhase::Finishing;
        let actor = interaction.actor;
        self.invalidate_caches_of(task, actor);
        Ok(())
    }

    fn invalidate_caches_of(&self, task: TaskId, actor: ObjectId) {
        for owner in self.actors.values() {
            if owner.id == actor || owner.si_state.contains(task) {
                owner.si_state.invalidate_cache();
            }
        }
    }

    // ========== Posture ==========

    /// Overwrite an actor's posture
    pub fn set_posture(
        &mut self,
        actor: ObjectId,
        posture: PostureNode,
        source: Option<TaskId>,
    ) -> InteractionResult<()> {
        let actor = self
            .actors
            .get_mut(&actor)
            .ok_or(InteractionError::UnknownActor(actor))?;
        actor.posture_state = posture;
        actor.posture_source = source;
        actor.si_state.invalidate_cache();
        Ok(())
    }

    /// Attach a planned transition to a task
    pub fn set_transition(&mut self, task: TaskId, plan: TransitionPlan) -> InteractionResult<()> {
        let interaction = self
            .tasks
            .get_mut(&task)
            .ok_or(InteractionError::UnknownTask(task))?;
        interaction.transition = Some(plan);
        Ok(())
    }

    /// Validate the task's transition and commit its destination as the
    /// actor's posture, with the task as posture source
    pub fn commit_transition(&mut self, task: TaskId) -> InteractionResult<()> {
        let interaction = self.task(task)?;
        let plan = interaction
            .transition
            .as_ref()
            .ok_or(InteractionError::NoTransition(task))?;
        let actor = self.actor_entry(interaction.actor)?;
        if *plan.source() != actor.posture_state {
            return Err(InteractionError::StaleTransition(task));
        }

        let ctx = ValidationContext {
            actor: actor.id,
            age: actor.age,
            var_map: &interaction.bindings,
            objects: &self.objects,
            spatial: &*self.spatial,
        };
        if !plan.validate(&ctx) {
            return Err(InteractionError::InvalidTransition(task));
        }

        let destination = plan.destination().clone();
        if let Some(spec) = &interaction.posture_spec {
            let matches = node_matches_spec(
                &destination,
                spec,
                &interaction.bindings,
                self.config.allow_owner_to_match_parts,
                &self.objects,
            );
            if !matches {
                return Err(InteractionError::InvalidTransition(task));
            }
        }

        let hypothetical = SetView {
            interactions: &self.tasks,
            objects: &self.objects,
            posture: &destination,
            posture_source: Some(task),
        };
        // Cache keys do not cover posture or posture source, so entries from
        // the held posture must not answer for the destination and vice versa.
        actor.si_state.invalidate_cache();
        let result = actor.si_state.is_compatible(
            interaction,
            interaction.priority,
            Some(interaction.group_id),
            Self::role_in(interaction, actor.id),
            &hypothetical,
        );
        actor.si_state.invalidate_cache();
        if let TestResult::Incompatible { blocking, .. } = result {
            return Err(InteractionError::IncompatibleTask { task, blocking });
        }

        let actor_id = actor.id;
        self.set_posture(actor_id, destination, Some(task))?;
        if let Some(interaction) = self.tasks.get_mut(&task) {
            interaction.transition = None;
        }
        tracing::debug!(%task, actor = %actor_id, "transition committed");
        Ok(())
    }

    // ========== Reset ==========

    /// Force-clear an actor's set without running exit sequences
    ///
    /// Interactions the actor was running are dropped; those it was only the
    /// target of stay with their own actor.
    pub fn reset_actor(&mut self, actor: ObjectId) -> InteractionResult<Vec<TaskId>> {
        let strict = self.config.strict_invariants;
        let tracked = self.actor_entry(actor)?.si_state.tasks();
        for task in &tracked {
            let owned = self.tasks.get(task).is_some_and(|t| t.actor == actor);
            if owned {
                self.detach(*task, ChangeKind::Removed);
                self.tasks.remove(task);
            } else if let Some(state) = self.actors.get_mut(&actor) {
                if let Some(role) = state.si_state.discard(*task) {
                    state.si_state.notify(InteractionChange {
                        actor,
                        task: *task,
                        role,
                        kind: ChangeKind::Removed,
                    });
                }
            }
        }

        let state = self
            .actors
            .get_mut(&actor)
            .ok_or(InteractionError::UnknownActor(actor))?;
        if !state.si_state.is_empty() {
            let leftover = state.si_state.clear();
            return Err(invariant_violation(
                strict,
                format!("reset of {actor} left {} entries behind", leftover.len()),
            ));
        }
        state.posture_source = None;
        tracing::debug!(%actor, cleared = tracked.len(), "actor reset");
        Ok(tracked)
    }

    // ========== Watchers ==========

    /// Register a change watcher on an actor's set
    pub fn watch(&mut self, actor: ObjectId, watcher: Watcher) -> InteractionResult<WatcherId> {
        let actor = self
            .actors
            .get_mut(&actor)
            .ok_or(InteractionError::UnknownActor(actor))?;
        Ok(actor.si_state.watch(watcher))
    }

    /// Unregister a watcher; returns whether it was registered
    pub fn unwatch(&mut self, actor: ObjectId, watcher: WatcherId) -> bool {
        self.actors
            .get_mut(&actor)
            .is_some_and(|actor| actor.si_state.unwatch(watcher))
    }
}

// Re-export commonly used types
pub use control::Control;
pub use geometry::Area;
pub use state::InteractionStateSet;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::objects::ObjectIndex;
    use crate::runtime::posture::PostureType;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert!(config.cache_constraints);
        assert!(config.allow_owner_to_match_parts);
        assert_eq!(config.tuning.standard_cost, 1.0);
    }

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config: RuntimeConfig = serde_json::from_str(r#"{"cache_constraints": false}"#).unwrap();
        assert!(!config.cache_constraints);
        assert_eq!(config.tuning, PostureTuning::default());
    }

    #[test]
    fn test_negative_tuning_is_rejected() {
        assert!(RuntimeConfig::default().validate().is_ok());

        let mut config = RuntimeConfig::default();
        config.tuning.transition_costs.push(TransitionCost {
            from: "stand".into(),
            to: "sit".into(),
            cost: -1.0,
        });
        assert!(matches!(config.validate(), Err(error::RuntimeError::Config(_))));
    }

    #[test]
    fn test_transition_cost_override() {
        let mut tuning = PostureTuning::default();
        tuning.transition_costs.push(TransitionCost {
            from: "stand".into(),
            to: "sit".into(),
            cost: 4.0,
        });
        assert_eq!(tuning.transition_cost("stand", "sit"), 4.0);
        assert_eq!(tuning.transition_cost("sit", "stand"), tuning.default_transition_cost);
    }

    #[test]
    fn test_create_interaction_needs_actor() {
        let mut runtime: Runtime<Area> = Runtime::new(RuntimeConfig::default());
        let affordance = runtime.register_affordance(Affordance::new("wave"));
        let stranger = ObjectId::new();

        let err = runtime
            .create_interaction(NewInteraction::new(stranger, affordance.clone()))
            .unwrap_err();
        assert_eq!(err, InteractionError::UnknownActor(stranger));

        let actor = runtime.spawn_actor(Age::Adult, PostureNode::origin(PostureType::stand()));
        let task = runtime
            .create_interaction(NewInteraction::new(actor, affordance))
            .unwrap();
        assert_eq!(runtime.interaction(task).unwrap().phase, InteractionPhase::Queued);
        assert!(runtime.objects().contains(actor));
    }
}
