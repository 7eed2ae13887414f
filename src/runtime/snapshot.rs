//! Actor snapshots: saving and re-admitting interactions
//!
//! Only what is needed to rebuild an interaction is persisted: affordance
//! id, target, priority, source and the guaranteed flag. On load every
//! entry goes back through the normal `add` path, so an entry whose world
//! moved on (missing affordance, missing target, now incompatible) is
//! dropped and logged instead of failing the whole load.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::Runtime;
use super::error::{InteractionError, InteractionResult, ReconstructionError};
use super::geometry::Constraint;
use super::ids::{AffordanceId, ObjectId, TaskId};
use super::interaction::{Affordance, InteractionSource, NewInteraction, Priority, Role};
use super::objects::ObjectIndex;
use super::posture::PostureNode;

/// Persisted form of one interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedInteraction {
    /// Affordance tuning key
    pub affordance: AffordanceId,

    /// Target object
    #[serde(default)]
    pub target: Option<ObjectId>,

    /// Priority
    #[serde(default)]
    pub priority: Option<Priority>,

    /// Source
    pub source: InteractionSource,

    /// Promoted to the protected tier
    #[serde(default)]
    pub guaranteed: bool,

    /// Supplied the actor's posture when saved
    #[serde(default)]
    pub posture_source: bool,
}

impl SavedInteraction {
    /// Request carrying the persisted fields; geometry comes from `C`'s defaults
    pub fn to_request<C: Constraint>(
        &self,
        actor: ObjectId,
        affordance: Arc<Affordance>,
    ) -> NewInteraction<C> {
        let mut request = NewInteraction::new(actor, affordance)
            .priority(self.priority)
            .source(self.source);
        if let Some(target) = self.target {
            request = request.target(target);
        }
        if self.guaranteed {
            request = request.guaranteed();
        }
        request
    }
}

/// Snapshot metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// When the snapshot was taken
    pub saved_at: chrono::DateTime<chrono::Utc>,

    /// Snapshot layout version
    pub version: String,
}

/// Everything needed to restore one actor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorSnapshot {
    /// Actor the snapshot belongs to
    pub actor: ObjectId,

    /// Posture at save time
    pub posture: PostureNode,

    /// Interactions the actor was running, posture source first
    pub interactions: Vec<SavedInteraction>,

    /// Metadata
    pub metadata: SnapshotMetadata,
}

/// Rebuilds live interactions from their persisted form
pub trait InteractionFactory<C: Constraint> {
    /// Build the request for `saved`, or `None` to decline
    fn rebuild(
        &self,
        actor: ObjectId,
        affordance: Arc<Affordance>,
        saved: &SavedInteraction,
    ) -> Option<NewInteraction<C>>;
}

impl<C, F> InteractionFactory<C> for F
where
    C: Constraint,
    F: Fn(ObjectId, Arc<Affordance>, &SavedInteraction) -> Option<NewInteraction<C>>,
{
    fn rebuild(
        &self,
        actor: ObjectId,
        affordance: Arc<Affordance>,
        saved: &SavedInteraction,
    ) -> Option<NewInteraction<C>> {
        self(actor, affordance, saved)
    }
}

/// Factory that restores only the persisted fields
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainFactory;

impl<C: Constraint> InteractionFactory<C> for PlainFactory {
    fn rebuild(
        &self,
        actor: ObjectId,
        affordance: Arc<Affordance>,
        saved: &SavedInteraction,
    ) -> Option<NewInteraction<C>> {
        Some(saved.to_request(actor, affordance))
    }
}

/// Outcome of loading a snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Re-admitted interactions, in snapshot order
    pub restored: Vec<TaskId>,

    /// Entries that could not be re-admitted
    pub dropped: Vec<(AffordanceId, ReconstructionError)>,
}

impl<C: Constraint> Runtime<C> {
    /// Capture the interactions `actor` is running
    ///
    /// Interactions the actor is only the target of are saved by their own
    /// actor. Finishing and removing entries are skipped.
    pub fn save_actor(&self, actor: ObjectId) -> InteractionResult<ActorSnapshot> {
        let state = self
            .actors
            .get(&actor)
            .ok_or(InteractionError::UnknownActor(actor))?;

        let mut order = state.si_state.tasks();
        if let Some(source) = state.posture_source {
            if let Some(pos) = order.iter().position(|id| *id == source) {
                let source = order.remove(pos);
                order.insert(0, source);
            }
        }

        let interactions = order
            .into_iter()
            .filter(|id| state.si_state.role_of(*id) == Some(Role::Actor))
            .filter(|id| !state.si_state.is_removing(*id))
            .filter_map(|id| self.tasks.get(&id))
            .filter(|task| !task.is_finishing())
            .map(|task| SavedInteraction {
                affordance: task.affordance.id.clone(),
                target: task.target,
                priority: task.priority,
                source: task.source,
                guaranteed: task.guaranteed,
                posture_source: state.posture_source == Some(task.id),
            })
            .collect();

        Ok(ActorSnapshot {
            actor,
            posture: state.posture_state.clone(),
            interactions,
            metadata: SnapshotMetadata {
                saved_at: chrono::Utc::now(),
                version: crate::SNAPSHOT_VERSION.to_string(),
            },
        })
    }

    /// Restore an actor's posture and re-admit its saved interactions
    ///
    /// Entries that cannot be rebuilt are dropped and logged; this only
    /// fails when the actor itself is unknown.
    pub fn load_actor(
        &mut self,
        snapshot: &ActorSnapshot,
        factory: &dyn InteractionFactory<C>,
    ) -> InteractionResult<LoadReport> {
        self.set_posture(snapshot.actor, snapshot.posture.clone(), None)?;

        let mut report = LoadReport::default();
        for saved in &snapshot.interactions {
            match self.reconstruct(snapshot.actor, saved, factory) {
                Ok(task) => report.restored.push(task),
                Err(err) => {
                    tracing::warn!(
                        actor = %snapshot.actor,
                        affordance = %saved.affordance,
                        error = %err,
                        "dropping saved interaction"
                    );
                    report.dropped.push((saved.affordance.clone(), err));
                }
            }
        }

        tracing::info!(
            actor = %snapshot.actor,
            restored = report.restored.len(),
            dropped = report.dropped.len(),
            "actor loaded"
        );
        Ok(report)
    }

    fn reconstruct(
        &mut self,
        actor: ObjectId,
        saved: &SavedInteraction,
        factory: &dyn InteractionFactory<C>,
    ) -> Result<TaskId, ReconstructionError> {
        let affordance = self
            .affordance(&saved.affordance)
            .ok_or_else(|| ReconstructionError::MissingAffordance(saved.affordance.clone()))?;
        if let Some(target) = saved.target {
            if !self.objects.contains(target) {
                return Err(ReconstructionError::MissingTarget(target));
            }
        }
        let request = factory
            .rebuild(actor, affordance, saved)
            .ok_or_else(|| ReconstructionError::FactoryDeclined(saved.affordance.clone()))?;

        let task = self.create_interaction(request)?;
        if let Err(err) = self.add(task) {
            self.tasks.remove(&task);
            return Err(err.into());
        }
        if saved.posture_source {
            if let Some(state) = self.actors.get_mut(&actor) {
                state.posture_source = Some(task);
                state.si_state.invalidate_cache();
            }
        }
        Ok(task)
    }
}
