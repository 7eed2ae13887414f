//! Runtime control facade for CLI and tests
//!
//! Read-only introspection (active interactions, posture aspects) and
//! administrative force operations that bypass the normal admission path.

use serde::{Deserialize, Serialize};

use super::Runtime;
use super::error::{InteractionError, InteractionResult};
use super::geometry::Constraint;
use super::ids::{ObjectId, TaskId};
use super::interaction::{InteractionPhase, Priority, Role};
use super::posture::PostureNode;
use super::state::ChangeKind;

/// Control interface over a runtime
pub struct Control<'a, C: Constraint> {
    runtime: &'a mut Runtime<C>,
}

impl<'a, C: Constraint> Control<'a, C> {
    /// Create a new control interface
    pub fn new(runtime: &'a mut Runtime<C>) -> Self {
        Self { runtime }
    }

    /// Interactions an actor takes part in, highest precedence first
    pub fn list_active(&self, actor: ObjectId) -> InteractionResult<Vec<ActiveInteraction>> {
        let state = self.runtime.actor_entry(actor)?;
        let view = self.runtime.view(state);
        Ok(state
            .si_state
            .ordered(&view)
            .into_iter()
            .filter_map(|id| {
                let task = self.runtime.tasks.get(&id)?;
                Some(ActiveInteraction {
                    task: id,
                    affordance: task.affordance.id.to_string(),
                    role: state.si_state.role_of(id)?,
                    priority: task.priority,
                    phase: task.phase,
                    guaranteed: task.guaranteed,
                    posture_source: state.posture_source == Some(id),
                    removing: state.si_state.is_removing(id),
                })
            })
            .collect())
    }

    /// Current posture of an actor, one line per aspect
    pub fn posture_aspects(&self, actor: ObjectId) -> InteractionResult<PostureAspects> {
        let state = self.runtime.actor_entry(actor)?;
        let posture = state.posture_state();
        Ok(PostureAspects {
            body: posture
                .body()
                .map_or_else(|| "*".to_string(), |body| format!("{} @ {}", body.posture_type.name, body.target)),
            carry: posture
                .carry()
                .map_or_else(|| "*".to_string(), |carry| format!("{} {} ({})", carry.posture_type.name, carry.target, carry.hand)),
            surface: posture
                .surface()
                .map_or_else(|| "*".to_string(), |surface| format!("{} [{}] {}", surface.target, surface.slot_type, surface.slot_target)),
            posture_source: state.posture_source,
        })
    }

    /// Evict an interaction without consulting its displacement hook or
    /// running its exit sequence
    pub fn force_displace(&mut self, task: TaskId) -> InteractionResult<()> {
        if !self.runtime.tasks.contains_key(&task) {
            return Err(InteractionError::UnknownTask(task));
        }
        tracing::info!(%task, "forced displacement");
        self.runtime.detach(task, ChangeKind::Displaced);
        self.runtime.tasks.remove(&task);
        Ok(())
    }

    /// Overwrite an actor's posture and clear its posture source
    pub fn force_posture(&mut self, actor: ObjectId, posture: PostureNode) -> InteractionResult<()> {
        tracing::info!(%actor, %posture, "forced posture");
        self.runtime.set_posture(actor, posture, None)
    }
}

/// One row of `list_active`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveInteraction {
    /// Interaction id
    pub task: TaskId,
    /// Affordance name
    pub affordance: String,
    /// Role in the actor's set
    pub role: Role,
    /// Priority
    pub priority: Option<Priority>,
    /// Lifecycle phase
    pub phase: InteractionPhase,
    /// Protected tier
    pub guaranteed: bool,
    /// Supplies the actor's posture
    pub posture_source: bool,
    /// Exit sequence in flight
    pub removing: bool,
}

/// Human-readable posture aspects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostureAspects {
    /// Body posture and anchor
    pub body: String,
    /// Carry posture, carried object and hand
    pub carry: String,
    /// Surface, slot type and slot occupant
    pub surface: String,
    /// Interaction supplying the posture
    pub posture_source: Option<TaskId>,
}
