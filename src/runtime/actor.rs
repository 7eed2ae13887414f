//! Actors: posture state plus the set of interactions they take part in

use serde::{Deserialize, Serialize};

use super::geometry::Constraint;
use super::ids::{ObjectId, TaskId};
use super::posture::PostureNode;
use super::state::InteractionStateSet;

/// Life stage; some postures are closed to some ages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Age {
    /// Baby
    Baby,
    /// Toddler
    Toddler,
    /// Child
    Child,
    /// Teen
    Teen,
    /// Young adult
    YoungAdult,
    /// Adult
    Adult,
    /// Elder
    Elder,
}

/// A simulated actor
pub struct Actor<C: Constraint> {
    /// Actor id; the actor is also a world object
    pub id: ObjectId,

    /// Life stage
    pub age: Age,

    pub(crate) posture_state: PostureNode,

    /// Interaction currently supplying the posture
    pub(crate) posture_source: Option<TaskId>,

    pub(crate) si_state: InteractionStateSet<C>,
}

impl<C: Constraint> Actor<C> {
    /// Create an actor in the given posture
    pub fn new(id: ObjectId, age: Age, posture_state: PostureNode, cache_constraints: bool) -> Self {
        Self {
            id,
            age,
            posture_state,
            posture_source: None,
            si_state: InteractionStateSet::new(id, cache_constraints),
        }
    }

    /// Current posture
    pub fn posture_state(&self) -> &PostureNode {
        &self.posture_state
    }

    /// Interaction supplying the current posture
    pub fn posture_source(&self) -> Option<TaskId> {
        self.posture_source
    }

    /// Interactions this actor takes part in
    pub fn si_state(&self) -> &InteractionStateSet<C> {
        &self.si_state
    }
}
