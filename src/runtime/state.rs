//! Interaction state sets
//!
//! One set per actor tracks every interaction the actor takes part in,
//! either as the one running it or as its target. The set owns the
//! admission algorithms:
//! - the non-geometric test (linked affordances on overlapping targets)
//! - constraint combination over must-include and displaceable tiers
//! - incompatibility queries used by resolve and diagnostics
//!
//! Entries are ids into the runtime's interaction arena, never owned values.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::error::{InteractionResult, invariant_violation};
use super::geometry::{Constraint, ConstraintKey};
use super::ids::{GroupId, ObjectId, TaskId, WatcherId};
use super::interaction::{InteractionArena, Priority, Role, SuperInteraction, can_priority_displace};
use super::objects::ObjectIndex;
use super::posture::PostureNode;

/// Kind of membership change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Admitted
    Added,
    /// Removed after its exit sequence (or a reset)
    Removed,
    /// Evicted by a higher-priority interaction
    Displaced,
}

/// Notification sent to watchers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteractionChange {
    /// Owner of the set that changed
    pub actor: ObjectId,
    /// Interaction concerned
    pub task: TaskId,
    /// Role the interaction had in the set
    pub role: Role,
    /// What happened
    pub kind: ChangeKind,
}

/// Change-notification callback
pub type Watcher = Box<dyn Fn(&InteractionChange) + Send + Sync>;

/// Read-only context the set's queries run against
pub struct SetView<'a, C: Constraint> {
    /// Interaction arena
    pub interactions: &'a InteractionArena<C>,
    /// World objects
    pub objects: &'a dyn ObjectIndex,
    /// Owner's posture
    pub posture: &'a PostureNode,
    /// Interaction supplying the owner's posture
    pub posture_source: Option<TaskId>,
}

/// Why a candidate was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Incompatibility {
    /// Linked affordance on an overlapping target
    LinkedAffordance,
    /// Geometric constraints do not intersect
    Constraint,
}

/// Outcome of a compatibility test
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestResult {
    /// Candidate can coexist with the set
    Compatible,
    /// Candidate is blocked
    Incompatible {
        /// Which test failed
        reason: Incompatibility,
        /// Interactions that block it
        blocking: Vec<TaskId>,
    },
}

impl TestResult {
    /// Whether the test passed
    pub fn is_compatible(&self) -> bool {
        matches!(self, TestResult::Compatible)
    }

    /// Blocking interactions (empty when compatible)
    pub fn blocking(&self) -> &[TaskId] {
        match self {
            TestResult::Compatible => &[],
            TestResult::Incompatible { blocking, .. } => blocking,
        }
    }
}

/// Result of constraint combination
#[derive(Debug, Clone)]
pub struct CombinedConstraint<C> {
    /// Intersection of the seed and every included constraint
    pub constraint: C,
    /// Interactions whose constraints were intersected, in order
    pub included: Vec<TaskId>,
    /// Must-include interactions that did not fit
    pub blocking: Vec<TaskId>,
    /// Displaceable interactions that did not fit
    pub displaced: Vec<TaskId>,
}

impl<C> CombinedConstraint<C> {
    fn mentions(&self, task: TaskId) -> bool {
        self.included.contains(&task) || self.blocking.contains(&task) || self.displaced.contains(&task)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    constraint: ConstraintKey,
    priority: Option<Priority>,
    group: Option<GroupId>,
    exclude: Option<TaskId>,
    include_inertial: bool,
    allow_clobber: bool,
}

/// The interactions one actor takes part in
pub struct InteractionStateSet<C: Constraint> {
    owner: ObjectId,
    entries: HashMap<TaskId, Role>,
    removing: HashSet<TaskId>,
    watchers: Vec<(WatcherId, Watcher)>,
    next_watcher: u64,
    cache_enabled: bool,
    cache: Mutex<HashMap<CacheKey, CombinedConstraint<C>>>,
}

impl<C: Constraint> InteractionStateSet<C> {
    /// Create an empty set for `owner`
    pub fn new(owner: ObjectId, cache_enabled: bool) -> Self {
        Self {
            owner,
            entries: HashMap::new(),
            removing: HashSet::new(),
            watchers: Vec::new(),
            next_watcher: 0,
            cache_enabled,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Owning actor
    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    /// Number of tracked interactions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `task` is tracked
    pub fn contains(&self, task: TaskId) -> bool {
        self.entries.contains_key(&task)
    }

    /// Role of a tracked interaction
    pub fn role_of(&self, task: TaskId) -> Option<Role> {
        self.entries.get(&task).copied()
    }

    /// Whether `task` is in its exit sequence
    pub fn is_removing(&self, task: TaskId) -> bool {
        self.removing.contains(&task)
    }

    /// Tracked interactions in id order
    pub fn tasks(&self) -> Vec<TaskId> {
        let mut tasks: Vec<_> = self.entries.keys().copied().collect();
        tasks.sort();
        tasks
    }

    /// Tracked interactions in canonical priority order, highest first
    pub fn ordered(&self, view: &SetView<'_, C>) -> Vec<TaskId> {
        let mut tasks: Vec<_> = self.entries.keys().copied().collect();
        sort_by_precedence(&mut tasks, view);
        tasks
    }

    // ========== Watchers ==========

    /// Register a change watcher
    pub fn watch(&mut self, watcher: Watcher) -> WatcherId {
        let id = WatcherId(self.next_watcher);
        self.next_watcher += 1;
        self.watchers.push((id, watcher));
        id
    }

    /// Unregister a watcher; returns whether it was registered
    pub fn unwatch(&mut self, id: WatcherId) -> bool {
        let before = self.watchers.len();
        self.watchers.retain(|(watcher_id, _)| *watcher_id != id);
        self.watchers.len() != before
    }

    /// Number of registered watchers
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    pub(crate) fn notify(&self, change: InteractionChange) {
        for (_, watcher) in &self.watchers {
            watcher(&change);
        }
    }

    // ========== Membership ==========

    pub(crate) fn insert(&mut self, task: TaskId, role: Role, strict: bool) -> InteractionResult<()> {
        if self.entries.contains_key(&task) {
            return Err(invariant_violation(
                strict,
                format!("{task} inserted twice into the set of {}", self.owner),
            ));
        }
        self.entries.insert(task, role);
        self.invalidate_cache();
        Ok(())
    }

    pub(crate) fn discard(&mut self, task: TaskId) -> Option<Role> {
        self.removing.remove(&task);
        let role = self.entries.remove(&task);
        if role.is_some() {
            self.invalidate_cache();
        }
        role
    }

    pub(crate) fn mark_removing(&mut self, task: TaskId) -> bool {
        self.entries.contains_key(&task) && self.removing.insert(task)
    }

    pub(crate) fn unmark_removing(&mut self, task: TaskId) -> bool {
        self.removing.remove(&task)
    }

    pub(crate) fn clear(&mut self) -> Vec<(TaskId, Role)> {
        self.removing.clear();
        self.invalidate_cache();
        let mut drained: Vec<_> = self.entries.drain().collect();
        drained.sort_by_key(|(task, _)| *task);
        drained
    }

    // ========== Constraint cache ==========

    /// Drop every memoized combination
    pub fn invalidate_cache(&self) {
        self.cache.lock().clear();
    }

    /// Number of memoized combinations
    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Whether any memoized combination refers to `task`
    pub fn cache_mentions(&self, task: TaskId) -> bool {
        self.cache
            .lock()
            .iter()
            .any(|(key, combined)| key.exclude == Some(task) || combined.mentions(task))
    }

    // ========== Compatibility ==========

    /// Non-geometric test: linked affordances on overlapping targets
    ///
    /// Returns the first conflicting interaction.
    pub fn test_non_constraint_compatibility(
        &self,
        candidate: &SuperInteraction<C>,
        group_id: Option<GroupId>,
        view: &SetView<'_, C>,
    ) -> Option<TaskId> {
        self.linked_conflicts(candidate, group_id, view).next()
    }

    fn linked_conflicts<'s>(
        &'s self,
        candidate: &'s SuperInteraction<C>,
        group_id: Option<GroupId>,
        view: &'s SetView<'_, C>,
    ) -> impl Iterator<Item = TaskId> + 's {
        let mut tasks = self.tasks();
        tasks.retain(|id| *id != candidate.id && !self.removing.contains(id));
        tasks.into_iter().filter(move |id| {
            let Some(existing) = view.interactions.get(id) else {
                return false;
            };
            if existing.is_finishing() || Some(existing.group_id) == group_id {
                return false;
            }
            let (Some(a), Some(b)) = (existing.target, candidate.target) else {
                return false;
            };
            if !view.objects.overlaps(a, b) {
                return false;
            }
            let same_affordance = existing.affordance.id == candidate.affordance.id;
            let exclusive =
                !existing.affordance.allow_target_share && !candidate.affordance.allow_target_share;
            (same_affordance || exclusive) && existing.affordance.is_linked_to(&candidate.affordance)
        })
    }

    /// Can `candidate` join this set under `role`?
    ///
    /// Pure: nothing is mutated and nothing is displaced.
    pub fn is_compatible(
        &self,
        candidate: &SuperInteraction<C>,
        priority: Option<Priority>,
        group_id: Option<GroupId>,
        role: Role,
        view: &SetView<'_, C>,
    ) -> TestResult {
        if let Some(blocking) = self.test_non_constraint_compatibility(candidate, group_id, view) {
            return TestResult::Incompatible {
                reason: Incompatibility::LinkedAffordance,
                blocking: vec![blocking],
            };
        }
        if candidate.immediate {
            return TestResult::Compatible;
        }

        let combined = self.combine(
            self.candidate_constraint(candidate, role, view),
            priority,
            group_id,
            Some(candidate.id),
            false,
            candidate.allow_clobber,
            view,
        );
        if combined.blocking.is_empty() {
            TestResult::Compatible
        } else {
            TestResult::Incompatible {
                reason: Incompatibility::Constraint,
                blocking: combined.blocking,
            }
        }
    }

    /// Every interaction that would have to go to admit `candidate`
    pub fn get_incompatible(
        &self,
        candidate: &SuperInteraction<C>,
        role: Role,
        view: &SetView<'_, C>,
    ) -> Vec<TaskId> {
        let mut incompatible: Vec<TaskId> =
            self.linked_conflicts(candidate, Some(candidate.group_id), view).collect();
        if candidate.immediate {
            return incompatible;
        }

        let combined = self.combine(
            self.candidate_constraint(candidate, role, view),
            candidate.priority,
            Some(candidate.group_id),
            Some(candidate.id),
            true,
            candidate.allow_clobber,
            view,
        );
        for task in combined.blocking.into_iter().chain(combined.displaced) {
            if !incompatible.contains(&task) {
                incompatible.push(task);
            }
        }
        incompatible
    }

    /// Displaceable interactions whose constraints clash with `candidate`
    pub fn displacement_targets(
        &self,
        candidate: &SuperInteraction<C>,
        role: Role,
        view: &SetView<'_, C>,
    ) -> Vec<TaskId> {
        if candidate.immediate {
            return Vec::new();
        }
        self.combine(
            self.candidate_constraint(candidate, role, view),
            candidate.priority,
            Some(candidate.group_id),
            Some(candidate.id),
            true,
            candidate.allow_clobber,
            view,
        )
        .displaced
    }

    /// Intersection of the constraints of every interaction that must stay
    ///
    /// `existing_task` is left out (used when asking what remains without
    /// it). With `include_inertial`, displaceable interactions are folded in
    /// after the must-include tier.
    pub fn get_combined_constraint(
        &self,
        priority: Option<Priority>,
        group_id: Option<GroupId>,
        existing_task: Option<TaskId>,
        include_inertial: bool,
        view: &SetView<'_, C>,
    ) -> (C, Vec<TaskId>) {
        let combined = self.combine(
            C::unconstrained(),
            priority,
            group_id,
            existing_task,
            include_inertial,
            false,
            view,
        );
        (combined.constraint, combined.included)
    }

    fn candidate_constraint(
        &self,
        candidate: &SuperInteraction<C>,
        role: Role,
        view: &SetView<'_, C>,
    ) -> C {
        let constraint = candidate.constraint_for(role);
        let constraint = if candidate.can_holster {
            constraint.holstered()
        } else {
            constraint
        };
        constraint.apply_posture_state(view.posture)
    }

    #[allow(clippy::too_many_arguments)]
    fn combine(
        &self,
        seed: C,
        priority: Option<Priority>,
        group_id: Option<GroupId>,
        exclude: Option<TaskId>,
        include_inertial: bool,
        allow_clobber: bool,
        view: &SetView<'_, C>,
    ) -> CombinedConstraint<C> {
        let key = self.cache_enabled.then(|| CacheKey {
            constraint: seed.cache_key(),
            priority,
            group: group_id,
            exclude,
            include_inertial,
            allow_clobber,
        });
        if let Some(key) = &key {
            if let Some(hit) = self.cache.lock().get(key) {
                return hit.clone();
            }
        }

        let (must_include, displaceable) =
            self.partition(priority, group_id, exclude, allow_clobber, view);

        let mut combined = CombinedConstraint {
            constraint: seed,
            included: Vec::new(),
            blocking: Vec::new(),
            displaced: Vec::new(),
        };
        self.fold_tier(
            &must_include,
            &mut combined.constraint,
            &mut combined.included,
            &mut combined.blocking,
            view,
        );
        if include_inertial {
            self.fold_tier(
                &displaceable,
                &mut combined.constraint,
                &mut combined.included,
                &mut combined.displaced,
                view,
            );
        }

        if let Some(key) = key {
            self.cache.lock().insert(key, combined.clone());
        }
        combined
    }

    /// Split live entries into must-include and displaceable tiers, each in
    /// precedence order
    fn partition(
        &self,
        priority: Option<Priority>,
        group_id: Option<GroupId>,
        exclude: Option<TaskId>,
        allow_clobber: bool,
        view: &SetView<'_, C>,
    ) -> (Vec<TaskId>, Vec<TaskId>) {
        let mut must_include = Vec::new();
        let mut displaceable = Vec::new();

        for id in self.tasks() {
            if Some(id) == exclude || self.removing.contains(&id) {
                continue;
            }
            let Some(task) = view.interactions.get(&id) else {
                continue;
            };
            if task.is_finishing() || task.immediate || Some(task.group_id) == group_id {
                continue;
            }
            let protected = task.is_guaranteed() || task.is_staging();
            if protected && !can_priority_displace(priority, task.priority, allow_clobber) {
                must_include.push(id);
            } else {
                displaceable.push(id);
            }
        }

        // The posture source stays while something must-include relies on it.
        if let Some(source) = view.posture_source {
            let anchored = must_include.iter().any(|id| {
                *id != source && view.interactions.get(id).is_some_and(|t| t.uses_posture)
            });
            if anchored {
                if let Some(pos) = displaceable.iter().position(|id| *id == source) {
                    must_include.push(displaceable.remove(pos));
                }
            }
        }

        sort_by_precedence(&mut must_include, view);
        sort_by_precedence(&mut displaceable, view);
        (must_include, displaceable)
    }

    fn fold_tier(
        &self,
        tier: &[TaskId],
        running: &mut C,
        included: &mut Vec<TaskId>,
        incompatible: &mut Vec<TaskId>,
        view: &SetView<'_, C>,
    ) {
        for (index, id) in tier.iter().enumerate() {
            if !running.valid() {
                incompatible.extend_from_slice(&tier[index..]);
                return;
            }
            let (Some(task), Some(role)) = (view.interactions.get(id), self.role_of(*id)) else {
                continue;
            };
            let constraint = task.constraint_for(role).apply_posture_state(view.posture);
            let next = running.intersect(&constraint);
            if next.valid() {
                *running = next;
                included.push(*id);
            } else {
                incompatible.push(*id);
            }
        }
    }
}

/// Highest precedence first: guaranteed, priority, posture source, newest
fn sort_by_precedence<C: Constraint>(tasks: &mut [TaskId], view: &SetView<'_, C>) {
    let key = |id: &TaskId| {
        let task = view.interactions.get(id);
        (
            task.is_some_and(|t| t.is_guaranteed()),
            task.and_then(|t| t.priority),
            view.posture_source == Some(*id),
            *id,
        )
    };
    tasks.sort_by(|a, b| key(b).cmp(&key(a)));
}
