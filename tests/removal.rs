use futures::FutureExt;
use futures::future::BoxFuture;
use posture::runtime::actor::Age;
use posture::runtime::geometry::Area;
use posture::runtime::ids::{ObjectId, TaskId};
use posture::runtime::interaction::{
    Affordance, ExitOutcome, InteractionHooks, NewInteraction, Priority,
};
use posture::runtime::posture::{PostureNode, PostureType};
use posture::runtime::state::{ChangeKind, InteractionChange};
use posture::runtime::{RemoveOutcome, Runtime, RuntimeConfig};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Exit sequence that waits until the test opens the gate
struct GatedExit {
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl GatedExit {
    fn new() -> (Arc<Self>, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let hooks = Arc::new(Self {
            gate: Mutex::new(Some(rx)),
        });
        (hooks, tx)
    }
}

impl InteractionHooks for GatedExit {
    fn exit(&self, _task: TaskId) -> BoxFuture<'static, ExitOutcome> {
        let gate = self.gate.lock().unwrap().take();
        async move {
            match gate {
                Some(rx) => match rx.await {
                    Ok(()) => ExitOutcome::Completed,
                    Err(_) => ExitOutcome::Interrupted,
                },
                None => ExitOutcome::Completed,
            }
        }
        .boxed()
    }
}

fn setup() -> (Runtime<Area>, ObjectId) {
    let mut runtime = Runtime::new(RuntimeConfig::default());
    let actor = runtime.spawn_actor(Age::Adult, PostureNode::origin(PostureType::stand()));
    (runtime, actor)
}

#[tokio::test]
async fn add_then_remove_restores_the_set() {
    let (mut runtime, actor) = setup();
    let read = runtime.register_affordance(Affordance::new("read"));

    let seen: Arc<Mutex<Vec<InteractionChange>>> = Arc::default();
    let log = seen.clone();
    let watcher = runtime
        .watch(actor, Box::new(move |change: &InteractionChange| log.lock().unwrap().push(*change)))
        .unwrap();

    let task = runtime
        .create_interaction(
            NewInteraction::new(actor, read)
                .guaranteed()
                .constraint(Area::rect(0, 0, 3, 3)),
        )
        .unwrap();
    runtime.add(task).unwrap();

    // Populate the cache with entries that refer to the task.
    runtime
        .get_combined_constraint(actor, Some(Priority::LOW), None, None, true)
        .unwrap();
    assert!(runtime.actor(actor).unwrap().si_state().cache_mentions(task));

    assert_eq!(runtime.remove(task).await, RemoveOutcome::Removed);

    let state = runtime.actor(actor).unwrap().si_state();
    assert!(state.is_empty());
    assert!(!state.is_removing(task));
    assert_eq!(state.cache_len(), 0);
    assert_eq!(state.watcher_count(), 1);

    let kinds: Vec<_> = seen.lock().unwrap().iter().map(|c| (c.task, c.kind)).collect();
    assert_eq!(kinds, vec![(task, ChangeKind::Added), (task, ChangeKind::Removed)]);

    assert!(runtime.unwatch(actor, watcher));
    assert_eq!(runtime.actor(actor).unwrap().si_state().watcher_count(), 0);
}

#[tokio::test]
async fn remove_suspends_until_exit_finishes() {
    let (mut runtime, actor) = setup();
    let cook = runtime.register_affordance(Affordance::new("cook"));
    let (hooks, gate) = GatedExit::new();

    let task = runtime
        .create_interaction(
            NewInteraction::new(actor, cook)
                .guaranteed()
                .constraint(Area::rect(0, 0, 1, 1))
                .hooks(hooks),
        )
        .unwrap();
    runtime.add(task).unwrap();

    let pending = runtime.begin_removal(task).unwrap();
    assert_eq!(pending.task(), task);

    // Still a member while the exit runs, but no longer constraining.
    let state = runtime.actor(actor).unwrap().si_state();
    assert!(state.contains(task));
    assert!(state.is_removing(task));
    let (constraint, included) = runtime
        .get_combined_constraint(actor, None, None, None, true)
        .unwrap();
    assert_eq!(constraint, <Area as posture::runtime::geometry::Constraint>::unconstrained());
    assert!(included.is_empty());

    assert_eq!(runtime.begin_removal(task).err(), Some(RemoveOutcome::AlreadyRemoving));

    gate.send(()).unwrap();
    let ready = pending.await;
    assert_eq!(ready.outcome, ExitOutcome::Completed);
    assert_eq!(runtime.complete_removal(ready), RemoveOutcome::Removed);
    assert!(runtime.actor(actor).unwrap().si_state().is_empty());
    assert_eq!(runtime.remove(task).await, RemoveOutcome::NotTracked);
}

#[tokio::test]
async fn interrupted_exit_still_removes() {
    let (mut runtime, actor) = setup();
    let cook = runtime.register_affordance(Affordance::new("cook"));
    let (hooks, gate) = GatedExit::new();

    let task = runtime
        .create_interaction(NewInteraction::new(actor, cook).hooks(hooks))
        .unwrap();
    runtime.add(task).unwrap();

    drop(gate);
    let pending = runtime.begin_removal(task).unwrap();
    let ready = pending.await;
    assert_eq!(ready.outcome, ExitOutcome::Interrupted);
    assert_eq!(runtime.complete_removal(ready), RemoveOutcome::Removed);
    assert!(runtime.actor(actor).unwrap().si_state().is_empty());
}

#[tokio::test]
async fn performing_interactions_are_not_removed() {
    let (mut runtime, actor) = setup();
    let dance = runtime.register_affordance(Affordance::new("dance"));

    let task = runtime
        .create_interaction(NewInteraction::new(actor, dance))
        .unwrap();
    runtime.add(task).unwrap();
    runtime.begin_core_action(task).unwrap();

    assert_eq!(runtime.remove(task).await, RemoveOutcome::StillPerforming);
    assert!(runtime.actor(actor).unwrap().si_state().contains(task));

    runtime.end_core_action(task).unwrap();
    assert_eq!(runtime.remove(task).await, RemoveOutcome::Removed);
}

#[tokio::test]
async fn queued_interactions_are_not_tracked() {
    let (mut runtime, actor) = setup();
    let dance = runtime.register_affordance(Affordance::new("dance"));
    let task = runtime
        .create_interaction(NewInteraction::new(actor, dance))
        .unwrap();

    assert_eq!(runtime.remove(task).await, RemoveOutcome::NotTracked);
    assert_eq!(runtime.remove(TaskId(999)).await, RemoveOutcome::NotTracked);
}

#[tokio::test]
async fn removal_leaves_both_ends() {
    let (mut runtime, actor) = setup();
    let partner = runtime.spawn_actor(Age::Adult, PostureNode::origin(PostureType::stand()));
    let chat = runtime.register_affordance(Affordance::new("chat"));

    let task = runtime
        .create_interaction(NewInteraction::new(actor, chat).target(partner))
        .unwrap();
    runtime.add(task).unwrap();
    assert!(runtime.actor(partner).unwrap().si_state().contains(task));

    assert_eq!(runtime.remove(task).await, RemoveOutcome::Removed);
    assert!(runtime.actor(actor).unwrap().si_state().is_empty());
    assert!(runtime.actor(partner).unwrap().si_state().is_empty());
}

#[test]
fn reset_clears_own_and_target_entries() {
    let (mut runtime, actor) = setup();
    let partner = runtime.spawn_actor(Age::Adult, PostureNode::origin(PostureType::stand()));
    let chat = runtime.register_affordance(Affordance::new("chat"));
    let idle = runtime.register_affordance(Affordance::new("idle"));

    let own = runtime
        .create_interaction(NewInteraction::new(actor, idle))
        .unwrap();
    runtime.add(own).unwrap();
    let incoming = runtime
        .create_interaction(NewInteraction::new(partner, chat).target(actor))
        .unwrap();
    runtime.add(incoming).unwrap();

    let cleared = runtime.reset_actor(actor).unwrap();
    assert_eq!(cleared, vec![own, incoming]);
    assert!(runtime.actor(actor).unwrap().si_state().is_empty());
    assert!(runtime.interaction(own).is_none());

    // The partner keeps running its interaction.
    assert!(runtime.actor(partner).unwrap().si_state().contains(incoming));
    assert!(runtime.interaction(incoming).is_some());
}

#[tokio::test]
async fn dropped_pending_removal_can_be_aborted() {
    let (mut runtime, actor) = setup();
    let cook = runtime.register_affordance(Affordance::new("cook"));
    let (hooks, _gate) = GatedExit::new();

    let task = runtime
        .create_interaction(
            NewInteraction::new(actor, cook)
                .guaranteed()
                .constraint(Area::rect(0, 0, 1, 1))
                .hooks(hooks),
        )
        .unwrap();
    runtime.add(task).unwrap();

    let pending = runtime.begin_removal(task).unwrap();
    drop(pending);
    assert_eq!(runtime.begin_removal(task).err(), Some(RemoveOutcome::AlreadyRemoving));

    assert!(runtime.abort_removal(task));
    assert!(!runtime.abort_removal(task));
    let state = runtime.actor(actor).unwrap().si_state();
    assert!(state.contains(task));
    assert!(!state.is_removing(task));
    let (constraint, included) = runtime
        .get_combined_constraint(actor, None, None, None, true)
        .unwrap();
    assert_eq!(constraint, Area::rect(0, 0, 1, 1));
    assert_eq!(included, vec![task]);

    // The gate was consumed by the first exit, so this one finishes at once.
    assert_eq!(runtime.remove(task).await, RemoveOutcome::Removed);
}

#[tokio::test]
async fn cancelled_remove_leaves_the_task_removable() {
    let (mut runtime, actor) = setup();
    let cook = runtime.register_affordance(Affordance::new("cook"));
    let (hooks, _gate) = GatedExit::new();

    let task = runtime
        .create_interaction(NewInteraction::new(actor, cook).hooks(hooks))
        .unwrap();
    runtime.add(task).unwrap();

    let timed_out =
        tokio::time::timeout(std::time::Duration::from_millis(20), runtime.remove(task)).await;
    assert!(timed_out.is_err());

    let state = runtime.actor(actor).unwrap().si_state();
    assert!(state.contains(task));
    assert!(!state.is_removing(task));
    assert_eq!(runtime.remove(task).await, RemoveOutcome::Removed);
    assert!(runtime.actor(actor).unwrap().si_state().is_empty());
}
