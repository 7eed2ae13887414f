use posture::runtime::actor::Age;
use posture::runtime::error::InteractionError;
use posture::runtime::geometry::{Area, OpenSpace};
use posture::runtime::ids::ObjectId;
use posture::runtime::interaction::{Affordance, NewInteraction};
use posture::runtime::objects::{ObjectTable, SlotType, WorldObject};
use posture::runtime::operations::{PostureOperation, TransitionPlan, ValidationContext};
use posture::runtime::posture::{BodyAspect, CarryAspect, Hand, PostureNode, PostureType};
use posture::runtime::variables::{Binding, PostureSpecVariable, SpecValue, VarMap};
use posture::runtime::{PostureTuning, Runtime, RuntimeConfig};

#[test]
fn pick_up_while_carrying_does_not_apply() {
    let cup = ObjectId::new();
    let node = PostureNode::origin(PostureType::stand())
        .with_carry(CarryAspect::holding(PostureType::carry_object(), cup, Hand::Right));

    let op = PostureOperation::pick_up(PostureType::carry_object(), ObjectId::new());
    assert_eq!(op.apply(&node), None);
}

#[test]
fn put_down_with_empty_hands_is_identity() {
    let node = PostureNode::origin(PostureType::stand());
    let op = PostureOperation::put_down(PostureType::carry_object());
    assert_eq!(op.apply(&node), Some(node));
}

#[test]
fn pick_up_then_place_in_slot() {
    let mut objects = ObjectTable::new();
    let counter = objects.insert(WorldObject::new(ObjectId::new()));
    let plate = objects.insert(WorldObject::new(ObjectId::new()).carryable());
    let tuning = PostureTuning::default();
    let slot = SlotType::new("slot_small");

    let start = PostureNode::origin(PostureType::stand());
    let plan = TransitionPlan::from_operations(
        &start,
        vec![
            PostureOperation::pick_up(PostureType::carry_object(), plate),
            PostureOperation::PutDownObjectOnSurface {
                posture_type: PostureType::carry_object(),
                surface: SpecValue::Is(counter),
                slot_type: SpecValue::Is(slot.clone()),
                slot_target: SpecValue::None,
            },
        ],
        &tuning,
    )
    .unwrap();

    let end = plan.destination();
    assert!(!end.is_carrying());
    assert_eq!(end.surface_target(), Some(counter));
    assert_eq!(end.surface().unwrap().slot_target, SpecValue::Is(plate));
    assert_eq!(plan.cost(), 2.0 * tuning.standard_cost);

    let mut bindings = VarMap::new();
    bindings.insert(PostureSpecVariable::Hand, Binding::Hand(Hand::Left));
    let open = OpenSpace::new();
    let ctx = ValidationContext::<Area> {
        actor: ObjectId::new(),
        age: Age::Adult,
        var_map: &bindings,
        objects: &objects,
        spatial: &open,
    };
    assert!(plan.validate(&ctx));

    let full = OpenSpace::new().fill_slot(counter, slot);
    let ctx = ValidationContext::<Area> {
        spatial: &full,
        ..ctx
    };
    assert!(!plan.validate(&ctx));
}

#[test]
fn stationary_postures_cannot_hop_between_anchors() {
    let chair = ObjectId::new();
    let sofa = ObjectId::new();
    let sit = PostureType::new("sit");

    let seated = PostureOperation::body_transition(sit.clone(), chair)
        .apply(&PostureNode::origin(PostureType::stand()))
        .unwrap();
    assert_eq!(seated.body_target(), Some(chair));

    assert_eq!(PostureOperation::body_transition(sit.clone(), sofa).apply(&seated), None);
    assert_eq!(PostureOperation::body_transition(sit, chair).apply(&seated), None);
}

#[test]
fn carrying_blocks_postures_without_carry() {
    let bed = ObjectId::new();
    let node = PostureNode::origin(PostureType::stand())
        .with_carry(CarryAspect::holding(PostureType::carry_object(), ObjectId::new(), Hand::Left));

    let lie = PostureType::new("lie").without_carry();
    assert_eq!(PostureOperation::body_transition(lie, bed).apply(&node), None);
}

#[test]
fn forget_surface_clears_or_keeps() {
    let table = ObjectId::new();
    let origin = PostureNode::origin(PostureType::stand());
    assert_eq!(PostureOperation::ForgetSurface.apply(&origin), Some(origin.clone()));

    let on_table = origin
        .with_surface(posture::runtime::posture::SurfaceAspect::on(table))
        .unwrap();
    let cleared = PostureOperation::ForgetSurface.apply(&on_table).unwrap();
    assert!(!cleared.has_surface());
}

#[test]
fn age_restricted_transition_fails_validation() {
    let mut objects = ObjectTable::new();
    let bar = objects.insert(WorldObject::new(ObjectId::new()));
    let stool = PostureType::new("bar_stool").disallow_age(Age::Toddler);
    let op = PostureOperation::body_transition(stool, bar);
    let open = OpenSpace::new();
    let bindings = VarMap::new();

    let ctx = ValidationContext::<Area> {
        actor: ObjectId::new(),
        age: Age::Toddler,
        var_map: &bindings,
        objects: &objects,
        spatial: &open,
    };
    let origin = PostureNode::origin(PostureType::stand());
    assert!(!op.validate(&origin, &ctx));
    assert!(op.validate(&origin, &ValidationContext { age: Age::Adult, ..ctx }));
}

#[test]
fn blocked_clearance_rejects_commit() {
    let mut runtime: Runtime<Area> = Runtime::with_spatial(
        RuntimeConfig::default(),
        Box::new(OpenSpace::new()),
    );
    let actor = runtime.spawn_actor(Age::Adult, PostureNode::origin(PostureType::stand()));
    let booth = runtime.add_object(WorldObject::new(ObjectId::new()).requiring_clearance());
    let sit = runtime.register_affordance(Affordance::new("sit_in_booth"));
    let task = runtime
        .create_interaction(NewInteraction::new(actor, sit))
        .unwrap();
    runtime.add(task).unwrap();

    let start = runtime.actor(actor).unwrap().posture_state().clone();
    let plan = TransitionPlan::from_operations(
        &start,
        vec![PostureOperation::body_transition(PostureType::new("sit"), booth)],
        &runtime.config().tuning,
    )
    .unwrap();

    let mut blocked: Runtime<Area> = Runtime::with_spatial(
        RuntimeConfig::default(),
        Box::new(OpenSpace::new().block_clearance(booth)),
    );
    let other = blocked.spawn_actor(Age::Adult, start.clone());
    blocked.add_object(WorldObject::new(booth).requiring_clearance());
    let affordance = blocked.register_affordance(Affordance::new("sit_in_booth"));
    let blocked_task = blocked
        .create_interaction(NewInteraction::new(other, affordance))
        .unwrap();
    blocked.add(blocked_task).unwrap();
    blocked.set_transition(blocked_task, plan.clone()).unwrap();
    assert_eq!(
        blocked.commit_transition(blocked_task),
        Err(InteractionError::InvalidTransition(blocked_task))
    );
    assert_eq!(blocked.actor(other).unwrap().posture_state(), &start);

    runtime.set_transition(task, plan).unwrap();
    runtime.commit_transition(task).unwrap();
    assert_eq!(runtime.actor(actor).unwrap().posture_source(), Some(task));
}

#[test]
fn target_already_in_slot_needs_matching_parent_and_slot() {
    let mut objects = ObjectTable::new();
    let counter = objects.insert(WorldObject::new(ObjectId::new()));
    let shelf = objects.insert(WorldObject::new(ObjectId::new()));
    let small = SlotType::new("slot_small");
    let plate = objects.insert(
        WorldObject::new(ObjectId::new())
            .carryable()
            .in_slot(counter, small.clone()),
    );
    let in_slot = |surface: ObjectId, slot_type: SlotType| PostureOperation::TargetAlreadyInSlot {
        slot_target: SpecValue::Is(plate),
        surface: SpecValue::Is(surface),
        slot_type: SpecValue::Is(slot_type),
    };

    let origin = PostureNode::origin(PostureType::stand());
    let at_slot = in_slot(counter, small.clone()).apply(&origin).unwrap();
    assert_eq!(at_slot.surface_target(), Some(counter));
    assert_eq!(at_slot.surface().unwrap().slot_target, SpecValue::Is(plate));
    assert!(!at_slot.is_carrying());

    let carrying = origin.with_carry(CarryAspect::holding(
        PostureType::carry_object(),
        ObjectId::new(),
        Hand::Left,
    ));
    assert_eq!(in_slot(counter, small.clone()).apply(&carrying), None);
    assert_eq!(in_slot(counter, small.clone()).apply(&at_slot), None);

    let open = OpenSpace::new();
    let bindings = VarMap::new();
    let ctx = ValidationContext::<Area> {
        actor: ObjectId::new(),
        age: Age::Adult,
        var_map: &bindings,
        objects: &objects,
        spatial: &open,
    };
    assert!(in_slot(counter, small.clone()).validate(&origin, &ctx));
    assert!(!in_slot(shelf, small).validate(&origin, &ctx));
    assert!(!in_slot(counter, SlotType::new("slot_large")).validate(&origin, &ctx));

    let unknown = PostureOperation::TargetAlreadyInSlot {
        slot_target: SpecValue::Is(ObjectId::new()),
        surface: SpecValue::Is(counter),
        slot_type: SpecValue::Is(SlotType::new("slot_small")),
    };
    assert!(!unknown.validate(&origin, &ctx));
}

#[test]
fn stationary_pick_up_needs_anchor_and_reach() {
    let mut objects = ObjectTable::new();
    let table = objects.insert(WorldObject::new(ObjectId::new()));
    let shelf = objects.insert(WorldObject::new(ObjectId::new()));
    let cup = objects.insert(
        WorldObject::new(ObjectId::new())
            .carryable()
            .in_slot(table, SlotType::new("slot_small")),
    );
    let loose = objects.insert(WorldObject::new(ObjectId::new()).carryable());
    let sit = PostureType::new("sit");

    let at_table = PostureNode::origin(PostureType::stand()).with_body(BodyAspect::new(sit.clone(), table));
    let at_shelf = PostureNode::origin(PostureType::stand()).with_body(BodyAspect::new(sit, shelf));
    let standing = PostureNode::origin(PostureType::stand());
    let pick_cup = PostureOperation::pick_up(PostureType::carry_object(), cup);

    let open = OpenSpace::new();
    let bindings = VarMap::new();
    let ctx = ValidationContext::<Area> {
        actor: ObjectId::new(),
        age: Age::Adult,
        var_map: &bindings,
        objects: &objects,
        spatial: &open,
    };
    assert!(pick_cup.validate(&at_table, &ctx));
    assert!(!pick_cup.validate(&at_shelf, &ctx));
    assert!(!PostureOperation::pick_up(PostureType::carry_object(), loose).validate(&at_table, &ctx));
    assert!(PostureOperation::pick_up(PostureType::carry_object(), loose).validate(&standing, &ctx));

    let out_of_reach = OpenSpace::new().unreachable(cup);
    let ctx = ValidationContext::<Area> {
        spatial: &out_of_reach,
        ..ctx
    };
    assert!(!pick_cup.validate(&at_table, &ctx));
    assert!(pick_cup.validate(&standing, &ctx));
}

#[test]
fn plan_nodes_follow_their_operations() {
    let chair = ObjectId::new();
    let cup = ObjectId::new();
    let start = PostureNode::origin(PostureType::stand());
    let plan = TransitionPlan::from_operations(
        &start,
        vec![
            PostureOperation::body_transition(PostureType::new("sit"), chair),
            PostureOperation::pick_up(PostureType::carry_object(), cup),
        ],
        &PostureTuning::default(),
    )
    .unwrap();

    let nodes: Vec<&PostureNode> = plan.nodes().collect();
    assert_eq!(nodes.len(), plan.len() + 1);
    assert_eq!(nodes[0], plan.source());
    for (i, operation) in plan.operations().enumerate() {
        assert_eq!(operation.apply(nodes[i]).as_ref(), Some(nodes[i + 1]));
    }

    let empty = TransitionPlan::from_operations(&start, Vec::new(), &PostureTuning::default()).unwrap();
    assert!(empty.is_empty());
    assert_eq!(empty.destination(), &start);
    assert_eq!(empty.cost(), 0.0);
}
