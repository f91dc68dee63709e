mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{CHILD_NODE, Child, Parent, Scripted, authority, count, entries, new_log, world};
use dispatch_core::{
    ActionDispatchSystem, ActionSignal, DispatcherState, EntityKind, NodeId, SharedAvailability,
};

#[test]
fn barrier_completes_once_when_every_participant_arrived() {
    let world = world();
    let actor = world.actor;
    let mut system = ActionDispatchSystem::with_entities(authority(), world.entities);
    let d = system.create_dispatcher("duet", Scripted::new(Some(actor), &[], &new_log()));
    system.start_dispatch(d).unwrap();
    let node = NodeId(7);

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    assert!(!system.enter_together_flow_control_with(
        d,
        node,
        1,
        2,
        Box::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    ));
    assert_eq!(
        system.dispatcher(d).unwrap().barrier(node).unwrap().checklist(),
        &[false, true]
    );

    // Re-entering an already checked slot does not complete the barrier.
    assert!(!system.enter_together_flow_control(d, node, 1, 2));
    assert!(system.enter_together_flow_control(d, node, 0, 2));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(system.dispatcher(d).unwrap().barrier(node).is_none());

    // The node can be reused for a fresh rendezvous.
    assert!(!system.enter_together_flow_control(d, node, 0, 2));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn barrier_resizes_when_participant_count_changes() {
    let world = world();
    let actor = world.actor;
    let mut system = ActionDispatchSystem::with_entities(authority(), world.entities);
    let d = system.create_dispatcher("trio", Scripted::new(Some(actor), &[], &new_log()));
    let node = NodeId(3);

    assert!(!system.enter_together_flow_control(d, node, 0, 2));
    assert!(!system.enter_together_flow_control(d, node, 2, 3));
    assert_eq!(
        system.dispatcher(d).unwrap().barrier(node).unwrap().participants(),
        3
    );
    assert!(system.enter_together_flow_control(d, node, 1, 3));
}

#[test]
#[should_panic(expected = "entered as participant")]
fn barrier_index_out_of_range_panics() {
    let world = world();
    let mut system = ActionDispatchSystem::with_entities(authority(), world.entities);
    let d = system.create_dispatcher("solo", Scripted::new(None, &[], &new_log()));
    system.enter_together_flow_control(d, NodeId(1), 2, 2);
}

#[test]
fn sub_dispatcher_actions_belong_to_main() {
    let world = world();
    let actor = world.actor;
    let mut system = ActionDispatchSystem::with_entities(authority(), world.entities);
    let log = new_log();
    let main = system.create_dispatcher(
        "cutscene",
        Parent {
            child_actor: Some(actor),
            log: log.clone(),
        },
    );
    system.start_dispatch(main).unwrap();

    let sub = system
        .dispatcher(main)
        .unwrap()
        .sub_dispatcher(CHILD_NODE)
        .expect("child registered");
    assert!(system.is_sub_dispatcher(sub));
    assert_eq!(system.main_dispatcher(sub), main);
    assert_eq!(system.state(sub), Some(DispatcherState::Active));
    assert!(system.dispatcher(sub).unwrap().current_actions().is_empty());

    let walk = system.dispatcher(main).unwrap().current_actions()[0];
    assert_eq!(system.action_owner(walk), Some(main));
    assert_eq!(system.claims().holder(actor), Some(main));
    assert_eq!(entries(&log), vec!["parent:start", "child:start", "walk:actived"]);
}

#[test]
fn sub_dispatcher_finish_reaches_parent_script() {
    let world = world();
    let actor = world.actor;
    let mut system = ActionDispatchSystem::with_entities(authority(), world.entities);
    let log = new_log();
    let main = system.create_dispatcher(
        "cutscene",
        Parent {
            child_actor: Some(actor),
            log: log.clone(),
        },
    );
    system.start_dispatch(main).unwrap();
    let sub = system.dispatcher(main).unwrap().sub_dispatcher(CHILD_NODE).unwrap();
    let tags = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = tags.clone();
    system.add_finish_listener(sub, move |_, tag| seen.lock().unwrap().push(tag.to_string()));

    let walk = system.dispatcher(main).unwrap().current_actions()[0];
    system.signal_action(walk, ActionSignal::Custom("finish".into()));

    assert_eq!(count(&log, "child:action done"), 1);
    assert_eq!(count(&log, &format!("parent:sub {CHILD_NODE} child_done")), 1);
    assert_eq!(*tags.lock().unwrap(), vec!["child_done".to_owned()]);
    assert_eq!(system.state(main), Some(DispatcherState::Deactive));
    assert_eq!(system.claims().holder(actor), None);
}

#[test]
fn refused_sub_dispatcher_aborts_main() {
    let mut world = world();
    let other = world
        .entities
        .spawn_dispatchable(EntityKind::Actor, "busy", SharedAvailability::new(true));
    let mut system = ActionDispatchSystem::with_entities(authority(), world.entities);
    let holder = system.create_dispatcher("holder", Scripted::new(Some(other), &[], &new_log()));
    system.start_dispatch(holder).unwrap();

    let log = new_log();
    let main = system.create_dispatcher(
        "cutscene",
        Parent {
            child_actor: Some(other),
            log: log.clone(),
        },
    );
    system.start_dispatch(main).unwrap();

    assert_eq!(system.state(main), Some(DispatcherState::Deactive));
    assert_eq!(count(&log, "child:start"), 0);
    assert_eq!(system.claims().holder(other), Some(holder));
}

#[test]
fn try_active_sub_dispatcher_reenters_registered_child() {
    let world = world();
    let actor = world.actor;
    let mut system = ActionDispatchSystem::with_entities(authority(), world.entities);
    let log = new_log();
    let main = system.create_dispatcher("hub", Scripted::new(Some(actor), &[], &log));
    system.start_dispatch(main).unwrap();

    assert!(!system.try_active_sub_dispatcher(main, CHILD_NODE));

    let child = system.create_sub_dispatcher(
        main,
        "child",
        Child {
            actor: Some(actor),
            log: log.clone(),
        },
    );
    system.active_sub_dispatcher(main, CHILD_NODE, child);
    assert_eq!(count(&log, "child:start"), 1);

    // Re-entry runs the start hook again; the first walk is still active,
    // so the new walk is a second owned action.
    assert!(system.try_active_sub_dispatcher(main, CHILD_NODE));
    assert_eq!(count(&log, "child:start"), 2);
    assert_eq!(system.dispatcher(main).unwrap().current_actions().len(), 2);
}

#[test]
fn replacing_registration_drops_previous_child() {
    let world = world();
    let actor = world.actor;
    let mut system = ActionDispatchSystem::with_entities(authority(), world.entities);
    let log = new_log();
    let main = system.create_dispatcher("hub", Scripted::new(Some(actor), &[], &log));

    let first = system.create_sub_dispatcher(main, "first", Child::default());
    system.active_sub_dispatcher(main, CHILD_NODE, first);
    let second = system.create_sub_dispatcher(main, "second", Child::default());
    system.active_sub_dispatcher(main, CHILD_NODE, second);

    assert!(system.dispatcher(first).is_none());
    assert_eq!(
        system.dispatcher(main).unwrap().sub_dispatcher(CHILD_NODE),
        Some(second)
    );
}
