mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use common::{Scripted, authority, count, new_log, world};
use dispatch_core::{
    ActionDispatchSystem, DispatchError, DispatcherState, EndPlayReason, EntityKind, LeaderLoss,
    StartRefusal,
};

#[test]
fn player_end_play_aborts_led_dispatcher() {
    let mut world = world();
    let player = world.entities.spawn(EntityKind::Player, "hero");
    let actor = world.actor;
    let mut system = ActionDispatchSystem::with_entities(authority(), world.entities);
    let log = new_log();
    let d = system.create_dispatcher("escort", Scripted::new(Some(actor), &["follow"], &log));
    system.set_leader(d, Some(player));

    let aborted = Arc::new(AtomicBool::new(false));
    let flag = aborted.clone();
    system.assign_on_abort(d, move |_, _| flag.store(true, Ordering::SeqCst));
    system.start_dispatch(d).unwrap();
    assert!(system.is_watching_leader(d));

    system.destroy_entity(player, EndPlayReason::Quit);

    assert_eq!(system.state(d), Some(DispatcherState::Deactive));
    assert!(aborted.load(Ordering::SeqCst));
    assert_eq!(count(&log, "follow:aborted"), 1);
    assert!(!system.is_watching_leader(d));
}

#[test]
fn level_unload_aborts_led_dispatcher() {
    let mut world = world();
    let level = world.entities.spawn(EntityKind::Level, "crypt");
    let actor = world.actor;
    let mut system = ActionDispatchSystem::with_entities(authority(), world.entities);
    let d = system.create_dispatcher("ambush", Scripted::new(Some(actor), &["wait"], &new_log()));
    system.set_leader(d, Some(level));
    system.start_dispatch(d).unwrap();

    // End of play is not what a level leader is watched for.
    system.leader_lost(level, LeaderLoss::EndPlay(EndPlayReason::Destroyed));
    assert_eq!(system.state(d), Some(DispatcherState::Active));

    system.unload_level(level);
    assert_eq!(system.state(d), Some(DispatcherState::Deactive));
}

#[test]
fn actor_leader_is_not_watched() {
    let mut world = world();
    let npc = world.entities.spawn(EntityKind::Actor, "merchant");
    let actor = world.actor;
    let mut system = ActionDispatchSystem::with_entities(authority(), world.entities);
    let d = system.create_dispatcher("trade", Scripted::new(Some(actor), &[], &new_log()));
    system.set_leader(d, Some(npc));
    system.start_dispatch(d).unwrap();

    assert!(!system.is_watching_leader(d));
}

#[test]
fn lost_leader_refuses_start() {
    let mut world = world();
    let player = world.entities.spawn(EntityKind::Player, "hero");
    let actor = world.actor;
    let mut system = ActionDispatchSystem::with_entities(authority(), world.entities);
    let d = system.create_dispatcher("escort", Scripted::new(Some(actor), &[], &new_log()));
    system.set_leader(d, Some(player));

    system.destroy_entity(player, EndPlayReason::RemovedFromWorld);

    assert!(matches!(
        system.start_dispatch(d),
        Err(DispatchError::StartRefused {
            refusal: StartRefusal::LeaderLost(leader),
            ..
        }) if leader == player
    ));
}

#[test]
fn deactive_dispatchers_ignore_leader_loss() {
    let mut world = world();
    let player = world.entities.spawn(EntityKind::Player, "hero");
    let actor = world.actor;
    let mut system = ActionDispatchSystem::with_entities(authority(), world.entities);
    let log = new_log();
    let d = system.create_dispatcher("escort", Scripted::new(Some(actor), &["follow"], &log));
    system.set_leader(d, Some(player));
    system.start_dispatch(d).unwrap();
    system.suspend_dispatch(d).unwrap();

    system.destroy_entity(player, EndPlayReason::Quit);

    assert_eq!(system.state(d), Some(DispatcherState::Deactive));
    assert_eq!(count(&log, "follow:aborted"), 0);
}
