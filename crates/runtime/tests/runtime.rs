use std::sync::{Arc, Mutex};
use std::time::Duration;

use dispatch_content::{MoveGoal, MoveTo, Navigator, SequenceBinding, SequencePlayer};
use dispatch_core::{
    ActionEvent, ActionId, ActionSignal, DeclareReferences, DispatchConfig, DispatchError,
    DispatcherId, DispatcherScript, DispatcherState, EndPlayReason, EntityId, EntityKind, Persistent,
    ReferenceField, ScriptContext, SharedAvailability,
};
use dispatch_runtime::{
    DispatchRuntime, DispatcherEvent, Event, RuntimeConfig, RuntimeError, RuntimeHandle, Topic,
    WorldEvent,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Navigator handing out request ids 1, 2, ...
#[derive(Default)]
struct CountingNavigator {
    requests: Mutex<u64>,
}

impl Navigator for CountingNavigator {
    fn request_move(&self, _pawn: EntityId, _goal: &MoveGoal, _radius: f32) -> Option<u64> {
        let mut requests = self.requests.lock().unwrap();
        *requests += 1;
        Some(*requests)
    }

    fn stop_movement(&self, _pawn: EntityId, _request: u64) {}
}

struct NoSequences;

impl SequencePlayer for NoSequences {
    fn play(&self, _sequence: &str, _bindings: &[SequenceBinding]) -> Option<u64> {
        None
    }

    fn stop(&self, _playback: u64) {}
}

/// Walks `pawn` to `target` and finishes when it arrives.
#[derive(Serialize, Deserialize)]
struct Escort {
    pawn: Option<EntityId>,
    target: Option<EntityId>,
    #[serde(skip)]
    navigator: Option<Arc<CountingNavigator>>,
}

impl DeclareReferences for Escort {
    const REFERENCES: &'static [ReferenceField<Self>] =
        &[ReferenceField::new("pawn", |s| s.pawn)];
}

impl Persistent for Escort {
    const KIND: &'static str = "escort";
}

impl DispatcherScript for Escort {
    fn when_dispatch_start(&mut self, ctx: &mut ScriptContext<'_>) {
        let (Some(pawn), Some(target), Some(navigator)) =
            (self.pawn, self.target, self.navigator.clone())
        else {
            return;
        };
        let navigator: Arc<dyn Navigator> = navigator;
        ctx.activate("walk", MoveTo::new(pawn, MoveGoal::Actor(target), navigator));
    }

    fn when_action_finished(
        &mut self,
        ctx: &mut ScriptContext<'_>,
        _action: ActionId,
        event: &ActionEvent,
    ) {
        if event.name() == MoveTo::REACHED {
            ctx.finish("arrived");
        } else {
            ctx.abort();
        }
    }

    fn finish_tags(&self) -> &[&'static str] {
        &["arrived"]
    }
}

struct Fixture {
    runtime: DispatchRuntime,
    handle: RuntimeHandle,
    navigator: Arc<CountingNavigator>,
    pawn: EntityId,
    target: EntityId,
}

async fn fixture(config: RuntimeConfig) -> Fixture {
    init_tracing();
    let navigator = Arc::new(CountingNavigator::default());
    let nav: Arc<dyn Navigator> = navigator.clone();
    let mut catalog = dispatch_content::action_catalog(nav, Arc::new(NoSequences));
    catalog.register_script::<Escort>();

    let runtime = DispatchRuntime::builder()
        .config(config)
        .catalog(catalog)
        .build();
    let handle = runtime.handle();
    let pawn = handle
        .spawn_entity(
            EntityKind::Actor,
            "escort",
            Some(SharedAvailability::new(true)),
        )
        .await
        .unwrap();
    let target = handle
        .spawn_entity(EntityKind::Actor, "gate", None)
        .await
        .unwrap();

    Fixture {
        runtime,
        handle,
        navigator,
        pawn,
        target,
    }
}

impl Fixture {
    fn escort(&self) -> Escort {
        Escort {
            pawn: Some(self.pawn),
            target: Some(self.target),
            navigator: Some(self.navigator.clone()),
        }
    }
}

async fn next(rx: &mut broadcast::Receiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("event in time")
        .expect("bus open")
}

fn lifecycle(event: Event) -> DispatcherEvent {
    match event {
        Event::Lifecycle(event) => event,
        other => panic!("expected lifecycle event, got {other:?}"),
    }
}

#[tokio::test]
async fn escort_runs_to_completion() {
    let fx = fixture(RuntimeConfig::default()).await;
    let mut events = fx.handle.subscribe(Topic::Lifecycle);

    let d = fx.handle.create_dispatcher("escort", fx.escort()).await.unwrap();
    fx.handle.start(d).await.unwrap();
    assert_eq!(
        lifecycle(next(&mut events).await),
        DispatcherEvent::Started { dispatcher: d }
    );
    assert_eq!(fx.handle.active_dispatchers().await.unwrap(), vec![d]);

    let walk = fx.handle.current_actions(d).await.unwrap()[0];
    fx.handle
        .signal_action(
            walk,
            ActionSignal::Completed {
                request: 1,
                succeeded: true,
            },
        )
        .await
        .unwrap();

    assert_eq!(
        lifecycle(next(&mut events).await),
        DispatcherEvent::Deactivated { dispatcher: d }
    );
    assert_eq!(
        lifecycle(next(&mut events).await),
        DispatcherEvent::Finished { dispatcher: d }
    );
    assert_eq!(
        fx.handle.query_state(d).await.unwrap(),
        Some(DispatcherState::Deactive)
    );
    assert!(fx.handle.active_dispatchers().await.unwrap().is_empty());

    fx.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn misuse_is_reported_not_fatal() {
    let fx = fixture(RuntimeConfig::default()).await;
    let d = fx.handle.create_dispatcher("escort", fx.escort()).await.unwrap();
    fx.handle.start(d).await.unwrap();

    let err = fx.handle.start(d).await.unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Dispatch(DispatchError::UnexpectedState {
            state: DispatcherState::Active,
            expected: DispatcherState::Deactive,
            ..
        })
    ));
    assert!(matches!(
        fx.handle.set_leader(d, Some(fx.pawn)).await,
        Err(RuntimeError::Dispatch(DispatchError::UnexpectedState { .. }))
    ));
    assert!(matches!(
        fx.handle.signal_action(ActionId(999), ActionSignal::Custom("x".into())).await,
        Err(RuntimeError::Dispatch(DispatchError::UnknownAction(_)))
    ));

    // The worker is still serving.
    fx.handle.abort(d).await.unwrap();
    assert_eq!(
        fx.handle.query_state(d).await.unwrap(),
        Some(DispatcherState::Deactive)
    );
    assert!(matches!(
        fx.handle.abort(d).await,
        Err(RuntimeError::Dispatch(DispatchError::UnexpectedState { .. }))
    ));
    assert!(matches!(
        fx.handle.finish(DispatcherId(404), "arrived").await,
        Err(RuntimeError::Dispatch(DispatchError::UnknownDispatcher(_)))
    ));

    fx.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn claimed_pawn_refuses_second_escort() {
    let fx = fixture(RuntimeConfig::default()).await;
    let first = fx.handle.create_dispatcher("first", fx.escort()).await.unwrap();
    let second = fx.handle.create_dispatcher("second", fx.escort()).await.unwrap();
    fx.handle.start(first).await.unwrap();

    assert!(matches!(
        fx.handle.start(second).await,
        Err(RuntimeError::Dispatch(DispatchError::StartRefused { .. }))
    ));
    assert_eq!(
        fx.handle.query_state(second).await.unwrap(),
        Some(DispatcherState::Deactive)
    );

    fx.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn client_runtime_cannot_start() {
    let config = RuntimeConfig {
        dispatch: DispatchConfig::client(),
        ..RuntimeConfig::default()
    };
    let fx = fixture(config).await;
    let d = fx.handle.create_dispatcher("escort", fx.escort()).await.unwrap();

    assert!(matches!(
        fx.handle.start(d).await,
        Err(RuntimeError::Dispatch(DispatchError::NotAuthority(_)))
    ));

    fx.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn player_leaving_aborts_led_dispatcher() {
    let fx = fixture(RuntimeConfig::default()).await;
    let mut world = fx.handle.subscribe(Topic::World);
    let mut events = fx.handle.subscribe(Topic::Lifecycle);
    let player = fx
        .handle
        .spawn_entity(EntityKind::Player, "player", None)
        .await
        .unwrap();

    let d = fx.handle.create_dispatcher("escort", fx.escort()).await.unwrap();
    fx.handle.set_leader(d, Some(player)).await.unwrap();
    fx.handle.start(d).await.unwrap();
    fx.handle
        .destroy_entity(player, EndPlayReason::Quit)
        .await
        .unwrap();

    assert_eq!(
        next(&mut world).await,
        Event::World(WorldEvent::LeaderLost {
            leader: player,
            dispatcher: d
        })
    );
    assert_eq!(
        next(&mut world).await,
        Event::World(WorldEvent::EntityDestroyed {
            entity: player,
            reason: EndPlayReason::Quit
        })
    );
    let seen: Vec<_> = [
        next(&mut events).await,
        next(&mut events).await,
        next(&mut events).await,
    ]
    .into_iter()
    .map(lifecycle)
    .collect();
    assert_eq!(
        seen,
        vec![
            DispatcherEvent::Started { dispatcher: d },
            DispatcherEvent::Aborted { dispatcher: d },
            DispatcherEvent::Deactivated { dispatcher: d },
        ]
    );

    fx.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn unmanaged_dispatchers_stay_off_the_bus() {
    let fx = fixture(RuntimeConfig::default()).await;
    let mut events = fx.handle.subscribe(Topic::Lifecycle);

    let d = fx
        .handle
        .create_unmanaged_dispatcher("door", fx.escort())
        .await
        .unwrap();
    fx.handle.start(d).await.unwrap();

    assert_eq!(
        fx.handle.query_state(d).await.unwrap(),
        Some(DispatcherState::Active)
    );
    assert!(fx.handle.active_dispatchers().await.unwrap().is_empty());
    assert!(events.try_recv().is_err());

    fx.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn saved_escort_resumes_through_catalog() {
    let fx = fixture(RuntimeConfig::default()).await;
    let d = fx.handle.create_dispatcher("escort", fx.escort()).await.unwrap();
    fx.handle.start(d).await.unwrap();

    let snapshot = fx.handle.save(d).await.unwrap();
    assert!(snapshot.was_running());
    fx.handle.abort(d).await.unwrap();

    let restored = fx.handle.restore(snapshot).await.unwrap();
    assert_ne!(restored, d);
    assert_eq!(
        fx.handle.query_state(restored).await.unwrap(),
        Some(DispatcherState::Active)
    );
    // The restored move re-requested its path.
    assert_eq!(*fx.navigator.requests.lock().unwrap(), 2);

    let walk = fx.handle.current_actions(restored).await.unwrap()[0];
    fx.handle
        .signal_action(
            walk,
            ActionSignal::Completed {
                request: 2,
                succeeded: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(
        fx.handle.query_state(restored).await.unwrap(),
        Some(DispatcherState::Deactive)
    );

    fx.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn tick_interval_drives_the_clock() {
    let config = RuntimeConfig {
        tick_interval: Some(Duration::from_millis(2)),
        ..RuntimeConfig::default()
    };
    let fx = fixture(config).await;

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(fx.handle.tick().await.unwrap() > 1);

    fx.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn manual_ticks_count_up() {
    let fx = fixture(RuntimeConfig::default()).await;
    assert_eq!(fx.handle.tick().await.unwrap(), 1);
    assert_eq!(fx.handle.tick().await.unwrap(), 2);
    fx.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_closes_the_handle() {
    let fx = fixture(RuntimeConfig::default()).await;
    let handle = fx.handle.clone();
    fx.runtime.shutdown().await.unwrap();

    assert!(matches!(
        handle.tick().await,
        Err(RuntimeError::CommandChannelClosed)
    ));
}
