//! Shared fixtures: logged actions and scripts that record every hook into a
//! shared log.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use dispatch_core::{
    AbortProgress, ActionContext, ActionEvent, ActionId, ActionSignal, DeclareReferences,
    DispatchConfig, DispatchableAction, DispatcherScript, EntityId, EntityKind, EntityRegistry,
    FinishTag, NodeId, Persistent, ReferenceField, ScriptContext, SharedAvailability,
};
use serde::{Deserialize, Serialize};

pub type Log = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().expect("log poisoned").clone()
}

pub fn count(log: &Log, entry: &str) -> usize {
    entries(log).iter().filter(|e| *e == entry).count()
}

fn record(log: &Log, entry: String) {
    log.lock().expect("log poisoned").push(entry);
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A world with one dispatch-capable actor.
pub struct World {
    pub entities: EntityRegistry,
    pub actor: EntityId,
    pub availability: SharedAvailability,
}

pub fn world() -> World {
    init_tracing();
    let mut entities = EntityRegistry::new();
    let availability = SharedAvailability::new(true);
    let actor = entities.spawn_dispatchable(EntityKind::Actor, "guard", availability.clone());
    World {
        entities,
        actor,
        availability,
    }
}

pub fn authority() -> DispatchConfig {
    DispatchConfig::new().with_abort_timeout(None)
}

// ===== actions =====

/// Action recording its hooks as `label:hook`.
///
/// Signals: `finish` finishes with event `done`, `abort` requests an abort of
/// the owning dispatcher.
#[derive(Default, Serialize, Deserialize)]
pub struct Logged {
    pub label: String,
    pub pending_abort: bool,
    pub invalid: bool,
    #[serde(skip)]
    pub log: Log,
}

impl Logged {
    pub fn new(label: &str, log: &Log) -> Self {
        Self {
            label: label.to_owned(),
            log: log.clone(),
            ..Self::default()
        }
    }

    pub fn pending(mut self) -> Self {
        self.pending_abort = true;
        self
    }

    pub fn invalid(mut self) -> Self {
        self.invalid = true;
        self
    }

    fn note(&self, hook: &str) {
        record(&self.log, format!("{}:{}", self.label, hook));
    }
}

impl Persistent for Logged {
    const KIND: &'static str = "logged";
}

impl DispatchableAction for Logged {
    fn is_action_valid(&self, _entities: &EntityRegistry) -> bool {
        !self.invalid
    }

    fn when_action_actived(&mut self, _ctx: &mut ActionContext<'_>) {
        self.note("actived");
    }

    fn when_action_deactived(&mut self, _ctx: &mut ActionContext<'_>) {
        self.note("deactived");
    }

    fn when_action_aborted(&mut self, _ctx: &mut ActionContext<'_>) -> AbortProgress {
        self.note("aborted");
        if self.pending_abort {
            AbortProgress::Pending
        } else {
            AbortProgress::Completed
        }
    }

    fn when_action_reactived(&mut self, _ctx: &mut ActionContext<'_>) {
        self.note("reactived");
    }

    fn on_signal(&mut self, ctx: &mut ActionContext<'_>, signal: &ActionSignal) {
        match signal {
            ActionSignal::Custom(name) if name == "finish" => ctx.finish("done"),
            ActionSignal::Custom(name) if name == "abort" => ctx.request_abort_dispatch(),
            other => self.note(&format!("signal {other:?}")),
        }
    }
}

// ===== scripts =====

/// Script activating one logged action per label on start. Finishes with `done` once
/// every launched action finished.
#[derive(Default, Serialize, Deserialize)]
pub struct Scripted {
    pub actor: Option<EntityId>,
    pub labels: Vec<String>,
    pub pending: Vec<String>,
    pub remaining: usize,
    pub finish_when_done: bool,
    #[serde(skip)]
    pub log: Log,
}

impl Scripted {
    pub fn new(actor: Option<EntityId>, labels: &[&str], log: &Log) -> Self {
        Self {
            actor,
            labels: labels.iter().map(|l| (*l).to_owned()).collect(),
            log: log.clone(),
            ..Self::default()
        }
    }

    /// Logged actions with these labels answer aborts with `Pending`.
    pub fn with_pending(mut self, labels: &[&str]) -> Self {
        self.pending = labels.iter().map(|l| (*l).to_owned()).collect();
        self
    }

    pub fn finishing(mut self) -> Self {
        self.finish_when_done = true;
        self
    }
}

impl DeclareReferences for Scripted {
    const REFERENCES: &'static [ReferenceField<Self>] = &[ReferenceField::new("actor", |s| s.actor)];
}

impl Persistent for Scripted {
    const KIND: &'static str = "scripted";
}

impl DispatcherScript for Scripted {
    fn when_dispatch_start(&mut self, ctx: &mut ScriptContext<'_>) {
        record(&self.log, "script:start".to_owned());
        for label in self.labels.clone() {
            let mut action = Logged::new(&label, &self.log);
            action.pending_abort = self.pending.contains(&label);
            if ctx.activate(label.clone(), action).is_some() {
                self.remaining += 1;
            }
        }
    }

    fn when_actived(&mut self, _ctx: &mut ScriptContext<'_>) {
        record(&self.log, "script:actived".to_owned());
    }

    fn when_deactived(&mut self, _ctx: &mut ScriptContext<'_>, finished_cleanly: bool) {
        record(&self.log, format!("script:deactived {finished_cleanly}"));
    }

    fn when_action_finished(
        &mut self,
        ctx: &mut ScriptContext<'_>,
        _action: ActionId,
        event: &ActionEvent,
    ) {
        record(&self.log, format!("script:action {event}"));
        self.remaining = self.remaining.saturating_sub(1);
        if self.finish_when_done && self.remaining == 0 {
            ctx.finish("done");
        }
    }

    fn finish_tags(&self) -> &[&'static str] {
        &["done"]
    }
}

/// Main script that nests a [`Child`] under node 1 on start and finishes
/// with `all_done` when the child finishes.
#[derive(Default, Serialize, Deserialize)]
pub struct Parent {
    pub child_actor: Option<EntityId>,
    #[serde(skip)]
    pub log: Log,
}

pub const CHILD_NODE: NodeId = NodeId(1);

impl DeclareReferences for Parent {}

impl Persistent for Parent {
    const KIND: &'static str = "parent";
}

impl DispatcherScript for Parent {
    fn when_dispatch_start(&mut self, ctx: &mut ScriptContext<'_>) {
        record(&self.log, "parent:start".to_owned());
        let child = Child {
            actor: self.child_actor,
            log: self.log.clone(),
        };
        ctx.active_sub_dispatcher(CHILD_NODE, "child", child);
    }

    fn when_sub_dispatch_finished(
        &mut self,
        ctx: &mut ScriptContext<'_>,
        node: NodeId,
        tag: &FinishTag,
    ) {
        record(&self.log, format!("parent:sub {node} {tag}"));
        ctx.finish("all_done");
    }
}

/// Sub-dispatcher script activating a `walk` logged action and finishing with
/// `child_done` when it finishes.
#[derive(Default, Serialize, Deserialize)]
pub struct Child {
    pub actor: Option<EntityId>,
    #[serde(skip)]
    pub log: Log,
}

impl DeclareReferences for Child {
    const REFERENCES: &'static [ReferenceField<Self>] = &[ReferenceField::new("actor", |s| s.actor)];
}

impl Persistent for Child {
    const KIND: &'static str = "child";
}

impl DispatcherScript for Child {
    fn when_dispatch_start(&mut self, ctx: &mut ScriptContext<'_>) {
        record(&self.log, "child:start".to_owned());
        ctx.activate("walk", Logged::new("walk", &self.log));
    }

    fn when_action_finished(
        &mut self,
        ctx: &mut ScriptContext<'_>,
        _action: ActionId,
        event: &ActionEvent,
    ) {
        record(&self.log, format!("child:action {event}"));
        ctx.finish("child_done");
    }
}
