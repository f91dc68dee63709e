//! Level sequence playback.

use std::sync::Arc;

use dispatch_core::persist::decode;
use dispatch_core::{
    AbortProgress, ActionContext, ActionSignal, Catalog, DispatchableAction, EntityId,
    EntityRegistry, Persistent,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Binds an actor to a named track of the sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceBinding {
    pub binding: String,
    pub actor: EntityId,
}

/// Sequence playback service of the host.
pub trait SequencePlayer: Send + Sync {
    /// Starts playing `sequence` with `bindings`. Returns the playback id
    /// reported back through [`ActionSignal::Completed`], or `None` if the
    /// sequence could not be played.
    fn play(&self, sequence: &str, bindings: &[SequenceBinding]) -> Option<u64>;

    fn stop(&self, playback: u64);
}

/// Plays a level sequence with actors bound to its tracks.
///
/// Finishes with [`PlaySequence::FINISHED`] when playback completes and with
/// [`PlaySequence::FAILED`] if it cannot start.
#[derive(Serialize, Deserialize)]
pub struct PlaySequence {
    pub sequence: String,
    pub bindings: Vec<SequenceBinding>,
    playback: Option<u64>,
    #[serde(skip)]
    player: Option<Arc<dyn SequencePlayer>>,
}

impl PlaySequence {
    pub const FINISHED: &'static str = "finished";
    pub const FAILED: &'static str = "failed";

    pub fn new(sequence: impl Into<String>, player: Arc<dyn SequencePlayer>) -> Self {
        Self {
            sequence: sequence.into(),
            bindings: Vec::new(),
            playback: None,
            player: Some(player),
        }
    }

    pub fn bind(mut self, binding: impl Into<String>, actor: EntityId) -> Self {
        self.bindings.push(SequenceBinding {
            binding: binding.into(),
            actor,
        });
        self
    }

    pub fn playback(&self) -> Option<u64> {
        self.playback
    }

    /// Registers a loader that binds `player` to every restored sequence.
    pub fn register(catalog: &mut Catalog, player: Arc<dyn SequencePlayer>) {
        catalog.register_action_with(Self::KIND, move |bytes| {
            let mut action: PlaySequence = decode(Self::KIND, bytes)?;
            action.player = Some(player.clone());
            let action: Box<dyn DispatchableAction> = Box::new(action);
            Ok(action)
        });
    }

    fn start(&mut self, ctx: &mut ActionContext<'_>) {
        let playback = self
            .player
            .as_ref()
            .and_then(|player| player.play(&self.sequence, &self.bindings));
        match playback {
            Some(playback) => {
                info!("playing sequence `{}` ({})", self.sequence, playback);
                self.playback = Some(playback);
            }
            None => {
                warn!("sequence `{}` could not be played", self.sequence);
                ctx.finish(Self::FAILED);
            }
        }
    }

    fn stop(&mut self) {
        if let Some(playback) = self.playback.take()
            && let Some(player) = self.player.as_ref()
        {
            debug!("stopping sequence `{}` ({})", self.sequence, playback);
            player.stop(playback);
        }
    }
}

impl Persistent for PlaySequence {
    const KIND: &'static str = "play_sequence";
}

impl DispatchableAction for PlaySequence {
    fn is_action_valid(&self, entities: &EntityRegistry) -> bool {
        self.player.is_some()
            && self
                .bindings
                .iter()
                .all(|binding| entities.is_resolvable(binding.actor))
    }

    fn when_action_actived(&mut self, ctx: &mut ActionContext<'_>) {
        self.start(ctx);
    }

    fn when_action_deactived(&mut self, _ctx: &mut ActionContext<'_>) {
        self.stop();
    }

    fn when_action_aborted(&mut self, _ctx: &mut ActionContext<'_>) -> AbortProgress {
        self.stop();
        AbortProgress::Completed
    }

    fn when_action_reactived(&mut self, ctx: &mut ActionContext<'_>) {
        // Playback restarts from the beginning after a load.
        self.playback = None;
        self.start(ctx);
    }

    fn on_signal(&mut self, ctx: &mut ActionContext<'_>, signal: &ActionSignal) {
        if let &ActionSignal::Completed { request, .. } = signal
            && self.playback == Some(request)
        {
            self.playback = None;
            ctx.finish(Self::FINISHED);
        }
    }
}

impl std::fmt::Debug for PlaySequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaySequence")
            .field("sequence", &self.sequence)
            .field("bindings", &self.bindings)
            .field("playback", &self.playback)
            .field("player", &self.player.is_some())
            .finish()
    }
}
