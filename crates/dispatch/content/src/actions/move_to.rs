//! Path-following action.

use std::sync::Arc;

use dispatch_core::persist::decode;
use dispatch_core::{
    AbortProgress, ActionContext, ActionSignal, Catalog, DispatchableAction, EntityId,
    EntityRegistry, Persistent,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// World-space point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Location {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Where a pawn should go.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum MoveGoal {
    Location(Location),
    /// Follow an actor; fails if the actor leaves the world first.
    Actor(EntityId),
}

/// Path-following service of the host (AI controller, navmesh).
pub trait Navigator: Send + Sync {
    /// Starts moving `pawn` toward `goal`. Returns the request id reported
    /// back through [`ActionSignal::Completed`], or `None` if no path exists.
    fn request_move(&self, pawn: EntityId, goal: &MoveGoal, acceptance_radius: f32) -> Option<u64>;

    fn stop_movement(&self, pawn: EntityId, request: u64);
}

/// Moves a pawn to a location or actor.
///
/// Finishes with [`MoveTo::REACHED`] or [`MoveTo::UNREACHABLE`] when the
/// navigator reports the matching request completed.
#[derive(Serialize, Deserialize)]
pub struct MoveTo {
    pub pawn: EntityId,
    pub goal: MoveGoal,
    pub acceptance_radius: f32,
    request: Option<u64>,
    #[serde(skip)]
    navigator: Option<Arc<dyn Navigator>>,
}

impl MoveTo {
    pub const REACHED: &'static str = "reached";
    pub const UNREACHABLE: &'static str = "unreachable";
    pub const DEFAULT_ACCEPTANCE_RADIUS: f32 = 5.0;

    pub fn new(pawn: EntityId, goal: MoveGoal, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            pawn,
            goal,
            acceptance_radius: Self::DEFAULT_ACCEPTANCE_RADIUS,
            request: None,
            navigator: Some(navigator),
        }
    }

    pub fn with_acceptance_radius(mut self, radius: f32) -> Self {
        self.acceptance_radius = radius;
        self
    }

    /// Movement request currently in flight.
    pub fn request(&self) -> Option<u64> {
        self.request
    }

    /// Registers a loader that binds `navigator` to every restored `MoveTo`.
    pub fn register(catalog: &mut Catalog, navigator: Arc<dyn Navigator>) {
        catalog.register_action_with(Self::KIND, move |bytes| {
            let mut action: MoveTo = decode(Self::KIND, bytes)?;
            action.navigator = Some(navigator.clone());
            let action: Box<dyn DispatchableAction> = Box::new(action);
            Ok(action)
        });
    }

    fn start_moving(&mut self, ctx: &mut ActionContext<'_>) {
        let Some(navigator) = self.navigator.as_ref() else {
            warn!("move_to {} has no navigator bound", ctx.action());
            ctx.finish(Self::UNREACHABLE);
            return;
        };
        match navigator.request_move(self.pawn, &self.goal, self.acceptance_radius) {
            Some(request) => {
                debug!(
                    "{} moving to {:?} (request {})",
                    ctx.entities().debug_name(self.pawn),
                    self.goal,
                    request
                );
                self.request = Some(request);
            }
            None => {
                warn!(
                    "{} cannot reach {:?}",
                    ctx.entities().debug_name(self.pawn),
                    self.goal
                );
                ctx.finish(Self::UNREACHABLE);
            }
        }
    }

    fn stop_moving(&mut self) {
        if let Some(request) = self.request.take()
            && let Some(navigator) = self.navigator.as_ref()
        {
            navigator.stop_movement(self.pawn, request);
        }
    }
}

impl Persistent for MoveTo {
    const KIND: &'static str = "move_to";
}

impl DispatchableAction for MoveTo {
    fn is_action_valid(&self, entities: &EntityRegistry) -> bool {
        let goal_resolves = match self.goal {
            MoveGoal::Location(_) => true,
            MoveGoal::Actor(actor) => entities.is_resolvable(actor),
        };
        self.navigator.is_some() && entities.is_resolvable(self.pawn) && goal_resolves
    }

    fn when_action_actived(&mut self, ctx: &mut ActionContext<'_>) {
        self.start_moving(ctx);
    }

    fn when_action_deactived(&mut self, _ctx: &mut ActionContext<'_>) {
        self.stop_moving();
    }

    fn when_action_aborted(&mut self, _ctx: &mut ActionContext<'_>) -> AbortProgress {
        self.stop_moving();
        AbortProgress::Completed
    }

    fn when_action_reactived(&mut self, ctx: &mut ActionContext<'_>) {
        // Request ids do not survive a reload.
        self.request = None;
        self.start_moving(ctx);
    }

    fn on_signal(&mut self, ctx: &mut ActionContext<'_>, signal: &ActionSignal) {
        let &ActionSignal::Completed { request, succeeded } = signal else {
            return;
        };
        if self.request != Some(request) {
            debug!("move_to ignores stale request {}", request);
            return;
        }
        self.request = None;
        ctx.finish(if succeeded {
            Self::REACHED
        } else {
            Self::UNREACHABLE
        });
    }
}

impl std::fmt::Debug for MoveTo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoveTo")
            .field("pawn", &self.pawn)
            .field("goal", &self.goal)
            .field("acceptance_radius", &self.acceptance_radius)
            .field("request", &self.request)
            .field("navigator", &self.navigator.is_some())
            .finish()
    }
}
