//! Lifecycle of a player-requested structure.
//!
//! A [`StructureExecution`] is created when a player asks for a structure on a
//! tile. Construction is attempted on its first tick, not at creation. Once
//! built it follows the structure's owner, and if the structure type produces,
//! credits currency on a randomized cadence until the structure goes inactive.

use std::sync::Arc;

use num_traits::Zero;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Execution;
use super::station::StationExecution;
use crate::config::{Config, DEFAULT_STATION_MAX_RANGE};
use crate::game::{BuildOptions, Game, StructureView};
use crate::production::{ProductionTimer, production_amount};
use crate::types::{KeyToU64, PlayerId, StructureId, StructureKind, Tick, TileRef};

// === POLICY ===

/// What happens when the host refuses placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementPolicy {
    /// Give up on the first refusal.
    #[default]
    FailFast,
    /// Stay pending across refusals, giving up after `max_attempts` of them.
    Retry { max_attempts: u32 },
}

impl PlacementPolicy {
    fn gives_up_after(self, refusals: u32) -> bool {
        match self {
            PlacementPolicy::FailFast => true,
            PlacementPolicy::Retry { max_attempts } => refusals >= max_attempts.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductionPolicy {
    /// Whether rail connectivity scales the amount.
    pub connected_bonus: bool,
}

/// Station request made once, right after construction, when any structure of
/// `kinds` is in range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionTrigger {
    pub kinds: Vec<StructureKind>,
    /// Overrides the configured station range.
    pub radius: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructurePolicy {
    pub kind: StructureKind,
    pub placement: PlacementPolicy,
    pub production: Option<ProductionPolicy>,
    pub companion: Option<CompanionTrigger>,
}

impl StructurePolicy {
    /// A structure that is only built and tracked.
    pub fn inert(kind: StructureKind) -> Self {
        Self {
            kind,
            placement: PlacementPolicy::FailFast,
            production: None,
            companion: None,
        }
    }

    pub fn bunker() -> Self {
        Self::inert(StructureKind::Bunker)
    }

    /// Produces gold, boosted when on rails; links to the network only if a
    /// factory is nearby when it is built.
    pub fn farmland() -> Self {
        Self {
            kind: StructureKind::Farmland,
            placement: PlacementPolicy::FailFast,
            production: Some(ProductionPolicy {
                connected_bonus: true,
            }),
            companion: Some(CompanionTrigger {
                kinds: vec![StructureKind::Factory],
                radius: None,
            }),
        }
    }

    /// Policy for kinds that are driven by a structure execution.
    pub fn for_kind(kind: StructureKind) -> Option<Self> {
        match kind {
            StructureKind::Bunker => Some(Self::bunker()),
            StructureKind::Farmland => Some(Self::farmland()),
            StructureKind::Factory | StructureKind::City | StructureKind::TrainStation => None,
        }
    }

    pub fn with_placement(mut self, placement: PlacementPolicy) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_companion(mut self, companion: Option<CompanionTrigger>) -> Self {
        self.companion = companion;
        self
    }
}

// === STATE ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Pending,
    Built,
    Terminated,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Pending {
        refusals: u32,
    },
    Built {
        structure: StructureId,
        timer: Option<ProductionTimer>,
    },
    Terminated,
}

pub struct StructureExecution<R = StdRng> {
    policy: StructurePolicy,
    owner: PlayerId,
    tile: TileRef,
    phase: Phase,
    config: Option<Arc<dyn Config>>,
    rng: R,
}

impl StructureExecution<StdRng> {
    pub fn seeded(policy: StructurePolicy, owner: PlayerId, tile: TileRef, seed: u64) -> Self {
        Self::with_rng(policy, owner, tile, StdRng::seed_from_u64(seed))
    }

    pub fn bunker(owner: PlayerId, tile: TileRef, seed: u64) -> Self {
        Self::seeded(StructurePolicy::bunker(), owner, tile, seed)
    }

    pub fn farmland(owner: PlayerId, tile: TileRef, seed: u64) -> Self {
        Self::seeded(StructurePolicy::farmland(), owner, tile, seed)
    }
}

impl<R: Rng> StructureExecution<R> {
    pub fn with_rng(policy: StructurePolicy, owner: PlayerId, tile: TileRef, rng: R) -> Self {
        Self {
            policy,
            owner,
            tile,
            phase: Phase::Pending { refusals: 0 },
            config: None,
            rng,
        }
    }

    pub fn policy(&self) -> &StructurePolicy {
        &self.policy
    }

    pub fn owner(&self) -> PlayerId {
        self.owner
    }

    pub fn tile(&self) -> TileRef {
        self.tile
    }

    pub fn state(&self) -> ExecutionState {
        match self.phase {
            Phase::Pending { .. } => ExecutionState::Pending,
            Phase::Built { .. } => ExecutionState::Built,
            Phase::Terminated => ExecutionState::Terminated,
        }
    }

    pub fn structure(&self) -> Option<StructureId> {
        match self.phase {
            Phase::Built { structure, .. } => Some(structure),
            _ => None,
        }
    }

    pub fn timer(&self) -> Option<ProductionTimer> {
        match self.phase {
            Phase::Built { timer, .. } => timer,
            _ => None,
        }
    }

    /// Cached handle, refetched from the game while still missing.
    fn config(&mut self, game: &dyn Game) -> Option<Arc<dyn Config>> {
        if self.config.is_none() {
            self.config = game.config();
        }
        self.config.clone()
    }

    fn construct(&mut self, game: &mut dyn Game, ticks: Tick, refusals: u32) -> Option<StructureId> {
        let kind = self.policy.kind;
        let Some(spawn_tile) = game.can_build(self.owner, kind, self.tile) else {
            let refusals = refusals + 1;
            if self.policy.placement.gives_up_after(refusals) {
                tracing::warn!(
                    target: "placement",
                    tick = ticks,
                    owner = self.owner.to_u64(),
                    x = self.tile.x,
                    y = self.tile.y,
                    refusals = refusals,
                    "cannot build {}",
                    kind
                );
                self.phase = Phase::Terminated;
            } else {
                self.phase = Phase::Pending { refusals };
            }
            return None;
        };

        let structure =
            game.build_structure(self.owner, kind, spawn_tile, BuildOptions::default());
        let timer = self.arm_timer(game, ticks);
        self.phase = Phase::Built { structure, timer };

        tracing::info!(
            target: "construction",
            tick = ticks,
            owner = self.owner.to_u64(),
            structure = structure.to_u64(),
            kind = kind.name(),
            x = spawn_tile.x,
            y = spawn_tile.y,
        );

        self.request_companion(game, structure, ticks);
        Some(structure)
    }

    fn arm_timer(&mut self, game: &dyn Game, ticks: Tick) -> Option<ProductionTimer> {
        self.policy.production.as_ref()?;
        let tunables = self.config(game)?.production(self.policy.kind)?;
        Some(ProductionTimer::armed(&mut self.rng, tunables.interval(), ticks))
    }

    fn request_companion(&mut self, game: &mut dyn Game, structure: StructureId, ticks: Tick) {
        let Some(trigger) = self.policy.companion.clone() else {
            return;
        };
        let Some(view) = game.structure(structure) else {
            return;
        };
        let radius = trigger.radius.unwrap_or_else(|| {
            self.config(game)
                .map_or(DEFAULT_STATION_MAX_RANGE, |config| config.station_max_range())
        });

        let has_neighbor = game
            .find_nearby(view.tile, radius, &trigger.kinds)
            .into_iter()
            .any(|id| id != structure);
        if !has_neighbor {
            return;
        }

        tracing::info!(
            target: "companion",
            tick = ticks,
            owner = self.owner.to_u64(),
            structure = structure.to_u64(),
            radius = radius,
        );
        game.add_execution(Box::new(StationExecution::new(structure)));
    }

    /// Adopt the structure's live owner. Returns whether it changed.
    fn sync_owner(&mut self, live: PlayerId, ticks: Tick) -> bool {
        if self.owner == live {
            return false;
        }
        tracing::info!(
            target: "ownership",
            tick = ticks,
            from = self.owner.to_u64(),
            to = live.to_u64(),
            kind = self.policy.kind.name(),
        );
        self.owner = live;
        true
    }

    fn terminate(&mut self, structure: StructureId, ticks: Tick) {
        tracing::info!(
            target: "termination",
            tick = ticks,
            owner = self.owner.to_u64(),
            structure = structure.to_u64(),
            kind = self.policy.kind.name(),
        );
        self.phase = Phase::Terminated;
    }

    fn produce(&mut self, game: &mut dyn Game, view: &StructureView, ticks: Tick) {
        let Some(production) = self.policy.production else {
            return;
        };
        let Some(config) = self.config(game) else {
            return;
        };
        let Some(tunables) = config.production(self.policy.kind) else {
            return;
        };
        let Phase::Built { timer, .. } = &mut self.phase else {
            return;
        };
        if timer.is_none() {
            *timer = Some(ProductionTimer::armed(&mut self.rng, tunables.interval(), ticks));
            return;
        }
        let Some(armed) = timer.as_mut() else {
            return;
        };
        if !armed.is_due(ticks) {
            return;
        }

        let connected = production.connected_bonus
            && (view.direct_link || game.find_linking_station(view.id).is_some());
        let bonus = connected.then(|| config.connected_bonus());
        let amount = production_amount(&tunables.amount_per_level, view.level, bonus);

        if !amount.is_zero() {
            tracing::info!(
                target: "production",
                tick = ticks,
                owner = self.owner.to_u64(),
                structure = view.id.to_u64(),
                level = view.level,
                connected = connected,
                amount = %amount,
            );
            game.credit_currency(self.owner, amount, view.tile);
        }
        armed.rearm(&mut self.rng, tunables.interval(), ticks);
    }
}

impl<R: Rng + 'static> Execution for StructureExecution<R> {
    fn init(&mut self, game: &mut dyn Game, _ticks: Tick) {
        self.config = game.config();
    }

    fn tick(&mut self, game: &mut dyn Game, ticks: Tick) {
        let structure = match self.phase {
            Phase::Terminated => return,
            Phase::Pending { refusals } => match self.construct(game, ticks, refusals) {
                Some(structure) => structure,
                None => return,
            },
            Phase::Built { structure, .. } => structure,
        };

        let Some(view) = game.structure(structure) else {
            self.terminate(structure, ticks);
            return;
        };
        self.sync_owner(view.owner, ticks);
        if !view.is_active() {
            self.terminate(structure, ticks);
            return;
        }
        self.produce(game, &view, ticks);
    }

    fn is_active(&self) -> bool {
        !matches!(self.phase, Phase::Terminated)
    }

    fn active_during_spawn_phase(&self) -> bool {
        false
    }

    fn label(&self) -> &'static str {
        match self.policy.kind {
            StructureKind::Bunker => "bunker",
            StructureKind::Farmland => "farmland",
            _ => "structure",
        }
    }
}
