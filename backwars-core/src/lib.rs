use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wasm_bindgen::prelude::*;

pub mod config;
pub mod execution;
pub mod game;
pub mod production;
pub mod scheduler;
mod state;
pub mod types;
pub mod world;

pub use config::{Config, ConfigError, GameConfig, ProductionTunables, ReloadableConfig, ServerConfig};
pub use execution::{
    CompanionTrigger, Execution, ExecutionState, PlacementPolicy, ProductionPolicy,
    StationExecution, StructureExecution, StructurePolicy,
};
pub use game::{BuildOptions, Game, Ledger, RailNetwork, StructureView, TileQuery};
pub use production::{BonusRatio, IntervalBounds, ProductionTimer, Rounding, production_amount};
pub use scheduler::Scheduler;
pub use state::*;
pub use types::*;
pub use world::{GameWorld, LedgerEntry, SimError};

#[cfg(feature = "instrument")]
pub use instrument;

// ============================================================================
// WASM API - Simulation
// ============================================================================

#[wasm_bindgen]
pub struct Simulation {
    world: GameWorld,
    scheduler: Scheduler,
    config: Arc<ReloadableConfig>,
    seeds: StdRng, // per-execution RNG seeds
}

#[wasm_bindgen]
impl Simulation {
    #[wasm_bindgen(constructor)]
    pub fn new(width: u32, height: u32, seed: u64) -> Self {
        Self::with_spawn_phase(width, height, seed, 0)
    }

    /// Ticks numbered below `spawn_ticks` are spawn phase; structure executions
    /// first run on tick `max(spawn_ticks, 1)`.
    #[wasm_bindgen]
    pub fn with_spawn_phase(width: u32, height: u32, seed: u64, spawn_ticks: u64) -> Self {
        // Better panic messages in browser console
        console_error_panic_hook::set_once();

        let config = Arc::new(ReloadableConfig::default());
        let handle: Arc<dyn Config> = config.clone();
        Self {
            world: GameWorld::new(width, height, handle),
            scheduler: Scheduler::with_spawn_phase(spawn_ticks),
            config,
            seeds: StdRng::seed_from_u64(seed),
        }
    }

    /// Replace the tunables; running executions see them on their next read.
    #[wasm_bindgen]
    pub fn load_config(&mut self, json: &str) -> Result<(), JsError> {
        self.reload_config(json)?;
        Ok(())
    }

    #[wasm_bindgen]
    pub fn add_player(&mut self, name: &str) -> u64 {
        self.world.add_player(name).to_u64()
    }

    /// Place a host-owned structure (factory, city, ...) immediately.
    #[wasm_bindgen]
    pub fn place_structure(&mut self, player: u64, kind: &str, x: u32, y: u32) -> Result<u64, JsError> {
        let kind: StructureKind = kind.parse().map_err(SimError::from)?;
        let id = self
            .world
            .place_structure(player_from_u64(player), kind, TileRef::new(x, y))?;
        Ok(id.to_u64())
    }

    /// Queue a player build request; the structure appears on a later tick.
    #[wasm_bindgen]
    pub fn request_build(&mut self, player: u64, kind: &str, x: u32, y: u32) -> Result<(), JsError> {
        let kind: StructureKind = kind.parse().map_err(SimError::from)?;
        self.request(player_from_u64(player), kind, TileRef::new(x, y))?;
        Ok(())
    }

    #[wasm_bindgen]
    pub fn capture(&mut self, structure: u64, player: u64) -> Result<(), JsError> {
        self.world
            .capture(structure_from_u64(structure), player_from_u64(player))?;
        Ok(())
    }

    #[wasm_bindgen]
    pub fn destroy(&mut self, structure: u64) -> Result<(), JsError> {
        self.world.destroy(structure_from_u64(structure))?;
        Ok(())
    }

    #[wasm_bindgen]
    pub fn upgrade(&mut self, structure: u64) -> Result<u32, JsError> {
        Ok(self.world.upgrade(structure_from_u64(structure))?)
    }

    /// Advance the simulation by one tick
    #[wasm_bindgen]
    pub fn advance_tick(&mut self) -> u64 {
        self.scheduler.tick(&mut self.world)
    }

    #[wasm_bindgen]
    pub fn get_tick(&self) -> u64 {
        self.scheduler.ticks()
    }

    /// Get a snapshot of the current state for rendering
    #[wasm_bindgen]
    pub fn get_state_snapshot(&self) -> StateSnapshot {
        StateSnapshot::capture(&self.world, self.scheduler.ticks(), self.scheduler.labels())
    }

    #[wasm_bindgen]
    pub fn gold_of(&self, player: u64) -> Option<String> {
        self.world
            .gold(player_from_u64(player))
            .map(|gold| gold.to_string())
    }

    /// Every credit issued so far, oldest first.
    #[wasm_bindgen]
    pub fn production_log(&self) -> Result<JsValue, JsValue> {
        let credits: Vec<CreditSnapshot> = self.world.ledger().iter().map(Into::into).collect();
        serde_wasm_bindgen::to_value(&credits).map_err(Into::into)
    }
}

impl Simulation {
    pub fn world(&self) -> &GameWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut GameWorld {
        &mut self.world
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn reload_config(&self, json: &str) -> Result<(), ConfigError> {
        self.config.replace(GameConfig::from_json_str(json)?)
    }

    /// Enlist the structure execution for `kind`, seeded from the simulation RNG.
    pub fn request(&mut self, owner: PlayerId, kind: StructureKind, tile: TileRef) -> Result<(), SimError> {
        if self.world.player(owner).is_none() {
            return Err(SimError::UnknownPlayer(owner));
        }
        let seed: u64 = self.seeds.random();
        let execution = execution::for_kind(kind, owner, tile, seed).ok_or(SimError::NoExecution(kind))?;
        self.scheduler.add(&mut self.world, execution);
        Ok(())
    }

    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.advance_tick();
        }
    }
}
