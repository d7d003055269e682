// Per-entity controllers driven by the tick scheduler

pub mod station;
pub mod structure;

pub use station::StationExecution;
pub use structure::{
    CompanionTrigger, ExecutionState, PlacementPolicy, ProductionPolicy, StructureExecution,
    StructurePolicy,
};

use crate::game::Game;
use crate::types::{PlayerId, StructureKind, Tick, TileRef};

/// A controller the scheduler calls once per tick until it reports inactive.
///
/// Calls never block and never run concurrently; everything an execution
/// touches is reached through `game` for the duration of the call.
pub trait Execution {
    fn init(&mut self, game: &mut dyn Game, ticks: Tick);

    fn tick(&mut self, game: &mut dyn Game, ticks: Tick);

    /// Once false, stays false; the scheduler drops the execution.
    fn is_active(&self) -> bool;

    fn active_during_spawn_phase(&self) -> bool;

    /// Short label for logs.
    fn label(&self) -> &'static str {
        "execution"
    }
}

/// Boxed execution for a player-requested `kind`, `None` for kinds the host
/// places directly.
pub fn for_kind(
    kind: StructureKind,
    owner: PlayerId,
    tile: TileRef,
    seed: u64,
) -> Option<Box<dyn Execution>> {
    let policy = StructurePolicy::for_kind(kind)?;
    Some(Box::new(StructureExecution::seeded(policy, owner, tile, seed)))
}
