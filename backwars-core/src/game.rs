//! Contracts between structure executions and the host game.
//!
//! The host owns the map, the structures, the rail network and the player
//! ledgers. Executions only ever see these narrow traits, all called
//! synchronously from inside a tick.

use std::sync::Arc;

use crate::config::Config;
use crate::execution::Execution;
use crate::types::{Gold, PlayerId, StationId, StructureId, StructureKind, Tick, TileRef};

/// Point-in-time view of a built structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureView {
    pub id: StructureId,
    pub kind: StructureKind,
    pub owner: PlayerId,
    pub tile: TileRef,
    /// Always at least 1.
    pub level: u32,
    pub active: bool,
    /// The structure carries its own station.
    pub direct_link: bool,
}

impl StructureView {
    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Extra placement parameters forwarded to the host on build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    pub level: Option<u32>,
}

/// Placement and spatial queries.
pub trait TileQuery {
    /// Where a `kind` structure for `owner` would land when requested at `tile`.
    /// `None` is a refusal.
    fn can_build(&self, owner: PlayerId, kind: StructureKind, tile: TileRef) -> Option<TileRef>;

    /// Place a structure. Must succeed when `can_build` returned `tile` this tick.
    fn build_structure(
        &mut self,
        owner: PlayerId,
        kind: StructureKind,
        tile: TileRef,
        options: BuildOptions,
    ) -> StructureId;

    /// `None` once the host has forgotten the structure entirely.
    fn structure(&self, id: StructureId) -> Option<StructureView>;

    /// Active structures of `kinds` within `radius` of `tile`, in no particular order.
    fn find_nearby(&self, tile: TileRef, radius: u32, kinds: &[StructureKind]) -> Vec<StructureId>;
}

/// Transport graph, independent from tile adjacency.
pub trait RailNetwork {
    fn find_linking_station(&self, structure: StructureId) -> Option<StationId>;

    /// Add a station anchored on `structure`. Returns `None` if the structure
    /// is gone or already has one.
    fn register_station(&mut self, structure: StructureId) -> Option<StationId>;

    fn unregister_station(&mut self, structure: StructureId) -> Option<StationId>;
}

pub trait Ledger {
    /// Add `amount` to `owner`. Callers never pass zero.
    fn credit_currency(&mut self, owner: PlayerId, amount: Gold, source: TileRef);
}

/// Everything an execution can reach during `init` and `tick`.
pub trait Game: TileQuery + RailNetwork + Ledger {
    /// Shared tunables, `None` while the host has not loaded them yet.
    fn config(&self) -> Option<Arc<dyn Config>>;

    /// Queue an execution; the scheduler picks it up after the current tick.
    fn add_execution(&mut self, execution: Box<dyn Execution>);

    /// Executions queued through `add_execution` since the last call.
    fn take_queued_executions(&mut self) -> Vec<Box<dyn Execution>>;

    /// Called by the scheduler before any execution runs for `ticks`.
    fn on_tick_start(&mut self, _ticks: Tick) {}
}
