use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::types::{KeyToU64, StructureKind, Tick, TileRef};
use crate::world::{GameWorld, LedgerEntry};

// ============================================================================
// Serializable State Snapshot for JS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct StateSnapshot {
    pub tick: Tick,
    pub players: Vec<PlayerSnapshot>,
    pub structures: Vec<StructureSnapshot>,
    /// Structure ids carrying a station
    pub stations: Vec<u64>,
    pub executions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct PlayerSnapshot {
    pub id: u64,
    pub name: String,
    /// Decimal string, currency is unbounded
    pub gold: String,
    pub alive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct StructureSnapshot {
    pub id: u64,
    pub kind: StructureKind,
    pub owner: u64,
    pub tile: TileRef,
    pub level: u32,
    pub active: bool,
    pub linked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct CreditSnapshot {
    pub tick: Tick,
    pub owner: u64,
    pub amount: String,
    pub tile: TileRef,
}

impl From<&LedgerEntry> for CreditSnapshot {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            tick: entry.tick,
            owner: entry.owner.to_u64(),
            amount: entry.amount.to_string(),
            tile: entry.source,
        }
    }
}

impl StateSnapshot {
    pub fn capture<'a>(
        world: &GameWorld,
        tick: Tick,
        executions: impl Iterator<Item = &'a str>,
    ) -> Self {
        Self {
            tick,
            players: world
                .players()
                .map(|(id, p)| PlayerSnapshot {
                    id: id.to_u64(),
                    name: p.name.clone(),
                    gold: p.gold.to_string(),
                    alive: p.alive,
                })
                .collect(),
            structures: world
                .structures()
                .map(|(id, s)| StructureSnapshot {
                    id: id.to_u64(),
                    kind: s.kind,
                    owner: s.owner.to_u64(),
                    tile: s.tile,
                    level: s.level,
                    active: s.active,
                    linked: s.direct_link,
                })
                .collect(),
            stations: world
                .stations()
                .map(|(_, station)| station.anchor.to_u64())
                .collect(),
            executions: executions.map(str::to_string).collect(),
        }
    }
}
