use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use thiserror::Error;
use tsify_next::Tsify;

// ============================================================================
// IDs - Using slotmap for generational indices
// ============================================================================

new_key_type! {
    pub struct PlayerId;
    pub struct StructureId;
    pub struct StationId;
}

/// Trait for converting SlotMap keys to u64 for the WASM boundary and log fields
pub trait KeyToU64 {
    fn to_u64(self) -> u64;
}

impl KeyToU64 for PlayerId {
    fn to_u64(self) -> u64 {
        self.0.as_ffi()
    }
}

impl KeyToU64 for StructureId {
    fn to_u64(self) -> u64 {
        self.0.as_ffi()
    }
}

impl KeyToU64 for StationId {
    fn to_u64(self) -> u64 {
        self.0.as_ffi()
    }
}

pub fn player_from_u64(raw: u64) -> PlayerId {
    PlayerId::from(slotmap::KeyData::from_ffi(raw))
}

pub fn structure_from_u64(raw: u64) -> StructureId {
    StructureId::from(slotmap::KeyData::from_ffi(raw))
}

// ============================================================================
// Scalars
// ============================================================================

/// Simulation time step counter.
pub type Tick = u64;

/// Arbitrary-precision, never-negative currency.
pub type Gold = BigUint;

// ============================================================================
// Tiles
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct TileRef {
    pub x: u32,
    pub y: u32,
}

impl TileRef {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Squared euclidean distance, kept in integers so radius checks stay exact.
    pub fn distance_squared(self, other: TileRef) -> u64 {
        let dx = u64::from(self.x.abs_diff(other.x));
        let dy = u64::from(self.y.abs_diff(other.y));
        dx * dx + dy * dy
    }

    pub fn within(self, other: TileRef, radius: u32) -> bool {
        let r = u64::from(radius);
        self.distance_squared(other) <= r * r
    }
}

impl fmt::Display for TileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ============================================================================
// Structure kinds
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Tsify,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub enum StructureKind {
    // Driven by a structure execution
    Bunker,
    Farmland,
    // Placed directly by the host game
    Factory,
    City,
    TrainStation,
}

impl StructureKind {
    pub fn all() -> impl Iterator<Item = StructureKind> {
        [
            StructureKind::Bunker,
            StructureKind::Farmland,
            StructureKind::Factory,
            StructureKind::City,
            StructureKind::TrainStation,
        ]
        .into_iter()
    }

    pub fn name(self) -> &'static str {
        match self {
            StructureKind::Bunker => "Bunker",
            StructureKind::Farmland => "Farmland",
            StructureKind::Factory => "Factory",
            StructureKind::City => "City",
            StructureKind::TrainStation => "Train Station",
        }
    }
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown structure kind: {0:?}")]
pub struct UnknownKind(pub String);

impl FromStr for StructureKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        StructureKind::all()
            .find(|kind| {
                kind.name()
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .collect::<String>()
                    .to_ascii_lowercase()
                    == wanted
            })
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_is_inclusive() {
        let origin = TileRef::new(10, 10);
        assert!(origin.within(TileRef::new(13, 14), 5));
        assert!(!origin.within(TileRef::new(14, 14), 5));
        assert!(origin.within(origin, 0));
    }

    #[test]
    fn kind_parses_host_spellings() {
        assert_eq!("Farmland".parse::<StructureKind>(), Ok(StructureKind::Farmland));
        assert_eq!("bunker".parse::<StructureKind>(), Ok(StructureKind::Bunker));
        assert_eq!(
            "Train Station".parse::<StructureKind>(),
            Ok(StructureKind::TrainStation)
        );
        assert_eq!(
            "train_station".parse::<StructureKind>(),
            Ok(StructureKind::TrainStation)
        );
        assert!("Warship".parse::<StructureKind>().is_err());
    }

    #[test]
    fn ids_round_trip_through_u64() {
        let mut players: slotmap::SlotMap<PlayerId, ()> = slotmap::SlotMap::with_key();
        let id = players.insert(());
        assert_eq!(player_from_u64(id.to_u64()), id);
    }
}
