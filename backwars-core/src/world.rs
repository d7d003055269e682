// In-memory host world: map, players, structures, rail stations and ledger

use std::sync::Arc;

use slotmap::SlotMap;
use thiserror::Error;

use crate::config::Config;
use crate::execution::Execution;
use crate::game::{BuildOptions, Game, Ledger, RailNetwork, StructureView, TileQuery};
use crate::types::{Gold, PlayerId, StationId, StructureId, StructureKind, Tick, TileRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub name: String,
    pub gold: Gold,
    pub alive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structure {
    pub kind: StructureKind,
    pub owner: PlayerId,
    pub tile: TileRef,
    pub level: u32,
    pub active: bool,
    pub direct_link: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Station {
    pub anchor: StructureId,
}

/// One currency credit, kept for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub tick: Tick,
    pub owner: PlayerId,
    pub amount: Gold,
    pub source: TileRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("unknown player {0:?}")]
    UnknownPlayer(PlayerId),
    #[error("unknown structure {0:?}")]
    UnknownStructure(StructureId),
    #[error("cannot place {kind} at {tile}")]
    PlacementRefused { kind: StructureKind, tile: TileRef },
    #[error("{0} has no structure execution")]
    NoExecution(StructureKind),
    #[error(transparent)]
    UnknownKind(#[from] crate::types::UnknownKind),
}

/// Complete state of the host side of the game
pub struct GameWorld {
    width: u32,
    height: u32,
    ticks: Tick,
    players: SlotMap<PlayerId, Player>,
    structures: SlotMap<StructureId, Structure>,
    stations: SlotMap<StationId, Station>,
    ledger: Vec<LedgerEntry>,
    config: Option<Arc<dyn Config>>,
    queued: Vec<Box<dyn Execution>>,
}

impl GameWorld {
    pub fn new(width: u32, height: u32, config: Arc<dyn Config>) -> Self {
        let mut world = Self::without_config(width, height);
        world.config = Some(config);
        world
    }

    /// A world whose tunables are not loaded yet.
    pub fn without_config(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ticks: 0,
            players: SlotMap::with_key(),
            structures: SlotMap::with_key(),
            stations: SlotMap::with_key(),
            ledger: Vec::new(),
            config: None,
            queued: Vec::new(),
        }
    }

    pub fn set_config(&mut self, config: Arc<dyn Config>) {
        self.config = Some(config);
    }

    pub fn ticks(&self) -> Tick {
        self.ticks
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn contains(&self, tile: TileRef) -> bool {
        tile.x < self.width && tile.y < self.height
    }

    // === Players ===

    pub fn add_player(&mut self, name: impl Into<String>) -> PlayerId {
        self.players.insert(Player {
            name: name.into(),
            gold: Gold::default(),
            alive: true,
        })
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn players(&self) -> impl Iterator<Item = (PlayerId, &Player)> {
        self.players.iter()
    }

    pub fn gold(&self, id: PlayerId) -> Option<&Gold> {
        self.players.get(id).map(|p| &p.gold)
    }

    pub fn eliminate(&mut self, id: PlayerId) -> Result<(), SimError> {
        let player = self.players.get_mut(id).ok_or(SimError::UnknownPlayer(id))?;
        player.alive = false;
        Ok(())
    }

    // === Structures ===

    pub fn structure_state(&self, id: StructureId) -> Option<&Structure> {
        self.structures.get(id)
    }

    pub fn structures(&self) -> impl Iterator<Item = (StructureId, &Structure)> {
        self.structures.iter()
    }

    /// Place a structure right away, bypassing any execution.
    pub fn place_structure(
        &mut self,
        owner: PlayerId,
        kind: StructureKind,
        tile: TileRef,
    ) -> Result<StructureId, SimError> {
        if !self.players.contains_key(owner) {
            return Err(SimError::UnknownPlayer(owner));
        }
        let spawn_tile = self
            .can_build(owner, kind, tile)
            .ok_or(SimError::PlacementRefused { kind, tile })?;
        Ok(self.build_structure(owner, kind, spawn_tile, BuildOptions::default()))
    }

    /// Hand a structure to another player.
    pub fn capture(&mut self, id: StructureId, new_owner: PlayerId) -> Result<(), SimError> {
        if !self.players.contains_key(new_owner) {
            return Err(SimError::UnknownPlayer(new_owner));
        }
        let structure = self
            .structures
            .get_mut(id)
            .ok_or(SimError::UnknownStructure(id))?;
        structure.owner = new_owner;
        Ok(())
    }

    /// Take a structure out of play. Its station goes with it.
    pub fn destroy(&mut self, id: StructureId) -> Result<(), SimError> {
        let structure = self
            .structures
            .get_mut(id)
            .ok_or(SimError::UnknownStructure(id))?;
        structure.active = false;
        self.unregister_station(id);
        Ok(())
    }

    pub fn upgrade(&mut self, id: StructureId) -> Result<u32, SimError> {
        let structure = self
            .structures
            .get_mut(id)
            .ok_or(SimError::UnknownStructure(id))?;
        structure.level = structure.level.saturating_add(1);
        Ok(structure.level)
    }

    pub fn set_direct_link(&mut self, id: StructureId, linked: bool) -> Result<(), SimError> {
        let structure = self
            .structures
            .get_mut(id)
            .ok_or(SimError::UnknownStructure(id))?;
        structure.direct_link = linked;
        Ok(())
    }

    // === Rail & ledger inspection ===

    pub fn stations(&self) -> impl Iterator<Item = (StationId, &Station)> {
        self.stations.iter()
    }

    pub fn ledger(&self) -> &[LedgerEntry] {
        &self.ledger
    }

    fn occupied(&self, tile: TileRef) -> bool {
        self.structures.values().any(|s| s.active && s.tile == tile)
    }
}

impl TileQuery for GameWorld {
    fn can_build(&self, owner: PlayerId, _kind: StructureKind, tile: TileRef) -> Option<TileRef> {
        let player = self.players.get(owner)?;
        if !player.alive || !self.contains(tile) || self.occupied(tile) {
            return None;
        }
        Some(tile)
    }

    fn build_structure(
        &mut self,
        owner: PlayerId,
        kind: StructureKind,
        tile: TileRef,
        options: BuildOptions,
    ) -> StructureId {
        self.structures.insert(Structure {
            kind,
            owner,
            tile,
            level: options.level.unwrap_or(1).max(1),
            active: true,
            direct_link: false,
        })
    }

    fn structure(&self, id: StructureId) -> Option<StructureView> {
        self.structures.get(id).map(|s| StructureView {
            id,
            kind: s.kind,
            owner: s.owner,
            tile: s.tile,
            level: s.level,
            active: s.active,
            direct_link: s.direct_link,
        })
    }

    fn find_nearby(&self, tile: TileRef, radius: u32, kinds: &[StructureKind]) -> Vec<StructureId> {
        self.structures
            .iter()
            .filter(|(_, s)| s.active && kinds.contains(&s.kind) && s.tile.within(tile, radius))
            .map(|(id, _)| id)
            .collect()
    }
}

impl RailNetwork for GameWorld {
    fn find_linking_station(&self, structure: StructureId) -> Option<StationId> {
        self.stations
            .iter()
            .find(|(_, station)| station.anchor == structure)
            .map(|(id, _)| id)
    }

    fn register_station(&mut self, structure: StructureId) -> Option<StationId> {
        if self.find_linking_station(structure).is_some() {
            return None;
        }
        let anchor = self.structures.get_mut(structure).filter(|s| s.active)?;
        anchor.direct_link = true;
        Some(self.stations.insert(Station { anchor: structure }))
    }

    fn unregister_station(&mut self, structure: StructureId) -> Option<StationId> {
        let id = self.find_linking_station(structure)?;
        self.stations.remove(id);
        if let Some(anchor) = self.structures.get_mut(structure) {
            anchor.direct_link = false;
        }
        Some(id)
    }
}

impl Ledger for GameWorld {
    fn credit_currency(&mut self, owner: PlayerId, amount: Gold, source: TileRef) {
        let Some(player) = self.players.get_mut(owner) else {
            tracing::warn!(target: "ledger", tick = self.ticks, "credit for unknown player dropped");
            return;
        };
        player.gold += &amount;
        self.ledger.push(LedgerEntry {
            tick: self.ticks,
            owner,
            amount,
            source,
        });
    }
}

impl Game for GameWorld {
    fn config(&self) -> Option<Arc<dyn Config>> {
        self.config.clone()
    }

    fn add_execution(&mut self, execution: Box<dyn Execution>) {
        self.queued.push(execution);
    }

    fn take_queued_executions(&mut self) -> Vec<Box<dyn Execution>> {
        std::mem::take(&mut self.queued)
    }

    fn on_tick_start(&mut self, ticks: Tick) {
        self.ticks = ticks;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;

    fn world() -> GameWorld {
        GameWorld::new(50, 40, Arc::new(GameConfig::default()))
    }

    #[test]
    fn test_can_build_rules() {
        let mut world = world();
        let alice = world.add_player("alice");
        let tile = TileRef::new(3, 4);

        assert_eq!(world.can_build(alice, StructureKind::Farmland, tile), Some(tile));
        assert_eq!(
            world.can_build(alice, StructureKind::Farmland, TileRef::new(50, 0)),
            None,
            "off map"
        );

        let id = world.place_structure(alice, StructureKind::Factory, tile).unwrap();
        assert_eq!(world.can_build(alice, StructureKind::Farmland, tile), None, "occupied");

        world.destroy(id).unwrap();
        assert_eq!(
            world.can_build(alice, StructureKind::Farmland, tile),
            Some(tile),
            "destroyed structures free the tile"
        );

        world.eliminate(alice).unwrap();
        assert_eq!(world.can_build(alice, StructureKind::Farmland, tile), None);
    }

    #[test]
    fn test_place_structure_errors() {
        let mut world = world();
        let alice = world.add_player("alice");
        world
            .place_structure(alice, StructureKind::City, TileRef::new(1, 1))
            .unwrap();
        let err = world
            .place_structure(alice, StructureKind::City, TileRef::new(1, 1))
            .unwrap_err();
        assert_eq!(
            err,
            SimError::PlacementRefused {
                kind: StructureKind::City,
                tile: TileRef::new(1, 1)
            }
        );
    }

    #[test]
    fn test_find_nearby_filters_kind_radius_and_activity() {
        let mut world = world();
        let alice = world.add_player("alice");
        let near = world
            .place_structure(alice, StructureKind::Factory, TileRef::new(10, 10))
            .unwrap();
        world
            .place_structure(alice, StructureKind::Factory, TileRef::new(30, 30))
            .unwrap();
        world
            .place_structure(alice, StructureKind::City, TileRef::new(11, 10))
            .unwrap();

        let found = world.find_nearby(TileRef::new(12, 12), 5, &[StructureKind::Factory]);
        assert_eq!(found, vec![near]);

        world.destroy(near).unwrap();
        assert!(world
            .find_nearby(TileRef::new(12, 12), 5, &[StructureKind::Factory])
            .is_empty());
    }

    #[test]
    fn test_station_registration_sets_direct_link() {
        let mut world = world();
        let alice = world.add_player("alice");
        let farm = world
            .place_structure(alice, StructureKind::Farmland, TileRef::new(2, 2))
            .unwrap();

        let station = world.register_station(farm).unwrap();
        assert_eq!(world.find_linking_station(farm), Some(station));
        assert!(world.structure(farm).unwrap().direct_link);
        assert_eq!(world.register_station(farm), None, "one station per structure");

        world.destroy(farm).unwrap();
        assert_eq!(world.find_linking_station(farm), None);
        assert!(!world.structure(farm).unwrap().direct_link);
        assert_eq!(world.register_station(farm), None, "inactive anchor");
    }

    #[test]
    fn test_credit_accumulates_and_logs() {
        let mut world = world();
        let alice = world.add_player("alice");
        world.on_tick_start(7);
        world.credit_currency(alice, Gold::from(10u32), TileRef::new(1, 1));
        world.credit_currency(alice, Gold::from(5u32), TileRef::new(1, 1));

        assert_eq!(world.gold(alice), Some(&Gold::from(15u32)));
        assert_eq!(world.ledger().len(), 2);
        assert_eq!(world.ledger()[0].tick, 7);
    }

    #[test]
    fn test_capture_and_upgrade() {
        let mut world = world();
        let alice = world.add_player("alice");
        let bob = world.add_player("bob");
        let id = world
            .place_structure(alice, StructureKind::Bunker, TileRef::new(5, 5))
            .unwrap();

        world.capture(id, bob).unwrap();
        assert_eq!(world.structure(id).unwrap().owner, bob);
        assert_eq!(world.upgrade(id), Ok(2));
        assert_eq!(world.structure(id).unwrap().level, 2);
    }

    #[test]
    fn test_upgrade_saturates_at_max_level() {
        let mut world = world();
        let alice = world.add_player("alice");
        let id = world
            .place_structure(alice, StructureKind::Farmland, TileRef::new(5, 5))
            .unwrap();
        world.structures[id].level = u32::MAX - 1;

        assert_eq!(world.upgrade(id), Ok(u32::MAX));
        assert_eq!(world.upgrade(id), Ok(u32::MAX));
        assert_eq!(world.upgrade(StructureId::default()), Err(SimError::UnknownStructure(StructureId::default())));
    }
}
