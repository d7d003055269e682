use super::Execution;
use crate::game::Game;
use crate::types::{KeyToU64, StationId, StructureId, Tick};

/// Keeps a rail station attached to a structure for as long as the structure
/// stays in play.
#[derive(Debug, Clone)]
pub struct StationExecution {
    anchor: StructureId,
    station: Option<StationId>,
    active: bool,
}

impl StationExecution {
    pub fn new(anchor: StructureId) -> Self {
        Self {
            anchor,
            station: None,
            active: true,
        }
    }

    pub fn anchor(&self) -> StructureId {
        self.anchor
    }

    pub fn station(&self) -> Option<StationId> {
        self.station
    }
}

impl Execution for StationExecution {
    fn init(&mut self, _game: &mut dyn Game, _ticks: Tick) {}

    fn tick(&mut self, game: &mut dyn Game, ticks: Tick) {
        if !self.active {
            return;
        }

        let anchor_active = game
            .structure(self.anchor)
            .is_some_and(|structure| structure.is_active());
        if !anchor_active {
            let removed = match self.station {
                Some(_) => game.unregister_station(self.anchor),
                None => None,
            };
            if let Some(station) = removed {
                tracing::info!(
                    target: "station",
                    tick = ticks,
                    structure = self.anchor.to_u64(),
                    station = station.to_u64(),
                    linked = false,
                );
            }
            self.active = false;
            return;
        }

        if self.station.is_some() {
            return;
        }
        match game.register_station(self.anchor) {
            Some(station) => {
                tracing::info!(
                    target: "station",
                    tick = ticks,
                    structure = self.anchor.to_u64(),
                    station = station.to_u64(),
                    linked = true,
                );
                self.station = Some(station);
            }
            // Someone else already put a station here
            None => self.active = false,
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn active_during_spawn_phase(&self) -> bool {
        false
    }

    fn label(&self) -> &'static str {
        "station"
    }
}
