// Tick scheduler: runs every live execution once per tick, in insertion order

use crate::execution::Execution;
use crate::game::Game;
use crate::types::Tick;

pub struct Scheduler {
    executions: Vec<Box<dyn Execution>>,
    ticks: Tick,
    /// Ticks numbered below this one belong to the spawn phase.
    spawn_phase_end: Tick,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_spawn_phase(0)
    }

    /// Executions that are not active during spawn are skipped on ticks
    /// `1..spawn_ticks` and first run on tick `spawn_ticks`.
    pub fn with_spawn_phase(spawn_ticks: Tick) -> Self {
        Self {
            executions: Vec::new(),
            ticks: 0,
            spawn_phase_end: spawn_ticks,
        }
    }

    pub fn ticks(&self) -> Tick {
        self.ticks
    }

    pub fn in_spawn_phase(&self) -> bool {
        self.ticks < self.spawn_phase_end
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.executions.iter().map(|e| e.label())
    }

    /// Initialise and enlist an execution. It first runs on the next tick.
    pub fn add(&mut self, game: &mut dyn Game, mut execution: Box<dyn Execution>) {
        execution.init(game, self.ticks);
        self.executions.push(execution);
    }

    /// Advance one tick and return its number.
    pub fn tick(&mut self, game: &mut dyn Game) -> Tick {
        self.ticks += 1;
        let ticks = self.ticks;
        let spawn_phase = self.in_spawn_phase();
        game.on_tick_start(ticks);

        for execution in self.executions.iter_mut() {
            if spawn_phase && !execution.active_during_spawn_phase() {
                continue;
            }
            if execution.is_active() {
                execution.tick(game, ticks);
            }
        }

        let before = self.executions.len();
        self.executions.retain(|e| e.is_active());
        let retired = before - self.executions.len();

        let queued = game.take_queued_executions();
        let spawned = queued.len();
        for execution in queued {
            self.add(game, execution);
        }

        if retired > 0 || spawned > 0 {
            tracing::debug!(
                target: "scheduler",
                tick = ticks,
                retired = retired as u64,
                spawned = spawned as u64,
                live = self.executions.len() as u64,
            );
        }
        ticks
    }
}
