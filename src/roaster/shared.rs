//! State shared by the control loops and the public API. Lives behind a single
//! mutex; every multi-field transition happens inside one critical section.

use chrono::Utc;
use roastero_shared::{
    HardwareCommand, Phase, PidGains, Recipe, RecipeSequencer, RoastConfig, RoastStep, RoasterState,
};
use tokio::time::Instant;
use uuid::Uuid;

/// Monotonic anchor for the roast timer. `ticks` counts whole seconds already
/// applied since `started_at`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RoastClock {
    pub started_at: Instant,
    pub ticks: u64,
}

#[derive(Debug)]
pub(crate) struct SharedState {
    pub state: RoasterState,
    pub sequencer: Option<RecipeSequencer>,
    pub command: HardwareCommand,
    pub clock: Option<RoastClock>,
    pub gains: PidGains,
    /// Bumped on every roast start so the thermostat rebuilds its PID state.
    pub roast_generation: u64,
    pub roast_id: Option<Uuid>,
}

impl SharedState {
    pub fn new(idle_temp: i32, gains: PidGains) -> Self {
        Self {
            state: RoasterState::new(idle_temp),
            sequencer: None,
            command: HardwareCommand::all_off(),
            clock: None,
            gains,
            roast_generation: 0,
            roast_id: None,
        }
    }

    /// Reset and enter Roasting on the first step of `recipe`.
    pub fn begin_roast(&mut self, recipe: &Recipe, idle_temp: i32, now: Instant) -> Uuid {
        let current_temp = self.state.current_temp;
        self.state.reset(idle_temp);
        // The measured temperature is live hardware data, not roast state.
        self.state.current_temp = current_temp;
        self.command = HardwareCommand::all_off();

        let sequencer = RecipeSequencer::new(recipe);
        if let Some(step) = sequencer.current_step().cloned() {
            self.apply_step(&step, sequencer.current_index());
        }
        self.sequencer = Some(sequencer);
        self.state.phase = Phase::Roasting;
        self.state.started_at = Some(Utc::now());
        self.clock = Some(RoastClock { started_at: now, ticks: 0 });
        self.roast_generation += 1;
        let id = Uuid::new_v4();
        self.roast_id = Some(id);
        id
    }

    /// Abort or reset: idle defaults, heater and fan commanded off.
    pub fn clear(&mut self, idle_temp: i32) {
        self.state.reset(idle_temp);
        self.sequencer = None;
        self.clock = None;
        self.command = HardwareCommand::all_off();
        self.roast_id = None;
    }

    /// Copy a step's settings into the live state and command.
    pub fn apply_step(&mut self, step: &RoastStep, index: usize) {
        self.state.target_temp = step.target_temp.unwrap_or(0);
        self.state.section_time = step.section_time;
        self.state.fan_speed = step.fan_speed;
        self.state.section_index = Some(index);
        self.command.fan_speed = step.fan_speed;
        if step.is_cooling() {
            self.command = self.command.heater_off();
        }
    }

    /// Move into Cooling. Without a cooling step the fan runs flat out for the
    /// configured cool-down.
    pub fn enter_cooling(&mut self, step: Option<(RoastStep, usize)>, roast: &RoastConfig) {
        debug_assert!(self.state.phase.can_transition_to(Phase::Cooling));
        self.state.phase = Phase::Cooling;
        match step {
            Some((step, index)) => self.apply_step(&step, index),
            None => {
                let fallback = RoastStep::cooling(roast.max_fan_speed, roast.cooldown_seconds);
                self.apply_step(&fallback, self.state.section_index.unwrap_or(0));
            }
        }
        self.command = self.command.heater_off();
    }

    /// Cooling is over. Elapsed time stays on display until the next clear.
    pub fn finish_roast(&mut self) {
        debug_assert!(self.state.phase.can_transition_to(Phase::Idle));
        self.state.phase = Phase::Idle;
        self.state.target_temp = 0;
        self.state.section_time = 0;
        self.state.fan_speed = 0;
        self.state.section_index = None;
        self.clock = None;
        self.command = HardwareCommand::all_off();
    }

    pub fn snapshot(&self) -> RoasterState {
        self.state.clone()
    }
}
