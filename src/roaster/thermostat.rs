//! Thermostat loop: runs the PID once per control period and writes the heater
//! command the comm loop sends.

use super::shared::SharedState;
use super::{LoopContext, stop_requested};
use roastero_shared::{Phase, PidConfig, PidController};
use tokio::time::{Instant, MissedTickBehavior, interval};

/// Per-loop PID state. Rebuilt whenever a new roast starts.
#[derive(Debug)]
pub(crate) struct Thermostat {
    pid: PidController,
    generation: u64,
}

impl Thermostat {
    pub fn new(config: &PidConfig) -> Self {
        Self { pid: PidController::from_config(config), generation: 0 }
    }

    /// One control step against the shared state. Returns the commanded power.
    pub fn step(&mut self, shared: &mut SharedState, config: &PidConfig, now: Instant) -> u8 {
        if shared.roast_generation != self.generation {
            self.pid = PidController::new(
                shared.gains,
                config.integral_limit,
                config.output_min,
                config.output_max,
            );
            self.generation = shared.roast_generation;
        } else if self.pid.gains() != shared.gains {
            self.pid.set_gains(shared.gains);
        }

        let state = &shared.state;
        let heating = state.phase == Phase::Roasting && state.connected && state.target_temp > 0;
        if !heating {
            self.pid.reset();
            shared.command = shared.command.heater_off();
            return 0;
        }

        let output = self.pid.update(
            f64::from(state.target_temp),
            f64::from(state.current_temp),
            now.into_std(),
        );
        let power = output.round().clamp(0.0, 100.0) as u8;
        shared.command.power = power;
        shared.command.igniter = true;
        power
    }
}

pub(crate) async fn run(ctx: LoopContext) {
    let LoopContext { shared, config, mut stop, .. } = ctx;
    let mut thermostat = Thermostat::new(&config.pid);
    let mut ticker = interval(config.pid.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::debug!("Thermostat loop started");

    loop {
        tokio::select! {
            _ = stop_requested(&mut stop) => break,
            _ = ticker.tick() => {}
        }
        let mut shared = shared.lock().await;
        let power = thermostat.step(&mut shared, &config.pid, Instant::now());
        tracing::debug!(
            "Thermostat: target={} current={} power={}",
            shared.state.target_temp,
            shared.state.current_temp,
            power
        );
    }
    tracing::debug!("Thermostat loop stopped");
}
