//! Comm loop: polls the roaster for temperature and status and writes the
//! latest command every cycle.

use super::{LoopContext, stop_requested};
use roastero_shared::{HardwareCommand, HardwareError, RoasterHardware};
use tokio::time::{MissedTickBehavior, interval, sleep, timeout};

/// Exchanges per cycle: temperature, status, power, igniter, fan.
const EXCHANGES_PER_CYCLE: u32 = 5;

#[derive(Debug, Clone, Copy)]
struct Reading {
    temperature: i32,
    healthy: bool,
    sent: HardwareCommand,
}

async fn cycle(
    hardware: &dyn RoasterHardware,
    command: HardwareCommand,
) -> Result<Reading, HardwareError> {
    let temperature = hardware.read_current_temperature().await?;
    let healthy = hardware.read_connection_status().await?;
    let sent = if healthy { command } else { command.heater_off() };
    hardware.send_power(sent.power).await?;
    hardware.send_igniter_state(sent.igniter).await?;
    hardware.send_fan_speed(sent.fan_speed).await?;
    Ok(Reading { temperature, healthy, sent })
}

pub(crate) async fn run(ctx: LoopContext) {
    let LoopContext { shared, hardware, config, mut stop, .. } = ctx;
    let serial = &config.serial;
    let cycle_timeout = serial.io_timeout() * EXCHANGES_PER_CYCLE;
    let mut ticker = interval(serial.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures: u32 = 0;
    tracing::debug!("Comm loop started");

    loop {
        tokio::select! {
            _ = stop_requested(&mut stop) => break,
            _ = ticker.tick() => {}
        }

        let command = {
            let shared = shared.lock().await;
            if shared.state.connected {
                shared.command
            } else {
                shared.command.heater_off()
            }
        };

        let result = match timeout(cycle_timeout, cycle(hardware.as_ref(), command)).await {
            Ok(result) => result,
            Err(_) => Err(HardwareError::Timeout),
        };

        match result {
            Ok(reading) => {
                failures = 0;
                let mut shared = shared.lock().await;
                shared.state.current_temp = reading.temperature;
                shared.state.heater_power = reading.sent.power;
                if reading.healthy {
                    if !shared.state.connected {
                        tracing::info!("Roaster link restored");
                    }
                    shared.state.connected = true;
                } else {
                    if shared.state.connected {
                        tracing::error!("Roaster reports a fault, heater forced off");
                    }
                    shared.state.connected = false;
                    shared.command = shared.command.heater_off();
                }
                tracing::debug!(
                    "Comm cycle: temp={} power={} fan={} igniter={}",
                    reading.temperature,
                    reading.sent.power,
                    reading.sent.fan_speed,
                    reading.sent.igniter
                );
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                tracing::warn!("Comm cycle failed ({} in a row): {}", failures, e);

                if failures >= serial.max_consecutive_failures {
                    let mut shared = shared.lock().await;
                    if shared.state.connected {
                        tracing::error!(
                            "Lost roaster connection after {} consecutive failures",
                            failures
                        );
                    }
                    shared.state.connected = false;
                    shared.state.heater_power = 0;
                    shared.command = shared.command.heater_off();
                }

                if matches!(e, HardwareError::NotConnected) {
                    match timeout(serial.io_timeout(), hardware.connect()).await {
                        Ok(Ok(())) => tracing::info!("Reopened roaster connection"),
                        Ok(Err(e)) => tracing::debug!("Reconnect failed: {}", e),
                        Err(_) => tracing::debug!("Reconnect timed out"),
                    }
                }

                tokio::select! {
                    _ = stop_requested(&mut stop) => break,
                    _ = sleep(serial.backoff(failures)) => {}
                }
            }
        }
    }
    tracing::debug!("Comm loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::SimulatedRoaster;

    #[tokio::test]
    async fn test_cycle_writes_command() {
        let sim = SimulatedRoaster::new(200.0);
        sim.connect().await.unwrap();
        let command = HardwareCommand { power: 40, fan_speed: 6, igniter: true };
        let reading = cycle(&sim, command).await.unwrap();
        assert!(reading.healthy);
        assert_eq!(reading.temperature, 200);
        assert_eq!(reading.sent, command);
        assert_eq!(sim.power().await, 40);
        assert_eq!(sim.fan_speed().await, 6);
        assert!(sim.igniter().await);
    }

    #[tokio::test]
    async fn test_cycle_forces_heater_off_on_fault() {
        let sim = SimulatedRoaster::new(200.0);
        sim.connect().await.unwrap();
        sim.set_fault(true).await;
        let command = HardwareCommand { power: 90, fan_speed: 4, igniter: true };
        let reading = cycle(&sim, command).await.unwrap();
        assert!(!reading.healthy);
        assert_eq!(reading.sent, HardwareCommand { power: 0, fan_speed: 4, igniter: false });
        assert_eq!(sim.power().await, 0);
        assert!(!sim.igniter().await);
    }

    #[tokio::test]
    async fn test_cycle_propagates_io_failure() {
        let sim = SimulatedRoaster::new(200.0);
        sim.connect().await.unwrap();
        sim.fail_next(1).await;
        assert!(cycle(&sim, HardwareCommand::all_off()).await.is_err());
        assert!(sim.power_log().await.is_empty());
    }
}
