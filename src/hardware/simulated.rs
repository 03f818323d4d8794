//! In-process roaster with a first-order thermal model and fault injection.
//! Backs `--simulate` runs and the control-loop tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use roastero_shared::{HardwareError, RoasterHardware};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Heat added per second at 100 % power, °F.
const MAX_RISE_PER_SEC: f64 = 12.0;
/// Decay rate of the gap to ambient with the fan at rest, 1/s.
const BASE_LOSS: f64 = 0.02;
/// Extra loss per fan step.
const FAN_LOSS: f64 = 0.004;
/// Power writes kept for inspection; older entries are dropped.
const POWER_LOG_CAP: usize = 512;

#[derive(Debug)]
struct SimState {
    connected: bool,
    unreachable: bool,
    offline: bool,
    fault: bool,
    fail_next: u32,
    temperature: f64,
    ambient: f64,
    noise: f64,
    power: u8,
    fan_speed: u8,
    igniter: bool,
    last_update: Option<Instant>,
    power_log: VecDeque<u8>,
    connect_calls: u32,
}

impl SimState {
    fn integrate(&mut self) {
        let now = Instant::now();
        let dt = self
            .last_update
            .map(|prev| now.saturating_duration_since(prev).as_secs_f64())
            .unwrap_or(0.0);
        self.last_update = Some(now);
        if dt <= 0.0 {
            return;
        }
        let heating = f64::from(self.power) / 100.0 * MAX_RISE_PER_SEC * dt;
        let k = BASE_LOSS + FAN_LOSS * f64::from(self.fan_speed);
        self.temperature = self.ambient + (self.temperature - self.ambient) * (-k * dt).exp() + heating;
    }

    fn check_io(&mut self) -> Result<(), HardwareError> {
        if !self.connected {
            return Err(HardwareError::NotConnected);
        }
        if self.offline {
            return Err(HardwareError::Timeout);
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(HardwareError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "injected failure",
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct SimulatedRoaster {
    state: Mutex<SimState>,
}

impl SimulatedRoaster {
    pub fn new(start_temp: f64) -> Self {
        Self {
            state: Mutex::new(SimState {
                connected: false,
                unreachable: false,
                offline: false,
                fault: false,
                fail_next: 0,
                temperature: start_temp,
                ambient: start_temp,
                noise: 0.0,
                power: 0,
                fan_speed: 0,
                igniter: false,
                last_update: None,
                power_log: VecDeque::with_capacity(POWER_LOG_CAP),
                connect_calls: 0,
            }),
        }
    }

    /// Add uniform sensor noise of the given peak-to-peak amplitude, °F.
    pub fn with_noise(mut self, amplitude: f64) -> Self {
        self.state.get_mut().noise = amplitude.abs();
        self
    }

    /// Make `connect` fail, as if no device were attached.
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().await.unreachable = unreachable;
    }

    /// While offline every exchange times out.
    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    /// Report `STATUS FAULT` while set.
    pub async fn set_fault(&self, fault: bool) {
        self.state.lock().await.fault = fault;
    }

    /// Fail the next `count` exchanges with an I/O error.
    pub async fn fail_next(&self, count: u32) {
        self.state.lock().await.fail_next = count;
    }

    pub async fn set_temperature(&self, temperature: f64) {
        let mut state = self.state.lock().await;
        state.temperature = temperature;
        state.last_update = Some(Instant::now());
    }

    pub async fn power(&self) -> u8 {
        self.state.lock().await.power
    }

    pub async fn fan_speed(&self) -> u8 {
        self.state.lock().await.fan_speed
    }

    pub async fn igniter(&self) -> bool {
        self.state.lock().await.igniter
    }

    /// The most recent accepted power levels, oldest first.
    pub async fn power_log(&self) -> Vec<u8> {
        self.state.lock().await.power_log.iter().copied().collect()
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }

    pub async fn connect_calls(&self) -> u32 {
        self.state.lock().await.connect_calls
    }
}

#[async_trait]
impl RoasterHardware for SimulatedRoaster {
    async fn connect(&self) -> Result<(), HardwareError> {
        let mut state = self.state.lock().await;
        state.connect_calls += 1;
        if state.unreachable {
            return Err(HardwareError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "simulated roaster unreachable",
            )));
        }
        if !state.connected {
            tracing::info!("Simulated roaster connected");
            state.connected = true;
            state.last_update = Some(Instant::now());
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), HardwareError> {
        let mut state = self.state.lock().await;
        state.connected = false;
        state.power = 0;
        state.igniter = false;
        Ok(())
    }

    async fn read_current_temperature(&self) -> Result<i32, HardwareError> {
        let mut state = self.state.lock().await;
        state.check_io()?;
        state.integrate();
        let noise = if state.noise > 0.0 {
            state.noise * (rand::random::<f64>() - 0.5)
        } else {
            0.0
        };
        Ok((state.temperature + noise).round() as i32)
    }

    async fn read_connection_status(&self) -> Result<bool, HardwareError> {
        let mut state = self.state.lock().await;
        state.check_io()?;
        Ok(!state.fault)
    }

    async fn send_power(&self, level: u8) -> Result<(), HardwareError> {
        let mut state = self.state.lock().await;
        state.check_io()?;
        state.integrate();
        state.power = level.min(100);
        let power = state.power;
        if state.power_log.len() == POWER_LOG_CAP {
            state.power_log.pop_front();
        }
        state.power_log.push_back(power);
        Ok(())
    }

    async fn send_igniter_state(&self, on: bool) -> Result<(), HardwareError> {
        let mut state = self.state.lock().await;
        state.check_io()?;
        state.integrate();
        state.igniter = on;
        Ok(())
    }

    async fn send_fan_speed(&self, speed: u8) -> Result<(), HardwareError> {
        let mut state = self.state.lock().await;
        state.check_io()?;
        state.integrate();
        state.fan_speed = speed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_heats_under_power_and_cools_without() {
        let sim = SimulatedRoaster::new(150.0);
        sim.connect().await.unwrap();
        sim.send_fan_speed(5).await.unwrap();
        sim.send_power(100).await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        let hot = sim.read_current_temperature().await.unwrap();
        assert!(hot > 200, "expected heating, got {}", hot);

        sim.send_power(0).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        let cooler = sim.read_current_temperature().await.unwrap();
        assert!(cooler < hot);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let sim = SimulatedRoaster::new(150.0);
        assert!(matches!(sim.read_current_temperature().await, Err(HardwareError::NotConnected)));
        sim.connect().await.unwrap();
        sim.fail_next(2).await;
        assert!(sim.send_power(10).await.is_err());
        assert!(sim.send_power(10).await.is_err());
        assert!(sim.send_power(10).await.is_ok());
        sim.set_offline(true).await;
        assert!(matches!(sim.read_connection_status().await, Err(HardwareError::Timeout)));
        sim.set_offline(false).await;
        sim.set_fault(true).await;
        assert!(!sim.read_connection_status().await.unwrap());
        assert_eq!(sim.power_log().await, vec![10]);
    }

    #[tokio::test]
    async fn test_power_log_keeps_only_recent_writes() {
        let sim = SimulatedRoaster::new(150.0);
        sim.connect().await.unwrap();
        for i in 0..(POWER_LOG_CAP + 40) {
            sim.send_power((i % 100) as u8).await.unwrap();
        }
        let log = sim.power_log().await;
        assert_eq!(log.len(), POWER_LOG_CAP);
        assert_eq!(log[0], 40);
        assert_eq!(*log.last().unwrap(), ((POWER_LOG_CAP + 39) % 100) as u8);
    }

    #[tokio::test]
    async fn test_unreachable_connect() {
        let sim = SimulatedRoaster::new(150.0);
        sim.set_unreachable(true).await;
        assert!(sim.connect().await.is_err());
        assert!(!sim.is_connected().await);
        assert_eq!(sim.connect_calls().await, 1);
    }
}
