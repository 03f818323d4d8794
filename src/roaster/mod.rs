// src/roaster/mod.rs - Roaster orchestrator: owns the shared state and the three control loops
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use roastero_shared::{Config, PidGains, Recipe, RoasterHardware, RoasterState};
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use uuid::Uuid;

use crate::error::{ConnectionError, RoasterError};

mod comm;
mod shared;
mod thermostat;
mod timer;

use shared::SharedState;

/// Upper bound on `RoasterHardware::connect`.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// How long clear and shutdown wait for each loop before aborting it.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything a control loop needs. Cloned once per spawned task.
#[derive(Clone)]
pub(crate) struct LoopContext {
    pub shared: Arc<Mutex<SharedState>>,
    pub hardware: Arc<dyn RoasterHardware>,
    pub config: Arc<Config>,
    pub stop: watch::Receiver<bool>,
    pub timer_wake: Arc<Notify>,
}

/// Resolves once a stop has been requested or the orchestrator is gone.
pub(crate) async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

pub struct Roaster {
    config: Arc<Config>,
    hardware: Arc<dyn RoasterHardware>,
    shared: Arc<Mutex<SharedState>>,
    stop_tx: watch::Sender<bool>,
    timer_wake: Arc<Notify>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl Roaster {
    pub fn new(config: Config, hardware: Arc<dyn RoasterHardware>) -> Self {
        let shared = SharedState::new(config.roast.idle_temp, PidGains::from(&config.pid));
        let (stop_tx, _) = watch::channel(false);
        Self {
            config: Arc::new(config),
            hardware,
            shared: Arc::new(Mutex::new(shared)),
            stop_tx,
            timer_wake: Arc::new(Notify::new()),
            tasks: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open the hardware channel and start the control loops. Calling it again
    /// while connected is a no-op.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        match timeout(CONNECT_TIMEOUT, self.hardware.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!("Roaster connect failed: {}", e);
                return Err(e.into());
            }
            Err(_) => {
                tracing::warn!("Roaster connect timed out after {:?}", CONNECT_TIMEOUT);
                return Err(ConnectionError::Timeout);
            }
        }
        self.shared.lock().await.state.connected = true;
        tracing::info!("Connected to roaster");
        self.start_loops().await;
        Ok(())
    }

    /// Validate `recipe` and begin roasting its first step. An invalid recipe
    /// leaves the current state untouched.
    pub async fn start_roast(&self, recipe: &Recipe) -> Result<(), RoasterError> {
        recipe.validate(&self.config.roast)?;
        let id = {
            let mut shared = self.shared.lock().await;
            shared.begin_roast(recipe, self.config.roast.idle_temp, Instant::now())
        };
        self.timer_wake.notify_one();
        self.start_loops().await;
        tracing::info!(
            "Roast {} started: {} steps, {}s planned{}",
            id,
            recipe.steps.len(),
            recipe.total_time,
            recipe.roast_name.as_deref().map(|n| format!(" ({})", n)).unwrap_or_default()
        );
        Ok(())
    }

    /// Abort or reset the roast. Safe in any phase: the control loops are
    /// stopped and joined before the idle defaults are written, so no stale
    /// reading or command lands afterwards. `connect` or the next
    /// `start_roast` starts them again.
    pub async fn clear_roast(&self) {
        let mut tasks = self.tasks.lock().await;
        self.stop_loops(&mut tasks).await;
        {
            let mut shared = self.shared.lock().await;
            shared.clear(self.config.roast.idle_temp);
        }

        let io_timeout = self.config.serial.io_timeout();
        if let Ok(Err(e)) = timeout(io_timeout, self.hardware.send_power(0)).await {
            tracing::debug!("Heater-off write on clear failed: {}", e);
        }
        if let Ok(Err(e)) = timeout(io_timeout, self.hardware.send_igniter_state(false)).await {
            tracing::debug!("Igniter-off write on clear failed: {}", e);
        }
        if let Ok(Err(e)) = timeout(io_timeout, self.hardware.send_fan_speed(0)).await {
            tracing::debug!("Fan-off write on clear failed: {}", e);
        }
        tracing::info!("Roast cleared");
    }

    pub async fn get_status(&self) -> RoasterState {
        self.shared.lock().await.snapshot()
    }

    /// Status and roast id read in one critical section.
    pub async fn status_with_roast_id(&self) -> (RoasterState, Option<Uuid>) {
        let shared = self.shared.lock().await;
        (shared.snapshot(), shared.roast_id)
    }

    pub async fn roast_id(&self) -> Option<Uuid> {
        self.shared.lock().await.roast_id
    }

    pub async fn set_gains(&self, p: f64, i: f64, d: f64) {
        self.shared.lock().await.gains = PidGains::new(p, i, d);
        tracing::info!("PID gains set to p={} i={} d={}", p, i, d);
    }

    pub async fn gains(&self) -> PidGains {
        self.shared.lock().await.gains
    }

    pub async fn set_target_temp(&self, target: i32) {
        self.shared.lock().await.state.target_temp = target;
    }

    pub async fn set_total_time(&self, seconds: u32) {
        self.shared.lock().await.state.total_time = seconds;
    }

    pub async fn set_section_time(&self, seconds: u32) {
        self.shared.lock().await.state.section_time = seconds;
    }

    pub async fn set_fan_speed(&self, speed: u8) {
        let mut shared = self.shared.lock().await;
        shared.state.fan_speed = speed;
        shared.command.fan_speed = speed;
    }

    /// True while every control loop is alive.
    pub async fn is_running(&self) -> bool {
        let tasks = self.tasks.lock().await;
        !tasks.is_empty() && tasks.iter().all(|task| !task.is_finished())
    }

    /// Heater off, stop and join the loops, then release the hardware.
    /// Calling it again after it has completed does nothing.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Shutting down roaster");
        {
            let mut shared = self.shared.lock().await;
            shared.command = shared.command.heater_off();
        }
        self.stop_loops(&mut tasks).await;

        let io_timeout = self.config.serial.io_timeout();
        if let Ok(Err(e)) = timeout(io_timeout, self.hardware.send_power(0)).await {
            tracing::debug!("Final heater-off write failed: {}", e);
        }
        if let Ok(Err(e)) = timeout(io_timeout, self.hardware.send_igniter_state(false)).await {
            tracing::debug!("Final igniter-off write failed: {}", e);
        }
        if let Ok(Err(e)) = timeout(io_timeout, self.hardware.disconnect()).await {
            tracing::warn!("Roaster disconnect failed: {}", e);
        }

        let mut shared = self.shared.lock().await;
        shared.state.connected = false;
        shared.state.heater_power = 0;
        tracing::info!("Roaster shut down");
    }

    /// Start the control loops if they are not running. `connect` and
    /// `start_roast` call this; calling it after a failed `connect` leaves the
    /// comm loop retrying the link in the background.
    pub async fn start_loops(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            return;
        }
        self.stop_tx.send_replace(false);
        let ctx = LoopContext {
            shared: self.shared.clone(),
            hardware: self.hardware.clone(),
            config: self.config.clone(),
            stop: self.stop_tx.subscribe(),
            timer_wake: self.timer_wake.clone(),
        };
        tasks.push(tokio::spawn(comm::run(ctx.clone())));
        tasks.push(tokio::spawn(timer::run(ctx.clone())));
        tasks.push(tokio::spawn(thermostat::run(ctx)));
        self.shut_down.store(false, Ordering::SeqCst);
        tracing::info!("Control loops started");
    }

    /// Signal stop and join every loop. The caller holds the task list lock
    /// for the whole call so no loop can be spawned in between.
    async fn stop_loops(&self, tasks: &mut Vec<JoinHandle<()>>) {
        self.stop_tx.send_replace(true);
        for mut task in tasks.drain(..) {
            match timeout(JOIN_TIMEOUT, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("Control loop ended abnormally: {}", e),
                Err(_) => {
                    tracing::warn!("Control loop did not stop within {:?}, aborting", JOIN_TIMEOUT);
                    task.abort();
                }
            }
        }
    }
}

impl std::fmt::Debug for Roaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Roaster").field("config", &self.config).finish_non_exhaustive()
    }
}
