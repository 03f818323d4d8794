//! Shared configuration logic for the roaster host, simulator and tests.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud = 115200
//! poll_interval_ms = 250
//!
//! [pid]
//! kp = 0.06
//! ki = 0.90
//! kd = 0.90
//!
//! [roast]
//! max_target_temp = 550
//! cooldown_seconds = 60
//! ```
//!
//! Every table and every key is optional; missing values fall back to the
//! defaults below.
//!
//! ```rust
//! use roastero_shared::config::Config;
//! let config: Config = toml::from_str("[pid]\nkp = 1.5\n").unwrap();
//! assert_eq!(config.pid.kp, 1.5);
//! assert_eq!(config.serial.baud, 115200);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub pid: PidConfig,
    #[serde(default)]
    pub roast: RoastConfig,
}

/// Hardware link settings used by the comm loop.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound for one complete read/write exchange with the roaster.
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
    /// Consecutive failed cycles before the link is reported as down.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud: default_baud(),
            poll_interval_ms: default_poll_interval_ms(),
            io_timeout_ms: default_io_timeout_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl SerialConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    /// Delay before the next attempt after `failures` consecutive failures.
    /// Doubles per failure and saturates at `backoff_max_ms`.
    pub fn backoff(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(16);
        let millis = self
            .backoff_base_ms
            .saturating_mul(1u64 << shift)
            .min(self.backoff_max_ms);
        Duration::from_millis(millis)
    }
}

/// Thermostat gains and limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PidConfig {
    #[serde(default = "default_kp")]
    pub kp: f64,
    #[serde(default = "default_ki")]
    pub ki: f64,
    #[serde(default = "default_kd")]
    pub kd: f64,
    /// Anti-windup bound applied symmetrically to the integral accumulator.
    #[serde(default = "default_integral_limit")]
    pub integral_limit: f64,
    #[serde(default = "default_output_min")]
    pub output_min: f64,
    #[serde(default = "default_output_max")]
    pub output_max: f64,
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: default_kp(),
            ki: default_ki(),
            kd: default_kd(),
            integral_limit: default_integral_limit(),
            output_min: default_output_min(),
            output_max: default_output_max(),
            period_ms: default_period_ms(),
        }
    }
}

impl PidConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Roast-level limits and defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoastConfig {
    /// Reported chamber temperature while idle and after a clear.
    #[serde(default = "default_idle_temp")]
    pub idle_temp: i32,
    #[serde(default = "default_max_target_temp")]
    pub max_target_temp: i32,
    #[serde(default = "default_min_fan_speed")]
    pub min_fan_speed: u8,
    #[serde(default = "default_max_fan_speed")]
    pub max_fan_speed: u8,
    /// Cooling time used when a recipe ends on a heating step.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u32,
}

impl Default for RoastConfig {
    fn default() -> Self {
        Self {
            idle_temp: default_idle_temp(),
            max_target_temp: default_max_target_temp(),
            min_fan_speed: default_min_fan_speed(),
            max_fan_speed: default_max_fan_speed(),
            cooldown_seconds: default_cooldown_seconds(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("serial.poll_interval_ms must be > 0".into()));
        }
        if self.serial.io_timeout_ms == 0 {
            return Err(ConfigError::Invalid("serial.io_timeout_ms must be > 0".into()));
        }
        if self.serial.max_consecutive_failures == 0 {
            return Err(ConfigError::Invalid(
                "serial.max_consecutive_failures must be at least 1".into(),
            ));
        }
        if self.serial.backoff_base_ms > self.serial.backoff_max_ms {
            return Err(ConfigError::Invalid(
                "serial.backoff_base_ms exceeds serial.backoff_max_ms".into(),
            ));
        }
        if self.pid.period_ms == 0 {
            return Err(ConfigError::Invalid("pid.period_ms must be > 0".into()));
        }
        if !(self.pid.output_min < self.pid.output_max) {
            return Err(ConfigError::Invalid(format!(
                "pid output range [{}, {}] is empty",
                self.pid.output_min, self.pid.output_max
            )));
        }
        if !(self.pid.integral_limit >= 0.0) {
            return Err(ConfigError::Invalid("pid.integral_limit must be >= 0".into()));
        }
        if self.roast.min_fan_speed > self.roast.max_fan_speed {
            return Err(ConfigError::Invalid("roast fan speed range is empty".into()));
        }
        Ok(())
    }
}

fn default_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud() -> u32 { 115200 }
fn default_poll_interval_ms() -> u64 { 250 }
fn default_io_timeout_ms() -> u64 { 200 }
fn default_max_consecutive_failures() -> u32 { 5 }
fn default_backoff_base_ms() -> u64 { 50 }
fn default_backoff_max_ms() -> u64 { 1000 }
fn default_kp() -> f64 { 0.06 }
fn default_ki() -> f64 { 0.90 }
fn default_kd() -> f64 { 0.90 }
fn default_integral_limit() -> f64 { 100.0 }
fn default_output_min() -> f64 { 0.0 }
fn default_output_max() -> f64 { 100.0 }
fn default_period_ms() -> u64 { 500 }
fn default_idle_temp() -> i32 { 150 }
fn default_max_target_temp() -> i32 { 550 }
fn default_min_fan_speed() -> u8 { 1 }
fn default_max_fan_speed() -> u8 { 9 }
fn default_cooldown_seconds() -> u32 { 60 }

pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let config: Config = match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                return Err(ConfigError::Toml(e));
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            return Err(ConfigError::Io(e));
        }
    };
    config.validate()?;
    Ok(config)
}
