// Trait-based interface for the roaster hardware boundary (shared)
use async_trait::async_trait;
use thiserror::Error;

/// Failure of a single exchange with the roaster. The comm loop treats every
/// variant as transient and retries with backoff.
#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("Serial port error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not connected to roaster")]
    NotConnected,
    #[error("Timeout waiting for response")]
    Timeout,
    #[error("Malformed response: {0}")]
    Protocol(String),
    #[error("Roaster rejected command: {0}")]
    Rejected(String),
}

/// Capability set the control loops need from a roaster. Each call is a single
/// fallible exchange; callers bound latency with their own timeout.
#[async_trait]
pub trait RoasterHardware: Send + Sync {
    /// Establish the link. Calling it on an open link is a no-op.
    async fn connect(&self) -> Result<(), HardwareError>;
    async fn disconnect(&self) -> Result<(), HardwareError>;
    /// Chamber temperature in whole °F.
    async fn read_current_temperature(&self) -> Result<i32, HardwareError>;
    /// Whether the roaster reports itself healthy.
    async fn read_connection_status(&self) -> Result<bool, HardwareError>;
    /// Heater power, 0-100 %.
    async fn send_power(&self, level: u8) -> Result<(), HardwareError>;
    async fn send_igniter_state(&self, on: bool) -> Result<(), HardwareError>;
    async fn send_fan_speed(&self, speed: u8) -> Result<(), HardwareError>;
}
