// roastero_shared: shared types and traits for the roaster host, simulator and tests

pub mod config;
pub mod hardware_traits;
pub mod pid;
pub mod recipe;
pub mod state;

pub use config::{Config, ConfigError, PidConfig, RoastConfig, SerialConfig, load_config};
pub use hardware_traits::{HardwareError, RoasterHardware};
pub use pid::{PidController, PidGains};
pub use recipe::{Recipe, RecipeError, RecipeSequencer, RoastStep};
pub use state::{Phase, RoasterState};

/// Latest actuator command, written by the thermostat and timer and sent to
/// the roaster by the comm loop on every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HardwareCommand {
    /// Heater power, 0-100 %.
    pub power: u8,
    pub fan_speed: u8,
    pub igniter: bool,
}

impl HardwareCommand {
    /// Heater and igniter off, fan untouched.
    pub fn heater_off(self) -> Self {
        Self { power: 0, igniter: false, ..self }
    }

    pub fn all_off() -> Self {
        Self::default()
    }
}
