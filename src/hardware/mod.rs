// src/hardware/mod.rs
pub mod protocol;
pub mod serial;
pub mod simulated;

pub use roastero_shared::hardware_traits::{HardwareError, RoasterHardware};
pub use serial::SerialRoaster;
pub use simulated::SimulatedRoaster;
