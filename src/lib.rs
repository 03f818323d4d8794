// roastero-rs: roaster hardware-control core and its HTTP status API

pub mod error;
pub mod hardware;
pub mod roaster;
pub mod web;

pub use error::{ConnectionError, RoasterError};
pub use roaster::Roaster;
pub use roastero_shared::{
    Config, HardwareCommand, Phase, PidController, PidGains, Recipe, RecipeError, RecipeSequencer,
    RoastStep, RoasterState,
};
