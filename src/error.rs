use roastero_shared::{HardwareError, RecipeError};
use thiserror::Error;

/// The roaster could not be reached when a connection was requested.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to connect to roaster: {0}")]
    Hardware(#[from] HardwareError),
    #[error("Timed out connecting to roaster")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum RoasterError {
    #[error("Invalid recipe: {0}")]
    InvalidRecipe(#[from] RecipeError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}
