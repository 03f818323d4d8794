//! Contains the data models for API requests and responses.

use roastero_shared::{PidGains, RoasterState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current roaster status plus the id of the running roast, if any.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: RoasterState,
    pub roast_id: Option<Uuid>,
}

/// PID gains, used both to read and to replace them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainsBody {
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

impl From<PidGains> for GainsBody {
    fn from(gains: PidGains) -> Self {
        Self { p: gains.kp, i: gains.ki, d: gains.kd }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRequest {
    pub target_temp: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl ToString) -> Self {
        Self { error: error.to_string() }
    }
}
