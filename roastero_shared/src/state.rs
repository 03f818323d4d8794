use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Roast lifecycle stage. Within one roast it only moves forward:
/// Idle -> Roasting -> Cooling -> Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Idle,
    Roasting,
    Cooling,
}

impl Phase {
    /// Whether the roast timer advances in this phase.
    pub fn is_active(self) -> bool {
        !matches!(self, Phase::Idle)
    }

    pub fn can_transition_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Idle, Phase::Roasting)
                | (Phase::Roasting, Phase::Cooling)
                | (Phase::Cooling, Phase::Idle)
        ) || self == next
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Roasting => "roasting",
            Phase::Cooling => "cooling",
        };
        f.write_str(name)
    }
}

/// Point-in-time roaster status. Temperatures are whole degrees Fahrenheit,
/// times are whole seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoasterState {
    pub current_temp: i32,
    /// 0 when no heating target is active.
    pub target_temp: i32,
    pub section_time: u32,
    pub total_time: u32,
    pub phase: Phase,
    pub connected: bool,
    pub fan_speed: u8,
    /// Last commanded heater power, 0-100 %.
    pub heater_power: u8,
    pub section_index: Option<usize>,
    pub started_at: Option<DateTime<Utc>>,
}

impl RoasterState {
    pub fn new(idle_temp: i32) -> Self {
        Self {
            current_temp: idle_temp,
            target_temp: 0,
            section_time: 0,
            total_time: 0,
            phase: Phase::Idle,
            connected: false,
            fan_speed: 0,
            heater_power: 0,
            section_index: None,
            started_at: None,
        }
    }

    /// Back to idle defaults. The link flag is hardware state and survives.
    pub fn reset(&mut self, idle_temp: i32) {
        let connected = self.connected;
        *self = Self::new(idle_temp);
        self.connected = connected;
    }
}

impl Default for RoasterState {
    fn default() -> Self {
        Self::new(150)
    }
}
