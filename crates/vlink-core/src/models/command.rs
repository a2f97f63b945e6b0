//! Remote commands

use serde::{Deserialize, Serialize};

use super::VehicleStatus;

/// Options for starting climate control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateOptions {
    /// Target cabin temperature in °C
    pub target_temp_c: f32,
    #[serde(default)]
    pub defrost: bool,
    /// Run time in minutes
    #[serde(default = "default_climate_minutes")]
    pub duration_minutes: u8,
}

fn default_climate_minutes() -> u8 {
    10
}

impl Default for ClimateOptions {
    fn default() -> Self {
        Self {
            target_temp_c: 21.0,
            defrost: false,
            duration_minutes: default_climate_minutes(),
        }
    }
}

/// A mutating command sent to a vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    Lock,
    Unlock,
    StartClimate(ClimateOptions),
    StopClimate,
    StartCharge,
    StopCharge,
    SetChargeLimits { ac_percent: u8, dc_percent: u8 },
}

/// Payload-free command discriminant, used to identify a command for
/// deduplication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Lock,
    Unlock,
    StartClimate,
    StopClimate,
    StartCharge,
    StopCharge,
    SetChargeLimits,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Lock => CommandKind::Lock,
            Command::Unlock => CommandKind::Unlock,
            Command::StartClimate(_) => CommandKind::StartClimate,
            Command::StopClimate => CommandKind::StopClimate,
            Command::StartCharge => CommandKind::StartCharge,
            Command::StopCharge => CommandKind::StopCharge,
            Command::SetChargeLimits { .. } => CommandKind::SetChargeLimits,
        }
    }

    /// Whether `status` shows the physical effect of this command
    pub fn is_reflected_in(&self, status: &VehicleStatus) -> bool {
        match self {
            Command::Lock => status.locked,
            Command::Unlock => !status.locked,
            Command::StartClimate(_) => status.climate.active,
            Command::StopClimate => !status.climate.active,
            Command::StartCharge => status.is_charging(),
            Command::StopCharge => !status.is_charging(),
            Command::SetChargeLimits {
                ac_percent,
                dc_percent,
            } => status.charge.as_ref().is_some_and(|c| {
                c.ac_limit_percent == Some(*ac_percent) && c.dc_limit_percent == Some(*dc_percent)
            }),
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CommandKind::Lock => "lock",
            CommandKind::Unlock => "unlock",
            CommandKind::StartClimate => "start_climate",
            CommandKind::StopClimate => "stop_climate",
            CommandKind::StartCharge => "start_charge",
            CommandKind::StopCharge => "stop_charge",
            CommandKind::SetChargeLimits => "set_charge_limits",
        };
        write!(f, "{}", s)
    }
}
