//! Vehicle status snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Climate control state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClimateState {
    pub active: bool,
    /// Target cabin temperature in °C
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target_temp_c: Option<f32>,
    #[serde(default)]
    pub defrost: bool,
}

/// Charging state for electrified vehicles
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargeState {
    pub plugged_in: bool,
    pub charging: bool,
    /// High-voltage battery level (0-100)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub battery_percent: Option<u8>,
    /// AC charge limit (0-100)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ac_limit_percent: Option<u8>,
    /// DC charge limit (0-100)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dc_limit_percent: Option<u8>,
}

/// Open/closed state of the body openings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpeningsState {
    #[serde(default)]
    pub doors_open: bool,
    #[serde(default)]
    pub trunk_open: bool,
    #[serde(default)]
    pub hood_open: bool,
}

/// Snapshot of a vehicle's physical state as reported by the vendor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleStatus {
    pub locked: bool,
    #[serde(default)]
    pub climate: ClimateState,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub charge: Option<ChargeState>,
    #[serde(default)]
    pub openings: OpeningsState,
    /// Remaining range in km
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub range_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub odometer_km: Option<f64>,
    /// When the vehicle last reported this state
    pub updated_at: DateTime<Utc>,
}

impl VehicleStatus {
    /// A locked, idle vehicle reported now
    pub fn new(locked: bool) -> Self {
        Self {
            locked,
            climate: ClimateState::default(),
            charge: None,
            openings: OpeningsState::default(),
            range_km: None,
            odometer_km: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_charging(&self) -> bool {
        self.charge.as_ref().map(|c| c.charging).unwrap_or(false)
    }

    pub fn battery_percent(&self) -> Option<u8> {
        self.charge.as_ref().and_then(|c| c.battery_percent)
    }
}
