//! Trip history models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single recorded trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripDetail {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Distance in kilometres
    pub distance_km: f64,
    /// Average speed in km/h
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub average_speed_kmh: Option<f64>,
    /// Maximum speed in km/h
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_speed_kmh: Option<f64>,
}

impl TripDetail {
    /// Trip duration in whole seconds (zero if the clock went backwards)
    pub fn duration_secs(&self) -> i64 {
        (self.ended_at - self.started_at).num_seconds().max(0)
    }
}
