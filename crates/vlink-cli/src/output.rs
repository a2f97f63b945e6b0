//! Output formatting for vlink (table, json, csv)

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};
use vlink_core::{TripDetail, Vehicle, VehicleStatus};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Whether progress decorations (spinners, hints) should be drawn
    pub fn interactive(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Table
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print data in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    if !self.quiet {
                        println!("No data");
                    }
                } else {
                    println!("{}", Table::new(data));
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string())
                );
            }
            OutputFormat::Csv => print_csv(data),
        }
    }

    /// Print key-value pairs, or `raw` as JSON in JSON mode
    pub fn print_kv<T: Serialize>(&self, pairs: &[(&str, String)], raw: &T) {
        match self.format {
            OutputFormat::Table => {
                for (key, value) in pairs {
                    println!("{}: {}", key.bold(), value);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(raw).unwrap_or_else(|_| "{}".to_string())
                );
            }
            OutputFormat::Csv => {
                let keys: Vec<&str> = pairs.iter().map(|(k, _)| *k).collect();
                println!("{}", keys.join(","));
                let values: Vec<String> = pairs.iter().map(|(_, v)| escape_csv(v)).collect();
                println!("{}", values.join(","));
            }
        }
    }
}

/// Print data as CSV
fn print_csv<T: Serialize>(data: &[T]) {
    let Some(first) = data.first() else {
        return;
    };

    // Field order follows the first row
    let first = serde_json::to_value(first).unwrap_or_default();
    if let serde_json::Value::Object(map) = &first {
        let headers: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
        println!("{}", headers.join(","));

        for item in data {
            if let Ok(serde_json::Value::Object(row)) = serde_json::to_value(item) {
                let values: Vec<String> = headers
                    .iter()
                    .map(|h| {
                        row.get(*h)
                            .map(|v| match v {
                                serde_json::Value::String(s) => escape_csv(s),
                                other => escape_csv(&other.to_string()),
                            })
                            .unwrap_or_default()
                    })
                    .collect();
                println!("{}", values.join(","));
            }
        }
    }
}

/// Escape a value for CSV output
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn on_off(value: bool) -> String {
    if value { "on" } else { "off" }.to_string()
}

// =============================================================================
// Display types for various commands
// =============================================================================

/// Vehicle display for the vehicles command
#[derive(Debug, Tabled, Serialize)]
pub struct VehicleRow {
    #[tabled(rename = "VIN")]
    pub vin: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Brand")]
    pub brand: String,
    #[tabled(rename = "Model")]
    pub model: String,
    #[tabled(rename = "Key")]
    pub key: String,
}

impl From<&Vehicle> for VehicleRow {
    fn from(v: &Vehicle) -> Self {
        let model = match (&v.model, v.year) {
            (Some(model), Some(year)) => format!("{} {}", year, model),
            (Some(model), None) => model.clone(),
            _ => "-".to_string(),
        };
        Self {
            vin: v.vin.clone(),
            name: v.display_name().to_string(),
            brand: v.brand.to_string(),
            model,
            key: or_dash(v.key.as_ref()),
        }
    }
}

/// Trip display for the trips command
#[derive(Debug, Tabled, Serialize)]
pub struct TripRow {
    #[tabled(rename = "Started")]
    pub started: String,
    #[tabled(rename = "Minutes")]
    pub minutes: i64,
    #[tabled(rename = "Distance (km)")]
    pub distance_km: String,
    #[tabled(rename = "Avg (km/h)")]
    pub average_speed: String,
    #[tabled(rename = "Max (km/h)")]
    pub max_speed: String,
}

impl From<&TripDetail> for TripRow {
    fn from(t: &TripDetail) -> Self {
        Self {
            started: t.started_at.format("%Y-%m-%d %H:%M").to_string(),
            minutes: t.duration_secs() / 60,
            distance_km: format!("{:.1}", t.distance_km),
            average_speed: or_dash(t.average_speed_kmh.map(|s| format!("{:.0}", s))),
            max_speed: or_dash(t.max_speed_kmh.map(|s| format!("{:.0}", s))),
        }
    }
}

/// Key-value view of a vehicle status
pub fn status_pairs(status: &VehicleStatus) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        ("Locked", status.locked.to_string()),
        ("Climate", on_off(status.climate.active)),
        (
            "Cabin target",
            or_dash(status.climate.target_temp_c.map(|t| format!("{:.1} °C", t))),
        ),
    ];

    if let Some(charge) = &status.charge {
        pairs.push(("Battery", or_dash(charge.battery_percent.map(|p| format!("{}%", p)))));
        pairs.push(("Plugged in", charge.plugged_in.to_string()));
        pairs.push(("Charging", charge.charging.to_string()));
        pairs.push((
            "Charge limits",
            format!(
                "AC {} / DC {}",
                or_dash(charge.ac_limit_percent.map(|p| format!("{}%", p))),
                or_dash(charge.dc_limit_percent.map(|p| format!("{}%", p)))
            ),
        ));
    }

    let openings = &status.openings;
    let open: Vec<&str> = [
        (openings.doors_open, "doors"),
        (openings.trunk_open, "trunk"),
        (openings.hood_open, "hood"),
    ]
    .iter()
    .filter(|(open, _)| *open)
    .map(|(_, name)| *name)
    .collect();
    pairs.push((
        "Open",
        if open.is_empty() {
            "none".to_string()
        } else {
            open.join(", ")
        },
    ));

    pairs.push(("Range", or_dash(status.range_km.map(|r| format!("{:.0} km", r)))));
    pairs.push(("Odometer", or_dash(status.odometer_km.map(|o| format!("{:.0} km", o)))));
    pairs.push(("Updated", status.updated_at.to_rfc3339()));
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vlink_core::{Brand, ChargeState};

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_vehicle_row() {
        let vehicle = Vehicle::new("KNDX", Brand::Kia).with_key("k-1").with_nickname("Daily");
        let row = VehicleRow::from(&vehicle);
        assert_eq!(row.name, "Daily");
        assert_eq!(row.brand, "kia");
        assert_eq!(row.key, "k-1");
        assert_eq!(row.model, "-");
    }

    #[test]
    fn test_status_pairs() {
        let mut status = VehicleStatus::new(true);
        status.charge = Some(ChargeState {
            plugged_in: true,
            charging: false,
            battery_percent: Some(64),
            ac_limit_percent: Some(80),
            dc_limit_percent: None,
        });
        status.openings.trunk_open = true;

        let pairs = status_pairs(&status);
        let get = |key: &str| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone());
        assert_eq!(get("Locked").as_deref(), Some("true"));
        assert_eq!(get("Battery").as_deref(), Some("64%"));
        assert_eq!(get("Charge limits").as_deref(), Some("AC 80% / DC -"));
        assert_eq!(get("Open").as_deref(), Some("trunk"));
    }
}
