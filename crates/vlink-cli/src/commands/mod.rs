//! Command implementations for vlink

pub mod control;
pub mod status;
pub mod trips;
pub mod vehicles;
pub mod verify;

pub use control::control;
pub use status::status;
pub use trips::trips;
pub use vehicles::vehicles;
pub use verify::{login, sign_out};

use anyhow::{bail, Result};
use vlink_client::VehicleClient;
use vlink_core::Vehicle;

/// Pick a vehicle by VIN or nickname. Without a selector the account must
/// have exactly one vehicle.
pub async fn resolve_vehicle(client: &VehicleClient, selector: Option<&str>) -> Result<Vehicle> {
    let vehicles = client.fetch_vehicles().await?;
    select(vehicles, selector)
}

fn select(vehicles: Vec<Vehicle>, selector: Option<&str>) -> Result<Vehicle> {
    let Some(selector) = selector else {
        return match <[Vehicle; 1]>::try_from(vehicles) {
            Ok([vehicle]) => Ok(vehicle),
            Err(vehicles) if vehicles.is_empty() => bail!("No vehicles on this account"),
            Err(vehicles) => bail!(
                "Account has {} vehicles, pick one with --vehicle <VIN or name>",
                vehicles.len()
            ),
        };
    };

    let needle = selector.to_lowercase();
    vehicles
        .into_iter()
        .find(|v| {
            v.vin.eq_ignore_ascii_case(selector)
                || v.nickname.as_deref().is_some_and(|n| n.to_lowercase() == needle)
        })
        .ok_or_else(|| anyhow::anyhow!("No vehicle matches '{}'", selector))
}
