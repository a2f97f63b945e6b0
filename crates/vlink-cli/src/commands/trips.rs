//! Trips command - recent trip details

use anyhow::Result;
use vlink_client::VehicleClient;
use vlink_core::Vehicle;

use crate::output::{OutputContext, TripRow};

pub async fn trips(client: &VehicleClient, vehicle: &Vehicle, ctx: &OutputContext) -> Result<()> {
    match client.fetch_trip_details(vehicle).await? {
        Some(trips) => {
            let rows: Vec<TripRow> = trips.iter().map(TripRow::from).collect();
            ctx.print(&rows);
        }
        None => ctx.info("No trip information available for this vehicle"),
    }
    Ok(())
}
