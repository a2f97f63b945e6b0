//! Vehicles command - list the account's vehicles

use anyhow::Result;
use vlink_client::VehicleClient;

use crate::output::{OutputContext, VehicleRow};

pub async fn vehicles(client: &VehicleClient, ctx: &OutputContext) -> Result<()> {
    let vehicles = client.fetch_vehicles().await?;
    let rows: Vec<VehicleRow> = vehicles.iter().map(VehicleRow::from).collect();
    ctx.print(&rows);
    Ok(())
}
