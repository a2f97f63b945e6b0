//! Status command - current vehicle status

use anyhow::Result;
use colored::Colorize;
use vlink_client::VehicleClient;
use vlink_core::Vehicle;

use crate::output::{status_pairs, OutputContext};

pub async fn status(client: &VehicleClient, vehicle: &Vehicle, ctx: &OutputContext) -> Result<()> {
    let status = client.fetch_vehicle_status(vehicle).await?;

    if ctx.interactive() {
        println!("{}", vehicle.display_name().bold());
    }
    ctx.print_kv(&status_pairs(&status), &status);
    Ok(())
}
