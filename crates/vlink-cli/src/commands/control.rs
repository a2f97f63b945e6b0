//! Remote commands - lock, unlock, climate, charging

use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use vlink_client::{VehicleClient, WaitProgress};
use vlink_core::{Command, Vehicle};

use crate::output::{status_pairs, OutputContext};

/// Send `command` and, unless `no_wait`, wait for the vehicle to report it
pub async fn control(
    client: &VehicleClient,
    vehicle: &Vehicle,
    command: &Command,
    no_wait: bool,
    cancel: &CancellationToken,
    ctx: &OutputContext,
) -> Result<()> {
    let kind = command.kind();

    if no_wait {
        client.send_command(vehicle, command).await?;
        ctx.success(&format!("{} sent to {}", kind, vehicle.display_name()));
        return Ok(());
    }

    let pb = spinner(ctx);
    pb.set_message(format!("Sending {}...", kind));

    let schedule = client.wait_schedule();
    let report = |progress: WaitProgress| match progress {
        WaitProgress::CommandSent => pb.set_message(format!(
            "{} accepted, waiting {}s for the vehicle...",
            kind,
            schedule.initial_delay.as_secs()
        )),
        WaitProgress::Waiting {
            attempt,
            max_attempts,
        } => pb.set_message(format!("Not reported yet (check {}/{})", attempt, max_attempts)),
    };

    let result = client
        .send_command_and_wait(vehicle, command, Some(&report), cancel)
        .await;
    pb.finish_and_clear();

    match result {
        Ok(status) => {
            ctx.success(&format!("{} confirmed by {}", kind, vehicle.display_name()));
            ctx.print_kv(&status_pairs(&status), &status);
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            ctx.warn(&format!("Stopped waiting; {} was already sent", kind));
            Ok(())
        }
        Err(e) if e.is_convergence_timeout() => {
            ctx.warn(&timeout_message(command, vehicle));
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// A convergence timeout is an uncertain success: the vendor accepted the
/// command, the vehicle just has not reported it yet
fn timeout_message(command: &Command, vehicle: &Vehicle) -> String {
    format!(
        "{} was accepted but {} has not reported the change yet; check status later",
        command.kind(),
        vehicle.display_name()
    )
}

fn spinner(ctx: &OutputContext) -> ProgressBar {
    if !ctx.interactive() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
