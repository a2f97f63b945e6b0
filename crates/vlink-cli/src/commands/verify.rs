//! Login and out-of-band verification

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use vlink_client::VehicleClient;
use vlink_core::{ChallengeContext, VerificationMethod};

use crate::output::OutputContext;

const CODE_ATTEMPTS: usize = 3;

/// Establish a session, completing a verification challenge interactively
/// if the vendor raises one.
pub async fn login(
    client: &VehicleClient,
    method: Option<VerificationMethod>,
    ctx: &OutputContext,
) -> Result<()> {
    match client.initialize().await {
        Ok(()) => Ok(()),
        Err(e) if e.is_challenge() => {
            let challenge = client
                .pending_challenge()
                .context("Verification required but no challenge was recorded")?;
            complete_challenge(client, &challenge, method, ctx).await
        }
        Err(e) => Err(e).context("Login failed"),
    }
}

async fn complete_challenge(
    client: &VehicleClient,
    challenge: &ChallengeContext,
    method: Option<VerificationMethod>,
    ctx: &OutputContext,
) -> Result<()> {
    let method = pick_method(challenge, method)?;
    ctx.warn("This device must be verified before it can access the account");

    client
        .send_verification_code(method)
        .await
        .context("Failed to request a verification code")?;
    let destination = match method {
        VerificationMethod::Sms => challenge.phone_hint.as_deref(),
        VerificationMethod::Email => challenge.email_hint.as_deref(),
    };
    match destination {
        Some(hint) => eprintln!("A code was sent by {} to {}", method, hint),
        None => eprintln!("A code was sent by {}", method),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut attempt = 1;
    loop {
        eprint!("Verification code: ");
        let Some(code) = lines.next_line().await? else {
            bail!("No verification code entered");
        };
        match client.verify_code(code.trim()).await {
            Ok(()) => {
                ctx.success("Device verified");
                return Ok(());
            }
            Err(e) if attempt < CODE_ATTEMPTS => {
                ctx.error(&format!("Verification failed: {}", e));
                attempt += 1;
            }
            Err(e) => return Err(e).context("Verification failed"),
        }
    }
}

fn pick_method(
    challenge: &ChallengeContext,
    requested: Option<VerificationMethod>,
) -> Result<VerificationMethod> {
    match requested {
        Some(method) if challenge.supports(method) => Ok(method),
        Some(method) => bail!("The vendor does not offer verification by {}", method),
        None => challenge
            .methods
            .first()
            .copied()
            .context("The vendor offered no verification method"),
    }
}

/// Forget the session, tokens, and device verification
pub async fn sign_out(client: &VehicleClient, ctx: &OutputContext) -> Result<()> {
    client.sign_out().await?;
    ctx.success("Signed out");
    Ok(())
}
