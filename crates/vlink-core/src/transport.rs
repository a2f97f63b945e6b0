//! VehicleTransport trait - the vendor API seam

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{TransportError, TransportResult};
use crate::models::{
    AuthToken, ChallengeContext, Command, TripDetail, Vehicle, VehicleStatus, VehicleSummary,
    VerificationMethod, VerifiedSession,
};

/// A client for one vendor account.
///
/// Implementations perform the actual network calls and classify failures
/// into [`TransportError`] kinds. They hold no session state of their own
/// beyond what they were constructed with; tokens are passed per call.
#[async_trait]
pub trait VehicleTransport: Send + Sync {
    // =========================================================================
    // Authentication
    // =========================================================================

    /// Log in with the account credentials the transport was built with.
    ///
    /// Fails with [`TransportError::ChallengeRequired`] when the vendor
    /// demands out-of-band verification.
    async fn login(&self) -> TransportResult<AuthToken>;

    /// Ask the vendor to deliver a one-time code for a pending challenge
    async fn request_verification_code(
        &self,
        challenge: &ChallengeContext,
        method: VerificationMethod,
    ) -> TransportResult<()> {
        let _ = (challenge, method);
        Err(TransportError::Other(
            "request_verification_code not supported".to_string(),
        ))
    }

    /// Exchange a one-time code for a remember-token and session id
    async fn exchange_verification_code(
        &self,
        challenge: &ChallengeContext,
        code: &str,
    ) -> TransportResult<VerifiedSession> {
        let _ = (challenge, code);
        Err(TransportError::Other(
            "exchange_verification_code not supported".to_string(),
        ))
    }

    /// Finish establishing a session after a successful code exchange
    async fn complete_login(&self, verified: &VerifiedSession) -> TransportResult<AuthToken> {
        let _ = verified;
        Err(TransportError::Other("complete_login not supported".to_string()))
    }

    // =========================================================================
    // Vehicle Access
    // =========================================================================

    /// List the vehicles registered to the account
    async fn fetch_vehicles(&self, token: &AuthToken) -> TransportResult<Vec<VehicleSummary>>;

    /// Read the latest reported status of a vehicle
    async fn fetch_vehicle_status(
        &self,
        vehicle: &Vehicle,
        token: &AuthToken,
    ) -> TransportResult<VehicleStatus>;

    /// Send a mutating command. Returns once the vendor accepted it, not
    /// once the vehicle acted on it.
    async fn send_command(
        &self,
        vehicle: &Vehicle,
        command: &Command,
        token: &AuthToken,
    ) -> TransportResult<()>;

    /// Recent trips, or `None` when the vendor has no trip log for this vehicle
    async fn fetch_trip_details(
        &self,
        vehicle: &Vehicle,
        token: &AuthToken,
    ) -> TransportResult<Option<Vec<TripDetail>>> {
        let _ = (vehicle, token);
        Ok(None)
    }
}

/// Builds transports for an account.
///
/// The factory owns the account credentials; the orchestration layer asks
/// for a fresh transport whenever it (re)initializes a session.
pub trait TransportFactory: Send + Sync {
    /// Create a transport. `remember_token` is the device token obtained
    /// from a previous verification, if any.
    fn create(&self, remember_token: Option<&str>) -> TransportResult<Arc<dyn VehicleTransport>>;
}
