//! Request and response bodies of the vendor gateway

use chrono::Duration;
use serde::{Deserialize, Serialize};
use vlink_core::{
    AuthToken, Brand, ChallengeContext, Command, TripDetail, VehicleSummary, VerificationMethod,
};

// =============================================================================
// Authentication
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub brand: Brand,
    pub region: String,
}

/// Token issued by login or session completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    pub expires_in: i64,
}

impl TokenResponse {
    pub fn into_token(self) -> AuthToken {
        let mut token = AuthToken::expiring_in(self.access_token, Duration::seconds(self.expires_in));
        token.refresh_token = self.refresh_token;
        token
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendCodeRequest {
    pub session_id: String,
    pub method: VerificationMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyCodeRequest {
    pub session_id: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyCodeResponse {
    pub remember_token: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRequest {
    pub session_id: String,
    pub remember_token: String,
}

// =============================================================================
// Vehicles
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleList {
    pub vehicles: Vec<VehicleSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    pub command: Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripList {
    pub trips: Vec<TripDetail>,
}

// =============================================================================
// Errors
// =============================================================================

/// Error body returned with any non-2xx status
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code, e.g. `invalid_session`
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Present with `verification_required`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<ChallengeContext>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn describe(&self) -> String {
        match &self.message {
            Some(message) => format!("{}: {}", self.error, message),
            None => self.error.clone(),
        }
    }
}

/// Error codes used in [`ErrorBody::error`]
pub mod codes {
    pub const INVALID_CREDENTIALS: &str = "invalid_credentials";
    pub const INVALID_SESSION: &str = "invalid_session";
    pub const INVALID_PIN: &str = "invalid_pin";
    pub const CONCURRENT_REQUEST: &str = "concurrent_request";
    pub const VERIFICATION_REQUIRED: &str = "verification_required";
}
