//! Authentication models

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Session credential returned by a successful login.
///
/// Immutable value; a token is usable while the current time is before
/// `valid_until`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub refresh_token: Option<String>,
    pub valid_until: DateTime<Utc>,
}

impl AuthToken {
    pub fn new(access_token: impl Into<String>, valid_until: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            valid_until,
        }
    }

    /// Token valid for `lifetime` from now
    pub fn expiring_in(access_token: impl Into<String>, lifetime: Duration) -> Self {
        Self::new(access_token, Utc::now() + lifetime)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.valid_until
    }

    /// Serialize for the account store
    pub fn encode(&self) -> String {
        // A struct of strings and a timestamp always serializes
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Deserialize a stored token. Any malformed input yields `None`.
    pub fn decode(encoded: &str) -> Option<Self> {
        serde_json::from_str(encoded).ok()
    }
}

/// Channel used to deliver a one-time verification code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMethod {
    Sms,
    Email,
}

impl std::fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationMethod::Sms => write!(f, "sms"),
            VerificationMethod::Email => write!(f, "email"),
        }
    }
}

impl std::str::FromStr for VerificationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sms" | "phone" => Ok(VerificationMethod::Sms),
            "email" => Ok(VerificationMethod::Email),
            other => Err(format!("unknown verification method: {}", other)),
        }
    }
}

/// Vendor-provided context needed to resume an interrupted login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeContext {
    /// Opaque vendor transaction id tying the verification steps together
    pub session_id: String,
    /// Delivery methods offered by the vendor
    pub methods: Vec<VerificationMethod>,
    /// Masked phone number, if offered
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub phone_hint: Option<String>,
    /// Masked email address, if offered
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub email_hint: Option<String>,
}

impl ChallengeContext {
    pub fn new(session_id: impl Into<String>, methods: Vec<VerificationMethod>) -> Self {
        Self {
            session_id: session_id.into(),
            methods,
            phone_hint: None,
            email_hint: None,
        }
    }

    pub fn supports(&self, method: VerificationMethod) -> bool {
        self.methods.contains(&method)
    }
}

/// Result of exchanging a verification code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedSession {
    /// Long-lived device token that lets future logins skip verification
    pub remember_token: String,
    /// Session id used to finish establishing the session
    pub session_id: String,
}
