//! Typed errors raised by vehicle transports

use thiserror::Error;

use crate::models::ChallengeContext;

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors that a vendor transport can raise.
///
/// Cloneable so a single failed call can be handed to every caller that
/// was attached to it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// The vendor requires an out-of-band verification before a session
    /// can be established
    #[error("Verification required ({} method(s) available)", .0.methods.len())]
    ChallengeRequired(ChallengeContext),

    /// Username/password rejected
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Session expired, token revoked, or vehicle key no longer valid
    #[error("Invalid session or vehicle key")]
    InvalidSessionOrKey,

    /// Vendor side failure (5xx, malformed gateway response)
    #[error("Server error: {0}")]
    ServerError(String),

    /// Another command is already being processed for this vehicle
    #[error("Concurrent request rejected by vendor")]
    ConcurrentRequestRejected,

    /// Remote command PIN rejected
    #[error("Invalid PIN")]
    InvalidPin,

    /// Anything the transport could not classify
    #[error("{0}")]
    Other(String),
}

/// Coarse error taxonomy used to decide recovery behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Server error or vendor-side conflict. Surfaced, never retried here.
    TransientTransport,
    /// Credentials or session are no longer usable. One full reinit + retry.
    SessionInvalid,
    /// Out-of-band verification must be completed first.
    ChallengeRequired,
    /// A status wait ran out of attempts.
    ConvergenceTimeout,
    /// The caller cancelled the operation.
    Cancellation,
    /// Bad user input (e.g. a wrong PIN).
    InvalidInput,
    /// Programming or environment error.
    Internal,
}

impl TransportError {
    pub fn is_challenge(&self) -> bool {
        matches!(self, TransportError::ChallengeRequired(_))
    }

    /// The challenge context, if this is a challenge error
    pub fn challenge(&self) -> Option<&ChallengeContext> {
        match self {
            TransportError::ChallengeRequired(ctx) => Some(ctx),
            _ => None,
        }
    }

    pub fn is_session_invalid(&self) -> bool {
        matches!(
            self,
            TransportError::InvalidCredentials | TransportError::InvalidSessionOrKey
        )
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::ServerError(_) | TransportError::ConcurrentRequestRejected
        )
    }

    /// Whether a full session reinitialization may fix this error.
    ///
    /// Unclassified errors are treated as session-suspect.
    pub fn warrants_reinit(&self) -> bool {
        self.is_session_invalid() || matches!(self, TransportError::Other(_))
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            TransportError::ChallengeRequired(_) => ErrorCategory::ChallengeRequired,
            TransportError::InvalidCredentials | TransportError::InvalidSessionOrKey => {
                ErrorCategory::SessionInvalid
            }
            TransportError::ServerError(_) | TransportError::ConcurrentRequestRejected => {
                ErrorCategory::TransientTransport
            }
            TransportError::InvalidPin => ErrorCategory::InvalidInput,
            TransportError::Other(_) => ErrorCategory::SessionInvalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VerificationMethod;

    #[test]
    fn test_categories() {
        assert_eq!(
            TransportError::InvalidSessionOrKey.category(),
            ErrorCategory::SessionInvalid
        );
        assert_eq!(
            TransportError::ServerError("boom".into()).category(),
            ErrorCategory::TransientTransport
        );
        assert_eq!(
            TransportError::ConcurrentRequestRejected.category(),
            ErrorCategory::TransientTransport
        );
        assert_eq!(TransportError::InvalidPin.category(), ErrorCategory::InvalidInput);
    }

    #[test]
    fn test_reinit_policy() {
        assert!(TransportError::InvalidCredentials.warrants_reinit());
        assert!(TransportError::Other("socket closed".into()).warrants_reinit());
        assert!(!TransportError::ServerError("502".into()).warrants_reinit());
        assert!(!TransportError::InvalidPin.warrants_reinit());

        let challenge = TransportError::ChallengeRequired(ChallengeContext::new(
            "xid-1",
            vec![VerificationMethod::Sms],
        ));
        assert!(challenge.is_challenge());
        assert!(!challenge.warrants_reinit());
        assert_eq!(challenge.challenge().unwrap().session_id, "xid-1");
    }
}
