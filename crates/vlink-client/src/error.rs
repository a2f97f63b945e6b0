//! Error types for vehicle client operations

use thiserror::Error;
use vlink_core::{ErrorCategory, StoreError, TransportError};

use crate::config::ConfigError;

/// Result type alias for vehicle client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur during vehicle client operations
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// The vendor transport failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The vehicle never reached the expected state within the attempt budget.
    ///
    /// The command was accepted, so callers should report this as an
    /// unconfirmed success rather than a failure.
    #[error("Condition not met after {attempts} attempts")]
    ConvergenceTimeout { attempts: u32 },

    /// Cancelled by the caller, or superseded by a newer wait
    #[error("Operation cancelled")]
    Cancelled,

    /// A verification call was made with no challenge outstanding
    #[error("No verification challenge is pending")]
    NoPendingChallenge,

    /// Vehicle missing from the account's vehicle list
    #[error("Vehicle not found: {0}")]
    VehicleNotFound(String),

    /// Persistence failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal invariant violated
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClientError::Transport(e) => e.category(),
            ClientError::ConvergenceTimeout { .. } => ErrorCategory::ConvergenceTimeout,
            ClientError::Cancelled => ErrorCategory::Cancellation,
            ClientError::NoPendingChallenge | ClientError::VehicleNotFound(_) => {
                ErrorCategory::InvalidInput
            }
            ClientError::Store(_) | ClientError::Config(_) | ClientError::Internal(_) => {
                ErrorCategory::Internal
            }
        }
    }

    pub fn is_challenge(&self) -> bool {
        matches!(self, ClientError::Transport(e) if e.is_challenge())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }

    pub fn is_convergence_timeout(&self) -> bool {
        matches!(self, ClientError::ConvergenceTimeout { .. })
    }

    /// The underlying transport error, if any
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            ClientError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for ClientError {
    fn from(e: ConfigError) -> Self {
        ClientError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_mapping() {
        assert_eq!(
            ClientError::ConvergenceTimeout { attempts: 3 }.category(),
            ErrorCategory::ConvergenceTimeout
        );
        assert_eq!(ClientError::Cancelled.category(), ErrorCategory::Cancellation);
        assert_eq!(
            ClientError::from(TransportError::InvalidSessionOrKey).category(),
            ErrorCategory::SessionInvalid
        );
    }

    #[test]
    fn test_timeout_message() {
        let err = ClientError::ConvergenceTimeout { attempts: 3 };
        assert_eq!(err.to_string(), "Condition not met after 3 attempts");
    }
}
