//! AccountStore trait - the persistence seam

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Vehicle, VehicleStatus};

/// Persistence failure
#[derive(Debug, Clone, Error)]
#[error("Store error: {0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Per-account persistent records.
///
/// Tokens are stored in their encoded form; decoding is the caller's
/// responsibility so that a corrupt record can be treated as absent.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn load_token(&self) -> Result<Option<String>, StoreError>;

    async fn save_token(&self, encoded: &str) -> Result<(), StoreError>;

    async fn clear_token(&self) -> Result<(), StoreError>;

    async fn load_remember_token(&self) -> Result<Option<String>, StoreError>;

    async fn save_remember_token(&self, token: &str) -> Result<(), StoreError>;

    async fn clear_remember_token(&self) -> Result<(), StoreError>;

    async fn load_vehicles(&self) -> Result<Vec<Vehicle>, StoreError>;

    async fn save_vehicles(&self, vehicles: &[Vehicle]) -> Result<(), StoreError>;

    /// Record the latest known status of a vehicle
    async fn save_status(&self, vin: &str, status: &VehicleStatus) -> Result<(), StoreError>;

    async fn load_status(&self, vin: &str) -> Result<Option<VehicleStatus>, StoreError> {
        let _ = vin;
        Ok(None)
    }
}
