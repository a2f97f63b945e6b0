//! Account store implementations
//!
//! [`MemoryStore`] keeps everything in process; [`FileStore`] keeps one
//! JSON document per record in a directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use vlink_core::{AccountStore, StoreError, Vehicle, VehicleStatus};

// =============================================================================
// MemoryStore
// =============================================================================

#[derive(Default)]
struct Records {
    token: Option<String>,
    remember_token: Option<String>,
    vehicles: Vec<Vehicle>,
    statuses: HashMap<String, VehicleStatus>,
}

/// In-memory account store
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stored vehicle list
    pub fn with_vehicles(self, vehicles: Vec<Vehicle>) -> Self {
        self.records.write().vehicles = vehicles;
        self
    }

    /// Seed an encoded token
    pub fn with_token(self, encoded: impl Into<String>) -> Self {
        self.records.write().token = Some(encoded.into());
        self
    }

    pub fn token(&self) -> Option<String> {
        self.records.read().token.clone()
    }

    pub fn remember_token(&self) -> Option<String> {
        self.records.read().remember_token.clone()
    }

    pub fn vehicles(&self) -> Vec<Vehicle> {
        self.records.read().vehicles.clone()
    }

    pub fn status(&self, vin: &str) -> Option<VehicleStatus> {
        self.records.read().statuses.get(vin).cloned()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn load_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.token())
    }

    async fn save_token(&self, encoded: &str) -> Result<(), StoreError> {
        self.records.write().token = Some(encoded.to_string());
        Ok(())
    }

    async fn clear_token(&self) -> Result<(), StoreError> {
        self.records.write().token = None;
        Ok(())
    }

    async fn load_remember_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.remember_token())
    }

    async fn save_remember_token(&self, token: &str) -> Result<(), StoreError> {
        self.records.write().remember_token = Some(token.to_string());
        Ok(())
    }

    async fn clear_remember_token(&self) -> Result<(), StoreError> {
        self.records.write().remember_token = None;
        Ok(())
    }

    async fn load_vehicles(&self) -> Result<Vec<Vehicle>, StoreError> {
        Ok(self.vehicles())
    }

    async fn save_vehicles(&self, vehicles: &[Vehicle]) -> Result<(), StoreError> {
        self.records.write().vehicles = vehicles.to_vec();
        Ok(())
    }

    async fn save_status(&self, vin: &str, status: &VehicleStatus) -> Result<(), StoreError> {
        self.records
            .write()
            .statuses
            .insert(vin.to_string(), status.clone());
        Ok(())
    }

    async fn load_status(&self, vin: &str) -> Result<Option<VehicleStatus>, StoreError> {
        Ok(self.status(vin))
    }
}

// =============================================================================
// FileStore
// =============================================================================

const TOKEN_FILE: &str = "token";
const REMEMBER_TOKEN_FILE: &str = "remember_token";
const VEHICLES_FILE: &str = "vehicles.json";
const STATUS_DIR: &str = "status";

/// Account store backed by files in a directory.
///
/// Layout:
/// - `token` / `remember_token`: raw encoded strings
/// - `vehicles.json`: the vehicle list
/// - `status/<vin>.json`: last known status per vehicle
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Use `dir`, creating it if needed
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(dir.join(STATUS_DIR))
            .await
            .map_err(|e| io_error(&dir, e))?;
        debug!(dir = %dir.display(), "Opened file store");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn status_path(&self, vin: &str) -> PathBuf {
        // VINs are alphanumeric; anything else is replaced to keep the
        // name inside the status directory
        let name: String = vin
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.dir.join(STATUS_DIR).join(format!("{}.json", name))
    }

    async fn read_string(&self, path: &Path) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(path, e)),
        }
    }

    async fn write_string(&self, path: &Path, content: &str) -> Result<(), StoreError> {
        // write-then-rename so a crash never leaves a half-written record
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| io_error(path, e))
    }

    async fn remove(&self, path: &Path) -> Result<(), StoreError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(path, e)),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StoreError> {
        match self.read_string(path).await? {
            Some(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| StoreError::new(format!("{}: {}", path.display(), e))),
            None => Ok(None),
        }
    }

    async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(value)
            .map_err(|e| StoreError::new(format!("{}: {}", path.display(), e)))?;
        self.write_string(path, &content).await
    }
}

fn io_error(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::new(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl AccountStore for FileStore {
    async fn load_token(&self) -> Result<Option<String>, StoreError> {
        self.read_string(&self.dir.join(TOKEN_FILE)).await
    }

    async fn save_token(&self, encoded: &str) -> Result<(), StoreError> {
        self.write_string(&self.dir.join(TOKEN_FILE), encoded).await
    }

    async fn clear_token(&self) -> Result<(), StoreError> {
        self.remove(&self.dir.join(TOKEN_FILE)).await
    }

    async fn load_remember_token(&self) -> Result<Option<String>, StoreError> {
        self.read_string(&self.dir.join(REMEMBER_TOKEN_FILE)).await
    }

    async fn save_remember_token(&self, token: &str) -> Result<(), StoreError> {
        self.write_string(&self.dir.join(REMEMBER_TOKEN_FILE), token)
            .await
    }

    async fn clear_remember_token(&self) -> Result<(), StoreError> {
        self.remove(&self.dir.join(REMEMBER_TOKEN_FILE)).await
    }

    async fn load_vehicles(&self) -> Result<Vec<Vehicle>, StoreError> {
        Ok(self
            .read_json(&self.dir.join(VEHICLES_FILE))
            .await?
            .unwrap_or_default())
    }

    async fn save_vehicles(&self, vehicles: &[Vehicle]) -> Result<(), StoreError> {
        self.write_json(&self.dir.join(VEHICLES_FILE), vehicles).await
    }

    async fn save_status(&self, vin: &str, status: &VehicleStatus) -> Result<(), StoreError> {
        self.write_json(&self.status_path(vin), status).await
    }

    async fn load_status(&self, vin: &str) -> Result<Option<VehicleStatus>, StoreError> {
        self.read_json(&self.status_path(vin)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_status;
    use vlink_core::{AuthToken, Brand};

    #[tokio::test]
    async fn test_memory_store_records() {
        let store = MemoryStore::new();
        assert!(store.load_token().await.unwrap().is_none());

        store.save_token("encoded").await.unwrap();
        store.save_remember_token("device").await.unwrap();
        assert_eq!(store.token().as_deref(), Some("encoded"));

        store.clear_token().await.unwrap();
        assert!(store.token().is_none());
        assert_eq!(store.remember_token().as_deref(), Some("device"));
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let token = AuthToken::expiring_in("abc", chrono::Duration::hours(1));
        let vehicles = vec![Vehicle::new("KNA1", Brand::Kia).with_key("vk-1")];

        {
            let store = FileStore::open(dir.path()).await.unwrap();
            store.save_token(&token.encode()).await.unwrap();
            store.save_vehicles(&vehicles).await.unwrap();
            store.save_status("KNA1", &sample_status(true)).await.unwrap();
        }

        let store = FileStore::open(dir.path()).await.unwrap();
        let loaded = store.load_token().await.unwrap().and_then(|s| AuthToken::decode(&s));
        assert_eq!(loaded, Some(token));
        assert_eq!(store.load_vehicles().await.unwrap(), vehicles);
        assert!(store.load_status("KNA1").await.unwrap().unwrap().locked);
        assert!(store.load_status("OTHER").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_clear_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("nested")).await.unwrap();

        store.clear_token().await.unwrap();
        store.clear_remember_token().await.unwrap();
        assert!(store.load_remember_token().await.unwrap().is_none());
        assert!(store.load_vehicles().await.unwrap().is_empty());
    }
}
