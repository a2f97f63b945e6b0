//! vlink client library
//!
//! Request orchestration between an application and a session-based,
//! rate-sensitive connected-vehicle API:
//!
//! - [`cache`]: short-TTL result cache that also coalesces concurrent
//!   identical requests into one transport call
//! - [`session`]: transport client and token lifecycle, out-of-band
//!   verification, and the reinitialize-and-retry-once policy
//! - [`waiter`]: polling a vehicle's status until a command's effect shows
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use vlink_client::{ClientConfig, MemoryStore, VehicleClient};
//! use vlink_core::{Brand, Command};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::builder("https://gateway.example.com", "me@example.com", "secret", Brand::Hyundai)
//!         .pin("1234")
//!         .build();
//!     let client = VehicleClient::with_http(&config, Arc::new(MemoryStore::new()));
//!
//!     let vehicles = client.fetch_vehicles().await?;
//!     let car = &vehicles[0];
//!
//!     // Lock and wait until the car reports it is locked
//!     let status = client
//!         .send_command_and_wait(car, &Command::Lock, None, &CancellationToken::new())
//!         .await?;
//!     assert!(status.locked);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Verification
//!
//! When the vendor demands out-of-band verification every operation fails
//! with a challenge error until the flow is completed:
//!
//! ```rust,ignore
//! match client.initialize().await {
//!     Err(e) if e.is_challenge() => {
//!         client.send_verification_code(VerificationMethod::Sms).await?;
//!         client.verify_code(&code_from_user).await?;
//!     }
//!     other => other?,
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module provides a scriptable transport and an axum-backed
//! test server:
//!
//! ```rust,ignore
//! use vlink_client::testing::{MockTransport, MockTransportFactory};
//!
//! let mock = Arc::new(MockTransport::new());
//! let client = VehicleClient::new(&config, Arc::new(MockTransportFactory::new(mock.clone())), store);
//! ```

pub mod cache;
mod client;
pub mod config;
mod error;
pub mod http;
pub mod session;
pub mod store;
pub mod testing;
pub mod waiter;

pub use cache::{CacheStats, OperationCache};
pub use client::VehicleClient;
pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, Result};
pub use http::{HttpTransport, HttpTransportFactory};
pub use session::{SessionOrchestrator, SessionStatus};
pub use store::{FileStore, MemoryStore};
pub use waiter::{ProgressFn, StatusWaiter, WaitProgress, WaitSchedule};

// Re-export core types for convenience
pub use vlink_core::{ErrorCategory, TransportError};
