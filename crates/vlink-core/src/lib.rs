//! vlink-core - Core traits and types for connected-vehicle clients
//!
//! This crate provides the abstractions shared by the request orchestration
//! layer and its collaborators: the vendor transport, the account store, and
//! the vehicle/status/command models that flow between them.

pub mod error;
pub mod models;
pub mod store;
pub mod transport;

pub use error::{ErrorCategory, TransportError, TransportResult};
pub use models::*;
pub use store::{AccountStore, StoreError};
pub use transport::{TransportFactory, VehicleTransport};
