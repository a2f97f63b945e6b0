//! Reference transport for a JSON vendor gateway
//!
//! Endpoints, all under `/api/v1`:
//!
//! | method | path | purpose |
//! |--------|------|---------|
//! | POST | `/auth/login` | credentials login, 428 when verification is required |
//! | POST | `/auth/verification/send` | deliver a one-time code |
//! | POST | `/auth/verification/verify` | exchange a code for a remember-token |
//! | POST | `/auth/session` | finish login with a remember-token |
//! | GET | `/vehicles` | vehicle list |
//! | GET | `/vehicles/{id}/status` | latest status |
//! | POST | `/vehicles/{id}/commands` | remote command |
//! | GET | `/vehicles/{id}/trips` | trip log, 204 when none |
//!
//! `{id}` is the vendor key when known, else the VIN.

mod transport;
pub mod wire;

pub use transport::{classify_error, HttpTransport, HttpTransportFactory, REMEMBER_TOKEN_HEADER};
