//! Shared data models for vehicle clients

mod auth;
mod command;
mod status;
mod trip;
mod vehicle;

pub use auth::*;
pub use command::*;
pub use status::*;
pub use trip::*;
pub use vehicle::*;
