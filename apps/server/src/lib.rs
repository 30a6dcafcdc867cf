//! Weft server - management HTTP API over the engine
//!
//! Hosts the engine built from a config file and exposes the management
//! surface: read/replace the config, validate, reload, and report status.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use state::ServerState;
