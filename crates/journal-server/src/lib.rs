//! HTTP surface of the journal relay.

pub mod config;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::{ConfigError, ServerConfig};
pub use routes::create_router;
pub use state::AppState;
