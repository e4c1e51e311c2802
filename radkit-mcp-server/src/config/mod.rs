//! Server configuration

mod loader;
mod schema;

pub use loader::ConfigLoader;
pub use schema::{ServerConfig, ServiceConfig, TransportConfig, TransportMode};
