// fsgate-host library
// HTTP surface over the sandboxed workspace store

// Shared-secret authentication
pub mod auth;

// Configuration
pub mod config;

// REST API
pub mod api;

pub use fsgate_vfs as vfs;
