//! API server for homeops.
//!
//! Serves the task queue used by worker instances and the service dashboard
//! with its one-click updates.

pub mod auth;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use state::AppState;
