//! Service monitoring and one-click container updates.
//!
//! - [`health`]: HTTP and container-state health checks
//! - [`version`]: reading running versions with `docker inspect`
//! - [`registry`]: resolving the latest manifest digest upstream
//! - [`coordinator`]: caches, views and the update job runner
//! - [`refresh`]: background loops that keep the caches warm

pub mod cache;
pub mod coordinator;
pub mod health;
pub mod refresh;
pub mod registry;
pub mod version;

#[cfg(test)]
mod testing;

pub use cache::TtlCache;
pub use coordinator::UpdateCoordinator;
pub use health::HealthChecker;
pub use refresh::spawn_background;
pub use registry::{DigestSource, ImageRef, RegistryClient};
