//! Remote command execution for homeops.
//!
//! Container hosts are driven over SSH with the system `ssh` client.

pub mod ssh;

pub use homeops_core::runner::{CommandOutput, RemoteRunner};
pub use ssh::SshRunner;
