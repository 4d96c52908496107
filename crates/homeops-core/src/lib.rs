//! Core domain types and traits for homeops.
//!
//! This crate contains:
//! - Resource identifiers and the shared error type
//! - Task queue types (tasks, priorities, statuses, instances)
//! - Service registry and update job types
//! - The `RemoteRunner` trait used to reach container hosts

pub mod error;
pub mod id;
pub mod instance;
pub mod runner;
pub mod service;
pub mod task;
pub mod update;

pub use error::{Error, Result};
pub use id::ResourceId;
