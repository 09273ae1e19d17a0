//! # System Registry
//!
//! Catalog of every registered subsystem: its declared interface (read
//! directly from the instance, never invented), its directed connections,
//! and its health record. Registration, unregistration, and health status
//! changes are announced on the shared bus.
//!
//! The registry holds subsystem handles but only ever calls their liveness
//! probes; all other subsystem interaction happens in the orchestrator.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod domain;
pub mod error;
pub mod health;
pub mod service;

// Re-export main types
pub use domain::{
    Connection, ConnectionOptions, ConnectionStats, RegistrationOptions, RegistryCounts,
    SystemConnections, SystemProfile, SystemRegistration,
};
pub use error::RegistryError;
pub use health::{ErrorEntry, HealthDelta, HealthRecord};
pub use service::SystemRegistry;
