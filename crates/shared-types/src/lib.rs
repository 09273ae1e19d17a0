//! # Shared Types - Integration Layer Domain Entities
//!
//! Single source of truth for the types exchanged between the System
//! Registry, the Data Flow Orchestrator, and registered subsystems.
//!
//! Subsystems never depend on each other directly; they depend on this crate
//! and on the contracts in [`contract`], and the orchestrator moves data
//! between them.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod contract;
pub mod ids;
pub mod kinds;
pub mod knobs;
pub mod payload;
pub mod time;
pub mod transform;

// Re-export main types
pub use contract::{
    ContextMetadata, DeterministicSystem, HeuristicSystem, SystemError, SystemHandle,
};
pub use ids::{ConnectionId, FlowId, InstanceId, SystemId};
pub use kinds::{
    ConnectionKind, HealthStatus, PriorityClass, ScopeCategory, SystemKind, SystemStatus,
};
pub use knobs::{
    ChannelDescriptor, ConsumerFlags, KnobConstraint, KnobDescriptor, KnobError, KnobType,
    KnobValue,
};
pub use payload::{payload_from, Payload};
pub use time::{ManualClock, SystemTimeSource, TimeSource, Timestamp};
pub use transform::{AggregateMethod, ConvertTarget, TransformationRule};
