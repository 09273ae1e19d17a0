//! # Data Flow Orchestrator
//!
//! The engine that moves data between registered subsystems. It schedules
//! periodic subsystem execution, routes flows over the registry's
//! connections with priority-based queueing (critical inline, high in a
//! dedicated queue, medium/low batched), applies transformation pipelines
//! behind a bounded memo cache, retries retryable failures with exponential
//! backoff, discovers routes for newly registered systems, and resolves
//! conflicting writes within a batch.
//!
//! ```text
//!            initiate_flow            batch tick (1s)
//!   caller ───────────────▶ queues ───────────────────▶ transform ─▶ deliver
//!                             ▲                            │
//!   registry events ──▶ route discovery          conflict resolution
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod discovery;
pub mod error;
pub mod flow;
pub mod service;
pub mod transform;

// Re-export main types
pub use discovery::{candidate_routes, semantic_match, RouteCandidate};
pub use error::FlowError;
pub use flow::{Flow, FlowOptions, FlowStatus, OrchestratorMetrics, OrchestratorStatus};
pub use service::{DataFlowOrchestrator, OrchestratorConfig};
pub use transform::{CustomTransform, TransformCache, CACHE_CAPACITY};
