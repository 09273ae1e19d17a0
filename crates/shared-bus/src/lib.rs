//! # Shared Bus - Integration Layer Notifications
//!
//! Typed publish/subscribe between the registry, the orchestrator, and the
//! surrounding application.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │   Registry   │                    │  Application │
//! │              │    publish()       │  subscribers │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │ ─────────┘
//!                  └──────────────┘  subscribe()
//!                        ▲
//!                        │ routing task
//!                  ┌──────────────┐
//!                  │ Orchestrator │
//!                  └──────────────┘
//! ```
//!
//! The bus is single-process and in-memory; it offers no durability for
//! in-flight notifications. Slow subscribers are lagged, not blocked.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{EventFilter, EventTopic, HealthCounts, IntegrationEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Maximum events buffered per subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
