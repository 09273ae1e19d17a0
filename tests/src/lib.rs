//! # Simweave Test Suite
//!
//! Unified test crate containing:
//!
//! ```text
//! tests/src/
//! ├── mocks.rs          # Mock heuristic/deterministic subsystems
//! └── integration/      # Cross-component scenarios
//!     ├── flows.rs      # Flow lifecycle, priorities, retries, cache
//!     ├── discovery.rs  # Automatic route discovery end to end
//!     └── health.rs     # Health checks and scheduler isolation
//! ```
//!
//! All timer-driven scenarios run under `#[tokio::test(start_paused = true)]`
//! so virtual time advances deterministically instead of sleeping.
//!
//! ```bash
//! cargo test -p simweave-tests
//! cargo test -p simweave-tests integration::flows
//! ```

#![allow(dead_code)]

pub mod integration;
pub mod mocks;

/// Install a fmt subscriber honoring `RUST_LOG`, once per process. Safe to
/// call from every test; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
