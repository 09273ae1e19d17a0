//! Cross-component scenarios driving the registry, orchestrator, and bus
//! together with mock subsystems.

pub mod flows;
