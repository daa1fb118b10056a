// src/health/mod.rs
mod checker;
mod status;

pub use checker::HealthChecker;
pub use status::{AggregateHealth, AggregateStatus, HealthProbeResult, ProbeStatus};
