mod collector;

pub use collector::{FailureReason, MetricsCollector, MetricsRegistry};
