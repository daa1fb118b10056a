// src/metrics/collector.rs
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

/// Why a proxied call never produced an upstream response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Timeout,
    Connect,
    Transport,
    Unconfigured,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::Connect => "connect",
            FailureReason::Transport => "transport",
            FailureReason::Unconfigured => "unconfigured",
        }
    }
}

pub struct MetricsCollector {
    // Request metrics
    pub requests_total: IntCounterVec,
    pub request_duration_seconds: HistogramVec,

    // Upstream metrics
    pub upstream_failures_total: IntCounterVec,
    pub service_health_status: IntGaugeVec,
    pub health_probe_duration_seconds: HistogramVec,

    // System metrics
    pub active_connections: IntGauge,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("gateway_requests_total", "Total number of requests"),
            &["method", "status_code", "service"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gateway_request_duration_seconds",
                "Request duration in seconds",
            ),
            &["method", "status_code", "service"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        let upstream_failures_total = IntCounterVec::new(
            Opts::new(
                "gateway_upstream_failures_total",
                "Proxied calls that got no upstream response",
            ),
            &["service", "reason"],
        )?;
        registry.register(Box::new(upstream_failures_total.clone()))?;

        let service_health_status = IntGaugeVec::new(
            Opts::new(
                "gateway_service_health_status",
                "Last probe result per service (1=healthy, 0=not healthy)",
            ),
            &["service"],
        )?;
        registry.register(Box::new(service_health_status.clone()))?;

        let health_probe_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gateway_health_probe_duration_seconds",
                "Health probe duration in seconds",
            ),
            &["service"],
        )?;
        registry.register(Box::new(health_probe_duration_seconds.clone()))?;

        let active_connections =
            IntGauge::new("gateway_active_connections", "Open client connections")?;
        registry.register(Box::new(active_connections.clone()))?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            upstream_failures_total,
            service_health_status,
            health_probe_duration_seconds,
            active_connections,
        })
    }

    pub fn record_request(
        &self,
        method: &str,
        status_code: u16,
        service: &str,
        duration: Duration,
    ) {
        let status = status_code.to_string();
        self.requests_total
            .with_label_values(&[method, &status, service])
            .inc();

        self.request_duration_seconds
            .with_label_values(&[method, &status, service])
            .observe(duration.as_secs_f64());
    }

    pub fn record_upstream_failure(&self, service: &str, reason: FailureReason) {
        self.upstream_failures_total
            .with_label_values(&[service, reason.as_str()])
            .inc();
    }

    pub fn record_probe(&self, service: &str, healthy: bool, duration: Duration) {
        let value = if healthy { 1 } else { 0 };
        self.service_health_status
            .with_label_values(&[service])
            .set(value);

        self.health_probe_duration_seconds
            .with_label_values(&[service])
            .observe(duration.as_secs_f64());
    }

    pub fn increment_active_connections(&self) {
        self.active_connections.inc();
    }

    pub fn decrement_active_connections(&self) {
        self.active_connections.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_text_output() {
        let registry = MetricsRegistry::new().unwrap();
        let metrics = registry.collector();

        metrics.record_request("GET", 200, "users", Duration::from_millis(12));
        metrics.record_upstream_failure("ai", FailureReason::Timeout);
        metrics.record_probe("ai", false, Duration::from_millis(5));

        let text = String::from_utf8(registry.gather().unwrap()).unwrap();
        assert!(text.contains(
            r#"gateway_requests_total{method="GET",service="users",status_code="200"} 1"#
        ));
        assert!(text.contains(
            r#"gateway_upstream_failures_total{reason="timeout",service="ai"} 1"#
        ));
        assert!(text.contains(r#"gateway_service_health_status{service="ai"} 0"#));
    }

    #[test]
    fn active_connections_gauge() {
        let registry = MetricsRegistry::new().unwrap();
        let metrics = registry.collector();

        metrics.increment_active_connections();
        metrics.increment_active_connections();
        metrics.decrement_active_connections();
        assert_eq!(metrics.active_connections.get(), 1);
    }
}
