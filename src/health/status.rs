// src/health/status.rs
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    /// 2xx from the health endpoint.
    Healthy,
    /// Answered, but with a non-2xx status.
    Unhealthy,
    /// Timed out or never produced a response.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthProbeResult {
    pub service: String,
    pub url: String,
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub response_time_ms: u64,
}

impl HealthProbeResult {
    pub fn is_healthy(&self) -> bool {
        self.status == ProbeStatus::Healthy
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateHealth {
    pub status: AggregateStatus,
    pub healthy_count: usize,
    pub total_count: usize,
    pub services: Vec<HealthProbeResult>,
    pub timestamp: DateTime<Utc>,
}

impl AggregateHealth {
    /// Healthy only if every probe is; an empty set is vacuously healthy.
    pub fn from_results(services: Vec<HealthProbeResult>) -> Self {
        let healthy_count = services.iter().filter(|r| r.is_healthy()).count();
        let total_count = services.len();
        let status = if healthy_count == total_count {
            AggregateStatus::Healthy
        } else {
            AggregateStatus::Degraded
        };

        Self {
            status,
            healthy_count,
            total_count,
            services,
            timestamp: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == AggregateStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(service: &str, status: ProbeStatus) -> HealthProbeResult {
        HealthProbeResult {
            service: service.to_string(),
            url: format!("http://{service}:1/health"),
            status,
            status_code: None,
            error: None,
            response_time_ms: 1,
        }
    }

    #[test]
    fn all_healthy_is_healthy() {
        let aggregate = AggregateHealth::from_results(vec![
            probe("users", ProbeStatus::Healthy),
            probe("ai", ProbeStatus::Healthy),
        ]);
        assert_eq!(aggregate.status, AggregateStatus::Healthy);
        assert_eq!(aggregate.healthy_count, 2);
        assert_eq!(aggregate.total_count, 2);
    }

    #[test]
    fn any_single_failure_degrades() {
        let statuses = [ProbeStatus::Healthy; 4];
        for i in 0..statuses.len() {
            for failing in [ProbeStatus::Unhealthy, ProbeStatus::Error] {
                let results = statuses
                    .iter()
                    .enumerate()
                    .map(|(j, s)| {
                        let status = if i == j { failing } else { *s };
                        probe(&format!("svc{j}"), status)
                    })
                    .collect();
                let aggregate = AggregateHealth::from_results(results);
                assert_eq!(aggregate.status, AggregateStatus::Degraded);
                assert_eq!(aggregate.healthy_count, 3);
                assert_eq!(aggregate.total_count, 4);
            }
        }
    }

    #[test]
    fn empty_set_is_healthy() {
        let aggregate = AggregateHealth::from_results(Vec::new());
        assert!(aggregate.is_healthy());
        assert_eq!(aggregate.total_count, 0);
    }

    #[test]
    fn serializes_camel_case_and_skips_missing_fields() {
        let mut unhealthy = probe("ai", ProbeStatus::Unhealthy);
        unhealthy.status_code = Some(500);
        let aggregate = AggregateHealth::from_results(vec![probe("users", ProbeStatus::Healthy), unhealthy]);

        let value = serde_json::to_value(&aggregate).unwrap();
        assert_eq!(value["status"], "degraded");
        assert_eq!(value["healthyCount"], 1);
        assert_eq!(value["totalCount"], 2);
        assert_eq!(value["services"][0]["status"], "healthy");
        assert!(value["services"][0].get("statusCode").is_none());
        assert!(value["services"][0].get("error").is_none());
        assert_eq!(value["services"][1]["statusCode"], 500);
        assert!(value["timestamp"].is_string());
    }
}
