// src/health/checker.rs
use super::status::{AggregateHealth, HealthProbeResult, ProbeStatus};
use crate::config::HealthCheckConfig;
use crate::metrics::MetricsCollector;
use crate::registry::{join_path, ServiceRegistry};
use reqwest::Client;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

/// Probes every registered service on demand.
pub struct HealthChecker {
    registry: Arc<ServiceRegistry>,
    client: Client,
    path: String,
    timeout: Duration,
    metrics: Option<Arc<MetricsCollector>>,
}

impl HealthChecker {
    pub fn new(
        config: &HealthCheckConfig,
        registry: Arc<ServiceRegistry>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout())
            .no_proxy()
            .build()?;

        Ok(Self {
            registry,
            client,
            path: config.path.clone(),
            timeout: config.timeout(),
            metrics,
        })
    }

    /// One concurrent probe per registry entry, each with its own timeout.
    /// Returns only after every probe has settled; the result has one
    /// entry per service, in registry order.
    pub async fn check_all(&self) -> AggregateHealth {
        let targets: Vec<(String, String)> = self
            .registry
            .entries()
            .map(|entry| (entry.name.clone(), join_path(&entry.base_url, &self.path)))
            .collect();

        let tasks: Vec<_> = targets
            .iter()
            .map(|(service, url)| {
                let client = self.client.clone();
                let service = service.clone();
                let url = url.clone();
                let limit = self.timeout;
                tokio::spawn(async move { probe(&client, service, url, limit).await })
            })
            .collect();

        // Wait for all health checks to complete
        let joined = futures::future::join_all(tasks).await;

        let services: Vec<HealthProbeResult> = targets
            .into_iter()
            .zip(joined)
            .map(|((service, url), joined)| match joined {
                Ok(result) => result,
                Err(e) => {
                    error!(%service, "Health probe task failed: {}", e);
                    HealthProbeResult {
                        service,
                        url,
                        status: ProbeStatus::Error,
                        status_code: None,
                        error: Some(format!("probe task failed: {e}")),
                        response_time_ms: 0,
                    }
                }
            })
            .collect();

        for result in &services {
            if result.is_healthy() {
                debug!("Service {} is healthy", result.service);
            } else {
                warn!(
                    "Service {} is {:?}: {:?}",
                    result.service, result.status, result.error
                );
            }

            if let Some(metrics) = &self.metrics {
                metrics.record_probe(
                    &result.service,
                    result.is_healthy(),
                    Duration::from_millis(result.response_time_ms),
                );
            }
        }

        let aggregate = AggregateHealth::from_results(services);
        info!(
            "Health check complete: {}/{} healthy",
            aggregate.healthy_count, aggregate.total_count
        );
        aggregate
    }
}

async fn probe(client: &Client, service: String, url: String, limit: Duration) -> HealthProbeResult {
    let start = Instant::now();
    let result = timeout(limit, client.get(url.as_str()).send()).await;
    let response_time_ms = start.elapsed().as_millis() as u64;

    let (status, status_code, error) = match result {
        Ok(Ok(response)) => {
            let code = response.status();
            if code.is_success() {
                (ProbeStatus::Healthy, Some(code.as_u16()), None)
            } else {
                (
                    ProbeStatus::Unhealthy,
                    Some(code.as_u16()),
                    Some(format!("HTTP {code}")),
                )
            }
        }
        Ok(Err(e)) if e.is_timeout() => (
            ProbeStatus::Error,
            None,
            Some(format!("Request timed out after {limit:?}")),
        ),
        Ok(Err(e)) => (ProbeStatus::Error, None, Some(e.to_string())),
        Err(_) => (
            ProbeStatus::Error,
            None,
            Some(format!("Request timed out after {limit:?}")),
        ),
    };

    HealthProbeResult {
        service,
        url,
        status,
        status_code,
        error,
        response_time_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ServiceUrls};
    use std::collections::BTreeMap;
    use url::Url;

    fn checker_for(services: &[(&str, &str)], timeout_secs: u64) -> HealthChecker {
        let mut config = Config::default();
        config.health_check.timeout_secs = timeout_secs;
        config.services = services
            .iter()
            .map(|(name, url)| {
                let url = Url::parse(url).unwrap();
                (
                    name.to_string(),
                    ServiceUrls {
                        local: url.clone(),
                        production: url,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        let registry = Arc::new(ServiceRegistry::from_config(&config));
        HealthChecker::new(&config.health_check, registry, None).unwrap()
    }

    #[tokio::test]
    async fn healthy_and_failing_services_are_both_reported() {
        let mut server = mockito::Server::new_async().await;
        let users = server
            .mock("GET", "/users/health")
            .with_status(200)
            .with_body("OK")
            .create_async()
            .await;
        let ai = server
            .mock("GET", "/ai/health")
            .with_status(500)
            .create_async()
            .await;

        let users_url = format!("{}/users", server.url());
        let ai_url = format!("{}/ai", server.url());
        let checker = checker_for(&[("users", &users_url), ("ai", &ai_url)], 5);

        let aggregate = checker.check_all().await;
        users.assert_async().await;
        ai.assert_async().await;

        assert!(!aggregate.is_healthy());
        assert_eq!(aggregate.total_count, 2);
        assert_eq!(aggregate.healthy_count, 1);

        let ai = &aggregate.services[0];
        assert_eq!(ai.service, "ai");
        assert_eq!(ai.status, ProbeStatus::Unhealthy);
        assert_eq!(ai.status_code, Some(500));

        let users = &aggregate.services[1];
        assert_eq!(users.service, "users");
        assert_eq!(users.status, ProbeStatus::Healthy);
        assert!(users.url.ends_with("/users/health"));
    }

    #[tokio::test]
    async fn refused_connection_is_an_error_entry() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{addr}");
        let checker = checker_for(&[("news", &url)], 5);

        let aggregate = checker.check_all().await;
        assert_eq!(aggregate.total_count, 1);
        assert_eq!(aggregate.services[0].status, ProbeStatus::Error);
        assert!(aggregate.services[0].error.is_some());
        assert!(aggregate.services[0].status_code.is_none());
    }
}
