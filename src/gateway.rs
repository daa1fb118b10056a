// src/gateway.rs
// Endpoint dispatch: local health/info endpoints, then the proxy route table.

use crate::config::Config;
use crate::health::HealthChecker;
use crate::metrics::{FailureReason, MetricsCollector};
use crate::proxy::{Proxy, ProxyError, RouteMatch, RouteTable};
use crate::registry::ServiceRegistry;
use crate::response;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{warn, Instrument};

pub const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

pub(crate) const GATEWAY_SERVICE: &str = "api-gateway";

/// Metrics label of whoever produced a response, carried in its extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLabel(pub String);

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Failed to serialize response body: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to build health check client: {0}")]
    HealthClient(#[from] reqwest::Error),
}

pub struct Gateway {
    registry: Arc<ServiceRegistry>,
    routes: RouteTable,
    proxy: Proxy,
    health: HealthChecker,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Gateway {
    pub fn new(config: &Config, metrics: Option<Arc<MetricsCollector>>) -> Result<Self, GatewayError> {
        let registry = Arc::new(ServiceRegistry::from_config(config));
        let routes = RouteTable::build(config, &registry);
        let proxy = Proxy::new(&config.proxy, metrics.clone());
        let health = HealthChecker::new(&config.health_check, registry.clone(), metrics.clone())?;

        Ok(Self {
            registry,
            routes,
            proxy,
            health,
            metrics,
        })
    }

    /// Handles one request. Every response carries the request's
    /// `X-Request-Id`, generated here when the client sent none.
    pub async fn handle(
        &self,
        mut req: Request<Body>,
        peer: Option<SocketAddr>,
    ) -> Result<Response<Body>, GatewayError> {
        let request_id = ensure_request_id(req.headers_mut());
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let span = tracing::info_span!(
            "request",
            request_id = ?request_id,
            method = %method,
            path = %path,
        );

        let (service, mut response) = self.dispatch(req, peer).instrument(span).await?;

        response.extensions_mut().insert(ServiceLabel(service));
        response.headers_mut().insert(REQUEST_ID, request_id);
        Ok(response)
    }

    /// Returns the metrics label for whoever produced the response.
    async fn dispatch(
        &self,
        req: Request<Body>,
        peer: Option<SocketAddr>,
    ) -> Result<(String, Response<Body>), GatewayError> {
        if req.method() == Method::GET {
            match req.uri().path() {
                "/" => return Ok((GATEWAY_SERVICE.to_string(), self.info())),
                "/health" => return Ok((GATEWAY_SERVICE.to_string(), liveness())),
                "/health/full" => {
                    return Ok((GATEWAY_SERVICE.to_string(), self.aggregate_health().await?))
                }
                _ => {}
            }
        }

        let path = req.uri().path().to_string();
        match self.routes.route(&path) {
            RouteMatch::Bound(binding) => {
                let service = binding.service().to_string();
                let response = match self.proxy.forward(req, binding, peer).await {
                    Ok(response) => response,
                    Err(err) => err.into(),
                };
                Ok((service, response))
            }
            RouteMatch::Unconfigured(service) => {
                warn!(service, "Request for unconfigured service");
                if let Some(metrics) = &self.metrics {
                    metrics.record_upstream_failure("unconfigured", FailureReason::Unconfigured);
                }
                let err = ProxyError::Unconfigured {
                    service: service.to_string(),
                };
                Ok(("unconfigured".to_string(), err.into()))
            }
            RouteMatch::NoRoute => Ok(("none".to_string(), response::not_found(&path))),
        }
    }

    fn info(&self) -> Response<Body> {
        response::json(
            StatusCode::OK,
            json!({
                "service": "Guidora API Gateway",
                "status": "working",
                "version": env!("CARGO_PKG_VERSION"),
                "environment": self.registry.environment().to_string(),
                "services": self.registry.len(),
            }),
        )
    }

    async fn aggregate_health(&self) -> Result<Response<Body>, GatewayError> {
        let aggregate = self.health.check_all().await;
        let status = if aggregate.is_healthy() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        Ok(response::json(status, serde_json::to_value(&aggregate)?))
    }
}

fn liveness() -> Response<Body> {
    response::json(
        StatusCode::OK,
        json!({
            "status": "healthy",
            "service": GATEWAY_SERVICE,
            "timestamp": response::timestamp(),
        }),
    )
}

fn ensure_request_id(headers: &mut HeaderMap) -> HeaderValue {
    if let Some(existing) = headers.get(&REQUEST_ID) {
        if !existing.is_empty() {
            return existing.clone();
        }
    }

    let generated = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
    headers.insert(REQUEST_ID, generated.clone());
    generated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_kept_when_present() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID, HeaderValue::from_static("abc-123"));
        assert_eq!(ensure_request_id(&mut headers), "abc-123");
    }

    #[test]
    fn request_id_is_generated_when_missing() {
        let mut headers = HeaderMap::new();
        let id = ensure_request_id(&mut headers);
        assert_eq!(headers[&REQUEST_ID], id);
        assert!(uuid::Uuid::parse_str(id.to_str().unwrap()).is_ok());
    }

    async fn body_json(response: Response<Body>) -> serde_json::Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn liveness_does_not_probe() {
        let gateway = Gateway::new(&Config::default(), None).unwrap();
        let req = Request::get("/health").body(Body::empty()).unwrap();

        let response = gateway.handle(req, None).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(&REQUEST_ID));
        assert_eq!(
            response.extensions().get::<ServiceLabel>(),
            Some(&ServiceLabel("api-gateway".to_string()))
        );

        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "api-gateway");
    }

    #[tokio::test]
    async fn root_reports_service_count() {
        let config = Config::default();
        let gateway = Gateway::new(&config, None).unwrap();
        let req = Request::get("/").body(Body::empty()).unwrap();

        let body = body_json(gateway.handle(req, None).await.unwrap()).await;
        assert_eq!(body["service"], "Guidora API Gateway");
        assert_eq!(body["environment"], "local");
        assert_eq!(body["services"], config.services.len());
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let gateway = Gateway::new(&Config::default(), None).unwrap();
        let req = Request::post("/nowhere").body(Body::empty()).unwrap();

        let response = gateway.handle(req, None).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Not Found");
    }

    #[tokio::test]
    async fn unconfigured_service_is_unavailable() {
        let gateway = Gateway::new(&Config::default(), None).unwrap();
        let req = Request::get("/api/unknown/x").body(Body::empty()).unwrap();

        let response = gateway.handle(req, None).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Service Unavailable");
        assert!(body["message"].as_str().unwrap().contains("unknown"));
    }
}
