// ────────────────────────────────
// src/proxy/proxy.rs
// Forwards one request to the service a route binding points at.
// ────────────────────────────────

use super::router::RouteBinding;
use crate::config::ProxyConfig;
use crate::metrics::{FailureReason, MetricsCollector};
use crate::registry::join_path;
use crate::response;
use futures::StreamExt;
use hyper::client::HttpConnector;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, HOST};
use hyper::{Body, Client, Request, Response, StatusCode, Uri, Version};
use hyper_tls::HttpsConnector;
use serde_json::json;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, Sleep};
use tracing::{info, warn};
use url::Url;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub struct Proxy {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    timeout: Duration,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Proxy {
    pub fn new(config: &ProxyConfig, metrics: Option<Arc<MetricsCollector>>) -> Self {
        let client = Client::builder().build(HttpsConnector::new());

        Self {
            client,
            timeout: config.timeout(),
            metrics,
        }
    }

    /// Single attempt, bounded by the configured timeout from request start
    /// to the last body byte. The upstream response is relayed as-is apart
    /// from hop-by-hop headers.
    pub async fn forward(
        &self,
        mut req: Request<Body>,
        binding: &RouteBinding,
        peer: Option<SocketAddr>,
    ) -> Result<Response<Body>, ProxyError> {
        let service = binding.service();
        let target = match &binding.target {
            Some(target) => target,
            None => {
                self.record_failure(service, FailureReason::Unconfigured);
                return Err(ProxyError::Unconfigured {
                    service: service.to_string(),
                });
            }
        };

        let original_path = req.uri().path().to_string();
        let upstream = upstream_uri(
            service,
            target,
            binding.rule.rewrite(&original_path),
            req.uri().query(),
        )?;

        prepare_request_headers(req.headers_mut(), target, peer);
        *req.uri_mut() = upstream.clone();
        *req.version_mut() = Version::HTTP_11;

        let method = req.method().clone();
        let start = Instant::now();
        let deadline = start + self.timeout;
        let result = tokio::time::timeout_at(deadline, self.client.request(req)).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(response)) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                info!(
                    service,
                    %method,
                    path = %original_path,
                    upstream = %upstream,
                    status = parts.status.as_u16(),
                    elapsed_ms,
                    "proxied request"
                );
                let body = self.body_until(body, service, deadline);
                Ok(Response::from_parts(parts, body))
            }
            Ok(Err(err)) => {
                let reason = if err.is_connect() {
                    FailureReason::Connect
                } else {
                    FailureReason::Transport
                };
                self.record_failure(service, reason);
                warn!(
                    service,
                    %method,
                    path = %original_path,
                    upstream = %upstream,
                    elapsed_ms,
                    error = %err,
                    "upstream request failed"
                );
                Err(ProxyError::Upstream {
                    service: service.to_string(),
                    source: err,
                })
            }
            Err(_) => {
                self.record_failure(service, FailureReason::Timeout);
                warn!(
                    service,
                    %method,
                    path = %original_path,
                    upstream = %upstream,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "upstream request timed out"
                );
                Err(ProxyError::Timeout {
                    service: service.to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Relays `body` until `deadline`, then ends the stream with a timeout
    /// error so a stalled upstream cannot hold the client connection.
    fn body_until(&self, body: Body, service: &str, deadline: Instant) -> Body {
        let service = service.to_string();
        let timeout = self.timeout;
        let metrics = self.metrics.clone();
        let sleep: Pin<Box<Sleep>> = Box::pin(tokio::time::sleep_until(deadline));

        let stream = futures::stream::unfold(Some((body, sleep)), move |state| {
            let service = service.clone();
            let metrics = metrics.clone();
            async move {
                let (mut body, mut sleep) = state?;
                tokio::select! {
                    chunk = body.next() => {
                        let chunk = chunk?.map_err(BoxError::from);
                        Some((chunk, Some((body, sleep))))
                    }
                    _ = &mut sleep => {
                        warn!(
                            service = %service,
                            timeout_ms = timeout.as_millis() as u64,
                            "upstream body timed out"
                        );
                        if let Some(metrics) = &metrics {
                            metrics.record_upstream_failure(&service, FailureReason::Timeout);
                        }
                        let err = BoxError::from(ProxyError::Timeout { service, timeout });
                        Some((Err(err), None))
                    }
                }
            }
        });

        Body::wrap_stream(stream)
    }

    fn record_failure(&self, service: &str, reason: FailureReason) {
        if let Some(metrics) = &self.metrics {
            metrics.record_upstream_failure(service, reason);
        }
    }
}

fn upstream_uri(
    service: &str,
    target: &Url,
    path: &str,
    query: Option<&str>,
) -> Result<Uri, ProxyError> {
    let mut uri = join_path(target, path);
    if let Some(query) = query {
        uri.push('?');
        uri.push_str(query);
    }

    uri.parse::<Uri>().map_err(|e| ProxyError::InvalidUri {
        service: service.to_string(),
        reason: e.to_string(),
    })
}

/// Removes hop-by-hop headers, including any the `Connection` header names.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn prepare_request_headers(headers: &mut HeaderMap, target: &Url, peer: Option<SocketAddr>) {
    let original_host = headers.get(HOST).cloned();

    strip_hop_by_hop(headers);

    let authority = &target[url::Position::BeforeHost..url::Position::AfterPort];
    if let Ok(host) = HeaderValue::from_str(authority) {
        headers.insert(HOST, host);
    }

    if let Some(peer) = peer {
        let ip = peer.ip().to_string();
        let forwarded_for = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(prior) => format!("{prior}, {ip}"),
            None => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    match original_host {
        Some(host) => {
            headers.insert(X_FORWARDED_HOST, host);
        }
        None => {
            headers.remove(&X_FORWARDED_HOST);
        }
    }
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Service {service} is not configured")]
    Unconfigured { service: String },

    #[error("Service {service} did not respond within {timeout:?}")]
    Timeout { service: String, timeout: Duration },

    #[error("Service {service} is unreachable: {source}")]
    Upstream {
        service: String,
        #[source]
        source: hyper::Error,
    },

    #[error("Cannot build upstream URI for {service}: {reason}")]
    InvalidUri { service: String, reason: String },
}

impl ProxyError {
    pub fn service(&self) -> &str {
        match self {
            ProxyError::Unconfigured { service }
            | ProxyError::Timeout { service, .. }
            | ProxyError::Upstream { service, .. }
            | ProxyError::InvalidUri { service, .. } => service,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Unconfigured { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        let message = err.to_string();
        match &err {
            ProxyError::Unconfigured { .. } => response::json(
                err.status(),
                json!({
                    "error": "Service Unavailable",
                    "message": message,
                }),
            ),
            _ => response::json(
                err.status(),
                json!({
                    "error": "Bad Gateway",
                    "service": err.service(),
                    "message": message,
                    "timestamp": response::timestamp(),
                }),
            ),
        }
    }
}
