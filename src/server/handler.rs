// src/server/handler.rs
use futures::FutureExt;
use hyper::{Body, Method, Request, Response};
use std::any::Any;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::Service;

use crate::gateway::{Gateway, GatewayError, ServiceLabel, GATEWAY_SERVICE};
use crate::metrics::MetricsCollector;
use crate::response;

type Outcome = Result<Result<Response<Body>, GatewayError>, Box<dyn Any + Send>>;

/// Top-level service. Turns gateway errors and panics into 500 responses so
/// a failing request never takes its connection task down.
#[derive(Clone)]
pub struct RequestHandler {
    gateway: Arc<Gateway>,
    peer: Option<SocketAddr>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RequestHandler {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            peer: None,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// A copy bound to one client connection.
    pub fn with_peer(&self, peer: SocketAddr) -> Self {
        Self {
            gateway: self.gateway.clone(),
            peer: Some(peer),
            metrics: self.metrics.clone(),
        }
    }
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let gateway = self.gateway.clone();
        let peer = self.peer;
        let metrics = self.metrics.clone();
        Box::pin(async move {
            let method = req.method().clone();
            let start = Instant::now();
            let outcome = AssertUnwindSafe(gateway.handle(req, peer))
                .catch_unwind()
                .await;

            let response = into_response(outcome);
            if let Some(metrics) = &metrics {
                record_request(metrics, &method, &response, start.elapsed());
            }
            Ok(response)
        })
    }
}

fn into_response(outcome: Outcome) -> Response<Body> {
    match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::error!(%e, "request handler error");
            response::internal_error(&e.to_string())
        }
        Err(panic) => {
            tracing::error!(panic = %panic_message(&*panic), "request handler panicked");
            response::internal_error("Unexpected error while handling the request")
        }
    }
}

/// Responses without a label (500s from errors or panics) count against
/// the gateway itself.
fn record_request(
    metrics: &MetricsCollector,
    method: &Method,
    response: &Response<Body>,
    elapsed: Duration,
) {
    let service = response
        .extensions()
        .get::<ServiceLabel>()
        .map(|label| label.0.as_str())
        .unwrap_or(GATEWAY_SERVICE);
    metrics.record_request(method.as_str(), response.status().as_u16(), service, elapsed);
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
