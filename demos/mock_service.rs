//! demos/mock_service.rs
//! Stand-in for one Guidora backend so the gateway can be run locally.
//! Run: cargo run --example mock_service -- <port> [name]
//!
//! HEALTHY=false makes `/health` answer 503, DELAY_MS adds latency to
//! every other path.

use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::sleep;

#[derive(Clone)]
struct ServiceState {
    port: u16,
    name: String,
    req_counter: Arc<AtomicU64>,
    healthy: bool,
    delay_ms: u64,
}

async fn handle(req: Request<Body>, state: ServiceState) -> Result<Response<Body>, Infallible> {
    let n = state.req_counter.fetch_add(1, Ordering::SeqCst) + 1;
    let path = req.uri().path().to_owned();

    if path == "/health" {
        let (status, body) = if state.healthy {
            (StatusCode::OK, r#"{"status":"healthy"}"#)
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, r#"{"status":"unhealthy"}"#)
        };
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        return Ok(response);
    }

    if state.delay_ms > 0 {
        sleep(Duration::from_millis(state.delay_ms)).await;
    }

    let forwarded_for = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_owned();

    let body = serde_json::json!({
        "service": state.name,
        "port": state.port,
        "req": n,
        "method": req.method().as_str(),
        "path": path,
        "query": req.uri().query(),
        "forwardedFor": forwarded_for,
    });

    let mut response = Response::new(Body::from(body.to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let port: u16 = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "5007".into())
        .parse()?;
    let name = std::env::args()
        .nth(2)
        .unwrap_or_else(|| format!("service-{port}"));

    let healthy = std::env::var("HEALTHY")
        .map(|v| v != "false")
        .unwrap_or(true);
    let delay_ms = std::env::var("DELAY_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let state = ServiceState {
        port,
        name: name.clone(),
        req_counter: Arc::new(AtomicU64::new(0)),
        healthy,
        delay_ms,
    };

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let make_svc = make_service_fn(move |_conn| {
        let st = state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(req, st.clone()))) }
    });

    println!(
        "Mock service '{}' on http://{}  [healthy={} delay={}ms]",
        name, addr, healthy, delay_ms
    );

    Server::bind(&addr).serve(make_svc).await?;
    Ok(())
}
