// src/response.rs
// JSON response helpers shared by the gateway endpoints and error paths.

use chrono::Utc;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Response, StatusCode};
use serde_json::{json, Value};

pub fn json(status: StatusCode, body: Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

pub fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

pub fn not_found(path: &str) -> Response<Body> {
    json(
        StatusCode::NOT_FOUND,
        json!({
            "error": "Not Found",
            "message": format!("Route {path} not found"),
            "timestamp": timestamp(),
        }),
    )
}

pub fn internal_error(message: &str) -> Response<Body> {
    json(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({
            "error": "Internal Server Error",
            "message": message,
            "timestamp": timestamp(),
        }),
    )
}
