// src/lib.rs
pub mod config;
pub mod gateway;
pub mod health;
pub mod metrics;
pub mod proxy;
pub mod registry;
pub mod response;
pub mod server;

pub use gateway::{Gateway, GatewayError};
