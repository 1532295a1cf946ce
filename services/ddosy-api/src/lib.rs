//! ddosy HTTP service
//!
//! Accepts load test definitions over HTTP, queues them with backpressure and
//! drives the traffic against the requested endpoint.

pub mod config;
pub mod server;
pub mod wire;

pub use config::{ConfigOverrides, ServerConfig};
pub use server::{create_router, run_server, ApiError, Server};
