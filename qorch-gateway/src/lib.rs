//! The MCP Gateway: a registry of named services, each protected by its own
//! circuit breaker, with a periodic health prober and a uniform
//! `call(service_id, method, params)` surface.

pub mod circuit_breaker;
pub mod gateway;
pub mod service;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use gateway::{Gateway, ServiceSummary};
pub use service::Service;
