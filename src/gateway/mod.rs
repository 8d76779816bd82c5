//! HTTP ingress: the Alertmanager webhook and the read-only observability
//! surface (`/health`, `/stats`, `/incidents`, `/metrics`).

pub mod routes;

pub use routes::{GatewayState, router};
