//! Service registry server
//!
//! Hosts the in-memory registry in a long-running process: loads
//! configuration, sets up logging and tracing, runs the health checker and an
//! optional read-only admin endpoint, and shuts down on request.
//!
//! # Components
//!
//! - **Config**: YAML file plus `REGISTRY_*` environment overrides
//! - **RegistryServer**: owns the store and hands out registry and discovery
//!   handles to in-process consumers
//! - **AdminServer**: `GET /metrics`, `GET /instances`, `GET /healthz`

pub mod config;
pub mod http_server;
pub mod server;
pub mod telemetry;

pub use config::{Config, ConfigError, EnvOverrides};
pub use http_server::AdminServer;
pub use server::RegistryServer;
pub use telemetry::{TelemetryGuard, setup_tracing};
