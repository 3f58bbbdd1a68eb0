//! Health probes for registered service instances.
//!
//! A probe is a single, bounded check of an instance's health endpoint:
//! - HTTP/HTTPS GET, healthy on any 2xx status
//! - TCP connect, for `tcp://host:port` endpoints
//!
//! Probes never return errors. Every failure mode (non-2xx, timeout,
//! connection error) is folded into a [`ProbeResult`] so a caller sweeping
//! many endpoints can treat each outcome as data.
//!
//! # Example
//!
//! ```no_run
//! use probe::{EndpointProber, Prober};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let prober = EndpointProber::new()?;
//! let result = prober
//!     .probe("http://10.0.0.7:8080/health", Duration::from_secs(2))
//!     .await;
//!
//! if !result.is_healthy() {
//!     println!("unhealthy: {}", result.summary());
//! }
//! # Ok(())
//! # }
//! ```

pub mod probers;
pub mod types;

pub use probers::{EndpointProber, HttpProber, Prober, TcpProber};
pub use types::{ProbeResult, ProbeStatus};

#[cfg(feature = "mock")]
pub use probers::MockProber;
