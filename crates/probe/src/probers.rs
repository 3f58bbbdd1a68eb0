//! Probe implementations.

use crate::types::ProbeResult;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Health prober trait
///
/// One prober is shared by every instance in a sweep, so the endpoint and
/// the timeout are per call.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe `endpoint`, giving up after `timeout_duration`
    async fn probe(&self, endpoint: &str, timeout_duration: Duration) -> ProbeResult;

    /// Get the name of this prober
    fn name(&self) -> &'static str;
}

/// TCP connect prober for `tcp://host:port` endpoints
#[derive(Debug, Default)]
pub struct TcpProber;

impl TcpProber {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, endpoint: &str, timeout_duration: Duration) -> ProbeResult {
        let start = Instant::now();
        let target = endpoint.strip_prefix("tcp://").unwrap_or(endpoint);

        match timeout(timeout_duration, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => {
                let duration = start.elapsed();
                debug!(endpoint = %endpoint, duration_ms = duration.as_millis(), "TCP probe successful");
                ProbeResult::healthy(duration)
            }
            Ok(Err(e)) => ProbeResult::error(start.elapsed(), format!("connection failed: {}", e)),
            Err(_) => ProbeResult::timeout(start.elapsed()),
        }
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

/// HTTP prober issuing a bodiless GET, healthy on any 2xx
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    /// Create a new HTTP prober with a pooled client
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, endpoint: &str, timeout_duration: Duration) -> ProbeResult {
        let start = Instant::now();

        let request = self.client.get(endpoint);

        match timeout(timeout_duration, request.send()).await {
            Ok(Ok(response)) => {
                let duration = start.elapsed();
                let status = response.status();

                if status.is_success() {
                    debug!(endpoint = %endpoint, status = status.as_u16(), duration_ms = duration.as_millis(),
                           "HTTP probe successful");
                    ProbeResult::healthy(duration).with_response_code(status.as_u16())
                } else {
                    ProbeResult::unhealthy(duration, format!("unexpected status code: {}", status.as_u16()))
                        .with_response_code(status.as_u16())
                }
            }
            Ok(Err(e)) => ProbeResult::error(start.elapsed(), format!("HTTP request failed: {}", e)),
            Err(_) => ProbeResult::timeout(start.elapsed()),
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Dispatches on the endpoint scheme: `http`/`https` or `tcp`
pub struct EndpointProber {
    http: HttpProber,
    tcp: TcpProber,
}

impl EndpointProber {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: HttpProber::new()?,
            tcp: TcpProber::new(),
        })
    }
}

#[async_trait]
impl Prober for EndpointProber {
    async fn probe(&self, endpoint: &str, timeout_duration: Duration) -> ProbeResult {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            self.http.probe(endpoint, timeout_duration).await
        } else if endpoint.starts_with("tcp://") {
            self.tcp.probe(endpoint, timeout_duration).await
        } else {
            ProbeResult::error(Duration::ZERO, format!("unsupported endpoint scheme: {}", endpoint))
        }
    }

    fn name(&self) -> &'static str {
        "endpoint"
    }
}
