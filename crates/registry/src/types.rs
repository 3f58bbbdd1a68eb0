//! Registry data model.

use common::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Identity of one registered instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Generate a fresh random (v4) id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Network location of an instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Address {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl Address {
    /// Create an `http` address
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_scheme("http", host, port)
    }

    pub fn with_scheme(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// `host:port`
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `scheme://host:port`
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    pub fn is_empty(&self) -> bool {
        self.host.trim().is_empty() || self.port == 0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Address {
    type Err = Error;

    /// Parse `host:port` or `scheme://host:port`, ignoring any trailing path.
    fn from_str(s: &str) -> Result<Self> {
        let (scheme, rest) = match s.trim().split_once("://") {
            Some((scheme, rest)) => (scheme, rest),
            None => ("http", s.trim()),
        };
        let authority = rest.split('/').next().unwrap_or_default();

        let (host, port) = authority
            .rsplit_once(':')
            .ok_or_else(|| Error::invalid_descriptor(format!("address '{}' has no port", s)))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| Error::invalid_descriptor(format!("address '{}' has an invalid port", s)))?;

        Ok(Self::with_scheme(scheme, host, port))
    }
}

/// Health state of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Registered, not yet confirmed by a probe
    Pending,
    Healthy,
    Unhealthy,
    /// Marker used while evicting; never stored
    Expired,
}

impl InstanceStatus {
    /// Status after a probe outcome.
    ///
    /// Only Pending->Healthy and Healthy<->Unhealthy are possible; a Pending
    /// instance that fails its probe stays Pending.
    pub fn after_probe(self, healthy: bool) -> Self {
        match (self, healthy) {
            (InstanceStatus::Expired, _) => InstanceStatus::Expired,
            (_, true) => InstanceStatus::Healthy,
            (InstanceStatus::Pending, false) => InstanceStatus::Pending,
            (_, false) => InstanceStatus::Unhealthy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Pending => "pending",
            InstanceStatus::Healthy => "healthy",
            InstanceStatus::Unhealthy => "unhealthy",
            InstanceStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weight of a descriptor that does not set one
pub const DEFAULT_WEIGHT: u32 = 1;

/// Registration input
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    pub service_name: String,
    pub address: Address,

    /// Probe URL. Empty means `<base_url>/health`; a value without a scheme
    /// inherits the address scheme.
    pub health_check_endpoint: String,

    pub metadata: HashMap<String, String>,

    /// Falls back to the registry default
    pub ttl: Option<Duration>,

    /// Relative share under weighted selection; 0 takes no traffic
    pub weight: u32,
}

impl ServiceDescriptor {
    pub fn new(service_name: impl Into<String>, address: Address) -> Self {
        Self {
            service_name: service_name.into(),
            address,
            health_check_endpoint: String::new(),
            metadata: HashMap::new(),
            ttl: None,
            weight: DEFAULT_WEIGHT,
        }
    }

    pub fn with_health_check(mut self, endpoint: impl Into<String>) -> Self {
        self.health_check_endpoint = endpoint.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

/// Outcome details of the most recent probes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeDetails {
    pub consecutive_failures: u32,
    pub last_duration: Option<Duration>,
    pub last_message: Option<String>,
}

/// One registered endpoint. Owned by the store and replaced as a whole.
#[derive(Debug, Clone)]
pub struct ServiceInstance {
    pub id: InstanceId,
    pub service_name: String,
    pub address: Address,
    pub metadata: HashMap<String, String>,
    pub health_check_endpoint: String,
    pub status: InstanceStatus,
    pub registered_at: Instant,
    pub last_heartbeat_at: Instant,
    pub last_checked_at: Option<Instant>,
    pub last_healthy_at: Option<Instant>,
    pub ttl: Duration,
    pub weight: u32,
    pub probe: ProbeDetails,
}

impl ServiceInstance {
    /// Most recent liveness signal: a heartbeat or a successful probe.
    pub fn last_seen(&self) -> Instant {
        match self.last_healthy_at {
            Some(healthy_at) if healthy_at > self.last_heartbeat_at => healthy_at,
            _ => self.last_heartbeat_at,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen()) > self.ttl
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            instance_id: self.id.clone(),
            address: self.address.clone(),
            metadata: self.metadata.clone(),
            weight: self.weight,
        }
    }

    /// Serializable snapshot with timestamps expressed as ages.
    pub fn view(&self, now: Instant) -> InstanceView {
        let age = |at: Instant| now.saturating_duration_since(at).as_secs_f64();

        InstanceView {
            instance_id: self.id.clone(),
            service_name: self.service_name.clone(),
            address: self.address.clone(),
            metadata: self.metadata.clone(),
            health_check_endpoint: self.health_check_endpoint.clone(),
            status: self.status,
            registered_secs_ago: age(self.registered_at),
            last_heartbeat_secs_ago: age(self.last_heartbeat_at),
            last_checked_secs_ago: self.last_checked_at.map(age),
            ttl_secs: self.ttl.as_secs_f64(),
            weight: self.weight,
            consecutive_failures: self.probe.consecutive_failures,
            last_probe_message: self.probe.last_message.clone(),
        }
    }
}

/// What discovery hands to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Endpoint {
    pub instance_id: InstanceId,
    pub address: Address,
    pub metadata: HashMap<String, String>,
    pub weight: u32,
}

/// Administrative view of an instance
#[derive(Debug, Clone, Serialize)]
pub struct InstanceView {
    pub instance_id: InstanceId,
    pub service_name: String,
    pub address: Address,
    pub metadata: HashMap<String, String>,
    pub health_check_endpoint: String,
    pub status: InstanceStatus,
    pub registered_secs_ago: f64,
    pub last_heartbeat_secs_ago: f64,
    pub last_checked_secs_ago: Option<f64>,
    pub ttl_secs: f64,
    pub weight: u32,
    pub consecutive_failures: u32,
    pub last_probe_message: Option<String>,
}
