//! Probe result types.

use std::fmt;
use std::time::Duration;

/// Outcome class of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    /// Endpoint answered with a success status
    Healthy,
    /// Endpoint answered, but not with a success status
    Unhealthy,
    /// No answer within the probe timeout
    Timeout,
    /// The request could not be made (connection refused, DNS, bad URL)
    Error,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Healthy => write!(f, "HEALTHY"),
            ProbeStatus::Unhealthy => write!(f, "UNHEALTHY"),
            ProbeStatus::Timeout => write!(f, "TIMEOUT"),
            ProbeStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Result of one probe
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub status: ProbeStatus,

    /// Wall time spent on the probe
    pub duration: Duration,

    /// Failure detail
    pub message: Option<String>,

    /// Response code (HTTP probes only)
    pub response_code: Option<u16>,
}

impl ProbeResult {
    pub fn healthy(duration: Duration) -> Self {
        Self {
            status: ProbeStatus::Healthy,
            duration,
            message: None,
            response_code: None,
        }
    }

    pub fn unhealthy(duration: Duration, message: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::Unhealthy,
            duration,
            message: Some(message.into()),
            response_code: None,
        }
    }

    pub fn timeout(duration: Duration) -> Self {
        Self {
            status: ProbeStatus::Timeout,
            duration,
            message: Some("timeout".to_string()),
            response_code: None,
        }
    }

    pub fn error(duration: Duration, message: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::Error,
            duration,
            message: Some(message.into()),
            response_code: None,
        }
    }

    pub fn with_response_code(mut self, code: u16) -> Self {
        self.response_code = Some(code);
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == ProbeStatus::Healthy
    }

    /// Short human readable outcome, e.g. `OK`, `HTTP 503`, `timeout`.
    pub fn summary(&self) -> String {
        match (self.status, self.response_code, &self.message) {
            (ProbeStatus::Healthy, _, _) => "OK".to_string(),
            (_, Some(code), _) => format!("HTTP {}", code),
            (_, None, Some(message)) => message.clone(),
            (status, None, None) => status.to_string().to_lowercase(),
        }
    }

    /// The failure as a registry error, `None` for a healthy result.
    pub fn to_error(&self) -> Option<common::Error> {
        if self.is_healthy() {
            None
        } else {
            Some(common::Error::probe_failed(self.summary()))
        }
    }
}
