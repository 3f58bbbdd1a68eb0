//! Configuration loading and validation for the registry server

use registry::CheckerConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

/// Prefix of environment overrides, e.g. `REGISTRY_SWEEP_INTERVAL=5s`
pub const ENV_PREFIX: &str = "REGISTRY_";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid environment override: {0}")]
    EnvError(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] ValidationErrors),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub registry: RegistrySettings,

    #[serde(default)]
    pub admin: AdminSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationErrors> {
        self.health.validate()?;
        self.registry.validate()?;
        self.admin.validate()?;

        let mut errors = ValidationErrors::new();
        if self.health.probe_timeout >= self.health.interval {
            errors.add(
                "probe_timeout",
                ValidationError::new("probe_timeout_not_below_interval"),
            );
        }
        if self.registry.default_ttl < self.health.interval {
            errors.add("default_ttl", ValidationError::new("default_ttl_below_interval"));
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Health checker settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HealthSettings {
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_interval")]
    pub interval: Duration,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_probe_timeout")]
    pub probe_timeout: Duration,

    #[validate(range(min = 1, max = 10000))]
    pub max_concurrent_probes: usize,
}

/// Registration settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RegistrySettings {
    /// TTL for descriptors that do not carry their own
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_ttl")]
    pub default_ttl: Duration,
}

/// Admin HTTP endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AdminSettings {
    pub enabled: bool,

    #[validate(custom = "validate_listen_addr")]
    pub listen_addr: String,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,

    /// `text` (default) or `json`
    pub format: Option<String>,
}

/// OTLP transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    #[default]
    Grpc,
    Http,
}

/// OpenTelemetry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub enabled: bool,
    pub service_name: String,
    pub otlp_endpoint: String,
    pub protocol: OtlpProtocol,
}

// Default implementations

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(2),
            max_concurrent_probes: 64,
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(30),
        }
    }
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1:9095".to_string(),
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "service-registry".to_string(),
            otlp_endpoint: "http://localhost:4317".to_string(),
            protocol: OtlpProtocol::Grpc,
        }
    }
}

// Custom validators

fn validate_interval(interval: &Duration) -> Result<(), ValidationError> {
    let millis = interval.as_millis();
    if !(100..=600_000).contains(&millis) {
        return Err(ValidationError::new("interval_out_of_range"));
    }
    Ok(())
}

fn validate_probe_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    let millis = timeout.as_millis();
    if !(10..=60_000).contains(&millis) {
        return Err(ValidationError::new("probe_timeout_out_of_range"));
    }
    Ok(())
}

fn validate_ttl(ttl: &Duration) -> Result<(), ValidationError> {
    if *ttl < Duration::from_secs(1) || *ttl > Duration::from_secs(86_400) {
        return Err(ValidationError::new("ttl_out_of_range"));
    }
    Ok(())
}

fn validate_listen_addr(addr: &str) -> Result<(), ValidationError> {
    addr.trim()
        .parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("listen_addr_invalid"))
}

/// Values read from `REGISTRY_*` environment variables
#[derive(Debug, Default, Deserialize)]
pub struct EnvOverrides {
    #[serde(default, with = "humantime_serde")]
    pub sweep_interval: Option<Duration>,

    #[serde(default, with = "humantime_serde")]
    pub probe_timeout: Option<Duration>,

    #[serde(default, with = "humantime_serde")]
    pub default_ttl: Option<Duration>,

    pub max_concurrent_probes: Option<usize>,
    pub log_level: Option<String>,
    pub admin_listen_addr: Option<String>,
}

impl EnvOverrides {
    /// Read overrides from the process environment
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed(ENV_PREFIX).from_env()
    }

    /// Read overrides from explicit `(name, value)` pairs
    pub fn from_vars<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX).from_iter(vars)
    }
}

// Configuration loading implementation

impl Config {
    /// Load from the default search paths, apply environment overrides, validate
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::read_file(&path)?
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Self::default()
            }
        };

        config.apply_overrides(EnvOverrides::from_env()?);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file, without environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::read_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Overlay environment values on top of file values
    pub fn apply_overrides(&mut self, overrides: EnvOverrides) {
        if let Some(interval) = overrides.sweep_interval {
            self.health.interval = interval;
        }
        if let Some(timeout) = overrides.probe_timeout {
            self.health.probe_timeout = timeout;
        }
        if let Some(probes) = overrides.max_concurrent_probes {
            self.health.max_concurrent_probes = probes;
        }
        if let Some(ttl) = overrides.default_ttl {
            self.registry.default_ttl = ttl;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = Some(level);
        }
        if let Some(addr) = overrides.admin_listen_addr {
            self.admin.listen_addr = addr;
        }
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/service-registry/registry.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./registry.yaml"));

        paths.into_iter().find(|p| p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/service-registry/registry.yaml"))
    }

    pub fn to_checker_config(&self) -> CheckerConfig {
        CheckerConfig {
            interval: self.health.interval,
            probe_timeout: self.health.probe_timeout,
            max_concurrent_probes: self.health.max_concurrent_probes,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.registry.default_ttl
    }

    pub fn log_level(&self) -> &str {
        self.logging.level.as_deref().unwrap_or("info")
    }

    pub fn json_logs(&self) -> bool {
        self.logging
            .format
            .as_deref()
            .is_some_and(|format| format.eq_ignore_ascii_case("json"))
    }
}
