//! Prometheus metrics for the registry.

use crate::types::InstanceStatus;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::time::Duration;

/// Labels for outcome counters
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResultLabels {
    /// Result (ok, not_found, healthy, unhealthy, timeout, error)
    pub result: String,
}

/// Labels for status transition metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TransitionLabels {
    pub from: String,
    pub to: String,
}

/// Labels for discovery metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResolutionLabels {
    /// Selection strategy (all, round_robin, random)
    pub strategy: String,
    /// Result (found, empty)
    pub result: String,
}

/// Labels for per-status gauges
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StatusLabels {
    pub status: String,
}

/// Metrics registry with all service registry metrics
pub struct RegistryMetrics {
    /// Prometheus registry
    pub registry: Registry,

    // Write path
    registrations_total: Counter,
    deregistrations_total: Counter,
    renewals_total: Family<ResultLabels, Counter>,

    // Health checker
    probes_total: Family<ResultLabels, Counter>,
    probe_duration_seconds: Histogram,
    evictions_total: Counter,
    status_transitions_total: Family<TransitionLabels, Counter>,
    sweep_duration_seconds: Histogram,
    instances: Family<StatusLabels, Gauge>,

    // Read path
    resolutions_total: Family<ResolutionLabels, Counter>,
}

impl RegistryMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let registrations_total = Counter::default();
        registry.register(
            "registry_registrations",
            "Total instance registrations",
            registrations_total.clone(),
        );

        let deregistrations_total = Counter::default();
        registry.register(
            "registry_deregistrations",
            "Total explicit deregistrations that removed an instance",
            deregistrations_total.clone(),
        );

        let renewals_total = Family::<ResultLabels, Counter>::default();
        registry.register(
            "registry_renewals",
            "Total heartbeat renewals by result",
            renewals_total.clone(),
        );

        let probes_total = Family::<ResultLabels, Counter>::default();
        registry.register(
            "registry_probes",
            "Total health probes by result",
            probes_total.clone(),
        );

        // 1ms to ~16s
        let probe_duration_seconds = Histogram::new(exponential_buckets(0.001, 2.0, 15));
        registry.register(
            "registry_probe_duration_seconds",
            "Health probe duration in seconds",
            probe_duration_seconds.clone(),
        );

        let evictions_total = Counter::default();
        registry.register(
            "registry_evictions",
            "Total instances evicted after their TTL elapsed",
            evictions_total.clone(),
        );

        let status_transitions_total = Family::<TransitionLabels, Counter>::default();
        registry.register(
            "registry_status_transitions",
            "Total instance status transitions",
            status_transitions_total.clone(),
        );

        let sweep_duration_seconds = Histogram::new(exponential_buckets(0.001, 2.0, 16));
        registry.register(
            "registry_sweep_duration_seconds",
            "Health check sweep duration in seconds",
            sweep_duration_seconds.clone(),
        );

        let instances = Family::<StatusLabels, Gauge>::default();
        registry.register(
            "registry_instances",
            "Registered instances by status",
            instances.clone(),
        );

        let resolutions_total = Family::<ResolutionLabels, Counter>::default();
        registry.register(
            "registry_resolutions",
            "Total discovery resolutions by strategy and result",
            resolutions_total.clone(),
        );

        Self {
            registry,
            registrations_total,
            deregistrations_total,
            renewals_total,
            probes_total,
            probe_duration_seconds,
            evictions_total,
            status_transitions_total,
            sweep_duration_seconds,
            instances,
            resolutions_total,
        }
    }

    pub fn record_registration(&self) {
        self.registrations_total.inc();
    }

    pub fn record_deregistration(&self) {
        self.deregistrations_total.inc();
    }

    pub fn record_renewal(&self, found: bool) {
        let result = if found { "ok" } else { "not_found" };
        self.renewals_total
            .get_or_create(&ResultLabels {
                result: result.to_string(),
            })
            .inc();
    }

    /// Record one probe outcome (`healthy`, `unhealthy`, `timeout`, `error`)
    pub fn record_probe(&self, result: &str, duration: Duration) {
        self.probes_total
            .get_or_create(&ResultLabels {
                result: result.to_string(),
            })
            .inc();
        self.probe_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn record_eviction(&self) {
        self.evictions_total.inc();
    }

    pub fn record_status_transition(&self, from: InstanceStatus, to: InstanceStatus) {
        self.status_transitions_total
            .get_or_create(&TransitionLabels {
                from: from.to_string(),
                to: to.to_string(),
            })
            .inc();
    }

    pub fn record_sweep_duration(&self, duration: Duration) {
        self.sweep_duration_seconds.observe(duration.as_secs_f64());
    }

    /// Update instances by status count
    pub fn update_instance_counts(&self, pending: usize, healthy: usize, unhealthy: usize) {
        for (status, count) in [
            (InstanceStatus::Pending, pending),
            (InstanceStatus::Healthy, healthy),
            (InstanceStatus::Unhealthy, unhealthy),
        ] {
            self.instances
                .get_or_create(&StatusLabels {
                    status: status.to_string(),
                })
                .set(count as i64);
        }
    }

    pub fn record_resolution(&self, strategy: &str, found: bool) {
        let result = if found { "found" } else { "empty" };
        self.resolutions_total
            .get_or_create(&ResolutionLabels {
                strategy: strategy.to_string(),
                result: result.to_string(),
            })
            .inc();
    }

    /// Encode all metrics in the Prometheus text format
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for RegistryMetrics {
    fn default() -> Self {
        Self::new()
    }
}
