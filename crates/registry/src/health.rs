//! Background health checking and TTL eviction.

use crate::metrics::RegistryMetrics;
use crate::store::ServiceStore;
use crate::types::{InstanceStatus, ServiceInstance};
use futures::FutureExt;
use probe::{ProbeResult, Prober};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Health checker tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerConfig {
    /// Time between sweeps
    pub interval: Duration,

    /// Upper bound for a single probe
    pub probe_timeout: Duration,

    /// Probes in flight at once within a sweep
    pub max_concurrent_probes: usize,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(2),
            max_concurrent_probes: 64,
        }
    }
}

/// Outcome counts of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Probes that produced a result
    pub probed: usize,
    pub healthy: usize,
    pub failed: usize,
    pub evicted: usize,
    /// Results not applied: the instance was removed mid-probe, or the
    /// probe was cancelled by shutdown
    pub dropped: usize,
}

/// Periodic probe-and-evict loop over the whole store
pub struct HealthChecker {
    store: Arc<dyn ServiceStore>,
    prober: Arc<dyn Prober>,
    config: CheckerConfig,
    metrics: Option<Arc<RegistryMetrics>>,
    shutdown: CancellationToken,
}

impl HealthChecker {
    pub fn new(
        store: Arc<dyn ServiceStore>,
        prober: Arc<dyn Prober>,
        config: CheckerConfig,
        metrics: Option<Arc<RegistryMetrics>>,
    ) -> Self {
        Self {
            store,
            prober,
            config,
            metrics,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancelling this token stops the loop and abandons in-flight probes.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run sweeps every `interval` until shutdown.
    ///
    /// A sweep that overruns the interval causes the missed ticks to be
    /// skipped, never queued.
    pub async fn run(self) {
        info!(
            interval_ms = self.config.interval.as_millis(),
            probe_timeout_ms = self.config.probe_timeout.as_millis(),
            max_concurrent_probes = self.config.max_concurrent_probes,
            prober = self.prober.name(),
            "Health checker starting"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Health checker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }
    }

    /// Evict expired instances, then probe the rest and apply the results.
    pub async fn sweep_once(&self) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport::default();

        let snapshot = self.store.list_all();
        let now = Instant::now();

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_probes.max(1)));
        let mut probes = JoinSet::new();

        for instance in snapshot {
            if instance.is_expired(now) {
                self.evict(&instance, now, &mut report);
                continue;
            }

            let prober = self.prober.clone();
            let semaphore = semaphore.clone();
            let token = self.shutdown.clone();
            let probe_timeout = self.config.probe_timeout;
            let endpoint = instance.health_check_endpoint.clone();

            probes.spawn(async move {
                let work = async {
                    let _permit = semaphore.acquire_owned().await.ok()?;
                    let attempt = AssertUnwindSafe(async {
                        prober.probe(&endpoint, probe_timeout).await
                    })
                    .catch_unwind();

                    Some(match timeout(probe_timeout, attempt).await {
                        Ok(Ok(result)) => result,
                        Ok(Err(_)) => {
                            error!(endpoint = %endpoint, "Health probe panicked");
                            ProbeResult::error(Duration::ZERO, "probe panicked")
                        }
                        Err(_) => ProbeResult::timeout(probe_timeout),
                    })
                };

                let outcome = tokio::select! {
                    _ = token.cancelled() => None,
                    outcome = work => outcome,
                };
                (instance, outcome)
            });
        }

        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((instance, Some(result))) => self.apply(&instance, result, &mut report),
                Ok((instance, None)) => {
                    debug!(instance_id = %instance.id, "Probe cancelled");
                    report.dropped += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Probe task failed");
                    report.dropped += 1;
                }
            }
        }

        self.publish_counts();

        let elapsed = started.elapsed();
        if let Some(ref m) = self.metrics {
            m.record_sweep_duration(elapsed);
        }
        debug!(
            probed = report.probed,
            healthy = report.healthy,
            failed = report.failed,
            evicted = report.evicted,
            dropped = report.dropped,
            duration_ms = elapsed.as_millis(),
            "Sweep completed"
        );

        report
    }

    fn apply(&self, instance: &ServiceInstance, result: ProbeResult, report: &mut SweepReport) {
        let checked_at = Instant::now();
        let healthy = result.is_healthy();

        report.probed += 1;
        if healthy {
            report.healthy += 1;
        } else {
            report.failed += 1;
        }
        if let Some(ref m) = self.metrics {
            m.record_probe(&result.status.to_string().to_lowercase(), result.duration);
        }

        let mut previous = None;
        let updated = self.store.update(&instance.id, &mut |record| {
            previous = Some(record.status);
            record.status = record.status.after_probe(healthy);
            record.last_checked_at = Some(checked_at);
            if healthy {
                record.last_healthy_at = Some(checked_at);
                record.probe.consecutive_failures = 0;
            } else {
                record.probe.consecutive_failures = record.probe.consecutive_failures.saturating_add(1);
            }
            record.probe.last_duration = Some(result.duration);
            record.probe.last_message = Some(result.summary());
        });

        // Removed while the probe was in flight: remove wins
        let Some(updated) = updated else {
            debug!(instance_id = %instance.id, "Instance removed during probe, result dropped");
            report.dropped += 1;
            return;
        };

        if let Some(err) = result.to_error() {
            warn!(
                instance_id = %updated.id,
                endpoint = %updated.health_check_endpoint,
                consecutive = updated.probe.consecutive_failures,
                error = %err,
                "Health probe failed"
            );
        }

        let Some(previous) = previous else { return };
        if previous == updated.status {
            return;
        }

        match updated.status {
            InstanceStatus::Healthy => info!(
                instance_id = %updated.id,
                service_name = %updated.service_name,
                from = %previous,
                duration_ms = result.duration.as_millis(),
                "Instance is now HEALTHY"
            ),
            _ => warn!(
                instance_id = %updated.id,
                service_name = %updated.service_name,
                from = %previous,
                reason = %result.summary(),
                "Instance is now UNHEALTHY"
            ),
        }
        if let Some(ref m) = self.metrics {
            m.record_status_transition(previous, updated.status);
        }
    }

    fn evict(&self, instance: &ServiceInstance, now: Instant, report: &mut SweepReport) {
        // Re-check against the live record: a renewal since the snapshot wins
        let Some(removed) = self.store.remove_if(&instance.id, &|record| record.is_expired(now)) else {
            return;
        };

        report.evicted += 1;
        info!(
            instance_id = %removed.id,
            service_name = %removed.service_name,
            status = %removed.status,
            silent_secs = now.saturating_duration_since(removed.last_seen()).as_secs(),
            ttl_secs = removed.ttl.as_secs(),
            "Instance expired, evicting"
        );
        if let Some(ref m) = self.metrics {
            m.record_eviction();
            m.record_status_transition(removed.status, InstanceStatus::Expired);
        }
    }

    fn publish_counts(&self) {
        let Some(ref m) = self.metrics else { return };

        let (mut pending, mut healthy, mut unhealthy) = (0, 0, 0);
        for instance in self.store.list_all() {
            match instance.status {
                InstanceStatus::Pending => pending += 1,
                InstanceStatus::Healthy => healthy += 1,
                InstanceStatus::Unhealthy => unhealthy += 1,
                InstanceStatus::Expired => {}
            }
        }
        m.update_instance_counts(pending, healthy, unhealthy);
    }
}
