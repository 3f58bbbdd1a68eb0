//! Read path: resolve a service name to healthy endpoints.

use crate::metrics::RegistryMetrics;
use crate::store::ServiceStore;
use crate::types::{Endpoint, InstanceStatus, ServiceInstance};
use common::{Error, Result};
use dashmap::DashMap;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// How `resolve_one` picks among healthy instances
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Cycle through instances in a stable order, per service name
    #[default]
    RoundRobin,
    Random,
    /// Random, in proportion to each instance's weight. Weight 0 is never picked.
    Weighted,
}

impl SelectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionStrategy::RoundRobin => "round_robin",
            SelectionStrategy::Random => "random",
            SelectionStrategy::Weighted => "weighted",
        }
    }
}

/// Service name plus optional metadata constraints.
///
/// Tag keys match exactly, tag values case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceQuery {
    pub service_name: String,
    pub tags: HashMap<String, String>,
}

impl ServiceQuery {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            tags: HashMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, instance: &ServiceInstance) -> bool {
        self.tags.iter().all(|(key, expected)| {
            instance
                .metadata
                .get(key)
                .is_some_and(|actual| actual.eq_ignore_ascii_case(expected))
        })
    }
}

/// Resolves service names against the store. Cheap to clone.
#[derive(Clone)]
pub struct ServiceDiscovery {
    store: Arc<dyn ServiceStore>,
    /// One round-robin cursor per service name, dropped once the name has
    /// no instances left
    cursors: Arc<DashMap<String, Arc<AtomicUsize>>>,
    metrics: Option<Arc<RegistryMetrics>>,
}

impl ServiceDiscovery {
    pub fn new(store: Arc<dyn ServiceStore>, metrics: Option<Arc<RegistryMetrics>>) -> Self {
        Self {
            store,
            cursors: Arc::new(DashMap::new()),
            metrics,
        }
    }

    /// All healthy endpoints of a service. An empty result is not an error.
    pub fn resolve(&self, service_name: &str) -> Vec<Endpoint> {
        self.resolve_query(&ServiceQuery::new(service_name))
    }

    pub fn resolve_query(&self, query: &ServiceQuery) -> Vec<Endpoint> {
        let endpoints: Vec<Endpoint> = self
            .healthy(query)
            .iter()
            .map(|instance| instance.endpoint())
            .collect();

        self.record("all", !endpoints.is_empty());
        endpoints
    }

    /// Pick a single healthy endpoint.
    pub fn resolve_one(&self, service_name: &str, strategy: SelectionStrategy) -> Result<Endpoint> {
        self.resolve_one_query(&ServiceQuery::new(service_name), strategy)
    }

    pub fn resolve_one_query(
        &self,
        query: &ServiceQuery,
        strategy: SelectionStrategy,
    ) -> Result<Endpoint> {
        let candidates = self.healthy(query);
        if candidates.is_empty() {
            self.forget_if_gone(&query.service_name);
            return Err(self.unavailable(query, strategy));
        }

        let index = match strategy {
            SelectionStrategy::RoundRobin => {
                let cursor = self
                    .cursors
                    .entry(query.service_name.clone())
                    .or_insert_with(|| Arc::new(AtomicUsize::new(0)))
                    .clone();
                cursor.fetch_add(1, Ordering::Relaxed) % candidates.len()
            }
            SelectionStrategy::Random => rand::thread_rng().gen_range(0..candidates.len()),
            SelectionStrategy::Weighted => match pick_weighted(&candidates) {
                Some(index) => index,
                None => return Err(self.unavailable(query, strategy)),
            },
        };

        self.record(strategy.as_str(), true);
        Ok(candidates[index].endpoint())
    }

    fn unavailable(&self, query: &ServiceQuery, strategy: SelectionStrategy) -> Error {
        self.record(strategy.as_str(), false);
        debug!(service_name = %query.service_name, "No healthy instance to resolve");
        Error::service_unavailable(&query.service_name)
    }

    fn forget_if_gone(&self, service_name: &str) {
        if self.cursors.contains_key(service_name) && self.store.list_by_name(service_name).is_empty() {
            self.cursors.remove(service_name);
        }
    }

    /// Healthy instances matching the query, sorted by id for a stable rotation.
    fn healthy(&self, query: &ServiceQuery) -> Vec<Arc<ServiceInstance>> {
        let mut instances: Vec<_> = self
            .store
            .list_by_name(&query.service_name)
            .into_iter()
            .filter(|instance| instance.status == InstanceStatus::Healthy)
            .filter(|instance| query.matches(instance))
            .collect();
        instances.sort_by(|a, b| a.id.cmp(&b.id));
        instances
    }

    fn record(&self, strategy: &str, found: bool) {
        if let Some(ref m) = self.metrics {
            m.record_resolution(strategy, found);
        }
    }

    #[cfg(test)]
    fn cursor_count(&self) -> usize {
        self.cursors.len()
    }
}

/// Index of a weighted random pick, or `None` when every weight is zero.
fn pick_weighted(candidates: &[Arc<ServiceInstance>]) -> Option<usize> {
    let total: u64 = candidates.iter().map(|c| u64::from(c.weight)).sum();
    if total == 0 {
        return None;
    }

    let mut target = rand::thread_rng().gen_range(0..total);
    for (index, candidate) in candidates.iter().enumerate() {
        let weight = u64::from(candidate.weight);
        if target < weight {
            return Some(index);
        }
        target -= weight;
    }
    None
}
