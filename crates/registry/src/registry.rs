//! Validated write path: register, renew, deregister.

use crate::metrics::RegistryMetrics;
use crate::store::ServiceStore;
use crate::types::{Address, InstanceId, InstanceStatus, ProbeDetails, ServiceDescriptor, ServiceInstance};
use common::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Write-path API in front of the store
#[derive(Clone)]
pub struct ServiceRegistry {
    store: Arc<dyn ServiceStore>,
    default_ttl: Duration,
    metrics: Option<Arc<RegistryMetrics>>,
}

impl ServiceRegistry {
    pub fn new(
        store: Arc<dyn ServiceStore>,
        default_ttl: Duration,
        metrics: Option<Arc<RegistryMetrics>>,
    ) -> Self {
        Self {
            store,
            default_ttl,
            metrics,
        }
    }

    /// Register a new instance in `Pending` state and return its id
    pub fn register(&self, descriptor: ServiceDescriptor) -> Result<InstanceId> {
        let service_name = descriptor.service_name.trim();
        if service_name.is_empty() {
            return Err(Error::invalid_descriptor("service name is required"));
        }
        if descriptor.address.is_empty() {
            return Err(Error::invalid_descriptor("address is required"));
        }

        let ttl = descriptor.ttl.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            return Err(Error::invalid_descriptor("ttl must be greater than zero"));
        }

        let now = Instant::now();
        let instance = ServiceInstance {
            id: InstanceId::generate(),
            service_name: service_name.to_string(),
            health_check_endpoint: health_check_url(&descriptor.health_check_endpoint, &descriptor.address),
            address: descriptor.address,
            metadata: descriptor.metadata,
            status: InstanceStatus::Pending,
            registered_at: now,
            last_heartbeat_at: now,
            last_checked_at: None,
            last_healthy_at: None,
            ttl,
            weight: descriptor.weight,
            probe: ProbeDetails::default(),
        };
        let id = instance.id.clone();

        info!(
            instance_id = %id,
            service_name = %instance.service_name,
            address = %instance.address,
            health_check = %instance.health_check_endpoint,
            ttl_secs = ttl.as_secs(),
            weight = instance.weight,
            "Service registered"
        );
        self.store.put(instance)?;

        if let Some(ref m) = self.metrics {
            m.record_registration();
        }

        Ok(id)
    }

    /// Heartbeat. Refreshes liveness only; it never changes the status.
    pub fn renew(&self, id: &InstanceId) -> Result<()> {
        let now = Instant::now();

        let renewed = match self.store.get(id) {
            Some(current) if current.is_expired(now) => {
                // Past its TTL but not swept yet: it is already dead
                self.store.remove_if(id, &|record| record.is_expired(now));
                None
            }
            Some(_) => self.store.update(id, &mut |record| {
                if now > record.last_heartbeat_at {
                    record.last_heartbeat_at = now;
                }
            }),
            None => None,
        };

        if let Some(ref m) = self.metrics {
            m.record_renewal(renewed.is_some());
        }

        match renewed {
            Some(instance) => {
                debug!(instance_id = %id, service_name = %instance.service_name, "Heartbeat received");
                Ok(())
            }
            None => {
                warn!(instance_id = %id, "Heartbeat for unknown or expired instance");
                Err(Error::not_found(id))
            }
        }
    }

    /// Remove an instance. Idempotent; returns whether anything was removed.
    pub fn deregister(&self, id: &InstanceId) -> bool {
        match self.store.remove(id) {
            Some(removed) => {
                info!(
                    instance_id = %id,
                    service_name = %removed.service_name,
                    status = %removed.status,
                    "Service deregistered"
                );
                if let Some(ref m) = self.metrics {
                    m.record_deregistration();
                }
                true
            }
            None => {
                debug!(instance_id = %id, "Deregister for unknown instance, already gone");
                false
            }
        }
    }

    pub fn get(&self, id: &InstanceId) -> Option<Arc<ServiceInstance>> {
        self.store.get(id)
    }

    /// Snapshot of every record, any status
    pub fn list(&self) -> Vec<Arc<ServiceInstance>> {
        self.store.list_all()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

/// Resolve the probe URL for a descriptor.
fn health_check_url(endpoint: &str, address: &Address) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');

    if endpoint.is_empty() {
        format!("{}/health", address.base_url())
    } else if endpoint.contains("://") {
        endpoint.to_string()
    } else if endpoint.starts_with('/') {
        format!("{}{}", address.base_url(), endpoint)
    } else {
        format!("{}://{}", address.scheme, endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use std::collections::HashSet;

    fn registry() -> (ServiceRegistry, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let registry = ServiceRegistry::new(store.clone(), Duration::from_secs(30), None);
        (registry, store)
    }

    fn descriptor(name: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(name, Address::new("10.0.0.1", 8080))
    }

    #[tokio::test]
    async fn test_register_creates_pending_instance() {
        let (registry, store) = registry();

        let id = registry
            .register(descriptor("catalog-api").with_metadata("version", "2.1"))
            .unwrap();

        let instance = store.get(&id).unwrap();
        assert_eq!(instance.status, InstanceStatus::Pending);
        assert_eq!(instance.service_name, "catalog-api");
        assert_eq!(instance.registered_at, instance.last_heartbeat_at);
        assert_eq!(instance.ttl, Duration::from_secs(30));
        assert_eq!(instance.metadata.get("version").map(String::as_str), Some("2.1"));
        assert_eq!(instance.weight, crate::types::DEFAULT_WEIGHT);

        let weighted = registry.register(descriptor("catalog-api").with_weight(0)).unwrap();
        assert_eq!(store.get(&weighted).unwrap().weight, 0);
    }

    #[tokio::test]
    async fn test_register_rejects_empty_name_and_address() {
        let (registry, store) = registry();

        let err = registry.register(descriptor("   ")).unwrap_err();
        assert!(matches!(err, Error::InvalidDescriptor(_)));

        let err = registry
            .register(ServiceDescriptor::new("catalog-api", Address::new("", 8080)))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDescriptor(_)));

        let err = registry
            .register(ServiceDescriptor::new("catalog-api", Address::new("10.0.0.1", 0)))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDescriptor(_)));

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_register_ids_are_unique() {
        let (registry, _) = registry();

        let ids: HashSet<InstanceId> = (0..500)
            .map(|_| registry.register(descriptor("catalog-api")).unwrap())
            .collect();

        assert_eq!(ids.len(), 500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_bumps_heartbeat() {
        let (registry, store) = registry();
        let id = registry.register(descriptor("catalog-api")).unwrap();
        let registered = store.get(&id).unwrap().last_heartbeat_at;

        tokio::time::advance(Duration::from_secs(5)).await;
        registry.renew(&id).unwrap();

        let renewed = store.get(&id).unwrap().last_heartbeat_at;
        assert_eq!(renewed - registered, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_renew_unknown_id_is_not_found() {
        let (registry, _) = registry();

        let err = registry.renew(&InstanceId::from("nope")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_after_ttl_is_not_found() {
        let (registry, store) = registry();
        let id = registry
            .register(descriptor("catalog-api").with_ttl(Duration::from_secs(10)))
            .unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;

        let err = registry.renew(&id).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(store.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_renew_does_not_promote_unhealthy() {
        let (registry, store) = registry();
        let id = registry.register(descriptor("catalog-api")).unwrap();
        store.update(&id, &mut |record| record.status = InstanceStatus::Unhealthy);

        registry.renew(&id).unwrap();

        assert_eq!(store.get(&id).unwrap().status, InstanceStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_deregister_is_idempotent() {
        let (registry, store) = registry();
        let id = registry.register(descriptor("catalog-api")).unwrap();

        assert!(registry.deregister(&id));
        assert!(store.get(&id).is_none());

        assert!(!registry.deregister(&id));
        assert!(store.get(&id).is_none());
        assert!(!registry.deregister(&InstanceId::from("never-registered")));
    }

    #[tokio::test]
    async fn test_register_after_close_fails() {
        let (registry, store) = registry();
        store.close();

        let err = registry.register(descriptor("catalog-api")).unwrap_err();
        assert!(matches!(err, Error::ShuttingDown));
    }

    #[test]
    fn test_health_check_url_resolution() {
        let address = Address::new("h1", 1);

        assert_eq!(health_check_url("", &address), "http://h1:1/health");
        assert_eq!(health_check_url("h1:1/health", &address), "http://h1:1/health");
        assert_eq!(health_check_url("/ready/", &address), "http://h1:1/ready");
        assert_eq!(
            health_check_url("https://h1:8443/health", &address),
            "https://h1:8443/health"
        );
        assert_eq!(health_check_url("tcp://h1:1", &address), "tcp://h1:1");
    }
}
