//! Concurrent in-memory storage of instance records.
//!
//! Records are held as `Arc<ServiceInstance>` and replaced wholesale, so a
//! reader holding a snapshot never sees a half-applied update. Locking is per
//! shard of the underlying `DashMap`, never global.

use crate::types::{InstanceId, ServiceInstance};
use common::{Error, Result};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Storage seam of the registry.
///
/// `update` and `remove_if` only ever touch a record that is still present:
/// once an id is removed, later writes targeting it are dropped.
pub trait ServiceStore: Send + Sync {
    /// Insert or replace by id. Fails only once the store is closed.
    fn put(&self, instance: ServiceInstance) -> Result<()>;

    fn get(&self, id: &InstanceId) -> Option<Arc<ServiceInstance>>;

    /// All instances of a service, any status.
    fn list_by_name(&self, service_name: &str) -> Vec<Arc<ServiceInstance>>;

    /// Idempotent delete, returning the removed record if there was one.
    fn remove(&self, id: &InstanceId) -> Option<Arc<ServiceInstance>>;

    /// Delete only if `predicate` holds for the current record.
    fn remove_if(
        &self,
        id: &InstanceId,
        predicate: &dyn Fn(&ServiceInstance) -> bool,
    ) -> Option<Arc<ServiceInstance>>;

    /// Copy-on-write update of an existing record. Returns the new record, or
    /// `None` if the id is absent.
    fn update(
        &self,
        id: &InstanceId,
        apply: &mut dyn FnMut(&mut ServiceInstance),
    ) -> Option<Arc<ServiceInstance>>;

    fn list_all(&self) -> Vec<Arc<ServiceInstance>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting new records
    fn close(&self);
}

/// Default single-process store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: DashMap<InstanceId, Arc<ServiceInstance>>,
    by_name: DashMap<String, HashSet<InstanceId>>,
    closed: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn unindex(&self, service_name: &str, id: &InstanceId) {
        if let Some(mut ids) = self.by_name.get_mut(service_name) {
            ids.remove(id);
        }
        self.by_name.remove_if(service_name, |_, ids| ids.is_empty());
    }
}

impl ServiceStore for InMemoryStore {
    fn put(&self, instance: ServiceInstance) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ShuttingDown);
        }

        // Index first: a record reachable through `records` is always listed.
        self.by_name
            .entry(instance.service_name.clone())
            .or_default()
            .insert(instance.id.clone());

        let id = instance.id.clone();
        let service_name = instance.service_name.clone();
        if let Some(previous) = self.records.insert(id.clone(), Arc::new(instance)) {
            if previous.service_name != service_name {
                self.unindex(&previous.service_name, &id);
            }
        }

        Ok(())
    }

    fn get(&self, id: &InstanceId) -> Option<Arc<ServiceInstance>> {
        self.records.get(id).map(|entry| entry.value().clone())
    }

    fn list_by_name(&self, service_name: &str) -> Vec<Arc<ServiceInstance>> {
        let ids: Vec<InstanceId> = match self.by_name.get(service_name) {
            Some(ids) => ids.iter().cloned().collect(),
            None => return Vec::new(),
        };

        ids.iter()
            .filter_map(|id| self.get(id))
            .filter(|instance| instance.service_name == service_name)
            .collect()
    }

    fn remove(&self, id: &InstanceId) -> Option<Arc<ServiceInstance>> {
        let (_, removed) = self.records.remove(id)?;
        self.unindex(&removed.service_name, id);
        Some(removed)
    }

    fn remove_if(
        &self,
        id: &InstanceId,
        predicate: &dyn Fn(&ServiceInstance) -> bool,
    ) -> Option<Arc<ServiceInstance>> {
        let (_, removed) = self.records.remove_if(id, |_, record| predicate(record.as_ref()))?;
        self.unindex(&removed.service_name, id);
        Some(removed)
    }

    fn update(
        &self,
        id: &InstanceId,
        apply: &mut dyn FnMut(&mut ServiceInstance),
    ) -> Option<Arc<ServiceInstance>> {
        let mut entry = self.records.get_mut(id)?;
        let mut next = (**entry.value()).clone();
        apply(&mut next);
        next.id = id.clone();

        let next = Arc::new(next);
        *entry.value_mut() = next.clone();
        Some(next)
    }

    fn list_all(&self) -> Vec<Arc<ServiceInstance>> {
        self.records.iter().map(|entry| entry.value().clone()).collect()
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
