//! In-memory service registry.
//!
//! Services register instances under a logical name, keep them alive with
//! heartbeats, and callers resolve a name to the instances that are currently
//! passing their health probes.
//!
//! - [`ServiceStore`]: concurrent storage of instance records
//! - [`ServiceRegistry`]: validated register / renew / deregister
//! - [`ServiceDiscovery`]: healthy-only resolution with round-robin or random selection
//! - [`HealthChecker`]: periodic probe-and-evict sweep
//!
//! # Example
//!
//! ```no_run
//! use probe::EndpointProber;
//! use registry::{
//!     Address, CheckerConfig, HealthChecker, InMemoryStore, SelectionStrategy,
//!     ServiceDescriptor, ServiceDiscovery, ServiceRegistry,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryStore::new());
//! let registry = ServiceRegistry::new(store.clone(), Duration::from_secs(30), None);
//! let discovery = ServiceDiscovery::new(store.clone(), None);
//!
//! let checker = HealthChecker::new(
//!     store,
//!     Arc::new(EndpointProber::new()?),
//!     CheckerConfig::default(),
//!     None,
//! );
//! tokio::spawn(checker.run());
//!
//! let id = registry.register(
//!     ServiceDescriptor::new("catalog-api", Address::new("10.0.0.7", 8080))
//!         .with_metadata("region", "eu-west"),
//! )?;
//! registry.renew(&id)?;
//!
//! let endpoint = discovery.resolve_one("catalog-api", SelectionStrategy::RoundRobin)?;
//! println!("calling {}", endpoint.address);
//! # Ok(())
//! # }
//! ```

pub mod discovery;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod store;
pub mod types;

pub use discovery::{SelectionStrategy, ServiceDiscovery, ServiceQuery};
pub use health::{CheckerConfig, HealthChecker, SweepReport};
pub use metrics::RegistryMetrics;
pub use registry::ServiceRegistry;
pub use store::{InMemoryStore, ServiceStore};
pub use types::{
    Address, DEFAULT_WEIGHT, Endpoint, InstanceId, InstanceStatus, InstanceView, ProbeDetails,
    ServiceDescriptor, ServiceInstance,
};
