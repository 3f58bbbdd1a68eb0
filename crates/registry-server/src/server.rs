//! Registry process: wires store, registry, discovery and the health checker.

use crate::config::Config;
use crate::http_server::AdminServer;
use probe::{EndpointProber, Prober};
use registry::{
    HealthChecker, InMemoryStore, RegistryMetrics, ServiceDiscovery, ServiceRegistry, ServiceStore,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Hosting process for one in-memory registry
pub struct RegistryServer {
    config: Config,
    store: Arc<InMemoryStore>,
    registry: ServiceRegistry,
    discovery: ServiceDiscovery,
    metrics: Arc<RegistryMetrics>,
    prober: Arc<dyn Prober>,
}

impl RegistryServer {
    /// Create a server probing over HTTP(S) and TCP
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let prober = Arc::new(EndpointProber::new()?);
        Ok(Self::with_prober(config, prober))
    }

    pub fn with_prober(config: Config, prober: Arc<dyn Prober>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let metrics = Arc::new(RegistryMetrics::new());

        let registry = ServiceRegistry::new(store.clone(), config.default_ttl(), Some(metrics.clone()));
        let discovery = ServiceDiscovery::new(store.clone(), Some(metrics.clone()));

        Self {
            config,
            store,
            registry,
            discovery,
            metrics,
            prober,
        }
    }

    /// Write-path handle for in-process consumers
    pub fn registry(&self) -> ServiceRegistry {
        self.registry.clone()
    }

    /// Read-path handle for in-process consumers
    pub fn discovery(&self) -> ServiceDiscovery {
        self.discovery.clone()
    }

    pub fn metrics(&self) -> Arc<RegistryMetrics> {
        self.metrics.clone()
    }

    /// Run the health checker (and admin endpoint, if enabled) until
    /// `shutdown` completes.
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            default_ttl_secs = self.config.default_ttl().as_secs(),
            admin_enabled = self.config.admin.enabled,
            "Starting service registry"
        );

        let checker = HealthChecker::new(
            self.store.clone(),
            self.prober.clone(),
            self.config.to_checker_config(),
            Some(self.metrics.clone()),
        );
        let token = checker.shutdown_token();

        // Bind before spawning so a bad address fails startup
        let admin_handle = if self.config.admin.enabled {
            let listener = TcpListener::bind(&self.config.admin.listen_addr).await?;
            let server = AdminServer::new(self.registry.clone(), self.metrics.clone());
            let token = token.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = server.serve(listener, token).await {
                    warn!(error = %e, "Admin server error");
                }
            }))
        } else {
            info!("Admin endpoint disabled");
            None
        };

        let checker_handle = tokio::spawn(checker.run());

        info!("All tasks spawned, registry running");
        shutdown.await;
        info!("Shutdown requested");

        // No new registrations from here on
        self.store.close();
        token.cancel();

        if let Err(e) = checker_handle.await {
            warn!(error = %e, "Health checker task failed");
        }
        if let Some(handle) = admin_handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Admin server task failed");
            }
        }

        info!(instances = self.store.len(), "Service registry stopped");
        Ok(())
    }
}
