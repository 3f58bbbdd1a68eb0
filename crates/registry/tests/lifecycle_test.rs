//! End-to-end instance lifecycle: register, probe, fail, expire

use async_trait::async_trait;
use probe::{EndpointProber, ProbeResult, Prober};
use registry::{
    Address, CheckerConfig, HealthChecker, InMemoryStore, InstanceStatus, SelectionStrategy,
    ServiceDescriptor, ServiceDiscovery, ServiceRegistry, ServiceStore,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Prober whose answer can be flipped from the test
#[derive(Default)]
struct SwitchProber {
    failing: AtomicBool,
}

impl SwitchProber {
    fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Prober for SwitchProber {
    async fn probe(&self, _endpoint: &str, _timeout: Duration) -> ProbeResult {
        if self.failing.load(Ordering::SeqCst) {
            ProbeResult::error(Duration::from_millis(1), "connection refused")
        } else {
            ProbeResult::healthy(Duration::from_millis(1))
        }
    }

    fn name(&self) -> &'static str {
        "switch"
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    registry: ServiceRegistry,
    discovery: ServiceDiscovery,
    checker: HealthChecker,
    prober: Arc<SwitchProber>,
}

fn harness(interval: Duration) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let prober = Arc::new(SwitchProber::default());
    let config = CheckerConfig {
        interval,
        probe_timeout: Duration::from_millis(100),
        max_concurrent_probes: 8,
    };

    Harness {
        registry: ServiceRegistry::new(store.clone(), Duration::from_secs(30), None),
        discovery: ServiceDiscovery::new(store.clone(), None),
        checker: HealthChecker::new(store.clone(), prober.clone(), config, None),
        store,
        prober,
    }
}

fn descriptor() -> ServiceDescriptor {
    ServiceDescriptor::new("x", "h1:1".parse::<Address>().unwrap())
        .with_health_check("h1:1/health")
        .with_ttl(Duration::from_secs(30))
}

#[tokio::test(start_paused = true)]
async fn test_full_lifecycle() {
    let h = harness(Duration::from_secs(10));

    let id = h.registry.register(descriptor()).unwrap();
    assert_eq!(
        h.store.get(&id).unwrap().health_check_endpoint,
        "http://h1:1/health"
    );

    // Pending instances are not discoverable
    assert!(h.discovery.resolve("x").is_empty());

    h.checker.sweep_once().await;
    let endpoints = h.discovery.resolve("x");
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].address.to_string(), "h1:1");

    // Probe starts failing: hidden from discovery, still listed
    h.prober.fail();
    tokio::time::advance(Duration::from_secs(10)).await;
    h.checker.sweep_once().await;
    assert!(h.discovery.resolve("x").is_empty());
    assert_eq!(h.store.get(&id).unwrap().status, InstanceStatus::Unhealthy);
    assert_eq!(h.store.list_all().len(), 1);

    // TTL elapses with no renewal
    tokio::time::advance(Duration::from_secs(21)).await;
    let report = h.checker.sweep_once().await;
    assert_eq!(report.evicted, 1);
    assert!(h.store.list_all().is_empty());
    assert!(h.registry.renew(&id).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_heartbeats_keep_unhealthy_instance_listed_but_hidden() {
    let h = harness(Duration::from_secs(10));
    let id = h.registry.register(descriptor()).unwrap();

    h.checker.sweep_once().await;
    h.prober.fail();

    for _ in 0..6 {
        tokio::time::advance(Duration::from_secs(10)).await;
        h.registry.renew(&id).unwrap();
        h.checker.sweep_once().await;
    }

    let instance = h.store.get(&id).unwrap();
    assert_eq!(instance.status, InstanceStatus::Unhealthy);
    assert_eq!(instance.probe.consecutive_failures, 6);
    assert!(h.discovery.resolve("x").is_empty());
    assert!(
        h.discovery
            .resolve_one("x", SelectionStrategy::RoundRobin)
            .unwrap_err()
            .is_retryable()
    );
}

#[tokio::test(start_paused = true)]
async fn test_background_loop_drives_lifecycle() {
    let h = harness(Duration::from_secs(1));
    let id = h
        .registry
        .register(descriptor().with_ttl(Duration::from_secs(5)))
        .unwrap();

    let token = h.checker.shutdown_token();
    let loop_handle = tokio::spawn(h.checker.run());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(h.discovery.resolve("x").len(), 1);

    h.prober.fail();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.discovery.resolve("x").is_empty());

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(h.store.get(&id).is_none());

    token.cancel();
    loop_handle.await.unwrap();
}

#[tokio::test]
async fn test_http_probe_against_live_endpoint() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else { break };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
                    .await;
            });
        }
    });

    let store = Arc::new(InMemoryStore::new());
    let registry = ServiceRegistry::new(store.clone(), Duration::from_secs(30), None);
    let discovery = ServiceDiscovery::new(store.clone(), None);
    let checker = HealthChecker::new(
        store.clone(),
        Arc::new(EndpointProber::new().unwrap()),
        CheckerConfig {
            interval: Duration::from_millis(100),
            probe_timeout: Duration::from_secs(1),
            max_concurrent_probes: 2,
        },
        None,
    );

    registry
        .register(ServiceDescriptor::new("live", Address::new("127.0.0.1", port)))
        .unwrap();
    let report = checker.sweep_once().await;

    assert_eq!(report.healthy, 1);
    let endpoint = discovery
        .resolve_one("live", SelectionStrategy::Random)
        .unwrap();
    assert_eq!(endpoint.address.port, port);
}
