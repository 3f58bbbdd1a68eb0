//! Integration tests for the hosting process

use async_trait::async_trait;
use probe::{ProbeResult, Prober};
use registry::{Address, InMemoryStore, RegistryMetrics, ServiceDescriptor, ServiceRegistry};
use registry_server::{AdminServer, Config, RegistryServer};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

struct AlwaysHealthy;

#[async_trait]
impl Prober for AlwaysHealthy {
    async fn probe(&self, _endpoint: &str, _timeout: Duration) -> ProbeResult {
        ProbeResult::healthy(Duration::from_millis(1))
    }

    fn name(&self) -> &'static str {
        "always-healthy"
    }
}

fn test_config(admin_enabled: bool) -> Config {
    let mut config = Config::default();
    config.health.interval = Duration::from_secs(1);
    config.health.probe_timeout = Duration::from_millis(100);
    config.admin.enabled = admin_enabled;
    config.admin.listen_addr = "127.0.0.1:0".to_string();
    config
}

#[tokio::test(start_paused = true)]
async fn test_server_probes_and_shuts_down() {
    let server = RegistryServer::with_prober(test_config(false), Arc::new(AlwaysHealthy));
    let registry = server.registry();
    let discovery = server.discovery();
    let metrics = server.metrics();

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.run(async move {
        let _ = shutdown_rx.await;
    }));

    registry
        .register(ServiceDescriptor::new("catalog-api", Address::new("10.0.0.1", 8080)))
        .unwrap();
    assert!(discovery.resolve("catalog-api").is_empty());

    // First sweep happens one interval after start
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(discovery.resolve("catalog-api").len(), 1);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    // The store is closed once the server has stopped
    let err = registry
        .register(ServiceDescriptor::new("catalog-api", Address::new("10.0.0.2", 8080)))
        .unwrap_err();
    assert!(matches!(err, common::Error::ShuttingDown));

    let text = metrics.encode().unwrap();
    assert!(text.contains("registry_registrations_total 1"));
    assert!(text.contains("registry_probes_total{result=\"healthy\"}"));
}

#[tokio::test]
async fn test_server_with_admin_endpoint_starts_and_stops() {
    let server = RegistryServer::with_prober(test_config(true), Arc::new(AlwaysHealthy));

    let result = server
        .run(tokio::time::sleep(Duration::from_millis(100)))
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_server_fails_on_bad_admin_address() {
    let mut config = test_config(true);
    config.admin.listen_addr = "not-an-address".to_string();
    let server = RegistryServer::with_prober(config, Arc::new(AlwaysHealthy));

    let result = server.run(std::future::pending::<()>()).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_admin_endpoints() {
    let metrics = Arc::new(RegistryMetrics::new());
    let registry = ServiceRegistry::new(
        Arc::new(InMemoryStore::new()),
        Duration::from_secs(30),
        Some(metrics.clone()),
    );
    registry
        .register(
            ServiceDescriptor::new("catalog-api", Address::new("10.0.0.1", 8080))
                .with_metadata("region", "eu-west")
                .with_weight(3),
        )
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let token = CancellationToken::new();
    let server = AdminServer::new(registry, metrics);
    let handle = tokio::spawn(server.serve(listener, token.clone()));

    let client = reqwest::Client::new();

    let healthz = client.get(format!("{}/healthz", base)).send().await.unwrap();
    assert!(healthz.status().is_success());
    assert_eq!(healthz.text().await.unwrap(), "ok");

    let instances: serde_json::Value = client
        .get(format!("{}/instances", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let instances = instances.as_array().unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0]["service_name"], "catalog-api");
    assert_eq!(instances[0]["status"], "pending");
    assert_eq!(instances[0]["address"]["port"], 8080);
    assert_eq!(instances[0]["metadata"]["region"], "eu-west");
    assert_eq!(instances[0]["weight"], 3);

    let filtered: serde_json::Value = client
        .get(format!("{}/instances?service=orders-api", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(filtered.as_array().unwrap().is_empty());

    let metrics_text = client
        .get(format!("{}/metrics", base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics_text.contains("registry_registrations_total 1"));

    drop(client);
    token.cancel();
    handle.await.unwrap().unwrap();
}
