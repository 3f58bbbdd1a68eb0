//! Log and trace pipeline setup
//!
//! Logs always go to stdout through `tracing-subscriber`. When enabled in the
//! configuration, spans are additionally exported over OTLP (gRPC or HTTP).

use crate::config::{Config, OtlpProtocol, TelemetrySettings};
use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource, runtime,
    trace::{RandomIdGenerator, Sampler, TracerProvider},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// OpenTelemetry tracer guard
///
/// When dropped, flushes all pending spans and shuts down the tracer
pub struct TelemetryGuard;

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        opentelemetry::global::shutdown_tracer_provider();
    }
}

/// Build a tracer provider exporting to the configured OTLP collector
fn build_provider(settings: &TelemetrySettings) -> anyhow::Result<TracerProvider> {
    let exporter = match settings.protocol {
        OtlpProtocol::Grpc => opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(settings.otlp_endpoint.clone())
            .build()?,
        OtlpProtocol::Http => opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(settings.otlp_endpoint.clone())
            .build()?,
    };

    let resource = Resource::new(vec![
        KeyValue::new("service.name", settings.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION").to_string()),
    ]);

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .build())
}

/// Install the global subscriber described by `config`.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes pending spans.
pub async fn setup_tracing(config: &Config) -> anyhow::Result<Option<TelemetryGuard>> {
    let settings = &config.telemetry;
    let level = config.log_level();

    if !settings.enabled {
        if config.json_logs() {
            common::logging::init_json(level);
        } else {
            common::logging::init(level);
        }
        tracing::info!("Tracing initialized without OpenTelemetry");
        return Ok(None);
    }

    let provider = build_provider(settings)?;
    let tracer = provider.tracer(settings.service_name.clone());
    opentelemetry::global::set_tracer_provider(provider);

    let subscriber = tracing_subscriber::registry()
        .with(common::logging::env_filter(level))
        .with(tracing_opentelemetry::layer().with_tracer(tracer));

    if config.json_logs() {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer()).init();
    }

    tracing::info!(
        service_name = %settings.service_name,
        otlp_endpoint = %settings.otlp_endpoint,
        protocol = ?settings.protocol,
        "Tracing initialized with OpenTelemetry integration"
    );

    Ok(Some(TelemetryGuard))
}
