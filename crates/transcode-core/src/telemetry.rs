//! Ambient logging/tracing setup: structured JSON logs via `tracing-subscriber`,
//! with an optional OTLP exporter for distributed traces across the
//! admission → bus → aggregator → notifier pipeline.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub otlp_endpoint: Option<String>,
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "transcode-orchestrator".to_string(),
            otlp_endpoint: None,
            json_logs: false,
        }
    }
}

/// Installs the global `tracing` subscriber. Call once at process start
/// (`transcode-cli`'s `serve`/`submit`/`task` entry points all do this).
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = Registry::default().with(env_filter);

    match &config.otlp_endpoint {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()?;
            let provider = opentelemetry_sdk::trace::TracerProvider::builder()
                .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
                .with_resource(opentelemetry_sdk::Resource::new(vec![KeyValue::new(
                    "service.name",
                    config.service_name.clone(),
                )]))
                .build();
            let tracer = provider.tracer(config.service_name.clone());
            let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

            if config.json_logs {
                registry
                    .with(otel_layer)
                    .with(tracing_subscriber::fmt::layer().json())
                    .try_init()?;
            } else {
                registry
                    .with(otel_layer)
                    .with(tracing_subscriber::fmt::layer())
                    .try_init()?;
            }
        }
        None => {
            if config.json_logs {
                registry.with(tracing_subscriber::fmt::layer().json()).try_init()?;
            } else {
                registry.with(tracing_subscriber::fmt::layer()).try_init()?;
            }
        }
    }

    Ok(())
}
