//! Tracing subscriber setup.
//!
//! Every `tracing` span and event emitted by the workspace crates flows through
//! the subscriber installed here. An OTLP exporter is added when
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

use clap::ValueEnum;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace::TracerProvider};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const SERVICE_NAME: &str = "fetch-trigger";

/// Log line format on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Installs the global subscriber. Must be called from within the tokio
/// runtime when OTLP export is enabled.
pub fn init(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = match format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let registry = tracing_subscriber::registry().with(env_filter).with(fmt_layer);
    if let Some(tracer) = init_tracer() {
        registry
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .init();
        tracing::debug!("OpenTelemetry tracing enabled");
    } else {
        registry.init();
    }
}

/// Flushes pending spans.
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}

fn init_tracer() -> Option<opentelemetry_sdk::trace::Tracer> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("OTLP exporter disabled: {e}");
            return None;
        }
    };

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .build();
    let tracer = provider.tracer(SERVICE_NAME);
    opentelemetry::global::set_tracer_provider(provider);
    Some(tracer)
}
