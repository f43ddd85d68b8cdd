//! # Telemetry
//!
//! Logs are always written to stdout through `tracing_subscriber::fmt`,
//! filtered by `RUST_LOG` (default `info`).
//!
//! ## Feature matrix
//!
//! - `otlp`: additionally exports spans through OpenTelemetry over OTLP/gRPC.
//!   The collector endpoint is read from `OTEL_EXPORTER_OTLP_ENDPOINT`.
//!
//! ## Span behavior
//!
//! - Each gRPC call runs inside an `rpc` span carrying the operation and the
//!   request ID; HTTP requests get spans from `tower_http::trace::TraceLayer`.
//! - Events inside a span become span events when `otlp` is enabled. Events
//!   outside of a span are only shown in log output.
//!
//! ```bash
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 cargo run --features otlp
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "otlp")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otlp")]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(feature = "otlp")]
use opentelemetry_sdk::Resource;
#[cfg(feature = "otlp")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "otlp")]
use opentelemetry_sdk::trace as sdktrace;
#[cfg(feature = "otlp")]
use opentelemetry_semantic_conventions as semvcns;

const SERVICE_NAME: &str = "miniblog";

/// Exporter handles that must outlive the server so buffered spans are
/// flushed on exit.
pub struct TelemetryProviders {
    #[cfg(feature = "otlp")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
}

impl TelemetryProviders {
    /// Flushes and shuts down every exporter. Called once the lifecycle has
    /// reached `Stopped`.
    pub fn shutdown(self) {
        #[cfg(feature = "otlp")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }
    }
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "otlp")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "otlp")]
    let tracer_provider = init_tracer()?;

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        );

    #[cfg(feature = "otlp")]
    let registry = {
        let scope = InstrumentationScope::builder(SERVICE_NAME)
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_schema_url(semvcns::SCHEMA_URL)
            .build();
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope))
                .with_error_records_to_exceptions(true),
        )
    };

    registry.try_init()?;
    tracing::debug!(service = SERVICE_NAME, "telemetry initialized");

    Ok(TelemetryProviders {
        #[cfg(feature = "otlp")]
        tracer_provider,
    })
}

#[cfg(feature = "otlp")]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "otlp")]
fn init_tracer() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    use anyhow::Context;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
        .context("failed to build span exporter")?;

    let batch = sdktrace::BatchSpanProcessor::builder(exporter)
        .with_batch_config(
            sdktrace::BatchConfigBuilder::default()
                .with_scheduled_delay(std::time::Duration::from_secs(5))
                .with_max_queue_size(2048)
                .build(),
        )
        .build();

    Ok(sdktrace::SdkTracerProvider::builder()
        .with_resource(resource())
        .with_span_processor(batch)
        .build())
}
