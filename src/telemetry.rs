//! Optional OpenTelemetry trace export for the controller/worker process
//! tree, feature-gated exactly like the teacher's
//! `ferroid-tonic-server/src/server/telemetry.rs`. This is ambient
//! observability, not the spec's own telemetry surface (§4.9 GPU polling
//! lives in `aiperf-telemetry`): it is off by default, and every process
//! falls back to plain [`aiperf_service::logging::init_logging`] when built
//! without the `otel` feature.
//!
//! Enable with `--features otel,otel-stdout` for a local stdout trace
//! exporter, or `--features otel,otel-otlp` to ship spans to an OTLP
//! collector at `OTEL_EXPORTER_OTLP_ENDPOINT` (read by `opentelemetry-otlp`
//! itself; no AIPerf-specific config flag is needed).

#[cfg(feature = "otel")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "otel")]
use opentelemetry_sdk::trace as sdktrace;
#[cfg(feature = "otel")]
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Holds the tracer provider for the lifetime of the process so spans flush
/// on drop; the controller/child `main` keeps this alive until exit.
#[cfg(feature = "otel")]
pub struct OtelGuard {
    provider: sdktrace::SdkTracerProvider,
}

#[cfg(feature = "otel")]
impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(err) = self.provider.shutdown() {
            eprintln!("otel tracer shutdown failed: {err}");
        }
    }
}

#[cfg(feature = "otel")]
fn resource() -> opentelemetry_sdk::Resource {
    use opentelemetry::KeyValue;
    use opentelemetry_semantic_conventions as semconv;

    opentelemetry_sdk::Resource::builder()
        .with_service_name("aiperf")
        .with_schema_url(
            [KeyValue::new(semconv::resource::SERVICE_VERSION, env!("CARGO_PKG_VERSION"))],
            semconv::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "otel")]
fn build_tracer_provider() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "otel-stdout")]
    let builder = builder.with_batch_exporter(opentelemetry_stdout::SpanExporter::default());

    #[cfg(feature = "otel-otlp")]
    let builder = {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .build()
            .map_err(|err| anyhow::anyhow!("failed to build OTLP span exporter: {err}"))?;
        builder.with_batch_exporter(exporter)
    };

    Ok(builder.build())
}

/// Initializes both the local `tracing-subscriber` formatter (same
/// human/JSON choice as [`aiperf_service::logging::init_logging`]) and an
/// OpenTelemetry tracing layer. Returns a guard that must be held until
/// process exit so buffered spans are flushed on drop.
#[cfg(feature = "otel")]
pub fn init_otel(log_level: &str, structured: bool) -> anyhow::Result<OtelGuard> {
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());
    let provider = build_tracer_provider()?;
    opentelemetry::global::set_tracer_provider(provider.clone());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let otel_layer = tracing_opentelemetry::layer().with_tracer(provider.tracer("aiperf"));

    let registry = tracing_subscriber::registry().with(filter).with(otel_layer);
    if structured {
        registry.with(fmt_layer.json()).try_init()
    } else {
        registry.with(fmt_layer).try_init()
    }
    .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))?;

    Ok(OtelGuard { provider })
}

/// No-op stand-in when the crate is built without `otel`, so call sites in
/// `main.rs` don't need a `#[cfg]` of their own.
#[cfg(not(feature = "otel"))]
pub struct OtelGuard;

#[cfg(not(feature = "otel"))]
pub fn init_otel(log_level: &str, structured: bool) -> anyhow::Result<OtelGuard> {
    aiperf_service::logging::init_logging(log_level, structured);
    Ok(OtelGuard)
}
