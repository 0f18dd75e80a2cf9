use anyhow::Result;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::env;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber: compact fmt output filtered by `RUST_LOG`
/// (default `info`), plus an OpenTelemetry layer when `OTEL_TRACES_EXPORTER`
/// is `otlp` or `stdout`.
pub fn init_telemetry(service_name: &'static str) {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let provider = match env::var("OTEL_TRACES_EXPORTER").as_deref() {
        Ok("otlp") => {
            let endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4318/v1/traces".to_string());
            match otlp_provider(&endpoint) {
                Ok(provider) => Some(provider),
                Err(e) => {
                    eprintln!("failed to initialize OTLP exporter for {service_name}: {e}");
                    Some(stdout_provider())
                }
            }
        }
        Ok("stdout") => Some(stdout_provider()),
        _ => None,
    };

    let otel = provider.map(|provider| {
        let tracer = provider.tracer(service_name);
        global::set_tracer_provider(provider);
        tracing_opentelemetry::layer().with_tracer(tracer)
    });

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .with(otel)
        .try_init();
}

fn otlp_provider(endpoint: &str) -> Result<SdkTracerProvider> {
    use opentelemetry_otlp::WithExportConfig;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build())
}

fn stdout_provider() -> SdkTracerProvider {
    SdkTracerProvider::builder()
        .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
        .build()
}
