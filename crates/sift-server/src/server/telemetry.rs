//! # Telemetry Features
//!
//! Console logging through `tracing-subscriber` is always on. OpenTelemetry
//! export is opt-in.
//!
//! ## Feature matrix
//!
//! - `otel`: Exports spans through `tracing-opentelemetry`.
//! - `metrics`: Exports the pipeline counters as observable counters.
//! - `honeycomb`: Enables the Honeycomb OTLP exporter.
//! - `stdout`: Enables the stdout OTLP exporter.
//!
//! ## Feature constraints
//!
//! - Exporters require using at least one of: `otel` or `metrics`.
//! - Both `honeycomb` and `stdout` exporters can be enabled at the same time.
//!
//! ## Metrics behavior
//!
//! - Counters are read from the shared [`Counters`] on each collection cycle;
//!   nothing is pushed from the pipeline itself.
//! - Each exporter (Honeycomb, stdout) gets its own reader.
//!
//! ## Example usage
//!
//! ```bash
//! cargo run -p sift-server --features otel,metrics,honeycomb
//! cargo run -p sift-server --features metrics,stdout
//! ```

// Disallow using `honeycomb` without `otel` or `metrics`
#[cfg(all(feature = "honeycomb", not(any(feature = "otel", feature = "metrics"))))]
compile_error!("The 'honeycomb' feature requires at least one of 'otel' or 'metrics' to be enabled.");

// Disallow using `stdout` without `otel` or `metrics`
#[cfg(all(feature = "stdout", not(any(feature = "otel", feature = "metrics"))))]
compile_error!("The 'stdout' feature requires at least one of 'otel' or 'metrics' to be enabled.");

use sift_ingest::Counters;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// Honeycomb-specific imports
#[cfg(all(feature = "honeycomb", any(feature = "metrics", feature = "otel")))]
use opentelemetry_otlp::{Compression, Protocol, WithExportConfig, WithTonicConfig};
#[cfg(all(feature = "honeycomb", feature = "metrics"))]
use opentelemetry_sdk::metrics::Temporality;
#[cfg(all(feature = "honeycomb", any(feature = "metrics", feature = "otel")))]
use tonic::{metadata::MetadataMap, transport::ClientTlsConfig};

// Metrics-specific imports
#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Meter, ObservableCounter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use sift_ingest::CountersSnapshot;

// Either
#[cfg(any(feature = "metrics", feature = "otel"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "otel"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "otel"))]
use opentelemetry_semantic_conventions as semvcns;

// Tracing-specific imports
#[cfg(feature = "otel")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "otel")]
use opentelemetry_sdk::trace as sdktrace;

pub struct TelemetryProviders {
    #[cfg(feature = "otel")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
    #[cfg(feature = "metrics")]
    _instruments: Vec<ObservableCounter<u64>>,
}

impl TelemetryProviders {
    /// Flushes and stops every exporter. Errors are printed, not returned, as
    /// the subscriber may already be gone.
    pub fn shutdown(self) {
        #[cfg(feature = "otel")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

pub fn init_telemetry(_counters: &Arc<Counters>) -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "otel")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "otel")]
    let tracer_provider = init_tracer()?;

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics()?;

    #[cfg(any(feature = "metrics", feature = "otel"))]
    let scope = InstrumentationScope::builder("sift")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    // Console output goes to stderr so stdout stays free for persisted
    // records.
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        );

    #[cfg(feature = "otel")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let (registry, instruments) = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        let instruments = init_counter_instruments(&meter, _counters);

        (
            registry.with(tracing_opentelemetry::MetricsLayer::new(
                meter_provider.clone(),
            )),
            instruments,
        )
    };

    registry.init();

    Ok(TelemetryProviders {
        #[cfg(feature = "otel")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
        #[cfg(feature = "metrics")]
        _instruments: instruments,
    })
}

/// Connection settings for the Honeycomb OTLP endpoint, read from the
/// `HONEYCOMB_*` environment variables.
#[cfg(all(feature = "honeycomb", any(feature = "metrics", feature = "otel")))]
struct Honeycomb {
    metadata: MetadataMap,
    endpoint: String,
    compression: Compression,
}

#[cfg(all(feature = "honeycomb", any(feature = "metrics", feature = "otel")))]
impl Honeycomb {
    fn from_env() -> anyhow::Result<Self> {
        use anyhow::Context;
        use std::str::FromStr;

        let var = |name: &str| std::env::var(name).with_context(|| format!("missing `{name}`"));

        let mut metadata = MetadataMap::new();
        metadata.insert(
            "x-honeycomb-team",
            var("HONEYCOMB_API_KEY")?
                .parse()
                .context("invalid API key")?,
        );
        metadata.insert(
            "x-honeycomb-dataset",
            var("HONEYCOMB_DATASET")?
                .parse()
                .context("invalid dataset")?,
        );
        let compression =
            Compression::from_str(&var("HONEYCOMB_COMPRESSION")?.to_ascii_lowercase())?;

        Ok(Self {
            metadata,
            endpoint: var("HONEYCOMB_ENDPOINT")?,
            compression,
        })
    }

    /// Points any tonic-based OTLP exporter builder at Honeycomb.
    fn configure<B: WithTonicConfig + WithExportConfig>(self, builder: B) -> B {
        builder
            .with_tls_config(ClientTlsConfig::new().with_native_roots())
            .with_metadata(self.metadata)
            .with_timeout(std::time::Duration::from_secs(10))
            .with_compression(self.compression)
            .with_endpoint(self.endpoint)
            .with_protocol(Protocol::Grpc)
    }
}

#[cfg(any(feature = "metrics", feature = "otel"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("sift")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::MetricExporter;
        let exporter = MetricExporter::default();
        let reader = opentelemetry_sdk::metrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();

        builder.with_reader(reader)
    };

    #[cfg(feature = "honeycomb")]
    let builder = {
        use anyhow::Context;

        let exporter = Honeycomb::from_env()?
            .configure(opentelemetry_otlp::MetricExporter::builder().with_tonic())
            .with_temporality(Temporality::Cumulative)
            .build()
            .context("failed to build metrics exporter")?;

        builder.with_periodic_exporter(exporter)
    };

    Ok(builder.build())
}

/// Registers one observable counter per pipeline counter. The callbacks read
/// the shared [`Counters`] at collection time.
#[cfg(feature = "metrics")]
fn init_counter_instruments(meter: &Meter, counters: &Arc<Counters>) -> Vec<ObservableCounter<u64>> {
    let specs: [(&'static str, &'static str, fn(&CountersSnapshot) -> u64); 4] = [
        ("messages_ingested", "Messages taken off the stream", |s| s.ingested),
        ("messages_classified", "Messages classified as of interest", |s| s.classified),
        ("persistence_errors", "Failed store inserts", |s| s.persistence_errors),
        ("parse_errors", "Messages that failed to decode", |s| s.parse_errors),
    ];

    specs
        .into_iter()
        .map(|(name, description, read)| {
            let counters = Arc::clone(counters);
            meter
                .u64_observable_counter(name)
                .with_description(description)
                .with_callback(move |observer| observer.observe(read(&counters.snapshot()), &[]))
                .build()
        })
        .collect()
}

#[cfg(feature = "otel")]
fn init_tracer() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder =
        builder.with_span_processor(batched(opentelemetry_stdout::SpanExporter::default()));

    #[cfg(feature = "honeycomb")]
    let builder = {
        use anyhow::Context;

        let exporter = Honeycomb::from_env()?
            .configure(opentelemetry_otlp::SpanExporter::builder().with_tonic())
            .build()
            .context("failed to build tracer exporter")?;

        builder.with_span_processor(batched(exporter))
    };

    Ok(builder.build())
}

/// Batches spans for `exporter`, flushing every 5 seconds.
#[cfg(all(feature = "otel", any(feature = "stdout", feature = "honeycomb")))]
fn batched<E>(exporter: E) -> sdktrace::BatchSpanProcessor
where
    E: opentelemetry_sdk::trace::SpanExporter + 'static,
{
    sdktrace::BatchSpanProcessor::builder(exporter)
        .with_batch_config(
            sdktrace::BatchConfigBuilder::default()
                .with_scheduled_delay(std::time::Duration::from_secs(5))
                .with_max_queue_size(2048)
                .build(),
        )
        .build()
}
