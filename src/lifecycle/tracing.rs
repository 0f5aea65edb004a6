//! # Logging Setup
//!
//! [`setup_tracing`] installs a compact `tracing` subscriber for the binary.
//!
//! The filter comes from `RUST_LOG` when it is set, otherwise from the level passed in
//! (the `--log-level` flag), otherwise `info`.
//!
//! ```bash
//! RUST_LOG=debug otelcol --config otelcol.toml
//! RUST_LOG=collector_lifecycle::lifecycle::service_slot=debug otelcol --config otelcol.toml
//! ```
//!
//! Everything the collector does runs inside the `collector` span, so log lines carry the
//! command and version:
//!
//! ```text
//! INFO collector: Starting collector command=otelcol version=latest description="OpenTelemetry Collector" cpus=8
//! INFO collector: Service started generation=1
//! INFO collector: Everything is ready. Begin running and processing data.
//! WARN collector: Config updated, must reload the service
//! INFO collector: Service retired generation=1
//! INFO collector: Service started generation=2
//! ```

use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "info";

pub fn setup_tracing(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or(DEFAULT_LEVEL)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
