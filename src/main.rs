//! # otelcol
//!
//! Demo binary: runs the collector lifecycle around a service that only logs its pipelines.
//!
//! ```bash
//! RUST_LOG=info otelcol --config otelcol.toml
//! otelcol --config otelcol.toml --set "exporters::logging::loglevel=debug" --mem-ballast-size-mib 64
//! ```
//!
//! Edit the configuration file while it runs to see a hot reload; Ctrl-C to stop.

use async_trait::async_trait;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use collector_lifecycle::component::{BuildInfo, Factories, StaticFactory};
use collector_lifecycle::lifecycle::setup_tracing;
use collector_lifecycle::service::{Service, ServiceFactory, ServiceSettings};
use collector_lifecycle::telemetry::TelemetryLevel;
use collector_lifecycle::{BoxError, Collector, CollectorSettings, Parameters};

#[derive(Parser)]
#[command(name = "otelcol")]
#[command(about = "OpenTelemetry Collector", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Override a configuration value, e.g. `exporters::logging::loglevel=debug`
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Memory ballast in MiB, 0 disables it
    #[arg(long, default_value_t = 0)]
    mem_ballast_size_mib: u32,

    /// Level of the collector's own telemetry: none, basic, normal or detailed
    #[arg(long, default_value = "basic")]
    metrics_level: TelemetryLevel,

    /// Log filter used when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,

    /// Release telemetry and the ballast when setup fails
    #[arg(long)]
    teardown_on_setup_failure: bool,
}

/// A service that logs the pipelines it was configured with.
struct PipelineLogger {
    settings: ServiceSettings,
}

#[async_trait]
impl Service for PipelineLogger {
    async fn start(&self) -> Result<(), BoxError> {
        for (id, pipeline) in &self.settings.config.service.pipelines {
            info!(
                parent: &self.settings.span,
                pipeline = %id,
                receivers = pipeline.receivers.len(),
                processors = pipeline.processors.len(),
                exporters = pipeline.exporters.len(),
                "Pipeline ready"
            );
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BoxError> {
        info!(
            parent: &self.settings.span,
            pipelines = self.settings.config.service.pipelines.len(),
            "Pipelines stopped"
        );
        Ok(())
    }
}

struct PipelineLoggerFactory;

impl ServiceFactory for PipelineLoggerFactory {
    fn new_service(&self, settings: ServiceSettings) -> Result<Box<dyn Service>, BoxError> {
        Ok(Box::new(PipelineLogger { settings }))
    }
}

fn factories() -> Factories {
    Factories::new()
        .with(StaticFactory::receiver("otlp").with_default("endpoint", "0.0.0.0:4317"))
        .with(StaticFactory::processor("batch").with_default("send_batch_size", 8192i64))
        .with(StaticFactory::processor("memory_limiter").with_default("limit_mib", 512i64))
        .with(StaticFactory::exporter("logging").with_default("loglevel", "info"))
        .with(StaticFactory::exporter("otlp"))
        .with(StaticFactory::extension("health_check").with_default("endpoint", "0.0.0.0:13133"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_tracing(cli.log_level.as_deref());

    let settings = CollectorSettings {
        config_path: Some(cli.config),
        config_overrides: cli.overrides,
        mem_ballast_size_mib: cli.mem_ballast_size_mib,
        telemetry_level: cli.metrics_level,
        teardown_on_setup_failure: cli.teardown_on_setup_failure,
    };
    let build_info = BuildInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        ..BuildInfo::default()
    };
    let params = Parameters::new(factories(), Arc::new(PipelineLoggerFactory))
        .with_build_info(build_info)
        .with_settings(settings);

    let mut collector = match Collector::new(params) {
        Ok(collector) => collector,
        Err(e) => {
            error!(error = %e, "Failed to create the collector");
            return ExitCode::FAILURE;
        }
    };

    match collector.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Collector server run finished with error");
            ExitCode::FAILURE
        }
    }
}
