//! # Collector
//!
//! The [`Collector`] wires the lifecycle together. One call to [`Collector::run`]:
//!
//! 1. publishes `Starting` and allocates the memory ballast,
//! 2. initializes the collector's own telemetry,
//! 3. spawns the [`ServiceSlot`] and applies the configuration,
//! 4. publishes `Running` and waits for the first shutdown trigger,
//! 5. refuses further reloads, publishes `Closing` and runs the shutdown sequence,
//! 6. publishes `Closed`, closes the state channel and returns every shutdown failure.
//!
//! ## Shutdown Triggers
//!
//! The first of these wins; the others are ignored from then on:
//!
//! - a fatal error sent through an [`AsyncErrorReporter`](super::AsyncErrorReporter),
//! - an interrupt or terminate signal from the [`SignalSource`],
//! - [`StopHandle::stop`] (or [`Collector::shutdown`]).
//!
//! ## Shutdown Sequence
//!
//! Close the provider, shut down the current service, shut down telemetry, release the ballast.
//! Every step runs even if an earlier one failed.
//!
//! ## Example
//!
//! ```ignore
//! let mut collector = Collector::new(Parameters::new(factories, service_factory).with_provider(provider))?;
//! let mut states = collector.state_receiver().unwrap();
//! let stop = collector.stop_handle();
//!
//! tokio::spawn(async move { collector.run().await });
//! assert_eq!(states.recv().await, Some(State::Starting));
//! stop.stop();
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument, Span};

use super::async_errors::async_error_channel;
use super::backoff::ReloadBackoff;
use super::service_slot::{ServiceSlot, ServiceSlotClient, SlotContext};
use super::signals::{Signal, SignalSource};
use super::state::{state_channel, State, StatePublisher, StateReceiver};
use crate::ballast::{Ballast, BallastGauge};
use crate::component::{BuildInfo, Factories};
use crate::config::{FileProvider, ParserProvider, ProviderHandle};
use crate::error::{BoxError, CollectorError, ShutdownError, ShutdownFailure, ShutdownStep};
use crate::service::ServiceFactory;
use crate::telemetry::{ProcessTelemetry, Telemetry, TelemetryLevel};

const SLOT_BUFFER: usize = 16;

/// Runtime knobs. Every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSettings {
    /// Configuration file used when no provider is supplied.
    pub config_path: Option<PathBuf>,
    /// `key::path=value` overrides applied to the configuration file.
    pub config_overrides: Vec<String>,
    /// Memory ballast in MiB. Zero disables it.
    pub mem_ballast_size_mib: u32,
    pub telemetry_level: TelemetryLevel,
    /// Tear down telemetry and the ballast when setup fails.
    /// Off by default: a failed setup leaves them as they are.
    pub teardown_on_setup_failure: bool,
}

/// Everything needed to build a [`Collector`].
pub struct Parameters {
    pub factories: Factories,
    pub build_info: BuildInfo,
    /// Configuration source. Falls back to a [`FileProvider`] on `settings.config_path`.
    pub provider: Option<Arc<dyn ParserProvider>>,
    pub service_factory: Arc<dyn ServiceFactory>,
    /// Own telemetry. Falls back to [`ProcessTelemetry`] at `settings.telemetry_level`.
    pub telemetry: Option<Arc<dyn Telemetry>>,
    pub settings: CollectorSettings,
    pub signals: SignalSource,
}

impl Parameters {
    pub fn new(factories: Factories, service_factory: Arc<dyn ServiceFactory>) -> Self {
        Self {
            factories,
            build_info: BuildInfo::default(),
            provider: None,
            service_factory,
            telemetry: None,
            settings: CollectorSettings::default(),
            signals: SignalSource::default(),
        }
    }

    pub fn with_build_info(mut self, build_info: BuildInfo) -> Self {
        self.build_info = build_info;
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn ParserProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn with_settings(mut self, settings: CollectorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_signals(mut self, signals: SignalSource) -> Self {
        self.signals = signals;
        self
    }
}

/// Requests a collector shutdown. Cloneable; stopping more than once is harmless.
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

enum Trigger {
    AsyncError(BoxError),
    Signal(Signal),
    Stop,
}

/// The lifecycle orchestrator.
pub struct Collector {
    factories: Arc<Factories>,
    build_info: BuildInfo,
    provider: ProviderHandle,
    service_factory: Arc<dyn ServiceFactory>,
    telemetry: Arc<dyn Telemetry>,
    settings: CollectorSettings,
    signals: SignalSource,
    publisher: StatePublisher,
    states: Option<StateReceiver>,
    stop: CancellationToken,
    ballast: Ballast,
    ballast_gauge: BallastGauge,
}

impl Collector {
    /// Validates the factories and resolves the provider and telemetry.
    pub fn new(params: Parameters) -> Result<Self, CollectorError> {
        params.factories.validate()?;

        let provider = match params.provider {
            Some(provider) => provider,
            None => file_provider(&params.settings)?,
        };
        let telemetry: Arc<dyn Telemetry> = match params.telemetry {
            Some(telemetry) => telemetry,
            None => Arc::new(ProcessTelemetry::new(params.settings.telemetry_level)),
        };
        let (publisher, states) = state_channel();

        Ok(Self {
            factories: Arc::new(params.factories),
            build_info: params.build_info,
            provider: ProviderHandle::install(provider),
            service_factory: params.service_factory,
            telemetry,
            settings: params.settings,
            signals: params.signals,
            publisher,
            states: Some(states),
            stop: CancellationToken::new(),
            ballast: Ballast::default(),
            ballast_gauge: BallastGauge::default(),
        })
    }

    /// The state notification stream. Can be taken once.
    pub fn state_receiver(&mut self) -> Option<StateReceiver> {
        self.states.take()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self.stop.clone(),
        }
    }

    /// Requests shutdown. A no-op once a trigger has fired.
    pub fn shutdown(&self) {
        self.stop.cancel();
    }

    /// The last published state, if the collector ever ran.
    pub fn state(&self) -> Option<State> {
        self.publisher.current()
    }

    pub fn build_info(&self) -> &BuildInfo {
        &self.build_info
    }

    /// How many ballast bytes the collector holds, readable while it runs.
    pub fn ballast_gauge(&self) -> BallastGauge {
        self.ballast_gauge.clone()
    }

    /// Runs the collector until a shutdown trigger fires and the shutdown sequence completes.
    ///
    /// A setup failure is returned immediately, with only `Starting` published. Otherwise the
    /// result carries every failure of the shutdown sequence.
    pub async fn run(&mut self) -> Result<(), CollectorError> {
        let span = info_span!(
            "collector",
            command = %self.build_info.command,
            version = %self.build_info.version
        );
        self.run_instrumented(span.clone()).instrument(span).await
    }

    async fn run_instrumented(&mut self, span: Span) -> Result<(), CollectorError> {
        self.publisher
            .publish(State::Starting)
            .map_err(|_| CollectorError::AlreadyStarted)?;
        let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
        info!(description = %self.build_info.description, cpus, "Starting collector");

        self.ballast = Ballast::allocate(self.settings.mem_ballast_size_mib);
        self.ballast_gauge.record(&self.ballast);
        let (async_errors, mut fatal_errors) = async_error_channel();

        if let Err(e) = self
            .telemetry
            .init(async_errors.clone(), self.ballast.size_bytes(), span.clone())
            .await
        {
            if self.settings.teardown_on_setup_failure {
                self.release_ballast();
            }
            return Err(CollectorError::TelemetryInit(e));
        }

        let (slot, client) = ServiceSlot::new(
            SLOT_BUFFER,
            SlotContext {
                provider: self.provider.clone(),
                factories: self.factories.clone(),
                build_info: self.build_info.clone(),
                service_factory: self.service_factory.clone(),
                async_errors: async_errors.clone(),
                backoff: ReloadBackoff::default(),
                span,
            },
        );
        slot.spawn();

        if let Err(e) = client.apply().await {
            error!(error = %e, "Failed to setup the collector");
            if self.settings.teardown_on_setup_failure {
                self.teardown_after_failed_setup(&client).await;
            }
            return Err(e);
        }

        self.publisher.publish(State::Running)?;
        info!("Everything is ready. Begin running and processing data.");

        let trigger = tokio::select! {
            Some(err) = fatal_errors.recv() => Trigger::AsyncError(err),
            signal = self.signals.recv() => Trigger::Signal(signal),
            _ = self.stop.cancelled() => Trigger::Stop,
        };
        match &trigger {
            Trigger::AsyncError(err) => error!(error = %err, "Asynchronous error received, terminating process"),
            Trigger::Signal(signal) => info!(%signal, "Received signal from OS"),
            Trigger::Stop => info!("Received shutdown request"),
        }
        client.refuse_reloads();
        self.publisher.publish(State::Closing)?;

        let failures = self.shutdown_sequence(&client).await;
        drop(async_errors);

        self.publisher.publish(State::Closed)?;
        self.publisher.close();
        info!(failures = failures.len(), "Shutdown complete");

        ShutdownError::combine(failures).map_err(CollectorError::from)
    }

    async fn shutdown_sequence(&mut self, client: &ServiceSlotClient) -> Vec<ShutdownFailure> {
        let mut failures = match client.shutdown().await {
            Ok(failures) => failures,
            Err(e) => vec![ShutdownFailure::new(ShutdownStep::ShutdownService, e)],
        };

        if let Err(e) = self.telemetry.shutdown().await {
            warn!(error = %e, "Failed to shutdown telemetry");
            failures.push(ShutdownFailure::new(ShutdownStep::ShutdownTelemetry, e));
        }

        self.release_ballast();
        failures
    }

    async fn teardown_after_failed_setup(&mut self, client: &ServiceSlotClient) {
        client.refuse_reloads();
        let failures = self.shutdown_sequence(client).await;
        for failure in &failures {
            warn!(error = %failure, "Teardown after failed setup");
        }
    }

    fn release_ballast(&mut self) {
        std::mem::take(&mut self.ballast).release();
        self.ballast_gauge.record(&self.ballast);
    }
}

fn file_provider(settings: &CollectorSettings) -> Result<Arc<dyn ParserProvider>, CollectorError> {
    let path = settings
        .config_path
        .as_ref()
        .ok_or(CollectorError::NoProvider)?;
    let provider: Arc<dyn ParserProvider> = Arc::new(
        FileProvider::new(path)
            .with_overrides(&settings.config_overrides)
            .map_err(CollectorError::ProviderGet)?,
    );
    Ok(provider)
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("build_info", &self.build_info)
            .field("provider", &self.provider)
            .field("state", &self.publisher.current())
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::StaticFactory;
    use crate::config::ProviderError;
    use crate::mock::{self, MockServiceFactory};

    #[test]
    fn test_settings_defaults_from_empty_toml() {
        let settings: CollectorSettings = toml::from_str("").unwrap();
        assert_eq!(settings, CollectorSettings::default());
        assert_eq!(settings.mem_ballast_size_mib, 0);
        assert!(!settings.teardown_on_setup_failure);

        let settings: CollectorSettings = toml::from_str(
            r#"
            mem_ballast_size_mib = 64
            telemetry_level = "detailed"
            "#,
        )
        .unwrap();
        assert_eq!(settings.mem_ballast_size_mib, 64);
        assert_eq!(settings.telemetry_level, TelemetryLevel::Detailed);
    }

    #[test]
    fn test_new_rejects_duplicate_factories() {
        let journal = mock::Journal::default();
        let factories = Factories::new()
            .with(StaticFactory::receiver("otlp"))
            .with(StaticFactory::receiver("otlp"));
        let params = Parameters::new(factories, Arc::new(MockServiceFactory::new(&journal)));
        assert!(matches!(
            Collector::new(params),
            Err(CollectorError::Factories(_))
        ));
    }

    #[test]
    fn test_new_requires_a_provider() {
        let journal = mock::Journal::default();
        let params = Parameters::new(mock::factories(), Arc::new(MockServiceFactory::new(&journal)));
        assert!(matches!(
            Collector::new(params),
            Err(CollectorError::NoProvider)
        ));
    }

    #[test]
    fn test_bad_override_is_rejected_up_front() {
        let journal = mock::Journal::default();
        let settings = CollectorSettings {
            config_path: Some("otelcol.toml".into()),
            config_overrides: vec!["missing-equals".into()],
            ..Default::default()
        };
        let params = Parameters::new(mock::factories(), Arc::new(MockServiceFactory::new(&journal)))
            .with_settings(settings);
        assert!(matches!(
            Collector::new(params),
            Err(CollectorError::ProviderGet(ProviderError::InvalidOverride { .. }))
        ));
    }

    #[test]
    fn test_state_receiver_taken_once() {
        let journal = mock::Journal::default();
        let provider = Arc::new(mock::MockProvider::new(&journal, mock::valid_config()));
        let params = Parameters::new(mock::factories(), Arc::new(MockServiceFactory::new(&journal)))
            .with_provider(provider);
        let mut collector = Collector::new(params).unwrap();

        assert!(collector.state_receiver().is_some());
        assert!(collector.state_receiver().is_none());
        assert_eq!(collector.state(), None);
    }
}
