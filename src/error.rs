//! # Collector Errors
//!
//! Error types shared by the lifecycle orchestrator.
//!
//! The taxonomy follows the three phases a collector goes through:
//!
//! - [`CollectorError`] - fatal errors raised while setting the collector up. They abort the run.
//!   It also carries the shutdown aggregate returned at the end of a run.
//! - [`ReloadError`] - errors raised while swapping the running service for a new one.
//!   They are logged by the watch task and never retried.
//! - [`ShutdownError`] - the aggregate of every step that failed during teardown.
//!   Teardown never stops early, so this type keeps *all* failures and the step each came from.
//!
//! External collaborators (service runtime, telemetry, providers) report their own failures as
//! [`BoxError`], so the orchestrator never has to know their concrete error types.

use std::fmt;

use crate::component::FactoryError;
use crate::config::provider::ProviderError;
use crate::config::ConfigError;
use crate::lifecycle::StateError;

/// Boxed error used at the seams with external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by [`Collector::run`](crate::lifecycle::Collector::run).
///
/// Everything but [`CollectorError::Shutdown`] aborts the run before it reaches `Running`.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("invalid component factories: {0}")]
    Factories(#[from] FactoryError),

    #[error("no configuration provider: set a provider or a config path")]
    NoProvider,

    #[error("collector already started")]
    AlreadyStarted,

    #[error(transparent)]
    State(#[from] StateError),

    #[error("failed to initialize telemetry: {0}")]
    TelemetryInit(#[source] BoxError),

    #[error("cannot load configuration's parser: {0}")]
    ProviderGet(#[source] ProviderError),

    #[error("cannot load configuration: {0}")]
    ConfigLoad(#[source] ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[source] ConfigError),

    #[error("failed to create service: {0}")]
    ServiceCreate(#[source] BoxError),

    #[error("failed to start service: {0}")]
    ServiceStart(#[source] BoxError),

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}

/// Errors returned by a configuration reload.
///
/// A failed reload may leave the collector without an active service. That is an
/// accepted degraded state: the next configuration change triggers another reload.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    /// The provider could not be closed; the old service is still installed and running.
    #[error("failed to close current config provider: {0}")]
    CloseProvider(#[source] ProviderError),

    #[error("failed to shutdown the retiring service: {0}")]
    RetireService(#[source] BoxError),

    #[error("failed to setup configuration components: {0}")]
    Setup(#[source] Box<CollectorError>),

    /// Shutdown has begun; the current service is left for the shutdown sequence.
    #[error("collector is shutting down, reload refused")]
    Closing,

    #[error(transparent)]
    Slot(#[from] SlotError),
}

/// Errors talking to the [`ServiceSlot`](crate::lifecycle::ServiceSlot) actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("service slot closed")]
    Closed,
    #[error("service slot dropped response channel")]
    Dropped,
}

/// A teardown step that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStep {
    CloseProvider,
    ShutdownService,
    ShutdownTelemetry,
}

impl fmt::Display for ShutdownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownStep::CloseProvider => write!(f, "close config"),
            ShutdownStep::ShutdownService => write!(f, "shutdown service"),
            ShutdownStep::ShutdownTelemetry => write!(f, "shutdown application telemetry"),
        }
    }
}

/// One failed teardown step.
#[derive(Debug, thiserror::Error)]
#[error("failed to {step}: {source}")]
pub struct ShutdownFailure {
    pub step: ShutdownStep,
    #[source]
    pub source: BoxError,
}

impl ShutdownFailure {
    pub fn new(step: ShutdownStep, source: impl Into<BoxError>) -> Self {
        Self {
            step,
            source: source.into(),
        }
    }
}

/// Aggregate of every failure recorded during the shutdown sequence.
///
/// Never empty: an empty sequence of failures means success, see [`ShutdownError::combine`].
#[derive(Debug)]
pub struct ShutdownError {
    failures: Vec<ShutdownFailure>,
}

impl ShutdownError {
    /// Combines collected failures into a single result.
    ///
    /// ```
    /// use collector_lifecycle::error::{ShutdownError, ShutdownFailure, ShutdownStep};
    ///
    /// assert!(ShutdownError::combine(Vec::new()).is_ok());
    ///
    /// let err = ShutdownError::combine(vec![
    ///     ShutdownFailure::new(ShutdownStep::CloseProvider, "disk gone"),
    ///     ShutdownFailure::new(ShutdownStep::ShutdownService, "exporter stuck"),
    /// ])
    /// .unwrap_err();
    /// assert_eq!(err.failures().len(), 2);
    /// assert_eq!(
    ///     err.to_string(),
    ///     "[failed to close config: disk gone; failed to shutdown service: exporter stuck]"
    /// );
    /// ```
    pub fn combine(failures: Vec<ShutdownFailure>) -> Result<(), ShutdownError> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ShutdownError { failures })
        }
    }

    pub fn failures(&self) -> &[ShutdownFailure] {
        &self.failures
    }

    /// Returns true if the given step is among the failures.
    pub fn failed(&self, step: ShutdownStep) -> bool {
        self.failures.iter().any(|f| f.step == step)
    }

    pub fn into_failures(self) -> Vec<ShutdownFailure> {
        self.failures
    }
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [single] = self.failures.as_slice() {
            return write!(f, "{single}");
        }
        write!(f, "[")?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{failure}")?;
        }
        write!(f, "]")
    }
}

impl std::error::Error for ShutdownError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|f| f as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_failure_displays_without_brackets() {
        let err = ShutdownError::combine(vec![ShutdownFailure::new(
            ShutdownStep::ShutdownTelemetry,
            "exporter flush failed",
        )])
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to shutdown application telemetry: exporter flush failed"
        );
        assert!(err.failed(ShutdownStep::ShutdownTelemetry));
        assert!(!err.failed(ShutdownStep::CloseProvider));
    }

    #[test]
    fn test_setup_errors_name_the_phase() {
        let err = CollectorError::ServiceStart("port in use".into());
        assert_eq!(err.to_string(), "failed to start service: port in use");

        let reload = ReloadError::Setup(Box::new(err));
        assert_eq!(
            reload.to_string(),
            "failed to setup configuration components: failed to start service: port in use"
        );
    }
}
