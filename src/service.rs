//! The service runtime seam.
//!
//! The collector does not process telemetry itself. Once a configuration is loaded and valid it
//! asks a [`ServiceFactory`] for a [`Service`], starts it, and later shuts it down.

use async_trait::async_trait;
use std::sync::Arc;

use crate::component::{BuildInfo, Factories};
use crate::config::Config;
use crate::error::BoxError;
use crate::lifecycle::AsyncErrorReporter;

/// Everything a service runtime needs to build its pipelines.
#[derive(Clone)]
pub struct ServiceSettings {
    pub factories: Arc<Factories>,
    pub build_info: BuildInfo,
    pub config: Arc<Config>,
    /// Reports a fatal condition; the first report shuts the collector down.
    pub async_errors: AsyncErrorReporter,
    /// The collector's span. Instrument long-running service tasks with it.
    pub span: tracing::Span,
}

/// A running processing pipeline.
#[async_trait]
pub trait Service: Send + Sync {
    async fn start(&self) -> Result<(), BoxError>;

    async fn shutdown(&self) -> Result<(), BoxError>;
}

/// Builds services from validated settings.
pub trait ServiceFactory: Send + Sync {
    fn new_service(&self, settings: ServiceSettings) -> Result<Box<dyn Service>, BoxError>;
}
