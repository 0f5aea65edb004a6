//! # Service Slot Actor
//!
//! The [`ServiceSlot`] owns the collector's current service instance. Every operation that reads
//! or replaces that instance is a message to this actor, so the instance has exactly one writer.
//!
//! ## Messages
//!
//! - **Apply**: load the configuration, build and start a service, install it, arm the watch.
//! - **Reload**: close the provider, retire the current service, then Apply again.
//! - **Current**: the generation of the installed service, if any.
//! - **Shutdown**: close the provider, shut down the installed service, stop the actor.
//!
//! Messages are processed one at a time, so a reload never interleaves with a read or with the
//! final shutdown, and the retiring service is always fully shut down before the next one is built.
//! Once [`ServiceSlotClient::refuse_reloads`] is called, reloads still in the queue are refused
//! and the installed service is left to the shutdown sequence.
//!
//! ## Watch Tasks
//!
//! When the provider can be watched, each successful Apply spawns a task that blocks on
//! [`Watchable::watch_for_update`]. A closed session ends the task quietly. Anything else (a
//! detected change or a broken watch) sends a Reload back to the actor.
//!
//! Every reload re-arms the watch, whatever its outcome, so the next change always gets a chance.
//! A reload that failed, or that a broken watch caused, counts as a strike; the next watch waits
//! out the [`ReloadBackoff`] delay for the current strike count before it starts. A change
//! applied cleanly clears the strikes.
//!
//! The actor keeps only a weak sender to itself. Watch tasks hold strong clients, and the actor
//! stops on the explicit Shutdown request or once every client is gone.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument, Span};

use super::backoff::ReloadBackoff;
use crate::component::{BuildInfo, Factories};
use crate::config::{self, ProviderHandle, WatchError, Watchable};
use crate::error::{CollectorError, ReloadError, ShutdownFailure, ShutdownStep, SlotError};
use crate::lifecycle::AsyncErrorReporter;
use crate::service::{Service, ServiceFactory, ServiceSettings};

/// Identity of an installed service. Increments with every successful Apply.
pub type Generation = u64;

/// Dependencies injected into the slot actor.
pub struct SlotContext {
    pub provider: ProviderHandle,
    pub factories: Arc<Factories>,
    pub build_info: BuildInfo,
    pub service_factory: Arc<dyn ServiceFactory>,
    pub async_errors: AsyncErrorReporter,
    pub backoff: ReloadBackoff,
    pub span: Span,
}

/// What ended the watch that asked for a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReloadCause {
    Changed,
    WatchFailed,
}

#[derive(Debug)]
enum SlotRequest {
    Apply {
        respond_to: oneshot::Sender<Result<Generation, CollectorError>>,
    },
    Reload {
        cause: ReloadCause,
        respond_to: oneshot::Sender<Result<Generation, ReloadError>>,
    },
    Current {
        respond_to: oneshot::Sender<Option<Generation>>,
    },
    Shutdown {
        respond_to: oneshot::Sender<Vec<ShutdownFailure>>,
    },
}

struct Installed {
    generation: Generation,
    service: Box<dyn Service>,
}

/// The actor owning the current service.
pub struct ServiceSlot {
    receiver: mpsc::Receiver<SlotRequest>,
    myself: mpsc::WeakSender<SlotRequest>,
    context: SlotContext,
    current: Option<Installed>,
    generation: Generation,
    watch: Option<CancellationToken>,
    strikes: u32,
    closing: CancellationToken,
}

impl ServiceSlot {
    pub fn new(buffer_size: usize, context: SlotContext) -> (Self, ServiceSlotClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let closing = CancellationToken::new();
        let actor = Self {
            receiver,
            myself: sender.downgrade(),
            context,
            current: None,
            generation: 0,
            watch: None,
            strikes: 0,
            closing: closing.clone(),
        };
        (actor, ServiceSlotClient { sender, closing })
    }

    /// Spawns the actor on the collector's span.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        let span = self.context.span.clone();
        tokio::spawn(self.run().instrument(span))
    }

    /// Processes requests until Shutdown or until every client is dropped.
    pub async fn run(mut self) {
        debug!("Service slot started");
        while let Some(msg) = self.receiver.recv().await {
            match msg {
                SlotRequest::Apply { respond_to } => {
                    let result = if self.current.is_some() {
                        Err(CollectorError::AlreadyStarted)
                    } else {
                        self.setup().await
                    };
                    if result.is_ok() {
                        self.spawn_watch(Duration::ZERO);
                    }
                    let _ = respond_to.send(result);
                }
                SlotRequest::Reload { cause, respond_to } => {
                    let result = self.reload(cause).await;
                    let _ = respond_to.send(result);
                }
                SlotRequest::Current { respond_to } => {
                    let _ = respond_to.send(self.current.as_ref().map(|i| i.generation));
                }
                SlotRequest::Shutdown { respond_to } => {
                    let failures = self.shutdown().await;
                    let _ = respond_to.send(failures);
                    break;
                }
            }
        }
        debug!(generation = self.generation, "Service slot stopped");
    }

    async fn setup(&mut self) -> Result<Generation, CollectorError> {
        let ctx = &self.context;
        let map = ctx.provider.get().await.map_err(CollectorError::ProviderGet)?;
        let config = config::load(&map, &ctx.factories).map_err(CollectorError::ConfigLoad)?;
        config.validate().map_err(CollectorError::InvalidConfig)?;

        let settings = ServiceSettings {
            factories: ctx.factories.clone(),
            build_info: ctx.build_info.clone(),
            config: Arc::new(config),
            async_errors: ctx.async_errors.clone(),
            span: ctx.span.clone(),
        };
        let service = ctx
            .service_factory
            .new_service(settings)
            .map_err(CollectorError::ServiceCreate)?;
        service.start().await.map_err(CollectorError::ServiceStart)?;

        self.generation += 1;
        let generation = self.generation;
        self.current = Some(Installed {
            generation,
            service,
        });
        info!(generation, "Service started");
        Ok(generation)
    }

    async fn reload(&mut self, cause: ReloadCause) -> Result<Generation, ReloadError> {
        if self.closing.is_cancelled() {
            return Err(ReloadError::Closing);
        }
        self.stop_watch();
        let result = self.swap().await;

        if result.is_ok() && cause == ReloadCause::Changed {
            self.strikes = 0;
        } else {
            self.strikes = self.strikes.saturating_add(1);
        }
        if let Some(watchable) = self.context.provider.watchable() {
            // A reload that closed the provider and then aborted left the session closed.
            watchable.resume();
        }
        self.spawn_watch(self.context.backoff.delay(self.strikes));
        result
    }

    async fn swap(&mut self) -> Result<Generation, ReloadError> {
        self.context
            .provider
            .close()
            .await
            .map_err(ReloadError::CloseProvider)?;

        if let Some(retiring) = self.current.take() {
            retiring
                .service
                .shutdown()
                .await
                .map_err(ReloadError::RetireService)?;
            info!(generation = retiring.generation, "Service retired");
        }

        self.setup()
            .await
            .map_err(|e| ReloadError::Setup(Box::new(e)))
    }

    async fn shutdown(&mut self) -> Vec<ShutdownFailure> {
        let mut failures = Vec::new();
        self.stop_watch();

        if let Err(e) = self.context.provider.close().await {
            warn!(error = %e, "Failed to close config provider");
            failures.push(ShutdownFailure::new(ShutdownStep::CloseProvider, e));
        }

        if let Some(installed) = self.current.take() {
            match installed.service.shutdown().await {
                Ok(()) => info!(generation = installed.generation, "Service stopped"),
                Err(e) => {
                    warn!(generation = installed.generation, error = %e, "Failed to shutdown service");
                    failures.push(ShutdownFailure::new(ShutdownStep::ShutdownService, e));
                }
            }
        }
        failures
    }

    fn spawn_watch(&mut self, delay: Duration) {
        self.stop_watch();
        let Some(watchable) = self.context.provider.watchable().cloned() else {
            return;
        };
        let Some(sender) = self.myself.upgrade() else {
            return;
        };
        if !delay.is_zero() {
            info!(strikes = self.strikes, delay_ms = delay.as_millis() as u64, "Config watch delayed");
        }
        let client = ServiceSlotClient {
            sender,
            closing: self.closing.clone(),
        };
        let token = CancellationToken::new();
        self.watch = Some(token.clone());
        tokio::spawn(watch(watchable, client, token, delay).instrument(self.context.span.clone()));
    }

    /// Ends the armed watch, if any. A watch that already fired is not affected.
    fn stop_watch(&mut self) {
        if let Some(token) = self.watch.take() {
            token.cancel();
        }
    }
}

async fn watch(
    watchable: Arc<dyn Watchable>,
    client: ServiceSlotClient,
    token: CancellationToken,
    delay: Duration,
) {
    let outcome = tokio::select! {
        _ = token.cancelled() => {
            debug!("Config watch cancelled");
            return;
        }
        outcome = async {
            tokio::time::sleep(delay).await;
            watchable.watch_for_update().await
        } => outcome,
    };
    let cause = match outcome {
        Err(WatchError::SessionClosed) => {
            info!("Config watch stopped, session closed");
            return;
        }
        Ok(()) => {
            warn!("Config updated, must reload the service");
            ReloadCause::Changed
        }
        Err(e) => {
            warn!(error = %e, "Config watch failed, reloading the service");
            ReloadCause::WatchFailed
        }
    };
    if client.closing.is_cancelled() {
        debug!("Collector is shutting down, reload skipped");
        return;
    }
    match client.request_reload(cause).await {
        Ok(generation) => info!(generation, "Configuration reloaded"),
        Err(ReloadError::Closing) => debug!("Collector is shutting down, reload refused"),
        Err(e) => error!(error = %e, "Failed to reload the configuration"),
    }
}

/// Handle for sending requests to the [`ServiceSlot`].
#[derive(Debug, Clone)]
pub struct ServiceSlotClient {
    sender: mpsc::Sender<SlotRequest>,
    closing: CancellationToken,
}

impl ServiceSlotClient {
    async fn request<T: Send>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SlotRequest,
    ) -> Result<T, SlotError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| SlotError::Closed)?;
        rx.await.map_err(|_| SlotError::Dropped)
    }

    /// Loads the configuration and installs a started service.
    pub async fn apply(&self) -> Result<Generation, CollectorError> {
        self.request(|respond_to| SlotRequest::Apply { respond_to })
            .await?
    }

    /// Retires the current service and applies the configuration again.
    pub async fn reload(&self) -> Result<Generation, ReloadError> {
        self.request_reload(ReloadCause::Changed).await
    }

    async fn request_reload(&self, cause: ReloadCause) -> Result<Generation, ReloadError> {
        self.request(|respond_to| SlotRequest::Reload { cause, respond_to })
            .await?
    }

    pub async fn current(&self) -> Result<Option<Generation>, SlotError> {
        self.request(|respond_to| SlotRequest::Current { respond_to })
            .await
    }

    /// From now on every reload fails with [`ReloadError::Closing`], including those already queued.
    pub fn refuse_reloads(&self) {
        self.closing.cancel();
    }

    /// Closes the provider and shuts the current service down, then stops the actor.
    ///
    /// Returns every failure; an empty list means both steps succeeded.
    pub async fn shutdown(&self) -> Result<Vec<ShutdownFailure>, SlotError> {
        self.request(|respond_to| SlotRequest::Shutdown { respond_to })
            .await
    }
}
