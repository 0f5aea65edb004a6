//! # Test Doubles
//!
//! In-memory stand-ins for the collector's three collaborators:
//!
//! | Double | Stands in for | Failure injection |
//! |--------|---------------|-------------------|
//! | [`MockProvider`] | [`ParserProvider`], [`Watchable`], [`Closeable`] | `fail_get`, `fail_close`, `fail_watch` |
//! | [`MockServiceFactory`] | [`ServiceFactory`] and its services | `fail_create`, `fail_start`, `fail_shutdown` |
//! | [`MockTelemetry`] | [`Telemetry`] | `fail_init`, `fail_shutdown` |
//!
//! All three write to a shared [`Journal`], so a test can assert the exact order in which the
//! collector called them.
//!
//! ```rust
//! use collector_lifecycle::mock::{self, Event, Journal, MockProvider};
//! use collector_lifecycle::config::ParserProvider;
//!
//! #[tokio::main]
//! async fn main() {
//!     let journal = Journal::default();
//!     let provider = MockProvider::new(&journal, mock::valid_config());
//!
//!     provider.get().await.unwrap();
//!     assert_eq!(journal.events(), vec![Event::ProviderGet]);
//! }
//! ```

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::component::{Factories, StaticFactory};
use crate::config::{
    Closeable, ConfigMap, ParserProvider, ProviderError, WatchError, Watchable,
};
use crate::error::BoxError;
use crate::lifecycle::AsyncErrorReporter;
use crate::service::{Service, ServiceFactory, ServiceSettings};
use crate::telemetry::Telemetry;

/// How long [`Journal::wait_until`] waits before failing the test.
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// A call made by the collector to one of the doubles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ProviderGet,
    ProviderClose,
    /// A service started successfully. Carries the service id.
    ServiceStart(u64),
    /// A service was asked to shut down, whether or not it succeeded.
    ServiceShutdown(u64),
    TelemetryInit { ballast_size_bytes: u64 },
    TelemetryShutdown,
}

/// Ordered record of [`Event`]s shared by the doubles.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Journal {
    pub fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, predicate: impl Fn(&Event) -> bool) -> bool {
        self.events.lock().unwrap().iter().any(predicate)
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| predicate(*e)).count()
    }

    /// Index of the first occurrence of `event`.
    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events.lock().unwrap().iter().position(|e| e == event)
    }

    /// Polls until `predicate` holds. Panics after five seconds.
    pub async fn wait_until(&self, predicate: impl Fn(&[Event]) -> bool) {
        let waited = tokio::time::timeout(WAIT_TIMEOUT, async {
            loop {
                if predicate(&self.events.lock().unwrap()) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        if waited.is_err() {
            panic!("Condition not met, journal: {:?}", self.events());
        }
    }
}

// =============================================================================
// PROVIDER
// =============================================================================

#[derive(Debug)]
enum WatchOutcome {
    Update,
    Fail(String),
}

/// A provider serving an in-memory TOML document.
///
/// Watchable and closeable by default. Like a real provider, `get` opens a session and `close`
/// ends it, which wakes a pending watch with [`WatchError::SessionClosed`].
pub struct MockProvider {
    journal: Journal,
    config: Mutex<String>,
    get_error: Mutex<Option<String>>,
    close_error: Mutex<Option<String>>,
    watch_error: Mutex<Option<String>>,
    watchable: bool,
    closeable: bool,
    session: Mutex<CancellationToken>,
    updates: mpsc::UnboundedSender<WatchOutcome>,
    pending: tokio::sync::Mutex<mpsc::UnboundedReceiver<WatchOutcome>>,
}

impl MockProvider {
    pub fn new(journal: &Journal, config: &str) -> Self {
        let (updates, pending) = mpsc::unbounded_channel();
        Self {
            journal: journal.clone(),
            config: Mutex::new(config.to_string()),
            get_error: Mutex::new(None),
            close_error: Mutex::new(None),
            watch_error: Mutex::new(None),
            watchable: true,
            closeable: true,
            session: Mutex::new(CancellationToken::new()),
            updates,
            pending: tokio::sync::Mutex::new(pending),
        }
    }

    pub fn without_watch(mut self) -> Self {
        self.watchable = false;
        self
    }

    pub fn without_close(mut self) -> Self {
        self.closeable = false;
        self
    }

    /// Replaces the document returned by the next `get`.
    pub fn set_config(&self, config: &str) {
        *self.config.lock().unwrap() = config.to_string();
    }

    pub fn fail_get(&self, message: &str) {
        *self.get_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_close(&self, message: &str) {
        *self.close_error.lock().unwrap() = Some(message.to_string());
    }

    /// Clears every injected `get`, `close` and persistent watch failure.
    pub fn clear_failures(&self) {
        *self.get_error.lock().unwrap() = None;
        *self.close_error.lock().unwrap() = None;
        *self.watch_error.lock().unwrap() = None;
    }

    /// Ends the pending (or next) watch with a detected change.
    pub fn trigger_update(&self) {
        let _ = self.updates.send(WatchOutcome::Update);
    }

    /// Ends the pending (or next) watch with an unexpected error.
    pub fn fail_watch(&self, message: &str) {
        let _ = self.updates.send(WatchOutcome::Fail(message.to_string()));
    }

    /// Makes every watch started from now on fail immediately.
    pub fn break_watch(&self, message: &str) {
        *self.watch_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn is_session_open(&self) -> bool {
        !self.session.lock().unwrap().is_cancelled()
    }

    fn open_session(&self) {
        let mut session = self.session.lock().unwrap();
        if session.is_cancelled() {
            *session = CancellationToken::new();
        }
    }
}

#[async_trait]
impl ParserProvider for MockProvider {
    async fn get(&self) -> Result<ConfigMap, ProviderError> {
        self.journal.record(Event::ProviderGet);
        self.open_session();
        if let Some(message) = self.get_error.lock().unwrap().clone() {
            return Err(ProviderError::other(message));
        }
        let config = self.config.lock().unwrap().clone();
        Ok(ConfigMap::from_toml(&config)?)
    }

    fn watchable(self: Arc<Self>) -> Option<Arc<dyn Watchable>> {
        if self.watchable {
            Some(self)
        } else {
            None
        }
    }

    fn closeable(self: Arc<Self>) -> Option<Arc<dyn Closeable>> {
        if self.closeable {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl Watchable for MockProvider {
    async fn watch_for_update(&self) -> Result<(), WatchError> {
        let session = self.session.lock().unwrap().clone();
        if session.is_cancelled() {
            return Err(WatchError::SessionClosed);
        }
        let broken = self.watch_error.lock().unwrap().clone();
        if let Some(message) = broken {
            return Err(WatchError::Failed(message.into()));
        }
        let mut pending = self.pending.lock().await;
        tokio::select! {
            _ = session.cancelled() => Err(WatchError::SessionClosed),
            outcome = pending.recv() => match outcome {
                Some(WatchOutcome::Update) => Ok(()),
                Some(WatchOutcome::Fail(message)) => Err(WatchError::Failed(message.into())),
                None => Err(WatchError::SessionClosed),
            },
        }
    }

    fn resume(&self) {
        self.open_session();
    }
}

#[async_trait]
impl Closeable for MockProvider {
    async fn close(&self) -> Result<(), ProviderError> {
        self.journal.record(Event::ProviderClose);
        if let Some(message) = self.close_error.lock().unwrap().clone() {
            return Err(ProviderError::other(message));
        }
        self.session.lock().unwrap().cancel();
        Ok(())
    }
}

// =============================================================================
// SERVICE
// =============================================================================

#[derive(Debug, Default)]
struct ServiceFailures {
    create: Option<String>,
    start: Option<String>,
    shutdown: Option<String>,
}

/// Builds [`MockService`]s numbered from 1.
pub struct MockServiceFactory {
    journal: Journal,
    next_id: AtomicU64,
    failures: Arc<Mutex<ServiceFailures>>,
    settings: Mutex<Vec<ServiceSettings>>,
}

impl MockServiceFactory {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            next_id: AtomicU64::new(1),
            failures: Arc::default(),
            settings: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_create(&self, message: &str) {
        self.failures.lock().unwrap().create = Some(message.to_string());
    }

    pub fn fail_start(&self, message: &str) {
        self.failures.lock().unwrap().start = Some(message.to_string());
    }

    pub fn fail_shutdown(&self, message: &str) {
        self.failures.lock().unwrap().shutdown = Some(message.to_string());
    }

    pub fn clear_failures(&self) {
        *self.failures.lock().unwrap() = ServiceFailures::default();
    }

    /// Number of services built so far.
    pub fn created(&self) -> usize {
        self.settings.lock().unwrap().len()
    }

    /// Settings handed to the most recent service.
    pub fn last_settings(&self) -> Option<ServiceSettings> {
        self.settings.lock().unwrap().last().cloned()
    }
}

impl ServiceFactory for MockServiceFactory {
    fn new_service(&self, settings: ServiceSettings) -> Result<Box<dyn Service>, BoxError> {
        if let Some(message) = self.failures.lock().unwrap().create.clone() {
            return Err(message.into());
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.settings.lock().unwrap().push(settings);
        Ok(Box::new(MockService {
            id,
            journal: self.journal.clone(),
            failures: self.failures.clone(),
        }))
    }
}

pub struct MockService {
    id: u64,
    journal: Journal,
    failures: Arc<Mutex<ServiceFailures>>,
}

#[async_trait]
impl Service for MockService {
    async fn start(&self) -> Result<(), BoxError> {
        if let Some(message) = self.failures.lock().unwrap().start.clone() {
            return Err(message.into());
        }
        self.journal.record(Event::ServiceStart(self.id));
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BoxError> {
        self.journal.record(Event::ServiceShutdown(self.id));
        match self.failures.lock().unwrap().shutdown.clone() {
            Some(message) => Err(message.into()),
            None => Ok(()),
        }
    }
}

// =============================================================================
// TELEMETRY
// =============================================================================

/// Telemetry that records its calls and keeps the reporter it was given.
pub struct MockTelemetry {
    journal: Journal,
    reporter: Mutex<Option<AsyncErrorReporter>>,
    init_error: Mutex<Option<String>>,
    shutdown_error: Mutex<Option<String>>,
}

impl MockTelemetry {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            reporter: Mutex::new(None),
            init_error: Mutex::new(None),
            shutdown_error: Mutex::new(None),
        }
    }

    pub fn fail_init(&self, message: &str) {
        *self.init_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_shutdown(&self, message: &str) {
        *self.shutdown_error.lock().unwrap() = Some(message.to_string());
    }

    /// The reporter received at init.
    pub fn reporter(&self) -> Option<AsyncErrorReporter> {
        self.reporter.lock().unwrap().clone()
    }
}

#[async_trait]
impl Telemetry for MockTelemetry {
    async fn init(
        &self,
        async_errors: AsyncErrorReporter,
        ballast_size_bytes: u64,
        _span: Span,
    ) -> Result<(), BoxError> {
        self.journal.record(Event::TelemetryInit { ballast_size_bytes });
        if let Some(message) = self.init_error.lock().unwrap().clone() {
            return Err(message.into());
        }
        *self.reporter.lock().unwrap() = Some(async_errors);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BoxError> {
        self.journal.record(Event::TelemetryShutdown);
        match self.shutdown_error.lock().unwrap().clone() {
            Some(message) => Err(message.into()),
            None => Ok(()),
        }
    }
}

// =============================================================================
// FIXTURES
// =============================================================================

/// Factories for every component type used by the fixtures.
pub fn factories() -> Factories {
    Factories::new()
        .with(StaticFactory::receiver("otlp").with_default("endpoint", "0.0.0.0:4317"))
        .with(StaticFactory::processor("batch").with_default("send_batch_size", 8192i64))
        .with(StaticFactory::exporter("logging").with_default("loglevel", "info"))
        .with(StaticFactory::exporter("otlp"))
        .with(StaticFactory::extension("health_check"))
}

/// One traces pipeline. Loads and validates.
pub fn valid_config() -> &'static str {
    r#"
    [receivers.otlp]

    [processors.batch]

    [exporters.logging]

    [extensions.health_check]

    [service]
    extensions = ["health_check"]

    [service.pipelines.traces]
    receivers = ["otlp"]
    processors = ["batch"]
    exporters = ["logging"]
    "#
}

/// Loads, but the pipeline names an exporter that is not configured.
pub fn invalid_config() -> &'static str {
    r#"
    [receivers.otlp]

    [exporters.logging]

    [service.pipelines.traces]
    receivers = ["otlp"]
    exporters = ["otlp/backend"]
    "#
}

/// Fails to load: the component type has no factory.
pub fn unloadable_config() -> &'static str {
    r#"
    [receivers.kafka]
    "#
}
