//! File-backed configuration provider with hot reload.
//!
//! Reads a TOML file, applies `--set` style overrides and watches the file for changes.
//!
//! # Sessions
//! Every [`get`](ParserProvider::get) opens a new session; [`close`](Closeable::close) ends the
//! current one. A watch belongs to the session that was current when it started, so closing the
//! provider wakes its watch with [`WatchError::SessionClosed`] while a later `get` still works.
//!
//! # Settling
//! A change is reported only once the file has seen no further writes for the settle period, so
//! an in-place edit made of several writes ends the watch once, after the last of them.

use async_trait::async_trait;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::provider::{Closeable, ParserProvider, ProviderError, WatchError, Watchable};
use super::ConfigMap;

const DEFAULT_SETTLE: Duration = Duration::from_millis(200);

/// A `key::path=value` override applied on top of the file contents.
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub path: String,
    pub value: toml::Value,
}

impl Override {
    /// Parses `key::path=value`.
    ///
    /// The value is read as a TOML value when it is one (`42`, `true`, `"quoted"`, `[1, 2]`) and
    /// as a plain string otherwise.
    pub fn parse(flag: &str) -> Result<Self, ProviderError> {
        let invalid = |reason: &str| ProviderError::InvalidOverride {
            flag: flag.to_string(),
            reason: reason.to_string(),
        };
        let (path, raw) = flag.split_once('=').ok_or_else(|| invalid("missing '='"))?;
        let path = path.trim();
        if path.is_empty() {
            return Err(invalid("missing key"));
        }
        let raw = raw.trim();
        let value = match format!("v = {raw}").parse::<toml::Table>() {
            Ok(mut table) => table
                .remove("v")
                .unwrap_or_else(|| toml::Value::String(raw.to_string())),
            Err(_) => toml::Value::String(raw.to_string()),
        };
        Ok(Self {
            path: path.to_string(),
            value,
        })
    }
}

/// Provider reading a TOML file from disk.
pub struct FileProvider {
    path: PathBuf,
    overrides: Vec<Override>,
    settle: Duration,
    session: Mutex<CancellationToken>,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            overrides: Vec::new(),
            settle: DEFAULT_SETTLE,
            session: Mutex::new(CancellationToken::new()),
        }
    }

    /// How long the file must stay quiet after a change before the watch reports it.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Adds overrides given as `key::path=value` strings.
    pub fn with_overrides<I, S>(mut self, flags: I) -> Result<Self, ProviderError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for flag in flags {
            self.overrides.push(Override::parse(flag.as_ref())?);
        }
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn current_session(&self) -> CancellationToken {
        match self.session.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn open_session(&self) {
        let mut guard = match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.is_cancelled() {
            *guard = CancellationToken::new();
        }
    }
}

#[async_trait]
impl ParserProvider for FileProvider {
    async fn get(&self) -> Result<ConfigMap, ProviderError> {
        self.open_session();
        let content =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| ProviderError::Read {
                    path: self.path.clone(),
                    source,
                })?;
        let mut map = ConfigMap::from_toml(&content)?;
        for o in &self.overrides {
            map.set(&o.path, o.value.clone());
        }
        debug!(path = %self.path.display(), overrides = self.overrides.len(), "Configuration read");
        Ok(map)
    }

    fn watchable(self: Arc<Self>) -> Option<Arc<dyn Watchable>> {
        Some(self)
    }

    fn closeable(self: Arc<Self>) -> Option<Arc<dyn Closeable>> {
        Some(self)
    }
}

#[async_trait]
impl Watchable for FileProvider {
    async fn watch_for_update(&self) -> Result<(), WatchError> {
        let session = self.current_session();
        if session.is_cancelled() {
            return Err(WatchError::SessionClosed);
        }

        let (tx, mut events) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )
        .map_err(|e| WatchError::Failed(Box::new(e)))?;
        // Editors often replace the file instead of writing it in place, so watch its directory.
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::Failed(Box::new(e)))?;
        debug!(path = %self.path.display(), "Watching configuration file");

        let file_name = self.path.file_name();
        let settle = tokio::time::sleep(self.settle);
        tokio::pin!(settle);
        let mut changed = false;
        loop {
            tokio::select! {
                _ = session.cancelled() => return Err(WatchError::SessionClosed),
                _ = &mut settle, if changed => {
                    info!(path = %self.path.display(), "Configuration file change detected");
                    return Ok(());
                }
                event = events.recv() => match event {
                    Some(Ok(event))
                        if (event.kind.is_modify() || event.kind.is_create())
                            && event.paths.iter().any(|p| p.file_name() == file_name) =>
                    {
                        // Wait for the writes to go quiet before reporting the change.
                        changed = true;
                        settle.as_mut().reset(tokio::time::Instant::now() + self.settle);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(WatchError::Failed(Box::new(e))),
                    None => return Err(WatchError::Failed("file watcher stopped".into())),
                },
            }
        }
    }

    fn resume(&self) {
        self.open_session();
    }
}

#[async_trait]
impl Closeable for FileProvider {
    async fn close(&self) -> Result<(), ProviderError> {
        self.current_session().cancel();
        debug!(path = %self.path.display(), "Configuration session closed");
        Ok(())
    }
}
