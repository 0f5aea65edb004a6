//! # Configuration Providers
//!
//! A provider hands the collector a fresh [`ConfigMap`] every time it is asked. Two capabilities
//! are optional:
//!
//! - [`Watchable`]: the provider can block until its source changes.
//! - [`Closeable`]: the provider holds resources that must be released explicitly.
//!
//! Capabilities are resolved exactly once, when the provider is installed into a
//! [`ProviderHandle`]. The rest of the collector works with the handle and never re-checks.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use super::ConfigMap;
use crate::error::BoxError;

/// Errors raised by a provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid override {flag:?}: {reason}")]
    InvalidOverride { flag: String, reason: String },

    #[error("{0}")]
    Other(#[source] BoxError),
}

impl ProviderError {
    pub fn other(err: impl Into<BoxError>) -> Self {
        ProviderError::Other(err.into())
    }
}

/// Why a watch ended.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The provider was closed. Expected during shutdown and reload; never triggers a reload.
    #[error("config source session closed")]
    SessionClosed,

    /// The watch itself broke.
    #[error("config watch failed: {0}")]
    Failed(#[source] BoxError),
}

/// Source of configuration.
#[async_trait]
pub trait ParserProvider: Send + Sync + 'static {
    /// Returns the current configuration.
    async fn get(&self) -> Result<ConfigMap, ProviderError>;

    /// The watch capability, if the provider has one.
    fn watchable(self: Arc<Self>) -> Option<Arc<dyn Watchable>> {
        None
    }

    /// The close capability, if the provider has one.
    fn closeable(self: Arc<Self>) -> Option<Arc<dyn Closeable>> {
        None
    }
}

#[async_trait]
pub trait Watchable: Send + Sync {
    /// Blocks until the configuration changes or the watch ends.
    ///
    /// `Ok(())` means a change was observed. [`WatchError::SessionClosed`] means the provider was
    /// closed and nothing should happen. Any other error ends the watch unexpectedly.
    async fn watch_for_update(&self) -> Result<(), WatchError>;

    /// Reopens a closed session without reading the configuration, so the next
    /// [`watch_for_update`](Watchable::watch_for_update) waits for a change again.
    ///
    /// Used when a reload closed the provider but aborted before its next `get`.
    fn resume(&self) {}
}

#[async_trait]
pub trait Closeable: Send + Sync {
    /// Releases the provider's current session.
    async fn close(&self) -> Result<(), ProviderError>;
}

/// A provider together with its resolved capabilities.
#[derive(Clone)]
pub struct ProviderHandle {
    source: Arc<dyn ParserProvider>,
    watchable: Option<Arc<dyn Watchable>>,
    closeable: Option<Arc<dyn Closeable>>,
}

impl ProviderHandle {
    pub fn install(provider: Arc<dyn ParserProvider>) -> Self {
        let watchable = provider.clone().watchable();
        let closeable = provider.clone().closeable();
        Self {
            source: provider,
            watchable,
            closeable,
        }
    }

    pub async fn get(&self) -> Result<ConfigMap, ProviderError> {
        self.source.get().await
    }

    pub fn watchable(&self) -> Option<&Arc<dyn Watchable>> {
        self.watchable.as_ref()
    }

    pub fn closeable(&self) -> Option<&Arc<dyn Closeable>> {
        self.closeable.as_ref()
    }

    /// Closes the provider if it is closeable; a no-op otherwise.
    pub async fn close(&self) -> Result<(), ProviderError> {
        match &self.closeable {
            Some(closeable) => closeable.close().await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("watchable", &self.watchable.is_some())
            .field("closeable", &self.closeable.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Inline(&'static str);

    #[async_trait]
    impl ParserProvider for Inline {
        async fn get(&self) -> Result<ConfigMap, ProviderError> {
            Ok(ConfigMap::from_toml(self.0)?)
        }
    }

    struct Closing;

    #[async_trait]
    impl ParserProvider for Closing {
        async fn get(&self) -> Result<ConfigMap, ProviderError> {
            Ok(ConfigMap::default())
        }

        fn closeable(self: Arc<Self>) -> Option<Arc<dyn Closeable>> {
            Some(self)
        }
    }

    #[async_trait]
    impl Closeable for Closing {
        async fn close(&self) -> Result<(), ProviderError> {
            Err(ProviderError::other("already closed"))
        }
    }

    #[tokio::test]
    async fn test_plain_provider_has_no_capabilities() {
        let handle = ProviderHandle::install(Arc::new(Inline("[receivers.otlp]")));
        assert!(handle.watchable().is_none());
        assert!(handle.closeable().is_none());
        assert!(handle.close().await.is_ok());

        let map = handle.get().await.unwrap();
        assert!(map.get("receivers::otlp").is_some());
    }

    #[tokio::test]
    async fn test_capabilities_resolved_at_install() {
        let handle = ProviderHandle::install(Arc::new(Closing));
        assert!(handle.watchable().is_none());
        assert!(handle.closeable().is_some());

        let err = handle.close().await.unwrap_err();
        assert_eq!(err.to_string(), "already closed");
    }
}
