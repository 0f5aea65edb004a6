//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! ParserProvider::get()          (provider.rs, file.rs)
//!     → ConfigMap                (raw tree, this file)
//!     → loader::load()           (resolve component ids against factories)
//!     → Config::validate()       (model.rs, cross-reference checks)
//!     → ServiceSettings          (handed to the service runtime)
//!
//! On an unexpected watch termination:
//!     Watchable::watch_for_update() returns
//!     → ServiceSlot reloads: close provider, retire service, load again
//! ```
//!
//! The raw tree is a TOML table. Nested keys are addressed with the `::` delimiter
//! (`exporters::otlp::endpoint`), which keeps `/` free for component names.

pub mod file;
pub mod loader;
pub mod model;
pub mod provider;

pub use file::FileProvider;
pub use loader::load;
pub use model::{ComponentId, Config, DataType, PipelineConfig, PipelineId, ServiceConfig};
pub use provider::{Closeable, ParserProvider, ProviderError, ProviderHandle, WatchError, Watchable};

use crate::component::ComponentKind;

/// Delimiter between the segments of a key path.
pub const KEY_DELIMITER: &str = "::";

/// Unstructured configuration as returned by a provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigMap {
    table: toml::Table,
}

impl ConfigMap {
    pub fn new(table: toml::Table) -> Self {
        Self { table }
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        Ok(Self {
            table: content.parse::<toml::Table>()?,
        })
    }

    pub fn table(&self) -> &toml::Table {
        &self.table
    }

    pub fn into_table(self) -> toml::Table {
        self.table
    }

    /// Looks up a `::` delimited key path.
    pub fn get(&self, path: &str) -> Option<&toml::Value> {
        let mut segments = path.split(KEY_DELIMITER);
        let mut current = self.table.get(segments.next()?)?;
        for segment in segments {
            current = current.as_table()?.get(segment)?;
        }
        Some(current)
    }

    /// Sets a `::` delimited key path, creating intermediate tables.
    ///
    /// A non-table value in the middle of the path is replaced by a table.
    pub fn set(&mut self, path: &str, value: toml::Value) {
        let segments: Vec<&str> = path.split(KEY_DELIMITER).collect();
        let Some((last, parents)) = segments.split_last() else {
            return;
        };
        let mut current = &mut self.table;
        for segment in parents {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            if !entry.is_table() {
                *entry = toml::Value::Table(toml::Table::new());
            }
            current = match entry {
                toml::Value::Table(table) => table,
                _ => return,
            };
        }
        current.insert(last.to_string(), value);
    }
}

/// Errors produced while loading or validating a configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown top-level section {0:?}")]
    UnknownSection(String),

    #[error("{key:?} must be a table")]
    NotATable { key: String },

    #[error("invalid component id {id:?}: {reason}")]
    InvalidComponentId { id: String, reason: String },

    #[error("invalid pipeline id {id:?}: {reason}")]
    InvalidPipelineId { id: String, reason: String },

    #[error("unknown {kind} type {type_name:?}")]
    UnknownType {
        kind: ComponentKind,
        type_name: String,
    },

    #[error("error reading service section: {0}")]
    Service(String),

    #[error("no receivers configured")]
    NoReceivers,

    #[error("no exporters configured")]
    NoExporters,

    #[error("service must have at least one pipeline")]
    NoPipelines,

    #[error("pipeline {0} must have at least one receiver")]
    PipelineNoReceivers(PipelineId),

    #[error("pipeline {0} must have at least one exporter")]
    PipelineNoExporters(PipelineId),

    #[error("pipeline {pipeline} references {kind} {id} which does not exist")]
    PipelineUnknownComponent {
        pipeline: PipelineId,
        kind: ComponentKind,
        id: ComponentId,
    },

    #[error("pipeline {pipeline} references processor {id} multiple times")]
    DuplicateProcessor { pipeline: PipelineId, id: ComponentId },

    #[error("service references extension {0} which does not exist")]
    UnknownExtension(ComponentId),
}
