//! # Components & Factories
//!
//! A collector is assembled from *component factories*: each factory knows the type name of one
//! receiver, processor, exporter or extension and the default settings for it. The configuration
//! loader only accepts components whose type has a registered factory.
//!
//! [`Factories::validate`] runs once, when a [`Collector`](crate::lifecycle::Collector) is created,
//! so a misregistered factory set fails fast instead of at the first config load.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Information logged at start and handed to the service runtime.
/// Custom builds override it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Executable file name, e.g. "otelcol".
    pub command: String,
    /// Full name of the collector, e.g. "OpenTelemetry Collector".
    pub description: String,
    pub version: String,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            command: "otelcol".to_string(),
            description: "OpenTelemetry Collector".to_string(),
            version: "latest".to_string(),
        }
    }
}

/// The four component kinds a configuration can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentKind {
    Receiver,
    Processor,
    Exporter,
    Extension,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 4] = [
        ComponentKind::Receiver,
        ComponentKind::Processor,
        ComponentKind::Exporter,
        ComponentKind::Extension,
    ];

    /// Name of the top-level configuration section holding this kind.
    pub fn section(&self) -> &'static str {
        match self {
            ComponentKind::Receiver => "receivers",
            ComponentKind::Processor => "processors",
            ComponentKind::Exporter => "exporters",
            ComponentKind::Extension => "extensions",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentKind::Receiver => "receiver",
            ComponentKind::Processor => "processor",
            ComponentKind::Exporter => "exporter",
            ComponentKind::Extension => "extension",
        };
        f.write_str(name)
    }
}

/// A component factory.
///
/// The orchestrator only needs the identity of a factory and its default settings; building the
/// actual pipeline components is the job of the service runtime.
pub trait Factory: Send + Sync {
    fn kind(&self) -> ComponentKind;

    /// Type name used in configuration keys (`<type>` or `<type>/<name>`).
    fn type_name(&self) -> &str;

    /// Settings applied before the user's own settings for this component.
    fn default_config(&self) -> toml::Table {
        toml::Table::new()
    }
}

/// A factory described entirely by data.
#[derive(Debug, Clone)]
pub struct StaticFactory {
    kind: ComponentKind,
    type_name: String,
    default_config: toml::Table,
}

impl StaticFactory {
    pub fn new(kind: ComponentKind, type_name: impl Into<String>) -> Self {
        Self {
            kind,
            type_name: type_name.into(),
            default_config: toml::Table::new(),
        }
    }

    pub fn receiver(type_name: impl Into<String>) -> Self {
        Self::new(ComponentKind::Receiver, type_name)
    }

    pub fn processor(type_name: impl Into<String>) -> Self {
        Self::new(ComponentKind::Processor, type_name)
    }

    pub fn exporter(type_name: impl Into<String>) -> Self {
        Self::new(ComponentKind::Exporter, type_name)
    }

    pub fn extension(type_name: impl Into<String>) -> Self {
        Self::new(ComponentKind::Extension, type_name)
    }

    /// Adds a default setting.
    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.default_config.insert(key.into(), value.into());
        self
    }
}

impl Factory for StaticFactory {
    fn kind(&self) -> ComponentKind {
        self.kind
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn default_config(&self) -> toml::Table {
        self.default_config.clone()
    }
}

/// Errors found while validating a set of factories.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FactoryError {
    #[error("{kind} factory has an empty type name")]
    EmptyType { kind: ComponentKind },

    #[error("{kind} factory type {type_name:?} must not contain '/' or whitespace")]
    InvalidType {
        kind: ComponentKind,
        type_name: String,
    },

    #[error("duplicate {kind} factory {type_name:?}")]
    Duplicate {
        kind: ComponentKind,
        type_name: String,
    },
}

/// The registered component factories.
#[derive(Clone, Default)]
pub struct Factories {
    factories: Vec<Arc<dyn Factory>>,
}

impl Factories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory. Duplicates are reported by [`Factories::validate`].
    pub fn with(mut self, factory: impl Factory + 'static) -> Self {
        self.factories.push(Arc::new(factory));
        self
    }

    pub fn register(&mut self, factory: Arc<dyn Factory>) {
        self.factories.push(factory);
    }

    pub fn get(&self, kind: ComponentKind, type_name: &str) -> Option<&Arc<dyn Factory>> {
        self.factories
            .iter()
            .find(|f| f.kind() == kind && f.type_name() == type_name)
    }

    pub fn of_kind(&self, kind: ComponentKind) -> impl Iterator<Item = &Arc<dyn Factory>> {
        self.factories.iter().filter(move |f| f.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Checks every type name is well formed and unique within its kind.
    pub fn validate(&self) -> Result<(), FactoryError> {
        for (i, factory) in self.factories.iter().enumerate() {
            let kind = factory.kind();
            let type_name = factory.type_name();
            if type_name.is_empty() {
                return Err(FactoryError::EmptyType { kind });
            }
            if type_name.contains('/') || type_name.chars().any(char::is_whitespace) {
                return Err(FactoryError::InvalidType {
                    kind,
                    type_name: type_name.to_string(),
                });
            }
            let duplicate = self.factories[..i]
                .iter()
                .any(|other| other.kind() == kind && other.type_name() == type_name);
            if duplicate {
                return Err(FactoryError::Duplicate {
                    kind,
                    type_name: type_name.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Factories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.factories
                    .iter()
                    .map(|factory| format!("{}/{}", factory.kind(), factory.type_name())),
            )
            .finish()
    }
}
