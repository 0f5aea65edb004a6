//! Structured collector configuration and its semantic checks.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use super::ConfigError;
use crate::component::ComponentKind;

/// Identifies a configured component: `<type>` or `<type>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub struct ComponentId {
    type_name: String,
    name: Option<String>,
}

impl ComponentId {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: None,
        }
    }

    pub fn with_name(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: Some(name.into()),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}/{}", self.type_name, name),
            None => f.write_str(&self.type_name),
        }
    }
}

/// Splits `<type>[/<name>]`, trimming whitespace and rejecting empty parts.
fn split_id(id: &str) -> Result<(&str, Option<&str>), String> {
    let (type_part, name_part) = match id.split_once('/') {
        Some((t, n)) => (t.trim(), Some(n.trim())),
        None => (id.trim(), None),
    };
    if type_part.is_empty() {
        return Err("the part before '/' must not be empty".to_string());
    }
    if name_part == Some("") {
        return Err("the part after '/' must not be empty".to_string());
    }
    Ok((type_part, name_part))
}

impl FromStr for ComponentId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (type_name, name) = split_id(s).map_err(|reason| ConfigError::InvalidComponentId {
            id: s.to_string(),
            reason,
        })?;
        Ok(Self {
            type_name: type_name.to_string(),
            name: name.map(str::to_string),
        })
    }
}

impl TryFrom<String> for ComponentId {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Signal type carried by a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    Traces,
    Metrics,
    Logs,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataType::Traces => "traces",
            DataType::Metrics => "metrics",
            DataType::Logs => "logs",
        })
    }
}

/// Identifies a pipeline: `<data type>` or `<data type>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub struct PipelineId {
    data_type: DataType,
    name: Option<String>,
}

impl PipelineId {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            name: None,
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}/{}", self.data_type, name),
            None => write!(f, "{}", self.data_type),
        }
    }
}

impl FromStr for PipelineId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ConfigError::InvalidPipelineId {
            id: s.to_string(),
            reason,
        };
        let (type_part, name) = split_id(s).map_err(invalid)?;
        let data_type = match type_part {
            "traces" => DataType::Traces,
            "metrics" => DataType::Metrics,
            "logs" => DataType::Logs,
            other => return Err(invalid(format!("unknown data type {other:?}"))),
        };
        Ok(Self {
            data_type,
            name: name.map(str::to_string),
        })
    }
}

impl TryFrom<String> for PipelineId {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// The components wired into one pipeline, in order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub receivers: Vec<ComponentId>,
    pub processors: Vec<ComponentId>,
    pub exporters: Vec<ComponentId>,
}

/// The `service` section: which extensions run and how pipelines are wired.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub extensions: Vec<ComponentId>,
    pub pipelines: BTreeMap<PipelineId, PipelineConfig>,
}

/// Settings of one configured component, defaults already merged in.
pub type ComponentConfig = toml::Table;

/// A loaded collector configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub receivers: BTreeMap<ComponentId, ComponentConfig>,
    pub processors: BTreeMap<ComponentId, ComponentConfig>,
    pub exporters: BTreeMap<ComponentId, ComponentConfig>,
    pub extensions: BTreeMap<ComponentId, ComponentConfig>,
    pub service: ServiceConfig,
}

impl Config {
    pub fn components(&self, kind: ComponentKind) -> &BTreeMap<ComponentId, ComponentConfig> {
        match kind {
            ComponentKind::Receiver => &self.receivers,
            ComponentKind::Processor => &self.processors,
            ComponentKind::Exporter => &self.exporters,
            ComponentKind::Extension => &self.extensions,
        }
    }

    pub(crate) fn components_mut(
        &mut self,
        kind: ComponentKind,
    ) -> &mut BTreeMap<ComponentId, ComponentConfig> {
        match kind {
            ComponentKind::Receiver => &mut self.receivers,
            ComponentKind::Processor => &mut self.processors,
            ComponentKind::Exporter => &mut self.exporters,
            ComponentKind::Extension => &mut self.extensions,
        }
    }

    /// Checks the configuration is runnable.
    ///
    /// Requires at least one receiver, one exporter and one pipeline; every pipeline must have
    /// receivers and exporters, reference only configured components and list each processor
    /// once; every service extension must be configured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.receivers.is_empty() {
            return Err(ConfigError::NoReceivers);
        }
        if self.exporters.is_empty() {
            return Err(ConfigError::NoExporters);
        }

        for id in &self.service.extensions {
            if !self.extensions.contains_key(id) {
                return Err(ConfigError::UnknownExtension(id.clone()));
            }
        }

        if self.service.pipelines.is_empty() {
            return Err(ConfigError::NoPipelines);
        }

        for (pipeline, wiring) in &self.service.pipelines {
            if wiring.receivers.is_empty() {
                return Err(ConfigError::PipelineNoReceivers(pipeline.clone()));
            }
            if wiring.exporters.is_empty() {
                return Err(ConfigError::PipelineNoExporters(pipeline.clone()));
            }

            let references = [
                (ComponentKind::Receiver, &wiring.receivers),
                (ComponentKind::Processor, &wiring.processors),
                (ComponentKind::Exporter, &wiring.exporters),
            ];
            for (kind, ids) in references {
                let configured = self.components(kind);
                if let Some(missing) = ids.iter().find(|id| !configured.contains_key(*id)) {
                    return Err(ConfigError::PipelineUnknownComponent {
                        pipeline: pipeline.clone(),
                        kind,
                        id: missing.clone(),
                    });
                }
            }

            let mut seen = BTreeSet::new();
            for id in &wiring.processors {
                if !seen.insert(id) {
                    return Err(ConfigError::DuplicateProcessor {
                        pipeline: pipeline.clone(),
                        id: id.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runnable() -> Config {
        let mut config = Config::default();
        config
            .receivers
            .insert(ComponentId::new("otlp"), ComponentConfig::new());
        config
            .processors
            .insert(ComponentId::new("batch"), ComponentConfig::new());
        config
            .exporters
            .insert(ComponentId::with_name("logging", "debug"), ComponentConfig::new());
        config.service.pipelines.insert(
            PipelineId::new(DataType::Traces),
            PipelineConfig {
                receivers: vec![ComponentId::new("otlp")],
                processors: vec![ComponentId::new("batch")],
                exporters: vec![ComponentId::with_name("logging", "debug")],
            },
        );
        config
    }

    #[test]
    fn test_component_id_parsing() {
        let id: ComponentId = "otlp/secondary".parse().unwrap();
        assert_eq!(id.type_name(), "otlp");
        assert_eq!(id.name(), Some("secondary"));
        assert_eq!(id.to_string(), "otlp/secondary");

        assert_eq!(" batch ".parse::<ComponentId>().unwrap(), ComponentId::new("batch"));
        assert!("/name".parse::<ComponentId>().is_err());
        assert!("otlp/".parse::<ComponentId>().is_err());
    }

    #[test]
    fn test_pipeline_id_parsing() {
        let id: PipelineId = "metrics/internal".parse().unwrap();
        assert_eq!(id.data_type(), DataType::Metrics);
        assert_eq!(id.to_string(), "metrics/internal");
        assert!(matches!(
            "profiles".parse::<PipelineId>(),
            Err(ConfigError::InvalidPipelineId { .. })
        ));
    }

    #[test]
    fn test_runnable_config_validates() {
        assert_eq!(runnable().validate(), Ok(()));
    }

    #[test]
    fn test_missing_sections_rejected() {
        let mut config = runnable();
        config.exporters.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoExporters));

        let mut config = runnable();
        config.service.pipelines.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoPipelines));
    }

    #[test]
    fn test_dangling_pipeline_reference_rejected() {
        let mut config = runnable();
        let traces = PipelineId::new(DataType::Traces);
        config
            .service
            .pipelines
            .get_mut(&traces)
            .unwrap()
            .exporters
            .push(ComponentId::new("zipkin"));

        assert_eq!(
            config.validate(),
            Err(ConfigError::PipelineUnknownComponent {
                pipeline: traces,
                kind: ComponentKind::Exporter,
                id: ComponentId::new("zipkin"),
            })
        );
    }

    #[test]
    fn test_duplicate_processor_rejected() {
        let mut config = runnable();
        let traces = PipelineId::new(DataType::Traces);
        config
            .service
            .pipelines
            .get_mut(&traces)
            .unwrap()
            .processors
            .push(ComponentId::new("batch"));

        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateProcessor { .. })
        ));
    }

    #[test]
    fn test_unconfigured_extension_rejected() {
        let mut config = runnable();
        config.service.extensions.push(ComponentId::new("health_check"));
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnknownExtension(ComponentId::new("health_check")))
        );
    }
}
