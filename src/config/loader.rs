//! Turns a raw [`ConfigMap`] into a structured [`Config`].

use tracing::debug;

use super::model::{ComponentConfig, ComponentId, Config, ServiceConfig};
use super::{ConfigError, ConfigMap};
use crate::component::{ComponentKind, Factories};

const SERVICE_SECTION: &str = "service";

/// Loads the configuration, resolving every component against its factory.
///
/// Component settings start from the factory defaults and are overlaid key by key with the
/// user's settings. The result is not validated yet, see [`Config::validate`].
pub fn load(map: &ConfigMap, factories: &Factories) -> Result<Config, ConfigError> {
    let table = map.table();

    if let Some(unknown) = table.keys().find(|key| {
        key.as_str() != SERVICE_SECTION && !ComponentKind::ALL.iter().any(|k| k.section() == *key)
    }) {
        return Err(ConfigError::UnknownSection(unknown.clone()));
    }

    let mut config = Config::default();
    for kind in ComponentKind::ALL {
        load_components(table, kind, factories, config.components_mut(kind))?;
    }

    if let Some(value) = table.get(SERVICE_SECTION) {
        let service: ServiceConfig = value
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Service(e.to_string()))?;
        config.service = service;
    }

    debug!(
        receivers = config.receivers.len(),
        processors = config.processors.len(),
        exporters = config.exporters.len(),
        extensions = config.extensions.len(),
        pipelines = config.service.pipelines.len(),
        "Configuration loaded"
    );
    Ok(config)
}

fn load_components(
    table: &toml::Table,
    kind: ComponentKind,
    factories: &Factories,
    out: &mut std::collections::BTreeMap<ComponentId, ComponentConfig>,
) -> Result<(), ConfigError> {
    let Some(section) = table.get(kind.section()) else {
        return Ok(());
    };
    let section = section.as_table().ok_or_else(|| ConfigError::NotATable {
        key: kind.section().to_string(),
    })?;

    for (key, value) in section {
        let id: ComponentId = key.parse()?;
        let factory = factories
            .get(kind, id.type_name())
            .ok_or_else(|| ConfigError::UnknownType {
                kind,
                type_name: id.type_name().to_string(),
            })?;

        let mut settings = factory.default_config();
        match value {
            toml::Value::Table(overrides) => {
                for (k, v) in overrides {
                    settings.insert(k.clone(), v.clone());
                }
            }
            _ => {
                return Err(ConfigError::NotATable {
                    key: format!("{}::{}", kind.section(), key),
                })
            }
        }
        out.insert(id, settings);
    }
    Ok(())
}
