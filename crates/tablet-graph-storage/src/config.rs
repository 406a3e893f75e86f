//! Store configuration.
//!
//! Loaded in layers: `config/default.toml`, then
//! `config/{TABLET_GRAPH_ENV}.toml`, then `TABLET_GRAPH_`-prefixed
//! environment variables. Credential and table fields are validated before
//! the store connects; a bad key-package identifier surfaces from the
//! registry at initialisation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::keypackage::LayoutKind;

fn default_instance() -> String {
    "tablet-graph".to_string()
}

fn default_endpoints() -> String {
    "localhost:2181".to_string()
}

fn default_key_package() -> String {
    LayoutKind::BYTE_ENTITY_ID.to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./tablet-graph-data")
}

/// Connection and layout settings for one store instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Tablet-engine instance name; for the bundled engine this names the
    /// directory under `data_dir`.
    #[serde(default = "default_instance")]
    pub instance: String,
    /// Discovery endpoints for a remote engine; unused by the bundled one.
    #[serde(default = "default_endpoints")]
    pub endpoints: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Target table.
    pub table: String,
    /// Layout registry identifier: `byte-entity` or `classic`.
    #[serde(default = "default_key_package")]
    pub key_package: String,
    /// Root directory for the bundled engine's data.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl StoreConfig {
    /// A minimal configuration for a named table, as tests and embedded
    /// callers use it.
    pub fn for_table(table: impl Into<String>) -> StoreConfig {
        StoreConfig {
            instance: default_instance(),
            endpoints: default_endpoints(),
            user: "root".to_string(),
            password: String::new(),
            table: table.into(),
            key_package: default_key_package(),
            data_dir: default_data_dir(),
        }
    }

    pub fn with_key_package(mut self, id: impl Into<String>) -> StoreConfig {
        self.key_package = id.into();
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> StoreConfig {
        self.data_dir = dir.into();
        self
    }

    /// Loads configuration from files and the environment.
    pub fn load() -> Result<StoreConfig, ConfigError> {
        let env = std::env::var("TABLET_GRAPH_ENV").unwrap_or_else(|_| "development".to_string());
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("TABLET_GRAPH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        let config: StoreConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks required fields; fatal at initialisation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance.is_empty() {
            return Err(ConfigError::MissingField { field: "instance" });
        }
        if self.user.is_empty() {
            return Err(ConfigError::MissingField { field: "user" });
        }
        if self.table.is_empty() {
            return Err(ConfigError::MissingField { field: "table" });
        }
        Ok(())
    }

    /// Resolves the configured key-package identifier.
    pub fn layout(&self) -> Result<LayoutKind, ConfigError> {
        LayoutKind::from_id(&self.key_package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = StoreConfig::for_table("graph");
        config.validate().unwrap();
        assert_eq!(config.layout().unwrap(), LayoutKind::ByteEntity);
    }

    #[test]
    fn missing_table_is_rejected() {
        let config = StoreConfig::for_table("");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { field: "table" })
        ));
    }

    #[test]
    fn unknown_key_package_is_rejected() {
        let config = StoreConfig::for_table("graph").with_key_package("exotic");
        assert!(matches!(
            config.layout(),
            Err(ConfigError::UnknownKeyPackage { .. })
        ));
    }
}
