use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::client::Endpoints;
use crate::domain::{Agency, KeyConfig};
use crate::error::CatalogError;

pub const DEFAULT_CONFIG_FILE: &str = "eurostat-fs.json";
pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub agency: Option<Agency>,
    #[serde(default)]
    pub connection: Option<String>,
    #[serde(default)]
    pub base_uri: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    pub agency: Agency,
    pub connection: Option<String>,
    pub base_uri: String,
    pub language: String,
    pub timeout_secs: u64,
}

impl ConnectorConfig {
    pub fn for_agency(agency: Agency) -> Self {
        Self {
            agency,
            connection: None,
            base_uri: agency.base_uri().to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Switch agency. A base URI configured for another agency is replaced by
    /// the new agency's default.
    pub fn with_agency(mut self, agency: Agency) -> Self {
        if agency != self.agency {
            self.agency = agency;
            self.base_uri = agency.base_uri().to_string();
        }
        self
    }

    pub fn with_connection(mut self, connection: Option<String>) -> Self {
        if let Some(connection) = connection.filter(|value| !value.is_empty()) {
            self.connection = Some(connection);
        }
        self
    }

    pub fn key_config(&self) -> KeyConfig {
        KeyConfig::new(self.agency, self.connection.clone())
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(self.base_uri.clone(), self.agency)
    }

    /// Endpoints serving `agency`; the configured base URI only applies to
    /// the configured agency.
    pub fn endpoints_for(&self, agency: Agency) -> Endpoints {
        if agency == self.agency {
            self.endpoints()
        } else {
            Endpoints::for_agency(agency)
        }
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self::for_agency(Agency::default())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ConnectorConfig, CatalogError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ConnectorConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CatalogError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CatalogError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ConnectorConfig, CatalogError> {
        let agency = config.agency.unwrap_or_default();
        let base_uri = config
            .base_uri
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| agency.base_uri().to_string());
        let language = config
            .language
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
        let timeout_secs = match config.timeout_secs {
            Some(0) => {
                return Err(CatalogError::ConfigParse(
                    "timeout_secs must be greater than zero".to_string(),
                ));
            }
            Some(value) => value,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(ConnectorConfig {
            agency,
            connection: config.connection.filter(|value| !value.is_empty()),
            base_uri,
            language,
            timeout_secs,
        })
    }
}
