use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

const KEY_SCHEME: &str = "sdmx";

/// Dissemination agencies publishing an SDMX 2.1 catalog.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "UPPERCASE")]
#[value(rename_all = "UPPERCASE")]
pub enum Agency {
    #[default]
    Estat,
    Comp,
    Empl,
    Grow,
}

impl Agency {
    pub fn code(&self) -> &'static str {
        match self {
            Agency::Estat => "ESTAT",
            Agency::Comp => "COMP",
            Agency::Empl => "EMPL",
            Agency::Grow => "GROW",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Agency::Estat => "Eurostat",
            Agency::Comp => "DG COMP",
            Agency::Empl => "DG EMPL",
            Agency::Grow => "DG GROW",
        }
    }

    pub fn base_uri(&self) -> &'static str {
        match self {
            Agency::Estat => "https://ec.europa.eu/eurostat/api/dissemination",
            Agency::Comp => "https://webgate.ec.europa.eu/comp/redisstat/api/dissemination",
            Agency::Empl => "https://webgate.ec.europa.eu/empl/redisstat/api/dissemination",
            Agency::Grow => "https://webgate.ec.europa.eu/grow/redisstat/api/dissemination",
        }
    }
}

impl fmt::Display for Agency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Agency {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "ESTAT" => Ok(Agency::Estat),
            "COMP" => Ok(Agency::Comp),
            "EMPL" => Ok(Agency::Empl),
            "GROW" => Ok(Agency::Grow),
            _ => Err(CatalogError::UnknownAgency(value.to_string())),
        }
    }
}

/// Opaque identifier handed to the host for a dataflow.
///
/// Rendered as `sdmx:{AGENCY}:{DATAFLOW}` with an optional trailing
/// `:{CONNECTION}`. The connection comes last so that it may contain `:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    agency: Agency,
    dataflow_id: String,
    connection: Option<String>,
}

impl ItemKey {
    pub fn agency(&self) -> Agency {
        self.agency
    }

    pub fn dataflow_id(&self) -> &str {
        &self.dataflow_id
    }

    pub fn connection(&self) -> Option<&str> {
        self.connection.as_deref()
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{KEY_SCHEME}:{}:{}", self.agency, self.dataflow_id)?;
        if let Some(connection) = &self.connection {
            write!(f, ":{connection}")?;
        }
        Ok(())
    }
}

impl FromStr for ItemKey {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || CatalogError::InvalidItemKey(value.to_string());
        let rest = value
            .strip_prefix(KEY_SCHEME)
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(invalid)?;
        let mut parts = rest.splitn(3, ':');
        let agency = parts.next().ok_or_else(invalid)?;
        let dataflow_id = parts.next().ok_or_else(invalid)?;
        if dataflow_id.is_empty() {
            return Err(invalid());
        }
        let agency = agency.parse::<Agency>().map_err(|_| invalid())?;
        let connection = parts
            .next()
            .filter(|connection| !connection.is_empty())
            .map(str::to_string);
        Ok(Self {
            agency,
            dataflow_id: dataflow_id.to_string(),
            connection,
        })
    }
}

/// Parameters folded into every item key of one catalog build.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyConfig {
    pub agency: Agency,
    pub connection: Option<String>,
}

impl KeyConfig {
    pub fn new(agency: Agency, connection: Option<String>) -> Self {
        let connection = connection.filter(|value| !value.is_empty());
        Self { agency, connection }
    }

    pub fn item_key(&self, dataflow_id: &str) -> ItemKey {
        ItemKey {
            agency: self.agency,
            dataflow_id: dataflow_id.to_string(),
            connection: self.connection.clone(),
        }
    }

    pub fn key_string(&self, dataflow_id: &str) -> String {
        self.item_key(dataflow_id).to_string()
    }
}
