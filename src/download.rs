use std::fs;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::client::{DataResponse, SdmxClient};
use crate::config::ConnectorConfig;
use crate::domain::ItemKey;
use crate::error::CatalogError;

pub const MIN_PERIOD: u16 = 1901;
pub const MAX_PERIOD: u16 = 9999;

/// Error bodies longer than this are cut before being reported.
const MAX_ERROR_BODY: u64 = 64 * 1024;

/// Filter values as the host supplies them, unvalidated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DownloadFilters {
    #[serde(default)]
    pub start_period: Option<String>,
    #[serde(default)]
    pub end_period: Option<String>,
    #[serde(default)]
    pub first_n_observations: Option<String>,
    #[serde(default)]
    pub last_n_observations: Option<String>,
}

/// Filters that survived validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidatedFilters {
    pub start_period: Option<u16>,
    pub end_period: Option<u16>,
    pub first_n_observations: Option<u32>,
    pub last_n_observations: Option<u32>,
}

impl DownloadFilters {
    /// Invalid values are dropped with a warning, never an error.
    ///
    /// The period bounds are kept or dropped as a pair: if either supplied
    /// bound is not a year in `[1901, 9999]`, or start is after end, neither is
    /// sent. Observation counts are checked independently of each other.
    pub fn validate(&self) -> ValidatedFilters {
        let (start_period, end_period) =
            validate_period(self.start_period.as_deref(), self.end_period.as_deref());
        ValidatedFilters {
            start_period,
            end_period,
            first_n_observations: validate_count(
                "firstNObservations",
                self.first_n_observations.as_deref(),
            ),
            last_n_observations: validate_count(
                "lastNObservations",
                self.last_n_observations.as_deref(),
            ),
        }
    }
}

impl ValidatedFilters {
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(start) = self.start_period {
            params.push(("startPeriod", start.to_string()));
        }
        if let Some(end) = self.end_period {
            params.push(("endPeriod", end.to_string()));
        }
        if let Some(first) = self.first_n_observations {
            params.push(("firstNObservations", first.to_string()));
        }
        if let Some(last) = self.last_n_observations {
            params.push(("lastNObservations", last.to_string()));
        }
        params
    }
}

fn supplied(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_year(value: &str) -> Option<u16> {
    value
        .parse::<u16>()
        .ok()
        .filter(|year| (MIN_PERIOD..=MAX_PERIOD).contains(year))
}

fn validate_period(start: Option<&str>, end: Option<&str>) -> (Option<u16>, Option<u16>) {
    let (start, end) = (supplied(start), supplied(end));
    let parsed_start = start.map(parse_year);
    let parsed_end = end.map(parse_year);
    let valid = match (parsed_start, parsed_end) {
        (Some(None), _) | (_, Some(None)) => false,
        (Some(Some(start)), Some(Some(end))) => start <= end,
        _ => true,
    };
    if !valid {
        tracing::warn!(
            start = start.unwrap_or_default(),
            end = end.unwrap_or_default(),
            "dropping invalid period filter"
        );
        return (None, None);
    }
    (parsed_start.flatten(), parsed_end.flatten())
}

fn validate_count(name: &str, value: Option<&str>) -> Option<u32> {
    let value = supplied(value)?;
    match value.parse::<u32>() {
        Ok(count) if count > 0 => Some(count),
        _ => {
            tracing::warn!(filter = name, value, "dropping invalid observation filter");
            None
        }
    }
}

pub fn is_csv_content_type(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("csv")
}

/// Turns an item key plus filters into a CSV extract.
pub struct DownloadTranslator<C: SdmxClient> {
    client: C,
    config: ConnectorConfig,
}

impl<C: SdmxClient> DownloadTranslator<C> {
    pub fn new(client: C, config: ConnectorConfig) -> Self {
        Self { client, config }
    }

    pub fn request_url(
        &self,
        key: &ItemKey,
        filters: &DownloadFilters,
    ) -> Result<String, CatalogError> {
        let params = filters.validate().query_params();
        self.config
            .endpoints_for(key.agency())
            .data_url(key.dataflow_id(), &params)
    }

    /// Stream the extract for `item_id` into `destination`, returning the byte
    /// count.
    pub fn download<W: Write>(
        &self,
        item_id: &str,
        destination: &mut W,
        filters: &DownloadFilters,
    ) -> Result<u64, CatalogError> {
        let key = item_id.parse::<ItemKey>()?;
        let url = self.request_url(&key, filters)?;
        tracing::info!(dataflow = key.dataflow_id(), url = %url, "downloading dataflow");

        let mut response = check_response(self.client.open_data(&url)?)?;
        let written = io::copy(&mut response.body, destination)
            .map_err(|err| CatalogError::Http(format!("{url}: {err}")))?;
        tracing::info!(dataflow = key.dataflow_id(), bytes = written, "download finished");
        Ok(written)
    }

    /// Download into `directory/filename`, defaulting to `{DATAFLOW}.csv`.
    ///
    /// The file only appears once the whole body has been written.
    pub fn download_to_dir(
        &self,
        item_id: &str,
        directory: &Utf8Path,
        filename: Option<&str>,
        filters: &DownloadFilters,
    ) -> Result<Utf8PathBuf, CatalogError> {
        let key = item_id.parse::<ItemKey>()?;
        let filename = match filename.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => Utf8Path::new(name)
                .file_name()
                .ok_or_else(|| CatalogError::Filesystem(format!("invalid file name `{name}`")))?
                .to_string(),
            None => format!("{}.csv", key.dataflow_id()),
        };
        let target = directory.join(filename);

        fs::create_dir_all(directory.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix("estat-fs-download")
            .tempfile_in(directory.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        self.download(item_id, temp.as_file_mut(), filters)?;
        temp.as_file_mut()
            .flush()
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        temp.persist(target.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        Ok(target)
    }
}

fn check_response(response: DataResponse) -> Result<DataResponse, CatalogError> {
    if !response.is_success() {
        let status = response.status;
        let message = response.into_text(MAX_ERROR_BODY);
        return Err(CatalogError::Status { status, message });
    }
    match response.content_type.clone() {
        Some(content_type) if is_csv_content_type(&content_type) => Ok(response),
        content_type => Err(CatalogError::UnexpectedContentType {
            content_type: content_type.unwrap_or_default(),
            body: response.into_text(MAX_ERROR_BODY),
        }),
    }
}
