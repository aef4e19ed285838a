use std::io::Read;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::Agency;
use crate::error::CatalogError;

/// REST surface of one agency's SDMX 2.1 dissemination API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base_uri: String,
    agency: Agency,
}

impl Endpoints {
    pub fn new(base_uri: impl Into<String>, agency: Agency) -> Self {
        let base_uri = base_uri.into().trim_end_matches('/').to_string();
        Self { base_uri, agency }
    }

    pub fn for_agency(agency: Agency) -> Self {
        Self::new(agency.base_uri(), agency)
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    pub fn agency(&self) -> Agency {
        self.agency
    }

    pub fn category_schemes_url(&self) -> String {
        format!("{}/sdmx/2.1/categoryscheme/{}/all", self.base_uri, self.agency)
    }

    pub fn categorisations_url(&self) -> String {
        format!("{}/sdmx/2.1/categorisation/{}/all", self.base_uri, self.agency)
    }

    pub fn dataflows_url(&self) -> String {
        format!(
            "{}/sdmx/2.1/dataflow/{}/all?detail=allstubs",
            self.base_uri, self.agency
        )
    }

    pub fn codelist_url(&self, codelist_id: &str) -> String {
        format!(
            "{}/sdmx/2.1/codelist/{}/{}?detail=referencestubs&completestub=true",
            self.base_uri, self.agency, codelist_id
        )
    }

    /// Data extraction URL; `params` are appended after `format=SDMX-CSV`.
    pub fn data_url(
        &self,
        dataflow_id: &str,
        params: &[(&str, String)],
    ) -> Result<String, CatalogError> {
        let base = format!("{}/sdmx/2.1/data/{}", self.base_uri, dataflow_id);
        let query = std::iter::once(("format", "SDMX-CSV".to_string()))
            .chain(params.iter().map(|(name, value)| (*name, value.clone())));
        let url = Url::parse_with_params(&base, query)
            .map_err(|err| CatalogError::Http(format!("invalid data URL {base}: {err}")))?;
        Ok(url.to_string())
    }
}

/// A data response whose body has not been read yet.
pub struct DataResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Box<dyn Read + Send>,
}

impl DataResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Read at most `limit` bytes of the body as lossy UTF-8.
    pub fn into_text(self, limit: u64) -> String {
        let mut raw = Vec::new();
        if self.body.take(limit).read_to_end(&mut raw).is_err() && raw.is_empty() {
            return String::new();
        }
        String::from_utf8_lossy(&raw).into_owned()
    }
}

/// "Fetch bytes for a URL": everything the catalog core needs from the network.
pub trait SdmxClient: Send + Sync {
    /// Fetch a structure document. Non-success statuses are errors.
    fn fetch_document(&self, url: &str) -> Result<String, CatalogError>;

    /// Open a streamed data response. Status handling is left to the caller.
    fn open_data(&self, url: &str) -> Result<DataResponse, CatalogError>;
}

#[derive(Clone)]
pub struct SdmxHttpClient {
    client: Client,
}

impl SdmxHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("estat-fs/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CatalogError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| CatalogError::Http(err.to_string()))?;
        Ok(Self { client })
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, CatalogError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "SDMX request failed".to_string());
        Err(CatalogError::Status { status, message })
    }
}

impl SdmxClient for SdmxHttpClient {
    fn fetch_document(&self, url: &str) -> Result<String, CatalogError> {
        tracing::debug!(url, "fetching structure document");
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/xml")
            .send()
            .map_err(|err| CatalogError::Http(format!("{url}: {err}")))?;
        let response = Self::handle_status(response)?;
        response
            .text()
            .map_err(|err| CatalogError::Http(format!("{url}: {err}")))
    }

    fn open_data(&self, url: &str) -> Result<DataResponse, CatalogError> {
        tracing::debug!(url, "requesting data extract");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| CatalogError::Http(format!("{url}: {err}")))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Ok(DataResponse {
            status,
            content_type,
            body: Box::new(response),
        })
    }
}
