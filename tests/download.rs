use std::io::Cursor;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::Utf8Path;

use eurostat_fs::client::{DataResponse, SdmxClient};
use eurostat_fs::config::ConnectorConfig;
use eurostat_fs::domain::Agency;
use eurostat_fs::download::{DownloadFilters, DownloadTranslator};
use eurostat_fs::driver::EurostatDriver;
use eurostat_fs::error::CatalogError;

const CSV: &str = "DATAFLOW,LAST UPDATE,freq,geo,TIME_PERIOD,OBS_VALUE\n\
ESTAT:DF1(1.0),05/01/26 10:00:00,A,BE,2020,12.5\n";

#[derive(Clone)]
struct CannedClient {
    status: u16,
    content_type: Option<&'static str>,
    body: &'static str,
    requests: Arc<Mutex<Vec<String>>>,
}

impl CannedClient {
    fn new(status: u16, content_type: Option<&'static str>, body: &'static str) -> Self {
        Self {
            status,
            content_type,
            body,
            requests: Arc::default(),
        }
    }

    fn csv() -> Self {
        Self::new(200, Some("application/vnd.sdmx.data+csv;version=1.0.0"), CSV)
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl SdmxClient for CannedClient {
    fn fetch_document(&self, url: &str) -> Result<String, CatalogError> {
        Err(CatalogError::Http(format!("unexpected catalog request {url}")))
    }

    fn open_data(&self, url: &str) -> Result<DataResponse, CatalogError> {
        self.requests.lock().unwrap().push(url.to_string());
        Ok(DataResponse {
            status: self.status,
            content_type: self.content_type.map(str::to_string),
            body: Box::new(Cursor::new(self.body.as_bytes().to_vec())),
        })
    }
}

fn period(start: &str, end: &str) -> DownloadFilters {
    DownloadFilters {
        start_period: Some(start.to_string()),
        end_period: Some(end.to_string()),
        ..DownloadFilters::default()
    }
}

const DATA_URL: &str = "https://ec.europa.eu/eurostat/api/dissemination/sdmx/2.1/data/DF1";

#[test]
fn streams_csv_into_destination() {
    let client = CannedClient::csv();
    let translator = DownloadTranslator::new(client.clone(), ConnectorConfig::default());
    let mut out = Vec::new();
    let written = translator
        .download("sdmx:ESTAT:DF1", &mut out, &DownloadFilters::default())
        .unwrap();
    assert_eq!(written, CSV.len() as u64);
    assert_eq!(String::from_utf8(out).unwrap(), CSV);
    assert_eq!(client.requests(), vec![format!("{DATA_URL}?format=SDMX-CSV")]);
}

#[test]
fn out_of_range_period_is_dropped() {
    let client = CannedClient::csv();
    let translator = DownloadTranslator::new(client.clone(), ConnectorConfig::default());
    translator
        .download("sdmx:ESTAT:DF1", &mut Vec::new(), &period("1800", "2020"))
        .unwrap();
    translator
        .download("sdmx:ESTAT:DF1", &mut Vec::new(), &period("2000", "1999"))
        .unwrap();
    translator
        .download("sdmx:ESTAT:DF1", &mut Vec::new(), &period("2000", "2020"))
        .unwrap();
    assert_eq!(
        client.requests(),
        vec![
            format!("{DATA_URL}?format=SDMX-CSV"),
            format!("{DATA_URL}?format=SDMX-CSV"),
            format!("{DATA_URL}?format=SDMX-CSV&startPeriod=2000&endPeriod=2020"),
        ]
    );
}

#[test]
fn observation_filters_are_appended() {
    let client = CannedClient::csv();
    let translator = DownloadTranslator::new(client.clone(), ConnectorConfig::default());
    let filters = DownloadFilters {
        first_n_observations: Some("-3".to_string()),
        last_n_observations: Some("10".to_string()),
        ..DownloadFilters::default()
    };
    translator
        .download("sdmx:ESTAT:DF1", &mut Vec::new(), &filters)
        .unwrap();
    assert_eq!(
        client.requests(),
        vec![format!("{DATA_URL}?format=SDMX-CSV&lastNObservations=10")]
    );
}

#[test]
fn key_agency_selects_endpoint() {
    let client = CannedClient::csv();
    let translator = DownloadTranslator::new(client.clone(), ConnectorConfig::default());
    translator
        .download(
            "sdmx:COMP:AID_SCR:prod",
            &mut Vec::new(),
            &DownloadFilters::default(),
        )
        .unwrap();
    assert_eq!(
        client.requests(),
        vec![format!(
            "{}/sdmx/2.1/data/AID_SCR?format=SDMX-CSV",
            Agency::Comp.base_uri()
        )]
    );
}

#[test]
fn html_with_success_status_is_rejected() {
    let client = CannedClient::new(
        200,
        Some("text/html; charset=utf-8"),
        "<html><body>Maintenance</body></html>",
    );
    let translator = DownloadTranslator::new(client, ConnectorConfig::default());
    let mut out = Vec::new();
    let err = translator
        .download("sdmx:ESTAT:DF1", &mut out, &DownloadFilters::default())
        .unwrap_err();
    assert_matches!(
        err,
        CatalogError::UnexpectedContentType { ref body, .. } if body.contains("Maintenance")
    );
    assert!(out.is_empty());
}

#[test]
fn missing_content_type_is_rejected() {
    let client = CannedClient::new(200, None, "a,b\n1,2\n");
    let translator = DownloadTranslator::new(client, ConnectorConfig::default());
    let err = translator
        .download("sdmx:ESTAT:DF1", &mut Vec::new(), &DownloadFilters::default())
        .unwrap_err();
    assert_matches!(err, CatalogError::UnexpectedContentType { .. });
}

#[test]
fn error_status_is_raised() {
    let client = CannedClient::new(404, Some("application/xml"), "No results found");
    let translator = DownloadTranslator::new(client, ConnectorConfig::default());
    let err = translator
        .download("sdmx:ESTAT:DF1", &mut Vec::new(), &DownloadFilters::default())
        .unwrap_err();
    assert_matches!(err, CatalogError::Status { status: 404, ref message } if message == "No results found");
}

#[test]
fn malformed_key_is_rejected_before_request() {
    let client = CannedClient::csv();
    let translator = DownloadTranslator::new(client.clone(), ConnectorConfig::default());
    let err = translator
        .download("DF1", &mut Vec::new(), &DownloadFilters::default())
        .unwrap_err();
    assert_matches!(err, CatalogError::InvalidItemKey(_));
    assert!(client.requests().is_empty());
}

#[test]
fn download_item_writes_named_file() {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8Path::from_path(temp.path()).unwrap().join("out");
    let driver = EurostatDriver::with_client(ConnectorConfig::default(), CannedClient::csv());

    let path = driver
        .download_item("sdmx:ESTAT:DF1", &dir, None, &DownloadFilters::default())
        .unwrap();
    assert_eq!(path, dir.join("DF1.csv"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), CSV);

    let path = driver
        .download_item(
            "sdmx:ESTAT:DF1",
            &dir,
            Some("gdp.csv"),
            &DownloadFilters::default(),
        )
        .unwrap();
    assert_eq!(path, dir.join("gdp.csv"));
}

#[test]
fn failed_download_leaves_no_file() {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8Path::from_path(temp.path()).unwrap();
    let client = CannedClient::new(500, Some("text/plain"), "Internal error");
    let driver = EurostatDriver::with_client(ConnectorConfig::default(), client);

    let err = driver
        .download_item("sdmx:ESTAT:DF1", dir, None, &DownloadFilters::default())
        .unwrap_err();
    assert_matches!(err, CatalogError::Status { status: 500, .. });
    assert_eq!(std::fs::read_dir(dir).unwrap().count(), 0);
}
