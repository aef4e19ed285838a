use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use crate::cache::CatalogCache;
use crate::catalog::CatalogSnapshot;
use crate::client::{SdmxClient, SdmxHttpClient};
use crate::codelist::{CodeList, fetch_codelists};
use crate::config::ConnectorConfig;
use crate::download::{DownloadFilters, DownloadTranslator};
use crate::error::CatalogError;
use crate::resolver::{ContainerContentResponse, ContainerItem, ListRequest, QueryResolver};
use crate::source::RemoteCatalog;

/// One connector instance: a lazily built catalog plus the download path.
///
/// The catalog is fetched on the first listing or lookup and kept until the
/// driver is dropped. A new driver is needed to see upstream changes.
pub struct EurostatDriver<C: SdmxClient + Clone> {
    config: ConnectorConfig,
    cache: CatalogCache<RemoteCatalog<C>>,
    downloads: DownloadTranslator<C>,
}

impl EurostatDriver<SdmxHttpClient> {
    pub fn new(config: ConnectorConfig) -> Result<Self, CatalogError> {
        let client = SdmxHttpClient::new(Duration::from_secs(config.timeout_secs))?;
        Ok(Self::with_client(config, client))
    }
}

impl<C: SdmxClient + Clone> EurostatDriver<C> {
    pub fn with_client(config: ConnectorConfig, client: C) -> Self {
        let source = RemoteCatalog::new(
            client.clone(),
            config.endpoints(),
            config.key_config(),
            config.language.clone(),
        );
        Self {
            cache: CatalogCache::new(source),
            downloads: DownloadTranslator::new(client, config.clone()),
            config,
        }
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn snapshot(&self) -> Result<Arc<CatalogSnapshot>, CatalogError> {
        self.cache.get()
    }

    pub fn list_root(&self) -> Result<ContainerContentResponse, CatalogError> {
        let snapshot = self.snapshot()?;
        Ok(QueryResolver::new(&snapshot).list_root())
    }

    pub fn list_container(
        &self,
        request: &ListRequest<'_>,
    ) -> Result<ContainerContentResponse, CatalogError> {
        let snapshot = self.snapshot()?;
        Ok(QueryResolver::new(&snapshot).list(request))
    }

    pub fn search(&self, query: &str) -> Result<ContainerContentResponse, CatalogError> {
        let snapshot = self.snapshot()?;
        Ok(QueryResolver::new(&snapshot).search(query))
    }

    pub fn get_item_info(&self, id: &str) -> Result<Option<ContainerItem>, CatalogError> {
        let snapshot = self.snapshot()?;
        Ok(QueryResolver::new(&snapshot).get_item_info(id))
    }

    /// Downloads go straight to the data endpoint; the catalog is not built.
    pub fn download_item(
        &self,
        id: &str,
        directory: &Utf8Path,
        filename: Option<&str>,
        filters: &DownloadFilters,
    ) -> Result<Utf8PathBuf, CatalogError> {
        self.downloads
            .download_to_dir(id, directory, filename, filters)
    }

    pub fn download_item_to<W: Write>(
        &self,
        id: &str,
        destination: &mut W,
        filters: &DownloadFilters,
    ) -> Result<u64, CatalogError> {
        self.downloads.download(id, destination, filters)
    }

    pub fn download_container(&self, id: &str) -> Result<Utf8PathBuf, CatalogError> {
        tracing::debug!(container = id, "rejecting folder download");
        Err(CatalogError::Unsupported("folder download".to_string()))
    }

    /// The catalog is read-only.
    pub fn delete_item(&self, id: &str) -> Result<(), CatalogError> {
        tracing::debug!(item = id, "rejecting delete");
        Err(CatalogError::Unsupported("delete".to_string()))
    }

    pub fn fetch_codelists(&self, ids: &[String]) -> Result<Vec<CodeList>, CatalogError> {
        fetch_codelists(
            self.cache.source().client(),
            &self.config.endpoints(),
            ids,
            &self.config.language,
        )
    }
}
