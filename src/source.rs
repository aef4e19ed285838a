use crate::builder::{CatalogRecords, build};
use crate::catalog::CatalogSnapshot;
use crate::client::{Endpoints, SdmxClient};
use crate::domain::KeyConfig;
use crate::error::CatalogError;
use crate::parser::{parse_categorisations, parse_category_schemes, parse_dataflows};

/// Produces a fresh catalog snapshot on demand.
pub trait CatalogSource: Send + Sync {
    fn load(&self) -> Result<CatalogSnapshot, CatalogError>;
}

/// Fetches the three structure documents of one agency and builds them.
pub struct RemoteCatalog<C: SdmxClient> {
    client: C,
    endpoints: Endpoints,
    keys: KeyConfig,
    language: String,
}

impl<C: SdmxClient> RemoteCatalog<C> {
    pub fn new(client: C, endpoints: Endpoints, keys: KeyConfig, language: String) -> Self {
        Self {
            client,
            endpoints,
            keys,
            language,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Fetch and parse without linking. Any failure aborts the whole load.
    pub fn fetch_records(&self) -> Result<CatalogRecords, CatalogError> {
        let schemes_url = self.endpoints.category_schemes_url();
        tracing::info!(url = %schemes_url, "reading category schemes");
        let listing = parse_category_schemes(
            &self.client.fetch_document(&schemes_url)?,
            &self.language,
        )?;

        let categorisations_url = self.endpoints.categorisations_url();
        tracing::info!(url = %categorisations_url, "reading categorisations");
        let categorisations =
            parse_categorisations(&self.client.fetch_document(&categorisations_url)?)?;

        let dataflows_url = self.endpoints.dataflows_url();
        tracing::info!(url = %dataflows_url, "reading dataflows");
        let dataflows = parse_dataflows(
            &self.client.fetch_document(&dataflows_url)?,
            &self.language,
        )?;

        Ok(CatalogRecords {
            schemes: listing.schemes,
            categories: listing.categories,
            categorisations,
            dataflows,
        })
    }
}

impl<C: SdmxClient> CatalogSource for RemoteCatalog<C> {
    fn load(&self) -> Result<CatalogSnapshot, CatalogError> {
        let records = self.fetch_records()?;
        Ok(build(&records, &self.keys))
    }
}
