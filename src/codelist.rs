use std::collections::HashMap;

use serde::Serialize;

use crate::client::{Endpoints, SdmxClient};
use crate::error::CatalogError;
use crate::parser::{ArtefactKind, DocumentKind, read_structure};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeValue {
    pub id: String,
    pub name: String,
}

/// One SDMX codelist with its codes in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeList {
    pub agency: String,
    pub id: String,
    pub is_final: Option<bool>,
    pub urn: Option<String>,
    pub version: Option<String>,
    pub name: String,
    pub values: Vec<CodeValue>,
}

impl CodeList {
    pub fn value(&self, code: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|value| value.id == code)
            .map(|value| value.name.as_str())
    }
}

pub fn parse_codelists(xml: &str, language: &str) -> Result<Vec<CodeList>, CatalogError> {
    let artefacts = read_structure(xml, DocumentKind::Codelist)?;

    let mut codes: HashMap<String, Vec<CodeValue>> = HashMap::new();
    for artefact in artefacts.iter().filter(|a| a.kind == ArtefactKind::Code) {
        let Some(parent) = &artefact.xml_parent_id else {
            continue;
        };
        codes.entry(parent.clone()).or_default().push(CodeValue {
            id: artefact.id.clone(),
            name: artefact.name(language),
        });
    }

    Ok(artefacts
        .iter()
        .filter(|artefact| artefact.kind == ArtefactKind::Codelist)
        .map(|artefact| CodeList {
            agency: artefact.agency.clone().unwrap_or_default(),
            id: artefact.id.clone(),
            is_final: artefact
                .is_final
                .as_deref()
                .map(|flag| flag.eq_ignore_ascii_case("true")),
            urn: artefact.urn.clone(),
            version: artefact.version.clone(),
            name: artefact.name(language),
            values: codes.remove(&artefact.xml_id).unwrap_or_default(),
        })
        .collect())
}

/// Fetch each codelist in turn; the first failure aborts.
pub fn fetch_codelists<C: SdmxClient>(
    client: &C,
    endpoints: &Endpoints,
    ids: &[String],
    language: &str,
) -> Result<Vec<CodeList>, CatalogError> {
    let mut codelists = Vec::with_capacity(ids.len());
    for id in ids {
        let url = endpoints.codelist_url(id);
        tracing::info!(codelist = %id, url = %url, "reading codelist");
        let parsed = parse_codelists(&client.fetch_document(&url)?, language)?;
        match parsed.into_iter().find(|codelist| codelist.id == *id) {
            Some(codelist) => {
                tracing::debug!(codelist = %id, values = codelist.values.len(), "codelist parsed");
                codelists.push(codelist);
            }
            None => {
                return Err(CatalogError::Xml {
                    document: DocumentKind::Codelist.to_string(),
                    message: format!("codelist `{id}` missing from response"),
                });
            }
        }
    }
    Ok(codelists)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FREQ: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<m:Structure xmlns:m="http://www.sdmx.org/resources/sdmxml/schemas/v2_1/message"
             xmlns:s="http://www.sdmx.org/resources/sdmxml/schemas/v2_1/structure"
             xmlns:c="http://www.sdmx.org/resources/sdmxml/schemas/v2_1/common">
  <m:Structures>
    <s:Codelists>
      <s:Codelist id="FREQ" agencyID="ESTAT" version="3.2" isFinal="true"
                  urn="urn:sdmx:org.sdmx.infomodel.codelist.Codelist=ESTAT:FREQ(3.2)">
        <c:Name xml:lang="de">Zeitliche Frequenz</c:Name>
        <c:Name xml:lang="en">Time frequency</c:Name>
        <s:Code id="A" urn="urn:sdmx:org.sdmx.infomodel.codelist.Code=ESTAT:FREQ(3.2).A">
          <c:Name xml:lang="en">Annual</c:Name>
        </s:Code>
        <s:Code id="M" urn="urn:sdmx:org.sdmx.infomodel.codelist.Code=ESTAT:FREQ(3.2).M">
          <c:Name xml:lang="en">Monthly</c:Name>
        </s:Code>
      </s:Codelist>
    </s:Codelists>
  </m:Structures>
</m:Structure>"#;

    #[test]
    fn parses_codes_in_order() {
        let codelists = parse_codelists(FREQ, "en").unwrap();
        assert_eq!(codelists.len(), 1);
        let freq = &codelists[0];
        assert_eq!(freq.agency, "ESTAT");
        assert_eq!(freq.name, "Time frequency");
        assert_eq!(freq.version.as_deref(), Some("3.2"));
        assert_eq!(freq.is_final, Some(true));
        let ids = freq.values.iter().map(|v| v.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["A", "M"]);
        assert_eq!(freq.value("M"), Some("Monthly"));
        assert_eq!(freq.value("Q"), None);
    }

    #[test]
    fn language_falls_back_to_first_name() {
        let codelists = parse_codelists(FREQ, "fr").unwrap();
        assert_eq!(codelists[0].name, "Zeitliche Frequenz");
    }
}
