//! Streaming reader for SDMX 2.1 structure messages.
//!
//! Every maintainable or item artefact the catalog cares about (category
//! schemes, categories, categorisations, dataflows, codelists, codes) is
//! collected into a flat [`RawArtefact`]; typed records are derived from those.

use std::collections::HashMap;
use std::fmt;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::CatalogError;

pub const DISSEMINATION_ANNOTATION: &str = "DISSEMINATION_PERSPECTIVE_ID";
pub const INTERNAL_FLAG: &str = "T";

const CATEGORY_URN_PREFIX: &str = "urn:sdmx:org.sdmx.infomodel.categoryscheme.Category=";
const DEFAULT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    CategorySchemes,
    Categorisations,
    Dataflows,
    Codelist,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::CategorySchemes => write!(f, "category scheme"),
            DocumentKind::Categorisations => write!(f, "categorisation"),
            DocumentKind::Dataflows => write!(f, "dataflow"),
            DocumentKind::Codelist => write!(f, "codelist"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySchemeRecord {
    pub id: String,
    pub xml_id: String,
    pub urn: Option<String>,
    pub name: String,
    pub dissemination_flag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRecord {
    pub id: String,
    pub urn: String,
    pub xml_id: String,
    pub xml_parent_id: String,
    pub name: String,
    pub dissemination_flag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorisationRecord {
    pub category_urn: String,
    pub dataflow_id: String,
    pub dissemination_flag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataflowRecord {
    pub id: String,
    pub name: String,
}

/// Both record kinds carried by the category scheme listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorySchemeListing {
    pub schemes: Vec<CategorySchemeRecord>,
    pub categories: Vec<CategoryRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtefactKind {
    CategoryScheme,
    Category,
    Categorisation,
    Dataflow,
    Codelist,
    Code,
}

impl ArtefactKind {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"CategoryScheme" => Some(ArtefactKind::CategoryScheme),
            b"Category" => Some(ArtefactKind::Category),
            b"Categorisation" => Some(ArtefactKind::Categorisation),
            b"Dataflow" => Some(ArtefactKind::Dataflow),
            b"Codelist" => Some(ArtefactKind::Codelist),
            b"Code" => Some(ArtefactKind::Code),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RawArtefact {
    pub kind: ArtefactKind,
    pub id: String,
    pub urn: Option<String>,
    pub agency: Option<String>,
    pub version: Option<String>,
    pub is_final: Option<String>,
    pub xml_id: String,
    pub xml_parent_id: Option<String>,
    /// Effective dissemination flag, inherited from enclosing artefacts.
    pub dissemination_flag: Option<String>,
    /// Categorisation source, as a dataflow id.
    pub source: Option<String>,
    /// Categorisation target, as a category URN.
    pub target: Option<String>,
    names: Vec<(Option<String>, String)>,
    depth: usize,
}

impl RawArtefact {
    /// Name in `language`, else the first name given, else the id.
    pub fn name(&self, language: &str) -> String {
        self.names
            .iter()
            .find(|(lang, _)| lang.as_deref() == Some(language))
            .or_else(|| self.names.first())
            .map(|(_, name)| name.clone())
            .unwrap_or_else(|| self.id.clone())
    }

    pub fn is_internal(&self) -> bool {
        self.dissemination_flag.as_deref() == Some(INTERNAL_FLAG)
    }
}

pub fn parse_category_schemes(
    xml: &str,
    language: &str,
) -> Result<CategorySchemeListing, CatalogError> {
    let artefacts = read_structure(xml, DocumentKind::CategorySchemes)?;
    let mut listing = CategorySchemeListing::default();
    for artefact in artefacts {
        if artefact.is_internal() {
            tracing::debug!(id = %artefact.id, "skipping internal artefact");
            continue;
        }
        match artefact.kind {
            ArtefactKind::CategoryScheme => listing.schemes.push(CategorySchemeRecord {
                name: artefact.name(language),
                id: artefact.id,
                xml_id: artefact.xml_id,
                urn: artefact.urn,
                dissemination_flag: artefact.dissemination_flag,
            }),
            ArtefactKind::Category => {
                let Some(xml_parent_id) = artefact.xml_parent_id.clone() else {
                    return Err(CatalogError::Xml {
                        document: DocumentKind::CategorySchemes.to_string(),
                        message: format!("category `{}` outside of a category scheme", artefact.id),
                    });
                };
                listing.categories.push(CategoryRecord {
                    name: artefact.name(language),
                    urn: artefact.urn.clone().unwrap_or_else(|| artefact.xml_id.clone()),
                    id: artefact.id,
                    xml_id: artefact.xml_id,
                    xml_parent_id,
                    dissemination_flag: artefact.dissemination_flag,
                });
            }
            _ => {}
        }
    }
    Ok(listing)
}

pub fn parse_categorisations(xml: &str) -> Result<Vec<CategorisationRecord>, CatalogError> {
    let artefacts = read_structure(xml, DocumentKind::Categorisations)?;
    let mut records = Vec::new();
    for artefact in artefacts {
        if artefact.kind != ArtefactKind::Categorisation || artefact.is_internal() {
            continue;
        }
        match (artefact.target, artefact.source) {
            (Some(category_urn), Some(dataflow_id)) => records.push(CategorisationRecord {
                category_urn,
                dataflow_id,
                dissemination_flag: artefact.dissemination_flag,
            }),
            _ => {
                tracing::warn!(id = %artefact.id, "categorisation without source or target");
            }
        }
    }
    Ok(records)
}

pub fn parse_dataflows(xml: &str, language: &str) -> Result<Vec<DataflowRecord>, CatalogError> {
    let artefacts = read_structure(xml, DocumentKind::Dataflows)?;
    Ok(artefacts
        .into_iter()
        .filter(|artefact| artefact.kind == ArtefactKind::Dataflow)
        .map(|artefact| DataflowRecord {
            name: artefact.name(language),
            id: artefact.id,
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Name,
    AnnotationTitle,
    AnnotationType,
    Urn,
    ErrorText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefRole {
    Source,
    Target,
}

#[derive(Default)]
struct Annotation {
    title: Option<String>,
    kind: Option<String>,
}

/// Element-stack state machine over one structure message.
struct StructureReader {
    document: DocumentKind,
    finished: Vec<RawArtefact>,
    open: Vec<RawArtefact>,
    depth: usize,
    root_seen: bool,
    error_message: Option<String>,
    annotation: Option<Annotation>,
    role: Option<RefRole>,
    capture: Option<(Capture, Option<String>)>,
    text: String,
}

impl StructureReader {
    fn new(document: DocumentKind) -> Self {
        Self {
            document,
            finished: Vec::new(),
            open: Vec::new(),
            depth: 0,
            root_seen: false,
            error_message: None,
            annotation: None,
            role: None,
            capture: None,
            text: String::new(),
        }
    }

    fn error(&self, message: impl Into<String>) -> CatalogError {
        CatalogError::Xml {
            document: self.document.to_string(),
            message: message.into(),
        }
    }

    fn handle_start(&mut self, e: &BytesStart<'_>, empty: bool) -> Result<(), CatalogError> {
        self.depth += 1;
        let local = e.local_name();
        let local = local.as_ref();

        if !self.root_seen {
            self.root_seen = true;
            match local {
                b"Structure" => {}
                b"Error" => self.error_message = Some(String::new()),
                other => {
                    return Err(self.error(format!(
                        "unexpected root element `{}`",
                        String::from_utf8_lossy(other)
                    )));
                }
            }
        } else if let Some(kind) = ArtefactKind::from_local_name(local) {
            let attrs = self.attributes(e)?;
            self.open_artefact(kind, attrs)?;
        } else {
            self.handle_child(local, e)?;
        }

        if empty {
            self.handle_end(local)?;
        }
        Ok(())
    }

    fn handle_child(&mut self, local: &[u8], e: &BytesStart<'_>) -> Result<(), CatalogError> {
        if self.error_message.is_some() {
            if local == b"Text" {
                self.begin_capture(Capture::ErrorText, None);
            }
            return Ok(());
        }
        let Some(top) = self.open.last() else {
            return Ok(());
        };
        let direct_child = self.depth == top.depth + 1;
        let is_categorisation = top.kind == ArtefactKind::Categorisation;
        match local {
            b"Name" if direct_child => {
                let attrs = self.attributes(e)?;
                self.begin_capture(Capture::Name, attrs.get("lang").cloned());
            }
            b"Annotation" => self.annotation = Some(Annotation::default()),
            b"AnnotationTitle" if self.annotation.is_some() => {
                self.begin_capture(Capture::AnnotationTitle, None)
            }
            b"AnnotationType" if self.annotation.is_some() => {
                self.begin_capture(Capture::AnnotationType, None)
            }
            b"Source" if is_categorisation => {
                self.role = Some(RefRole::Source)
            }
            b"Target" if is_categorisation => {
                self.role = Some(RefRole::Target)
            }
            b"URN" if self.role.is_some() => self.begin_capture(Capture::Urn, None),
            b"Ref" => {
                if let Some(role) = self.role {
                    let attrs = self.attributes(e)?;
                    self.apply_ref(role, &attrs);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_end(&mut self, local: &[u8]) -> Result<(), CatalogError> {
        if let Some((capture, lang)) = self.capture.take() {
            let text = std::mem::take(&mut self.text);
            self.finish_capture(capture, lang, text);
        }

        let closes_artefact = self
            .open
            .last()
            .map(|top| top.depth == self.depth)
            .unwrap_or(false);
        if closes_artefact {
            if let Some(artefact) = self.open.pop() {
                self.finished.push(artefact);
            }
        } else {
            match local {
                b"Annotation" => {
                    if let Some(annotation) = self.annotation.take() {
                        self.apply_annotation(annotation);
                    }
                }
                b"Source" | b"Target" => self.role = None,
                _ => {}
            }
        }

        self.depth = self
            .depth
            .checked_sub(1)
            .ok_or_else(|| self.error("unbalanced end tag"))?;
        Ok(())
    }

    fn handle_text(&mut self, text: &str) {
        if self.capture.is_some() {
            self.text.push_str(text);
        }
    }

    fn begin_capture(&mut self, capture: Capture, lang: Option<String>) {
        self.capture = Some((capture, lang));
        self.text.clear();
    }

    fn finish_capture(&mut self, capture: Capture, lang: Option<String>, text: String) {
        let text = text.trim().to_string();
        match capture {
            Capture::Name if text.is_empty() => {}
            Capture::Name => {
                if let Some(top) = self.open.last_mut() {
                    top.names.push((lang, text));
                }
            }
            Capture::AnnotationTitle => {
                if let Some(annotation) = self.annotation.as_mut() {
                    annotation.title = Some(text);
                }
            }
            Capture::AnnotationType => {
                if let Some(annotation) = self.annotation.as_mut() {
                    annotation.kind = Some(text);
                }
            }
            Capture::Urn => {
                if let Some(role) = self.role {
                    self.apply_urn(role, &text);
                }
            }
            Capture::ErrorText => {
                if let Some(message) = self.error_message.as_mut() {
                    if !message.is_empty() {
                        message.push_str("; ");
                    }
                    message.push_str(&text);
                }
            }
        }
    }

    fn apply_annotation(&mut self, annotation: Annotation) {
        if annotation.kind.as_deref() != Some(DISSEMINATION_ANNOTATION) {
            return;
        }
        if let Some(top) = self.open.last_mut() {
            top.dissemination_flag = annotation.title;
        }
    }

    fn apply_urn(&mut self, role: RefRole, urn: &str) {
        let Some(top) = self.open.last_mut() else {
            return;
        };
        match role {
            RefRole::Source => top.source = dataflow_id_from_urn(urn),
            RefRole::Target => top.target = Some(urn.to_string()),
        }
    }

    fn apply_ref(&mut self, role: RefRole, attrs: &HashMap<String, String>) {
        let Some(top) = self.open.last_mut() else {
            return;
        };
        match role {
            RefRole::Source => {
                if let Some(id) = attrs.get("id") {
                    top.source = Some(id.clone());
                }
            }
            RefRole::Target => {
                let parts = (
                    attrs.get("agencyID"),
                    attrs.get("maintainableParentID"),
                    attrs.get("id"),
                );
                if let (Some(agency), Some(scheme), Some(id)) = parts {
                    let version = attrs
                        .get("maintainableParentVersion")
                        .map(String::as_str)
                        .unwrap_or(DEFAULT_VERSION);
                    top.target = Some(category_urn(agency, scheme, version, id));
                }
            }
        }
    }

    fn open_artefact(
        &mut self,
        kind: ArtefactKind,
        attrs: HashMap<String, String>,
    ) -> Result<(), CatalogError> {
        let id = attrs
            .get("id")
            .cloned()
            .ok_or_else(|| self.error(format!("{kind:?} element without an id")))?;
        let parent = self.open.last();
        let xml_parent_id = parent.map(|parent| parent.xml_id.clone());
        let inherited_flag = parent.and_then(|parent| parent.dissemination_flag.clone());
        let agency = attrs
            .get("agencyID")
            .cloned()
            .or_else(|| parent.and_then(|parent| parent.agency.clone()));
        let version = attrs.get("version").cloned();
        let mut urn = attrs.get("urn").cloned();

        let xml_id = match (kind, &urn) {
            (_, Some(urn)) => urn.clone(),
            (ArtefactKind::CategoryScheme, None) => format!(
                "{}:{}({})",
                agency.as_deref().unwrap_or_default(),
                id,
                version.as_deref().unwrap_or(DEFAULT_VERSION)
            ),
            (_, None) => match &xml_parent_id {
                Some(parent_id) => format!("{parent_id}.{id}"),
                None => id.clone(),
            },
        };
        if kind == ArtefactKind::Category && urn.is_none() {
            urn = self.synthesize_category_urn(&id);
        }

        self.open.push(RawArtefact {
            kind,
            id,
            urn,
            agency,
            version,
            is_final: attrs.get("isFinal").cloned(),
            xml_id,
            xml_parent_id,
            dissemination_flag: inherited_flag,
            source: None,
            target: None,
            names: Vec::new(),
            depth: self.depth,
        });
        Ok(())
    }

    /// URN of a category declared without one, from the enclosing scheme and
    /// the ids of enclosing categories.
    fn synthesize_category_urn(&self, id: &str) -> Option<String> {
        let scheme_index = self
            .open
            .iter()
            .rposition(|artefact| artefact.kind == ArtefactKind::CategoryScheme)?;
        let scheme = &self.open[scheme_index];
        let mut path = self.open[scheme_index + 1..]
            .iter()
            .filter(|artefact| artefact.kind == ArtefactKind::Category)
            .map(|artefact| artefact.id.as_str())
            .collect::<Vec<_>>();
        path.push(id);
        Some(category_urn(
            scheme.agency.as_deref().unwrap_or_default(),
            &scheme.id,
            scheme.version.as_deref().unwrap_or(DEFAULT_VERSION),
            &path.join("."),
        ))
    }

    fn attributes(&self, e: &BytesStart<'_>) -> Result<HashMap<String, String>, CatalogError> {
        let mut attrs = HashMap::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| self.error(err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
            let value = attr
                .unescape_value()
                .map_err(|err| self.error(err.to_string()))?
                .to_string();
            attrs.insert(key, value);
        }
        Ok(attrs)
    }

    fn finish(self) -> Result<Vec<RawArtefact>, CatalogError> {
        if let Some(message) = &self.error_message {
            return Err(self.error(format!("service returned an error message: {message}")));
        }
        if !self.root_seen {
            return Err(self.error("document has no root element"));
        }
        if self.depth != 0 || !self.open.is_empty() {
            return Err(self.error("unexpected end of document"));
        }
        Ok(self.finished)
    }
}

/// Collect every known artefact of a structure message in closing order.
pub fn read_structure(xml: &str, document: DocumentKind) -> Result<Vec<RawArtefact>, CatalogError> {
    let mut reader = Reader::from_str(xml);
    let mut state = StructureReader::new(document);

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => state.handle_start(e, false)?,
            Ok(Event::Empty(ref e)) => state.handle_start(e, true)?,
            Ok(Event::End(ref e)) => state.handle_end(e.local_name().as_ref())?,
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().map_err(|err| state.error(err.to_string()))?;
                state.handle_text(&text);
            }
            Ok(Event::CData(ref e)) => {
                let text = String::from_utf8_lossy(e).to_string();
                state.handle_text(&text);
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(state.error(format!(
                    "at byte {}: {err}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
    }

    state.finish()
}

pub fn category_urn(agency: &str, scheme_id: &str, version: &str, category_path: &str) -> String {
    format!("{CATEGORY_URN_PREFIX}{agency}:{scheme_id}({version}).{category_path}")
}

/// `urn:...Dataflow=ESTAT:NAMA_10_GDP(1.0)` -> `NAMA_10_GDP`.
pub fn dataflow_id_from_urn(urn: &str) -> Option<String> {
    let (_, reference) = urn.rsplit_once('=')?;
    let (_, rest) = reference.split_once(':')?;
    let id = rest.split('(').next()?.trim();
    (!id.is_empty()).then(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const SCHEMES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<m:Structure xmlns:m="http://www.sdmx.org/resources/sdmxml/schemas/v2_1/message"
             xmlns:s="http://www.sdmx.org/resources/sdmxml/schemas/v2_1/structure"
             xmlns:c="http://www.sdmx.org/resources/sdmxml/schemas/v2_1/common">
  <m:Structures>
    <s:CategorySchemes>
      <s:CategoryScheme id="theme" agencyID="ESTAT" version="1.0">
        <c:Name xml:lang="de">Thema</c:Name>
        <c:Name xml:lang="en">Theme</c:Name>
        <s:Category id="env">
          <c:Name xml:lang="en">Environment &amp; energy</c:Name>
          <s:Category id="forest">
            <c:Name xml:lang="fr">Forêt</c:Name>
          </s:Category>
        </s:Category>
      </s:CategoryScheme>
    </s:CategorySchemes>
  </m:Structures>
</m:Structure>"#;

    #[test]
    fn synthesizes_ids_and_prefers_language() {
        let listing = parse_category_schemes(SCHEMES, "en").unwrap();
        assert_eq!(listing.schemes.len(), 1);
        let scheme = &listing.schemes[0];
        assert_eq!(scheme.name, "Theme");
        assert_eq!(scheme.xml_id, "ESTAT:theme(1.0)");

        assert_eq!(listing.categories.len(), 2);
        let forest = &listing.categories[0];
        let env = &listing.categories[1];
        assert_eq!(env.name, "Environment & energy");
        assert_eq!(env.xml_parent_id, scheme.xml_id);
        assert_eq!(
            forest.urn,
            "urn:sdmx:org.sdmx.infomodel.categoryscheme.Category=ESTAT:theme(1.0).env.forest"
        );
        assert_eq!(forest.xml_parent_id, env.xml_id);
        assert_eq!(forest.name, "Forêt");
    }

    #[test]
    fn name_keeps_spacing_around_comments_and_cdata() {
        let xml = r#"<Structure><Dataflows>
  <Dataflow id="FOR_VOL">
    <Name xml:lang="en"> Forest <!-- rev 2 -->volume </Name>
  </Dataflow>
  <Dataflow id="FOR_TRD">
    <Name xml:lang="en">Imports <![CDATA[&]]> exports</Name>
  </Dataflow>
</Dataflows></Structure>"#;
        let records = parse_dataflows(xml, "en").unwrap();
        let names = records
            .iter()
            .map(|record| record.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Forest volume", "Imports & exports"]);
    }

    #[test]
    fn dataflow_id_from_source_urn() {
        let urn = "urn:sdmx:org.sdmx.infomodel.datastructure.Dataflow=ESTAT:NAMA_10_GDP(1.0)";
        assert_eq!(dataflow_id_from_urn(urn).as_deref(), Some("NAMA_10_GDP"));
        assert_eq!(dataflow_id_from_urn("garbage"), None);
    }

    #[test]
    fn error_message_fails_parse() {
        let xml = r#"<mes:Error xmlns:mes="m"><mes:ErrorMessage code="500"><com:Text xmlns:com="c">Service unavailable</com:Text></mes:ErrorMessage></mes:Error>"#;
        let err = parse_dataflows(xml, "en").unwrap_err();
        assert_matches!(err, CatalogError::Xml { ref message, .. } if message.contains("Service unavailable"));
    }

    #[test]
    fn unexpected_root_fails_parse() {
        let err = parse_dataflows("<html><body>maintenance</body></html>", "en").unwrap_err();
        assert_matches!(err, CatalogError::Xml { .. });
    }

    #[test]
    fn truncated_document_fails_parse() {
        let xml = r#"<Structure><Structures><Dataflows><Dataflow id="A">"#;
        let err = parse_dataflows(xml, "en").unwrap_err();
        assert_matches!(err, CatalogError::Xml { .. });
    }

    #[test]
    fn artefact_without_id_fails_parse() {
        let xml = r#"<Structure><Dataflows><Dataflow><Name>x</Name></Dataflow></Dataflows></Structure>"#;
        let err = parse_dataflows(xml, "en").unwrap_err();
        assert_matches!(err, CatalogError::Xml { .. });
    }
}
