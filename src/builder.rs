use std::collections::{HashMap, HashSet};

use crate::catalog::{
    BuildReport, CatalogSnapshot, Category, CategoryScheme, ChildRef, Container, Item,
};
use crate::domain::KeyConfig;
use crate::parser::{CategorisationRecord, CategoryRecord, CategorySchemeRecord, DataflowRecord};

/// Everything parsed from the three catalog documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRecords {
    pub schemes: Vec<CategorySchemeRecord>,
    pub categories: Vec<CategoryRecord>,
    pub categorisations: Vec<CategorisationRecord>,
    pub dataflows: Vec<DataflowRecord>,
}

/// Link parsed records into a [`CatalogSnapshot`].
///
/// Records may reference each other in any order: every entry is materialised
/// before parent and categorisation links are resolved. Orphaned categories
/// and dangling categorisations are reported, never fatal.
pub fn build(records: &CatalogRecords, keys: &KeyConfig) -> CatalogSnapshot {
    let mut index = Index::default();
    index.materialise_schemes(&records.schemes);
    index.materialise_categories(&records.categories);
    index.materialise_items(&records.dataflows, keys);

    let mut links = Links::default();
    index.link_categories(&records.categories, &mut links);
    index.link_categorisations(&records.categorisations, keys, &mut links);

    let snapshot = index.finish(links);
    let report = snapshot.report();
    tracing::info!(
        containers = snapshot.container_count(),
        items = snapshot.item_count(),
        orphans = report.orphans.len(),
        unresolved_categorisations = report.unresolved_categorisations,
        merged_schemes = report.merged_schemes,
        "catalog built"
    );
    snapshot
}

#[derive(Default)]
struct Index {
    containers: HashMap<String, Container>,
    items: HashMap<String, Item>,
    roots: Vec<String>,
    item_order: Vec<String>,
    by_xml_id: HashMap<String, String>,
    by_urn: HashMap<String, String>,
    report: BuildReport,
}

#[derive(Default)]
struct Links {
    children: HashMap<String, Vec<ChildRef>>,
}

impl Links {
    fn push(&mut self, parent: &str, child: ChildRef) -> bool {
        let children = self.children.entry(parent.to_string()).or_default();
        if children.contains(&child) {
            return false;
        }
        children.push(child);
        true
    }
}

impl Index {
    fn materialise_schemes(&mut self, schemes: &[CategorySchemeRecord]) {
        for record in schemes {
            self.by_xml_id
                .insert(record.xml_id.clone(), record.id.clone());
            if let Some(urn) = &record.urn {
                self.by_urn.insert(urn.clone(), record.id.clone());
            }
            if let Some(existing) = self.containers.get_mut(&record.id) {
                if let Container::Scheme(scheme) = &*existing
                    && scheme.xml_id != record.xml_id
                {
                    tracing::warn!(
                        scheme = %record.id,
                        kept = %scheme.xml_id,
                        merged = %record.xml_id,
                        "merging category scheme versions"
                    );
                    self.report.merged_schemes += 1;
                }
                rename(&mut self.report, existing_name(existing), &record.id, &record.name);
                continue;
            }
            self.roots.push(record.id.clone());
            self.containers.insert(
                record.id.clone(),
                Container::Scheme(CategoryScheme {
                    id: record.id.clone(),
                    xml_id: record.xml_id.clone(),
                    name: record.name.clone(),
                    children: Vec::new(),
                }),
            );
        }
    }

    fn materialise_categories(&mut self, categories: &[CategoryRecord]) {
        for record in categories {
            let id = record.urn.clone();
            self.by_xml_id.insert(record.xml_id.clone(), id.clone());
            self.by_urn.insert(record.urn.clone(), id.clone());
            if let Some(existing) = self.containers.get_mut(&id) {
                rename(&mut self.report, existing_name(existing), &id, &record.name);
                continue;
            }
            self.containers.insert(
                id.clone(),
                Container::Category(Category {
                    id,
                    urn: record.urn.clone(),
                    xml_id: record.xml_id.clone(),
                    xml_parent_id: record.xml_parent_id.clone(),
                    name: record.name.clone(),
                    children: Vec::new(),
                }),
            );
        }
    }

    fn materialise_items(&mut self, dataflows: &[DataflowRecord], keys: &KeyConfig) {
        for record in dataflows {
            let key = keys.key_string(&record.id);
            if let Some(existing) = self.items.get_mut(&key) {
                rename(&mut self.report, &mut existing.name, &key, &record.name);
                continue;
            }
            self.item_order.push(key.clone());
            self.items.insert(
                key.clone(),
                Item {
                    id: key,
                    name: record.name.clone(),
                },
            );
        }
    }

    fn link_categories(&mut self, categories: &[CategoryRecord], links: &mut Links) {
        let mut linked = HashSet::new();
        for record in categories {
            let id = &record.urn;
            if !linked.insert(id.clone()) {
                continue;
            }
            let parent = self
                .by_xml_id
                .get(&record.xml_parent_id)
                .filter(|parent| *parent != id);
            match parent {
                Some(parent) => {
                    links.push(parent, ChildRef::Category(id.clone()));
                }
                None => {
                    tracing::warn!(
                        category = %id,
                        parent = %record.xml_parent_id,
                        "orphaned category, parent not found"
                    );
                    self.report.orphans.push(id.clone());
                }
            }
        }
    }

    fn link_categorisations(
        &mut self,
        categorisations: &[CategorisationRecord],
        keys: &KeyConfig,
        links: &mut Links,
    ) {
        for record in categorisations {
            let category = self
                .by_urn
                .get(&record.category_urn)
                .and_then(|id| self.containers.get(id));
            let key = keys.key_string(&record.dataflow_id);
            match (category, self.items.get(&key)) {
                (Some(Container::Category(category)), Some(item)) => {
                    if !links.push(&category.id, ChildRef::Item(item.id.clone())) {
                        self.report.duplicate_links += 1;
                    }
                }
                (Some(Container::Scheme(_)) | None, _) | (_, None) => {
                    tracing::debug!(
                        category = %record.category_urn,
                        dataflow = %record.dataflow_id,
                        "unresolved categorisation"
                    );
                    self.report.unresolved_categorisations += 1;
                }
            }
        }
    }

    fn finish(mut self, mut links: Links) -> CatalogSnapshot {
        for (id, container) in self.containers.iter_mut() {
            let Some(children) = links.children.remove(id) else {
                continue;
            };
            match container {
                Container::Scheme(scheme) => scheme.children = children,
                Container::Category(category) => category.children = children,
            }
        }
        CatalogSnapshot {
            containers: self.containers,
            items: self.items,
            roots: self.roots,
            item_order: self.item_order,
            report: self.report,
        }
    }
}

fn existing_name(container: &mut Container) -> &mut String {
    match container {
        Container::Scheme(scheme) => &mut scheme.name,
        Container::Category(category) => &mut category.name,
    }
}

/// Later records win; conflicting names are logged.
fn rename(report: &mut BuildReport, current: &mut String, id: &str, name: &str) {
    if current.as_str() != name {
        tracing::warn!(id, previous = %current, name, "duplicate id with conflicting name");
        report.renamed += 1;
        *current = name.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Node;
    use crate::domain::Agency;

    fn scheme(id: &str) -> CategorySchemeRecord {
        CategorySchemeRecord {
            id: id.to_string(),
            xml_id: format!("ESTAT:{id}(1.0)"),
            urn: None,
            name: id.to_uppercase(),
            dissemination_flag: None,
        }
    }

    fn category(code: &str, parent_xml_id: &str) -> CategoryRecord {
        let urn = format!("{parent_xml_id}.{code}");
        CategoryRecord {
            id: code.to_string(),
            urn: urn.clone(),
            xml_id: urn,
            xml_parent_id: parent_xml_id.to_string(),
            name: code.to_uppercase(),
            dissemination_flag: None,
        }
    }

    fn keys() -> KeyConfig {
        KeyConfig::new(Agency::Estat, None)
    }

    #[test]
    fn later_dataflow_name_wins() {
        let records = CatalogRecords {
            dataflows: vec![
                DataflowRecord {
                    id: "DF1".to_string(),
                    name: "Draft".to_string(),
                },
                DataflowRecord {
                    id: "DF1".to_string(),
                    name: "Final".to_string(),
                },
            ],
            ..CatalogRecords::default()
        };
        let snapshot = build(&records, &keys());
        assert_eq!(snapshot.item_count(), 1);
        assert_eq!(snapshot.item("sdmx:ESTAT:DF1").unwrap().name, "Final");
        assert_eq!(snapshot.report().renamed, 1);
    }

    #[test]
    fn category_cannot_parent_itself() {
        let mut looped = category("loop", "x");
        looped.xml_parent_id = looped.xml_id.clone();
        let records = CatalogRecords {
            schemes: vec![scheme("s")],
            categories: vec![looped.clone()],
            ..CatalogRecords::default()
        };
        let snapshot = build(&records, &keys());
        assert_eq!(snapshot.report().orphans, vec![looped.urn]);
    }

    #[test]
    fn categorisation_targeting_scheme_is_skipped() {
        let mut root = scheme("s");
        root.urn = Some("urn:scheme:s".to_string());
        let records = CatalogRecords {
            schemes: vec![root],
            categorisations: vec![CategorisationRecord {
                category_urn: "urn:scheme:s".to_string(),
                dataflow_id: "DF1".to_string(),
                dissemination_flag: None,
            }],
            dataflows: vec![DataflowRecord {
                id: "DF1".to_string(),
                name: "Flow".to_string(),
            }],
            ..CatalogRecords::default()
        };
        let snapshot = build(&records, &keys());
        let Some(Node::Scheme(root)) = snapshot.resolve("s") else {
            panic!("scheme missing");
        };
        assert!(root.children.is_empty());
        assert_eq!(snapshot.report().unresolved_categorisations, 1);
    }

    #[test]
    fn duplicate_categorisation_links_once() {
        let c1 = category("c1", "ESTAT:s(1.0)");
        let link = CategorisationRecord {
            category_urn: c1.urn.clone(),
            dataflow_id: "DF1".to_string(),
            dissemination_flag: None,
        };
        let records = CatalogRecords {
            schemes: vec![scheme("s")],
            categories: vec![c1.clone()],
            categorisations: vec![link.clone(), link],
            dataflows: vec![DataflowRecord {
                id: "DF1".to_string(),
                name: "Flow".to_string(),
            }],
        };
        let snapshot = build(&records, &keys());
        let container = snapshot.container(&c1.urn).unwrap();
        assert_eq!(container.children().len(), 1);
        assert_eq!(snapshot.report().duplicate_links, 1);
    }

    #[test]
    fn scheme_versions_share_one_root() {
        let mut newer = scheme("s");
        newer.xml_id = "ESTAT:s(2.0)".to_string();
        newer.name = "Newer".to_string();
        let records = CatalogRecords {
            schemes: vec![scheme("s"), newer],
            categories: vec![
                category("old", "ESTAT:s(1.0)"),
                category("new", "ESTAT:s(2.0)"),
            ],
            ..CatalogRecords::default()
        };
        let snapshot = build(&records, &keys());
        assert_eq!(snapshot.roots().count(), 1);
        let root = snapshot.container("s").unwrap();
        assert_eq!(root.children().len(), 2);
        assert_eq!(snapshot.report().merged_schemes, 1);
        assert!(snapshot.report().orphans.is_empty());
    }

    #[test]
    fn categorisation_to_unknown_dataflow_is_skipped() {
        let c1 = category("c1", "ESTAT:s(1.0)");
        let records = CatalogRecords {
            schemes: vec![scheme("s")],
            categories: vec![c1.clone()],
            categorisations: vec![CategorisationRecord {
                category_urn: c1.urn.clone(),
                dataflow_id: "MISSING".to_string(),
                dissemination_flag: None,
            }],
            dataflows: Vec::new(),
        };
        let snapshot = build(&records, &keys());
        assert!(snapshot.container(&c1.urn).unwrap().children().is_empty());
        assert_eq!(snapshot.report().unresolved_categorisations, 1);
        assert_eq!(snapshot.item_count(), 0);
    }
}
