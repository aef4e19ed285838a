use serde::Serialize;

use crate::catalog::{CatalogSnapshot, Node};

/// Uniform descriptor handed to the host for any catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerItem {
    pub is_container: bool,
    pub id: String,
    pub name: String,
}

impl From<Node<'_>> for ContainerItem {
    fn from(node: Node<'_>) -> Self {
        Self {
            is_container: node.is_container(),
            id: node.id().to_string(),
            name: node.name().to_string(),
        }
    }
}

/// One page of a listing. The whole catalog lives in memory, so there is
/// never a next page and `continuation` is always `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerContentResponse {
    pub contents: Vec<ContainerItem>,
    pub continuation: Option<String>,
}

impl ContainerContentResponse {
    pub fn single_page(contents: Vec<ContainerItem>) -> Self {
        Self {
            contents,
            continuation: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

/// Host listing parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListRequest<'a> {
    pub container_id: Option<&'a str>,
    pub query: Option<&'a str>,
    /// Accepted for the host's pagination protocol and otherwise ignored.
    pub page_size: Option<usize>,
    /// Used when `container_id` is empty.
    pub category_scheme: Option<&'a str>,
}

pub struct QueryResolver<'a> {
    snapshot: &'a CatalogSnapshot,
}

impl<'a> QueryResolver<'a> {
    pub fn new(snapshot: &'a CatalogSnapshot) -> Self {
        Self { snapshot }
    }

    /// Host entry point: a non-blank query searches, anything else lists.
    pub fn list(&self, request: &ListRequest<'_>) -> ContainerContentResponse {
        if let Some(page_size) = request.page_size {
            tracing::debug!(page_size, "page size ignored, catalog is served in one page");
        }
        if let Some(query) = non_blank(request.query) {
            return self.search(query);
        }
        let container_id = non_blank(request.container_id).or(non_blank(request.category_scheme));
        self.list_container(container_id)
    }

    pub fn list_root(&self) -> ContainerContentResponse {
        ContainerContentResponse::single_page(
            self.snapshot
                .roots()
                .map(|scheme| ContainerItem::from(Node::Scheme(scheme)))
                .collect(),
        )
    }

    pub fn list_container(&self, container_id: Option<&str>) -> ContainerContentResponse {
        let Some(container_id) = non_blank(container_id) else {
            return self.list_root();
        };
        let links = match self.snapshot.resolve(container_id) {
            Some(Node::Scheme(scheme)) => &scheme.children,
            Some(Node::Category(category)) => &category.children,
            Some(Node::Item(_)) => return ContainerContentResponse::empty(),
            None => {
                tracing::debug!(container_id, "listing unknown container");
                return ContainerContentResponse::empty();
            }
        };
        ContainerContentResponse::single_page(
            links
                .iter()
                .filter_map(|link| self.snapshot.child(link))
                .map(ContainerItem::from)
                .collect(),
        )
    }

    /// Case-insensitive substring match over every item name, including items
    /// no container links to.
    pub fn search(&self, query: &str) -> ContainerContentResponse {
        let needle = query.to_lowercase();
        ContainerContentResponse::single_page(
            self.snapshot
                .items()
                .filter(|item| item.name.to_lowercase().contains(&needle))
                .map(|item| ContainerItem::from(Node::Item(item)))
                .collect(),
        )
    }

    pub fn get_item_info(&self, id: &str) -> Option<ContainerItem> {
        self.snapshot.resolve(id).map(ContainerItem::from)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}
