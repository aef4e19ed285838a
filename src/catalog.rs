use std::collections::{HashMap, HashSet};

/// A downloadable dataflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Host-visible key, see [`crate::domain::ItemKey`].
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryScheme {
    pub id: String,
    pub xml_id: String,
    pub name: String,
    pub children: Vec<ChildRef>,
}

/// A category; its catalog id is its URN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub urn: String,
    pub xml_id: String,
    pub xml_parent_id: String,
    pub name: String,
    pub children: Vec<ChildRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Container {
    Scheme(CategoryScheme),
    Category(Category),
}

impl Container {
    pub fn id(&self) -> &str {
        match self {
            Container::Scheme(scheme) => &scheme.id,
            Container::Category(category) => &category.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Container::Scheme(scheme) => &scheme.name,
            Container::Category(category) => &category.name,
        }
    }

    pub fn children(&self) -> &[ChildRef] {
        match self {
            Container::Scheme(scheme) => &scheme.children,
            Container::Category(category) => &category.children,
        }
    }
}

/// Link from a container to one of its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildRef {
    Category(String),
    Item(String),
}

/// Borrowed view of any catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node<'a> {
    Scheme(&'a CategoryScheme),
    Category(&'a Category),
    Item(&'a Item),
}

impl<'a> Node<'a> {
    pub fn id(&self) -> &'a str {
        match self {
            Node::Scheme(scheme) => &scheme.id,
            Node::Category(category) => &category.id,
            Node::Item(item) => &item.id,
        }
    }

    pub fn name(&self) -> &'a str {
        match self {
            Node::Scheme(scheme) => &scheme.name,
            Node::Category(category) => &category.name,
            Node::Item(item) => &item.name,
        }
    }

    pub fn is_container(&self) -> bool {
        match self {
            Node::Scheme(_) | Node::Category(_) => true,
            Node::Item(_) => false,
        }
    }

    fn from_container(container: &'a Container) -> Self {
        match container {
            Container::Scheme(scheme) => Node::Scheme(scheme),
            Container::Category(category) => Node::Category(category),
        }
    }
}

/// Data-quality findings of one build. Never fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub orphans: Vec<String>,
    pub unresolved_categorisations: usize,
    pub duplicate_links: usize,
    pub renamed: usize,
    /// Schemes sharing an id but not a version, folded into one root.
    pub merged_schemes: usize,
}

/// Fully linked, read-only catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    pub(crate) containers: HashMap<String, Container>,
    pub(crate) items: HashMap<String, Item>,
    pub(crate) roots: Vec<String>,
    pub(crate) item_order: Vec<String>,
    pub(crate) report: BuildReport,
}

impl CatalogSnapshot {
    pub fn container(&self, id: &str) -> Option<&Container> {
        self.containers.get(id)
    }

    pub fn item(&self, key: &str) -> Option<&Item> {
        self.items.get(key)
    }

    /// Containers take precedence over items.
    pub fn resolve(&self, id: &str) -> Option<Node<'_>> {
        self.containers
            .get(id)
            .map(Node::from_container)
            .or_else(|| self.items.get(id).map(Node::Item))
    }

    pub fn roots(&self) -> impl Iterator<Item = &CategoryScheme> {
        self.roots
            .iter()
            .filter_map(|id| match self.containers.get(id) {
                Some(Container::Scheme(scheme)) => Some(scheme),
                _ => None,
            })
    }

    /// Items in dataflow document order.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.item_order.iter().filter_map(|key| self.items.get(key))
    }

    pub fn child(&self, link: &ChildRef) -> Option<Node<'_>> {
        match link {
            ChildRef::Category(id) => self.containers.get(id).map(Node::from_container),
            ChildRef::Item(key) => self.items.get(key).map(Node::Item),
        }
    }

    pub fn children(&self, container: &Container) -> Vec<Node<'_>> {
        container
            .children()
            .iter()
            .filter_map(|link| self.child(link))
            .collect()
    }

    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    /// Depth-first walk of everything reachable from the roots, each node
    /// visited once.
    pub fn walk<F>(&self, mut visit: F)
    where
        F: FnMut(usize, Node<'_>),
    {
        let mut seen = HashSet::new();
        for root in self.roots() {
            self.walk_node(Node::Scheme(root), 0, &mut seen, &mut visit);
        }
    }

    fn walk_node<'a, F>(
        &'a self,
        node: Node<'a>,
        depth: usize,
        seen: &mut HashSet<&'a str>,
        visit: &mut F,
    ) where
        F: FnMut(usize, Node<'_>),
    {
        if node.is_container() && !seen.insert(node.id()) {
            return;
        }
        visit(depth, node);
        let links = match node {
            Node::Scheme(scheme) => &scheme.children,
            Node::Category(category) => &category.children,
            Node::Item(_) => return,
        };
        for link in links {
            if let Some(child) = self.child(link) {
                self.walk_node(child, depth + 1, seen, visit);
            }
        }
    }
}
