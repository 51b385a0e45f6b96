//! Visualization node tree
//!
//! Nodes live in an arena owned by [`NodeTree`] and refer to each other by
//! [`NodeHandle`]. Parent, child and chain links are handle lookups, so a
//! malformed tree can never keep nodes alive through reference cycles.

mod flow;
mod mapper;

pub use flow::VisualFlow;
pub use mapper::to_tree;

use serde::{Deserialize, Serialize};

use crate::catalog::{is_group_processor, CatalogKind};
use crate::entity::EntityType;

/// Index of a node in its tree's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeHandle(usize);

impl NodeHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Payload carried by every node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    /// Address of the step inside its entity definition
    pub path: String,
    pub entity_id: String,
    pub entity_type: EntityType,
    /// DSL keyword of the step (`from`, `log`, `when`, `route`)
    pub processor_name: String,
    /// Catalog name shown for the step (`timer` for `from: {uri: timer:x}`)
    pub name: String,
    pub catalog_kind: CatalogKind,
    pub icon: String,
    pub is_group: bool,
    pub is_placeholder: bool,
}

impl NodeData {
    /// Data for a processor step
    pub fn step(
        entity_id: impl Into<String>,
        entity_type: EntityType,
        path: impl Into<String>,
        processor: impl Into<String>,
    ) -> Self {
        let processor = processor.into();
        Self {
            path: path.into(),
            entity_id: entity_id.into(),
            entity_type,
            icon: format!("processor:{}", processor),
            name: processor.clone(),
            catalog_kind: CatalogKind::Processor,
            is_group: is_group_processor(&processor),
            is_placeholder: false,
            processor_name: processor,
        }
    }

    /// Data for the root of an entity
    pub fn root(entity_id: impl Into<String>, entity_type: EntityType) -> Self {
        let root = entity_type.root_path();
        let processor = match entity_type {
            EntityType::Route | EntityType::Kamelet => root,
            EntityType::RouteConfiguration => "routeConfiguration",
            EntityType::Rest => "rest",
        };
        Self {
            path: root.to_string(),
            entity_id: entity_id.into(),
            entity_type,
            processor_name: processor.to_string(),
            name: processor.to_string(),
            catalog_kind: CatalogKind::Entity,
            icon: format!("entity:{}", root),
            is_group: true,
            is_placeholder: false,
        }
    }

    /// Data for an empty slot at `path`
    pub fn placeholder(entity_id: impl Into<String>, entity_type: EntityType, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            entity_id: entity_id.into(),
            entity_type,
            processor_name: "placeholder".to_string(),
            name: "placeholder".to_string(),
            catalog_kind: CatalogKind::Processor,
            icon: String::new(),
            is_group: false,
            is_placeholder: true,
        }
    }

    /// Display the step as a catalog entry of another kind
    pub fn with_catalog(mut self, kind: CatalogKind, name: impl Into<String>) -> Self {
        let name = name.into();
        self.icon = match kind {
            CatalogKind::Component => format!("component:{}", name),
            CatalogKind::Kamelet => format!("kamelet:{}", name),
            CatalogKind::Processor => format!("processor:{}", name),
            CatalogKind::Entity => format!("entity:{}", name),
        };
        self.catalog_kind = kind;
        self.name = name;
        self
    }

    pub fn is_root(&self) -> bool {
        self.catalog_kind == CatalogKind::Entity
    }
}

/// One node of the tree
#[derive(Debug, Clone, PartialEq)]
pub struct VisualizationNode {
    pub id: String,
    pub data: NodeData,
    /// Bumped whenever the owning flow mutates
    pub last_update: u64,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
    previous: Option<NodeHandle>,
    next: Option<NodeHandle>,
}

impl VisualizationNode {
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    pub fn previous(&self) -> Option<NodeHandle> {
        self.previous
    }

    pub fn next(&self) -> Option<NodeHandle> {
        self.next
    }
}

/// Arena of visualization nodes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeTree {
    nodes: Vec<Option<VisualizationNode>>,
    root: Option<NodeHandle>,
}

impl NodeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a detached node; the first node added becomes the root
    pub fn add(&mut self, id: impl Into<String>, data: NodeData) -> NodeHandle {
        let handle = NodeHandle(self.nodes.len());
        self.nodes.push(Some(VisualizationNode {
            id: id.into(),
            data,
            last_update: 0,
            parent: None,
            children: Vec::new(),
            previous: None,
            next: None,
        }));
        if self.root.is_none() {
            self.root = Some(handle);
        }
        handle
    }

    /// Append `child` to the children of `parent`
    ///
    /// No structural checks are made; graph building guards against the
    /// cycles a careless caller may create.
    pub fn attach(&mut self, parent: NodeHandle, child: NodeHandle) {
        if self.get(parent).is_none() || self.get(child).is_none() {
            return;
        }
        if let Some(node) = self.get_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.get_mut(parent) {
            node.children.push(child);
        }
    }

    /// Link two nodes as consecutive steps of a chain
    pub fn link(&mut self, previous: NodeHandle, next: NodeHandle) {
        if let Some(node) = self.get_mut(previous) {
            node.next = Some(next);
        }
        if let Some(node) = self.get_mut(next) {
            node.previous = Some(previous);
        }
    }

    pub fn root(&self) -> Option<NodeHandle> {
        self.root
    }

    pub fn get(&self, handle: NodeHandle) -> Option<&VisualizationNode> {
        self.nodes.get(handle.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut VisualizationNode> {
        self.nodes.get_mut(handle.0).and_then(Option::as_mut)
    }

    pub fn parent(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.get(handle)?.parent
    }

    pub fn children(&self, handle: NodeHandle) -> &[NodeHandle] {
        self.get(handle).map_or(&[], |n| n.children.as_slice())
    }

    pub fn previous(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.get(handle)?.previous
    }

    pub fn next(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.get(handle)?.next
    }

    /// Live nodes in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (NodeHandle, &VisualizationNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (NodeHandle(i), n)))
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find_by_id(&self, id: &str) -> Option<NodeHandle> {
        self.iter().find(|(_, n)| n.id == id).map(|(h, _)| h)
    }

    pub fn find_by_path(&self, path: &str) -> Option<NodeHandle> {
        self.iter().find(|(_, n)| n.data.path == path).map(|(h, _)| h)
    }

    /// Set the update marker of every node
    pub fn stamp(&mut self, last_update: u64) {
        self.nodes.iter_mut().flatten().for_each(|n| n.last_update = last_update);
    }

    /// Remove a node and its descendants, unlinking them from their neighbours
    pub fn detach(&mut self, handle: NodeHandle) {
        let Some(node) = self.get(handle) else {
            return;
        };
        let (parent, previous, next) = (node.parent, node.previous, node.next);

        if let Some(p) = parent.and_then(|p| self.get_mut(p)) {
            p.children.retain(|c| *c != handle);
        }
        match (previous, next) {
            (Some(prev), Some(next)) => self.link(prev, next),
            (Some(prev), None) => {
                if let Some(n) = self.get_mut(prev) {
                    n.next = None;
                }
            }
            (None, Some(next)) => {
                if let Some(n) = self.get_mut(next) {
                    n.previous = None;
                }
            }
            (None, None) => {}
        }

        let mut stack = vec![handle];
        while let Some(h) = stack.pop() {
            if let Some(removed) = self.nodes.get_mut(h.0).and_then(Option::take) {
                stack.extend(removed.children);
            }
        }
        if self.root == Some(handle) {
            self.root = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> (NodeTree, Vec<NodeHandle>) {
        let mut tree = NodeTree::new();
        let root = tree.add("route-1", NodeData::root("route-1", EntityType::Route));
        let mut handles = vec![root];
        for (i, name) in ["from", "log", "to"].iter().enumerate() {
            let path = if i == 0 {
                "route.from".to_string()
            } else {
                format!("route.from.steps.{}.{}", i - 1, name)
            };
            let h = tree.add(format!("route-1|{}", path), NodeData::step("route-1", EntityType::Route, path, *name));
            tree.attach(root, h);
            if let Some(prev) = handles.last().copied().filter(|p| *p != root) {
                tree.link(prev, h);
            }
            handles.push(h);
        }
        (tree, handles)
    }

    #[test]
    fn test_navigation() {
        let (tree, h) = chain();
        assert_eq!(tree.root(), Some(h[0]));
        assert_eq!(tree.children(h[0]), &h[1..]);
        assert_eq!(tree.parent(h[2]), Some(h[0]));
        assert_eq!(tree.next(h[1]), Some(h[2]));
        assert_eq!(tree.previous(h[1]), None);
        assert_eq!(tree.parent(h[0]), None);
        assert_eq!(tree.find_by_path("route.from.steps.1.to"), Some(h[3]));
    }

    #[test]
    fn test_detach_relinks_neighbours() {
        let (mut tree, h) = chain();
        tree.detach(h[2]);

        assert!(tree.get(h[2]).is_none());
        assert_eq!(tree.children(h[0]), &[h[1], h[3]]);
        assert_eq!(tree.next(h[1]), Some(h[3]));
        assert_eq!(tree.previous(h[3]), Some(h[1]));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_detach_root_clears_everything() {
        let (mut tree, h) = chain();
        tree.detach(h[0]);
        assert!(tree.is_empty());
        assert_eq!(tree.root(), None);
    }

    #[test]
    fn test_root_data() {
        let data = NodeData::root("rc-1", EntityType::RouteConfiguration);
        assert!(data.is_root());
        assert!(data.is_group);
        assert_eq!(data.path, "routeConfiguration");
        assert_eq!(data.processor_name, "routeConfiguration");
    }
}
