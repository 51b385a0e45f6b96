//! Entity definition to node tree mapping
//!
//! Walks an entity definition and creates one node per step. Empty branches
//! get a placeholder node so they stay visible and droppable. Node ids are
//! derived from the entity id and the step path, so mapping an unchanged
//! definition always yields the same tree.

use serde_json::Value;

use super::{NodeData, NodeHandle, NodeTree};
use crate::catalog::{self, CatalogKind, StepsPropertyKind};
use crate::entity::{EntityType, VisualEntity};
use crate::path;

/// Id of the node at `path` inside `entity_id`
pub fn node_id(entity_id: &str, path: &str) -> String {
    format!("{}|{}", entity_id, path)
}

/// Build the node tree of an entity
pub fn to_tree(entity: &VisualEntity) -> NodeTree {
    let mapper = Mapper {
        entity_id: entity.id(),
        entity_type: entity.entity_type(),
        definition: entity.definition(),
    };
    let mut tree = NodeTree::new();
    let root_data = NodeData::root(entity.id(), entity.entity_type());
    let root = tree.add(entity.id(), root_data.clone());

    match entity.entity_type() {
        EntityType::Route | EntityType::Kamelet => {
            let from_path = path::join(entity.root_path(), "from");
            mapper.map_from(&mut tree, root, &from_path);
        }
        EntityType::RouteConfiguration | EntityType::Rest => {
            mapper.map_children(&mut tree, root, &root_data.path, &root_data.processor_name);
        }
    }
    tree
}

struct Mapper<'a> {
    entity_id: &'a str,
    entity_type: EntityType,
    definition: &'a Value,
}

impl Mapper<'_> {
    fn add(&self, tree: &mut NodeTree, parent: NodeHandle, data: NodeData) -> NodeHandle {
        let handle = tree.add(node_id(self.entity_id, &data.path), data);
        tree.attach(parent, handle);
        handle
    }

    /// `from` and its steps, chained, as direct children of the root
    fn map_from(&self, tree: &mut NodeTree, root: NodeHandle, from_path: &str) {
        let uri = path::get(self.definition, &path::join(from_path, "uri"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let data = NodeData::step(self.entity_id, self.entity_type, from_path, "from");
        let data = match uri.split_once(':') {
            Some(("kamelet", name)) => data.with_catalog(CatalogKind::Kamelet, name.split('?').next().unwrap_or(name)),
            Some((scheme, _)) => data.with_catalog(CatalogKind::Component, scheme),
            None if !uri.is_empty() => data.with_catalog(CatalogKind::Component, uri),
            None => data,
        };
        let from = self.add(tree, root, data);

        let steps_path = path::join(from_path, "steps");
        let steps = self.map_branch(tree, root, &steps_path, false);
        if let Some(first) = steps.first() {
            tree.link(from, *first);
        }
    }

    /// Steps of a branch array, chained, as children of `parent`
    fn map_branch(&self, tree: &mut NodeTree, parent: NodeHandle, steps_path: &str, placeholder: bool) -> Vec<NodeHandle> {
        let items = path::get(self.definition, steps_path)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        if items.is_empty() {
            if placeholder {
                let data = NodeData::placeholder(self.entity_id, self.entity_type, path::join(steps_path, 0));
                return vec![self.add(tree, parent, data)];
            }
            return Vec::new();
        }

        let mut handles: Vec<NodeHandle> = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let element_path = path::join(steps_path, index);
            let Some((name, _)) = item.as_object().filter(|m| m.len() == 1).and_then(|m| m.iter().next()) else {
                log::warn!("Skipping unrecognized step at {}", element_path);
                continue;
            };
            let step_path = path::join(&element_path, name);
            let handle = self.map_step(tree, parent, &step_path, name);
            if let Some(prev) = handles.last() {
                tree.link(*prev, handle);
            }
            handles.push(handle);
        }
        handles
    }

    /// One step and, for containers, its nested steps and clauses
    fn map_step(&self, tree: &mut NodeTree, parent: NodeHandle, step_path: &str, processor: &str) -> NodeHandle {
        let data = NodeData::step(self.entity_id, self.entity_type, step_path, processor);
        let is_group = data.is_group;
        let handle = self.add(tree, parent, data);

        if is_group {
            if path::get(self.definition, step_path).map_or(true, |v| !v.is_object()) {
                log::warn!("Step at {} has no definition; treating it as a leaf", step_path);
                return handle;
            }
            self.map_children(tree, handle, step_path, processor);
        }
        handle
    }

    fn map_children(&self, tree: &mut NodeTree, handle: NodeHandle, step_path: &str, processor: &str) {
        for property in catalog::steps_properties(processor) {
            let property_path = path::join(step_path, property.name);
            match property.kind {
                StepsPropertyKind::Branch => {
                    self.map_branch(tree, handle, &property_path, true);
                }
                StepsPropertyKind::ArrayClause | StepsPropertyKind::WrappedClause => {
                    let count = path::get(self.definition, &property_path)
                        .and_then(Value::as_array)
                        .map_or(0, Vec::len);
                    for index in 0..count {
                        let clause_path = path::join(&property_path, index);
                        let clause_path = if property.kind == StepsPropertyKind::WrappedClause {
                            path::join(&clause_path, property.name)
                        } else {
                            clause_path
                        };
                        self.map_step(tree, handle, &clause_path, property.name);
                    }
                }
                StepsPropertyKind::SingleClause => {
                    if path::get(self.definition, &property_path).is_some() {
                        self.map_step(tree, handle, &property_path, property.name);
                    }
                }
            }
        }
    }
}
