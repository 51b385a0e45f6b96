//! A flow entity together with its node tree
//!
//! Every mutation goes through the entity definition first and then
//! rebuilds the whole tree from it, so the tree never drifts from the
//! document.

use std::collections::HashSet;

use super::{mapper, NodeData, NodeHandle, NodeTree, VisualizationNode};
use crate::catalog::Catalog;
use crate::clipboard::ClipboardPayload;
use crate::compatibility::AddStepMode;
use crate::config::NodeLabelType;
use crate::entity::{NodeInteraction, VisualComponentSchema, VisualEntity};
use crate::error::{CanvasError, Result};

/// An entity and the visualization tree mapped from it
#[derive(Debug, Clone, PartialEq)]
pub struct VisualFlow {
    entity: VisualEntity,
    tree: NodeTree,
    last_update: u64,
}

impl VisualFlow {
    pub fn new(entity: VisualEntity) -> Self {
        let tree = mapper::to_tree(&entity);
        Self {
            entity,
            tree,
            last_update: 0,
        }
    }

    pub fn entity(&self) -> &VisualEntity {
        &self.entity
    }

    pub fn id(&self) -> &str {
        self.entity.id()
    }

    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    pub fn root(&self) -> Option<NodeHandle> {
        self.tree.root()
    }

    pub fn last_update(&self) -> u64 {
        self.last_update
    }

    pub fn node(&self, handle: NodeHandle) -> Option<&VisualizationNode> {
        self.tree.get(handle)
    }

    pub fn find_by_id(&self, id: &str) -> Option<NodeHandle> {
        self.tree.find_by_id(id)
    }

    pub fn find_by_path(&self, path: &str) -> Option<NodeHandle> {
        self.tree.find_by_path(path)
    }

    fn data(&self, handle: NodeHandle) -> Result<&NodeData> {
        self.tree
            .get(handle)
            .map(|n| &n.data)
            .ok_or_else(|| CanvasError::UnresolvedReference(format!("node #{}", handle.index())))
    }

    fn rebuild(&mut self) {
        self.last_update += 1;
        self.tree = mapper::to_tree(&self.entity);
        self.tree.stamp(self.last_update);
        log::debug!(
            "Rebuilt tree of '{}' ({} nodes, update {})",
            self.entity.id(),
            self.tree.len(),
            self.last_update
        );
    }

    pub fn node_label(&self, handle: NodeHandle, label_type: NodeLabelType) -> Option<String> {
        let data = self.data(handle).ok()?;
        Some(self.entity.node_label(data, label_type))
    }

    pub fn node_title(&self, handle: NodeHandle, catalog: &Catalog) -> Option<String> {
        let data = self.data(handle).ok()?;
        Some(self.entity.node_title(data, catalog))
    }

    /// Capabilities of a node; a dangling handle permits nothing
    pub fn node_interaction(&self, handle: NodeHandle) -> NodeInteraction {
        self.data(handle)
            .map(|data| self.entity.node_interaction(data))
            .unwrap_or_default()
    }

    pub fn component_schema(&self, handle: NodeHandle, catalog: &Catalog) -> Option<VisualComponentSchema> {
        let data = self.data(handle).ok()?;
        self.entity.component_schema(data, catalog)
    }

    pub fn copied_content(&self, handle: NodeHandle) -> Option<ClipboardPayload> {
        let data = self.data(handle).ok()?;
        self.entity.copied_content(data)
    }

    /// Whether a drag gesture may start on this node
    pub fn can_drag_node(&self, handle: NodeHandle) -> bool {
        self.data(handle)
            .map(|data| !data.is_placeholder && !data.is_root())
            .unwrap_or(false)
            && self.node_interaction(handle).can_be_copied
    }

    /// Whether a dragged node may be dropped onto this node
    pub fn can_drop_on_node(&self, handle: NodeHandle) -> bool {
        self.data(handle)
            .map(|data| !data.is_root() && data.processor_name != "from")
            .unwrap_or(false)
    }

    /// Insert a new step relative to `handle`
    pub fn add_base_entity_step(&mut self, handle: NodeHandle, mode: AddStepMode, content: &ClipboardPayload) -> Result<()> {
        let data = self.data(handle)?.clone();
        if !self.node_interaction(handle).allows(mode) {
            return Err(CanvasError::UnsupportedMode {
                node: data.path,
                mode: mode.to_string(),
            });
        }
        self.entity.add_step(mode, &data, content)?;
        self.rebuild();
        Ok(())
    }

    /// Insert pasted content relative to `handle`
    ///
    /// Content copied from another entity family is rejected. Ids are taken
    /// as they are; `Clipboard::paste` hands out content with fresh ones.
    pub fn paste_base_entity_step(&mut self, handle: NodeHandle, mode: AddStepMode, content: &ClipboardPayload) -> Result<()> {
        if !content.entity_type.is_paste_compatible(self.entity.entity_type()) {
            return Err(CanvasError::PasteFailed(format!(
                "{} content cannot be pasted into a {}",
                content.entity_type.title(),
                self.entity.entity_type().title()
            )));
        }
        self.add_base_entity_step(handle, mode, content)
    }

    /// Remove the step at `handle`
    ///
    /// Returns `false` without touching anything when the node cannot be
    /// removed.
    pub fn remove_child(&mut self, handle: NodeHandle) -> Result<bool> {
        let data = self.data(handle)?.clone();
        if !self.node_interaction(handle).can_remove_step {
            return Ok(false);
        }
        self.entity.remove_step(&data.path)?;
        self.rebuild();
        Ok(true)
    }

    /// Ids present in the entity definition
    pub fn collect_ids(&self, out: &mut HashSet<String>) {
        self.entity.collect_ids(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use serde_json::json;

    fn flow() -> VisualFlow {
        VisualFlow::new(VisualEntity::new(
            EntityType::Route,
            json!({
                "id": "route-1",
                "from": {
                    "uri": "timer:tick",
                    "steps": [
                        {"log": {"id": "log-1", "message": "a"}},
                        {"choice": {"when": [{"steps": []}]}}
                    ]
                }
            }),
        ))
    }

    fn payload(name: &str, value: serde_json::Value) -> ClipboardPayload {
        ClipboardPayload::new(EntityType::Route, name, value)
    }

    #[test]
    fn test_add_step_rebuilds_tree() {
        let mut flow = flow();
        let log = flow.find_by_path("route.from.steps.0.log").unwrap();

        flow.add_base_entity_step(log, AddStepMode::AppendStep, &payload("to", json!({"uri": "mock:a"})))
            .unwrap();

        let to = flow.find_by_path("route.from.steps.1.to").unwrap();
        let log = flow.find_by_path("route.from.steps.0.log").unwrap();
        assert_eq!(flow.tree().next(log), Some(to));
        assert_eq!(flow.last_update(), 1);
        assert_eq!(flow.node(to).unwrap().last_update, 1);
    }

    #[test]
    fn test_mode_must_be_allowed() {
        let mut flow = flow();
        let when = flow.find_by_path("route.from.steps.1.choice.when.0").unwrap();
        let before = flow.clone();

        let err = flow.add_base_entity_step(when, AddStepMode::AppendStep, &payload("log", json!({})));
        assert!(matches!(err, Err(CanvasError::UnsupportedMode { .. })));
        assert_eq!(flow, before);
    }

    #[test]
    fn test_remove_forbidden_is_noop() {
        let mut flow = flow();
        let root = flow.root().unwrap();
        let before = flow.clone();

        assert!(!flow.remove_child(root).unwrap());
        assert_eq!(flow, before);
    }

    #[test]
    fn test_remove_step() {
        let mut flow = flow();
        let log = flow.find_by_path("route.from.steps.0.log").unwrap();
        assert!(flow.remove_child(log).unwrap());
        assert!(flow.find_by_path("route.from.steps.0.choice").is_some());
        assert!(flow.find_by_path("route.from.steps.1.choice").is_none());
    }

    #[test]
    fn test_paste_inserts_clipboard_content() {
        let mut flow = flow();
        let log = flow.find_by_path("route.from.steps.0.log").unwrap();
        let content = ClipboardPayload::new(EntityType::Route, "log", json!({"id": "log-9999", "message": "b"}));

        flow.paste_base_entity_step(log, AddStepMode::AppendStep, &content).unwrap();

        let pasted = flow.entity().step_definition("route.from.steps.1.log").unwrap();
        assert_eq!(pasted["message"], "b");
        assert_eq!(pasted["id"], "log-9999");
    }

    #[test]
    fn test_paste_rejects_other_family() {
        let mut flow = flow();
        let log = flow.find_by_path("route.from.steps.0.log").unwrap();
        let content = ClipboardPayload::new(EntityType::RouteConfiguration, "log", json!({}));

        let err = flow.paste_base_entity_step(log, AddStepMode::AppendStep, &content);
        assert!(matches!(err, Err(CanvasError::PasteFailed(_))));
    }

    #[test]
    fn test_drag_and_drop_predicates() {
        let flow = flow();
        let root = flow.root().unwrap();
        let from = flow.find_by_path("route.from").unwrap();
        let log = flow.find_by_path("route.from.steps.0.log").unwrap();
        let placeholder = flow.find_by_path("route.from.steps.1.choice.when.0.steps.0").unwrap();

        assert!(flow.can_drag_node(log));
        assert!(!flow.can_drag_node(from));
        assert!(!flow.can_drag_node(root));
        assert!(!flow.can_drag_node(placeholder));

        assert!(flow.can_drop_on_node(log));
        assert!(!flow.can_drop_on_node(from));
        assert!(!flow.can_drop_on_node(root));
    }
}
