//! Interaction controller
//!
//! [`FlowCanvas`] turns user gestures (copy, paste, add, remove, drag and
//! drop, undo) into document mutations. A gesture either applies completely
//! or leaves the document as it was; failures go to the diagnostic sink.
//!
//! Every successful mutation clears the rendered model and marks a rebuild.
//! The host calls [`FlowCanvas::on_animation_frame`] on its next frame, which
//! rebuilds the graph from the visible flows and lays it out again.

mod drag;
mod visible;

pub use drag::{
    drag_and_drop_direction, edge_under, nearest_node, DragDirection, DragGesture, DragOutcome, DragState,
    DropTarget,
};
pub use visible::VisibleFlows;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{json, Value};

use crate::catalog::{Catalog, CatalogKind, Tile};
use crate::clipboard::{Clipboard, ClipboardPayload};
use crate::compatibility::{self, is_special_processor, AddStepMode};
use crate::config::CanvasSettings;
use crate::document::FlowDocument;
use crate::entity::{EntityType, VisualEntity};
use crate::error::{CanvasError, Result};
use crate::events::{CanvasEvent, DiagnosticSink, NullDiagnosticSink};
use crate::graph::canvas::{to_canvas, CanvasModel};
use crate::graph::pipeline::{to_pipeline_flow, PipelineFlow};
use crate::graph::{FlowGraph, GraphBuilder};
use crate::ids;
use crate::layout::{
    absolute_rects, check_complete, grid_positions, LayeredLayout, LayoutEngine, LayoutScheduler, PositionedNode, Rect,
};
use crate::node::{NodeData, NodeHandle, VisualFlow};
use crate::undo::UndoStack;

/// How the dragged node leaves its original place
#[derive(Debug, Clone, PartialEq)]
enum Removal {
    Step,
    Flow(String),
}

/// A validated move of one node
#[derive(Debug, Clone)]
struct MovePlan {
    dragged: String,
    content: ClipboardPayload,
    /// Node the content is inserted relative to
    anchor: String,
    mode: AddStepMode,
    direction: DragDirection,
    removal: Removal,
}

/// Editing surface over one document
pub struct FlowCanvas {
    document: FlowDocument,
    catalog: Catalog,
    clipboard: Arc<Clipboard>,
    settings: CanvasSettings,
    sink: Arc<dyn DiagnosticSink>,
    engine: Arc<dyn LayoutEngine>,
    scheduler: LayoutScheduler,
    visible: VisibleFlows,
    history: UndoStack,
    measured: HashMap<String, (f64, f64)>,
    graph: FlowGraph,
    positions: Vec<PositionedNode>,
    model: CanvasModel,
    rebuild_pending: bool,
    drag: DragGesture,
}

impl FlowCanvas {
    /// Create a canvas with the built-in catalog and layout engine
    ///
    /// Nothing is rendered until the first [`on_animation_frame`](Self::on_animation_frame).
    pub fn new(document: FlowDocument, settings: CanvasSettings) -> Result<Self> {
        let sink: Arc<dyn DiagnosticSink> = Arc::new(NullDiagnosticSink);
        let engine: Arc<dyn LayoutEngine> = Arc::new(LayeredLayout::new());
        let mut history = UndoStack::default();
        history.push(&document)?;
        let mut visible = VisibleFlows::new();
        visible.sync(&document.flow_ids());

        Ok(Self {
            document,
            catalog: Catalog::builtin(),
            clipboard: Arc::new(Clipboard::new()),
            settings,
            scheduler: LayoutScheduler::new(engine.clone(), sink.clone()),
            sink,
            engine,
            visible,
            history,
            measured: HashMap::new(),
            graph: FlowGraph::default(),
            positions: Vec::new(),
            model: CanvasModel::default(),
            rebuild_pending: true,
            drag: DragGesture::new(),
        })
    }

    /// Share a clipboard slot with other canvases
    pub fn with_clipboard(mut self, clipboard: Arc<Clipboard>) -> Self {
        self.clipboard = clipboard;
        self
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.scheduler = LayoutScheduler::new(self.engine.clone(), sink.clone());
        self.sink = sink;
        self
    }

    pub fn with_layout_engine(mut self, engine: Arc<dyn LayoutEngine>) -> Self {
        self.scheduler = LayoutScheduler::new(engine.clone(), self.sink.clone());
        self.engine = engine;
        self
    }

    pub fn document(&self) -> &FlowDocument {
        &self.document
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn clipboard(&self) -> &Arc<Clipboard> {
        &self.clipboard
    }

    pub fn settings(&self) -> &CanvasSettings {
        &self.settings
    }

    /// Replace the settings; labels and layout follow on the next frame
    pub fn set_settings(&mut self, settings: CanvasSettings) {
        self.settings = settings;
        self.invalidate();
    }

    pub fn visible_flows(&self) -> &VisibleFlows {
        &self.visible
    }

    /// Change which flows are rendered
    pub fn update_visible_flows(&mut self, f: impl FnOnce(&mut VisibleFlows)) {
        self.visible.sync(&self.document.flow_ids());
        f(&mut self.visible);
        self.invalidate();
    }

    /// Record the rendered size of a node for the next layout
    pub fn set_measured_size(&mut self, node_id: impl Into<String>, width: f64, height: f64) {
        self.measured.insert(node_id.into(), (width, height));
        self.rebuild_pending = true;
    }

    /// The containment model currently on screen; empty while a rebuild is pending
    pub fn canvas_model(&self) -> &CanvasModel {
        &self.model
    }

    /// The neutral graph behind the current model
    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn positions(&self) -> &[PositionedNode] {
        &self.positions
    }

    /// The current graph as a pipeline-flow document
    pub fn pipeline_flow(&self) -> PipelineFlow {
        to_pipeline_flow(&self.graph, &self.positions)
    }

    pub fn is_rebuild_pending(&self) -> bool {
        self.rebuild_pending
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn drag_state(&self) -> &DragState {
        self.drag.state()
    }

    fn invalidate(&mut self) {
        self.model = CanvasModel::default();
        self.graph = FlowGraph::default();
        self.rebuild_pending = true;
        self.drag.cancel();
    }

    /// Rebuild and lay out the rendered model if a rebuild is pending
    ///
    /// Returns `true` when a new model was produced. When the layout engine
    /// fails, the previous positions are reused if they still cover every
    /// node, otherwise nodes are stacked in a default grid.
    pub async fn on_animation_frame(&mut self) -> bool {
        if !self.rebuild_pending {
            return false;
        }

        self.visible.sync(&self.document.flow_ids());
        let visible = &self.visible;
        let graph = GraphBuilder::new(self.sink.as_ref())
            .with_label_type(self.settings.node_label)
            .build_flows(self.document.flows().filter(|f| visible.is_visible(f.id())));

        let result = self
            .scheduler
            .request(&graph, &self.settings.layout, &self.measured)
            .await;
        let positions = match result {
            Ok(Some(positions)) => positions,
            Ok(None) => return false,
            Err(e) => {
                log::warn!("Layout failed, using fallback positions: {}", e);
                self.sink.report(CanvasEvent::LayoutFailed { error: e.to_string() });
                if check_complete(&graph, &self.positions).is_ok() {
                    std::mem::take(&mut self.positions)
                } else {
                    grid_positions(&graph, &self.settings.layout)
                }
            }
        };

        self.model = to_canvas(&graph, &positions);
        self.sink.report(CanvasEvent::GraphRebuilt {
            nodes: graph.nodes.len(),
            edges: graph.edges.len(),
        });
        log::debug!("Rendered {} nodes and {} edges", graph.nodes.len(), graph.edges.len());
        self.graph = graph;
        self.positions = positions;
        self.rebuild_pending = false;
        true
    }

    /// Find the flow holding `node_id`
    fn locate(&self, node_id: &str) -> Option<(&VisualFlow, NodeHandle)> {
        self.document
            .flows()
            .find_map(|flow| flow.find_by_id(node_id).map(|handle| (flow, handle)))
    }

    /// Keep a successful mutation or restore the document
    fn settle(&mut self, before: FlowDocument, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                self.committed();
                Ok(())
            }
            Err(e) => {
                self.document = before;
                Err(e)
            }
        }
    }

    fn committed(&mut self) {
        if let Err(e) = self.history.push(&self.document) {
            log::warn!("Failed to record undo snapshot: {}", e);
        }
        self.invalidate();
    }

    // Clipboard

    /// Copy the step at `node_id` to the clipboard
    pub fn copy(&self, node_id: &str) -> bool {
        let result = self
            .locate(node_id)
            .and_then(|(flow, handle)| flow.copied_content(handle))
            .ok_or_else(|| CanvasError::CopyFailed(format!("'{}' has no copyable content", node_id)))
            .and_then(|content| self.clipboard.copy(&content));

        match result {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Copy of '{}' failed: {}", node_id, e);
                self.sink.report(CanvasEvent::CopyFailed {
                    node_id: node_id.to_string(),
                    error: e.to_string(),
                });
                false
            }
        }
    }

    /// Paste modes offered for `node_id` with the current clipboard
    ///
    /// An empty list means the paste entry is not shown at all.
    pub fn paste_menu_entries(&self, node_id: &str) -> Vec<AddStepMode> {
        let Ok(Some(content)) = self.clipboard.peek() else {
            return Vec::new();
        };
        let Some((flow, handle)) = self.locate(node_id) else {
            return Vec::new();
        };
        let Some(data) = flow.node(handle).map(|n| &n.data) else {
            return Vec::new();
        };
        if !content.entity_type.is_paste_compatible(flow.entity().entity_type()) {
            return Vec::new();
        }

        let interaction = flow.node_interaction(handle);
        let definition = definition_at(flow.entity(), data);
        [
            (AddStepMode::AppendStep, interaction.can_be_pasted_as_next_step),
            (AddStepMode::InsertChildStep, interaction.can_be_pasted_as_child),
            (AddStepMode::InsertSpecialChildStep, interaction.can_be_pasted_as_special_child),
        ]
        .into_iter()
        .filter(|(mode, offered)| *offered && compatibility::is_compatible(&content.name, *mode, data, definition))
        .map(|(mode, _)| mode)
        .collect()
    }

    /// Paste the clipboard relative to `node_id`
    pub fn paste(&mut self, node_id: &str, mode: AddStepMode) -> bool {
        let mut taken = self.document.collect_ids();
        let content = match self.clipboard.paste(&mut taken) {
            Ok(Some(content)) => content,
            Ok(None) => return false,
            Err(e) => {
                self.report_paste_failure(node_id, &e);
                return false;
            }
        };
        if !self.paste_menu_entries(node_id).contains(&mode) {
            log::debug!("Paste of '{}' at '{}' ({}) is not offered", content.name, node_id, mode);
            return false;
        }

        let before = self.document.clone();
        let result = match locate_mut(&mut self.document, node_id) {
            Some((flow, handle)) => flow.paste_base_entity_step(handle, mode, &content),
            None => Err(CanvasError::UnresolvedReference(node_id.to_string())),
        };
        match self.settle(before, result) {
            Ok(()) => true,
            Err(e) => {
                self.report_paste_failure(node_id, &e);
                false
            }
        }
    }

    fn report_paste_failure(&self, node_id: &str, error: &CanvasError) {
        log::warn!("Paste at '{}' failed: {}", node_id, error);
        self.sink.report(CanvasEvent::PasteFailed {
            node_id: node_id.to_string(),
            error: error.to_string(),
        });
    }

    // Editing

    /// Catalog tiles that may be inserted at `node_id` with `mode`
    pub fn compatible_tiles(&self, node_id: &str, mode: AddStepMode) -> Vec<&Tile> {
        let Some((flow, handle)) = self.locate(node_id) else {
            return Vec::new();
        };
        let Some(data) = flow.node(handle).map(|n| &n.data) else {
            return Vec::new();
        };
        let filter = self
            .document
            .get_compatible_components(mode, data, definition_at(flow.entity(), data));
        self.catalog.tiles().iter().filter(|t| filter.matches(t)).collect()
    }

    /// Insert a new step from the catalog tile `tile_name`
    pub fn add_step(&mut self, node_id: &str, mode: AddStepMode, tile_name: &str) -> bool {
        let Some((flow, handle)) = self.locate(node_id) else {
            return false;
        };
        let Some(data) = flow.node(handle).map(|n| n.data.clone()) else {
            return false;
        };
        let Some(tile) = self
            .compatible_tiles(node_id, mode)
            .into_iter()
            .find(|t| t.name == tile_name)
            .cloned()
        else {
            log::debug!("'{}' cannot be added at '{}' ({})", tile_name, node_id, mode);
            return false;
        };

        let mut taken = self.document.collect_ids();
        let content = new_step_content(flow.entity().entity_type(), &tile, mode, &data, &mut taken);

        let before = self.document.clone();
        let result = match locate_mut(&mut self.document, node_id) {
            Some((flow, handle)) => flow.add_base_entity_step(handle, mode, &content),
            None => Err(CanvasError::UnresolvedReference(node_id.to_string())),
        };
        match self.settle(before, result) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Adding '{}' at '{}' failed: {}", tile_name, node_id, e);
                false
            }
        }
    }

    /// Remove the step at `node_id`, or its whole flow when `node_id` is a flow root
    ///
    /// Nodes that permit neither are left alone.
    pub fn remove(&mut self, node_id: &str) -> bool {
        let Some((flow, handle)) = self.locate(node_id) else {
            return false;
        };
        let Some(removal) = removal_for(flow, handle) else {
            return false;
        };

        let before = self.document.clone();
        let result = remove_node(&mut self.document, node_id, &removal);
        match self.settle(before, result) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Removing '{}' failed: {}", node_id, e);
                false
            }
        }
    }

    /// Replace the whole document after it was edited outside the canvas
    pub fn update_document(&mut self, document: FlowDocument) {
        self.document = document;
        self.committed();
    }

    /// Append a new empty flow, returning its id
    pub fn add_flow(&mut self, entity_type: EntityType) -> String {
        let id = self.document.add_entity(entity_type);
        self.committed();
        id
    }

    // Drag and drop

    /// Whether `dragged_id` may be dropped onto `target_id`
    pub fn check_node_drop_compatibility(&self, dragged_id: &str, target_id: &str) -> bool {
        self.plan_node_drop(dragged_id, target_id).is_some()
    }

    /// Whether `dragged_id` may be dropped onto the rendered edge `edge_id`
    pub fn can_drop_on_edge(&self, dragged_id: &str, edge_id: &str) -> bool {
        self.plan_edge_drop(dragged_id, edge_id).is_some()
    }

    fn plan_node_drop(&self, dragged_id: &str, target_id: &str) -> Option<MovePlan> {
        if dragged_id == target_id {
            return None;
        }
        let (source_flow, source) = self.locate(dragged_id)?;
        let (target_flow, target) = self.locate(target_id)?;
        let dragged = &source_flow.node(source)?.data;
        let dropped = &target_flow.node(target)?.data;
        if !source_flow.can_drag_node(source) || !target_flow.can_drop_on_node(target) || encloses(dragged, dropped) {
            return None;
        }

        let content = source_flow.copied_content(source)?;
        let target_family = if dropped.is_placeholder {
            target_flow.entity().entity_type()
        } else {
            target_flow.copied_content(target)?.entity_type
        };
        if !content.entity_type.is_paste_compatible(target_family) {
            return None;
        }

        let direction = drag_and_drop_direction(dragged, dropped);
        let (anchor, mode) = if dropped.is_placeholder {
            // An empty branch takes the step in place of its placeholder
            (target, AddStepMode::ReplaceStep)
        } else if is_special_processor(&dragged.processor_name) {
            (target_flow.tree().parent(target)?, AddStepMode::InsertSpecialChildStep)
        } else {
            let mode = match direction {
                DragDirection::Forward => AddStepMode::AppendStep,
                DragDirection::Backward => AddStepMode::PrependStep,
            };
            (target, mode)
        };
        if !self.accepts(target_flow, anchor, mode, &content.name) {
            return None;
        }

        Some(MovePlan {
            dragged: dragged_id.to_string(),
            removal: removal_for(source_flow, source)?,
            anchor: target_flow.node(anchor)?.id.clone(),
            content,
            mode,
            direction,
        })
    }

    fn plan_edge_drop(&self, dragged_id: &str, edge_id: &str) -> Option<MovePlan> {
        let edge = self.graph.edges.iter().find(|e| e.id == edge_id)?;
        let (source_flow, source) = self.locate(dragged_id)?;
        let (flow, following) = self.locate(&edge.target)?;
        let dragged = &source_flow.node(source)?.data;
        let following_data = &flow.node(following)?.data;

        if !source_flow.can_drag_node(source) || following_data.is_placeholder || encloses(dragged, following_data) {
            return None;
        }
        if source_flow.id() == flow.id() {
            let preceding = flow.find_by_id(&edge.source);
            let tree = flow.tree();
            if tree.next(source) == Some(following) || (preceding.is_some() && tree.previous(source) == preceding) {
                return None;
            }
        }

        let content = source_flow.copied_content(source)?;
        if !content.entity_type.is_paste_compatible(flow.entity().entity_type()) {
            return None;
        }
        if !self.accepts(flow, following, AddStepMode::PrependStep, &content.name) {
            return None;
        }

        Some(MovePlan {
            dragged: dragged_id.to_string(),
            removal: removal_for(source_flow, source)?,
            anchor: edge.target.clone(),
            direction: drag_and_drop_direction(dragged, following_data),
            mode: AddStepMode::PrependStep,
            content,
        })
    }

    /// Whether the node at `handle` takes a step named `name` with `mode`
    fn accepts(&self, flow: &VisualFlow, handle: NodeHandle, mode: AddStepMode, name: &str) -> bool {
        let Some(data) = flow.node(handle).map(|n| &n.data) else {
            return false;
        };
        if !flow.node_interaction(handle).allows(mode) {
            return false;
        }
        let filter = self
            .document
            .get_compatible_components(mode, data, definition_at(flow.entity(), data));
        self.document.check_compatibility(&self.catalog, name, &filter)
    }

    /// Move `dragged_id` next to `target_id`
    pub fn drop_on_node(&mut self, dragged_id: &str, target_id: &str) -> bool {
        match self.plan_node_drop(dragged_id, target_id) {
            Some(plan) => self.apply_move(plan, target_id),
            None => rejected(dragged_id, target_id),
        }
    }

    /// Move `dragged_id` in front of the target of `edge_id`
    pub fn drop_on_edge(&mut self, dragged_id: &str, edge_id: &str) -> bool {
        match self.plan_edge_drop(dragged_id, edge_id) {
            Some(plan) => self.apply_move(plan, edge_id),
            None => rejected(dragged_id, edge_id),
        }
    }

    fn apply_move(&mut self, plan: MovePlan, target_id: &str) -> bool {
        let before = self.document.clone();
        let result = execute_move(&mut self.document, &plan);
        match self.settle(before, result) {
            Ok(()) => {
                log::debug!(
                    "Moved '{}' {:?} relative to '{}' ({:?})",
                    plan.dragged,
                    plan.mode,
                    plan.anchor,
                    plan.direction
                );
                true
            }
            Err(e) => {
                log::warn!("Drop of '{}' on '{}' failed: {}", plan.dragged, target_id, e);
                self.sink.report(CanvasEvent::DropFailed {
                    dragged_id: plan.dragged.clone(),
                    target_id: target_id.to_string(),
                    error: e.to_string(),
                });
                false
            }
        }
    }

    /// Start dragging `node_id` from `position` (absolute box origin)
    ///
    /// Inert unless drag and drop is enabled and the node is draggable.
    pub fn start_drag(&mut self, node_id: &str, position: (f64, f64)) -> bool {
        let draggable = self.settings.experimental_features.enable_drag_and_drop
            && self
                .locate(node_id)
                .is_some_and(|(flow, handle)| flow.can_drag_node(handle));
        self.drag.start(node_id, position, draggable)
    }

    /// Move the dragged node; returns the drop target under it
    pub fn drag_to(&mut self, position: (f64, f64)) -> Option<DropTarget> {
        let dragged = self.drag.dragged()?.to_string();
        let target = self.find_drop_target(&dragged, position);
        self.drag.update(position, target.clone());
        target
    }

    /// Release the dragged node
    pub fn drop_drag(&mut self) -> bool {
        match self.drag.finish() {
            DragOutcome::Dropped {
                node_id,
                target: DropTarget::Node(target),
            } => self.drop_on_node(&node_id, &target),
            DragOutcome::Dropped {
                node_id,
                target: DropTarget::Edge(edge),
            } => self.drop_on_edge(&node_id, &edge),
            DragOutcome::Rejected | DragOutcome::Inert => false,
        }
    }

    pub fn cancel_drag(&mut self) {
        self.drag.cancel();
    }

    /// An edge under the dragged box wins over the nearest node
    fn find_drop_target(&self, dragged: &str, position: (f64, f64)) -> Option<DropTarget> {
        let rects = absolute_rects(&self.positions);
        let layout = &self.settings.layout;
        let (width, height) = rects
            .get(dragged)
            .map(|r| (r.width, r.height))
            .unwrap_or((layout.default_node_width, layout.default_node_height + layout.label_height));
        let dragged_box = Rect {
            x: position.0,
            y: position.1,
            width,
            height,
        };

        let edges = self
            .graph
            .edges
            .iter()
            .filter_map(|e| Some((e.id.as_str(), *rects.get(e.source.as_str())?, *rects.get(e.target.as_str())?)))
            .filter(|(id, _, _)| self.plan_edge_drop(dragged, id).is_some());
        if let Some(edge) = edge_under(dragged_box, edges) {
            return Some(DropTarget::Edge(edge.to_string()));
        }

        let nodes = self
            .graph
            .nodes
            .iter()
            .filter(|n| n.id != dragged)
            .filter_map(|n| Some((n.id.as_str(), *rects.get(n.id.as_str())?)))
            .filter(|(id, _)| self.plan_node_drop(dragged, id).is_some());
        nearest_node(position, nodes, self.settings.drop_distance).map(|id| DropTarget::Node(id.to_string()))
    }

    // History

    pub fn undo(&mut self) -> bool {
        let restored = self.history.undo();
        self.restore(restored)
    }

    pub fn redo(&mut self) -> bool {
        let restored = self.history.redo();
        self.restore(restored)
    }

    fn restore(&mut self, snapshot: Option<Result<FlowDocument>>) -> bool {
        match snapshot {
            Some(Ok(document)) => {
                self.document = document;
                self.invalidate();
                true
            }
            Some(Err(e)) => {
                log::warn!("Failed to restore snapshot: {}", e);
                false
            }
            None => false,
        }
    }
}

/// Incompatible drops are not failures; they only leave a debug trace
fn rejected(dragged: &str, target: &str) -> bool {
    let reason = CanvasError::IncompatibleDrop {
        dragged: dragged.to_string(),
        target: target.to_string(),
    };
    log::debug!("{}", reason);
    false
}

fn locate_mut<'d>(document: &'d mut FlowDocument, node_id: &str) -> Option<(&'d mut VisualFlow, NodeHandle)> {
    let entity_id = document
        .flows()
        .find(|f| f.find_by_id(node_id).is_some())?
        .id()
        .to_string();
    let flow = document.entity_mut(&entity_id)?;
    let handle = flow.find_by_id(node_id)?;
    Some((flow, handle))
}

/// Definition of the node, the entity body for a flow root
fn definition_at<'e>(entity: &'e VisualEntity, data: &NodeData) -> Option<&'e Value> {
    if data.is_root() {
        Some(entity.root())
    } else {
        entity.step_definition(&data.path)
    }
}

/// Whether `inner` is `outer` or one of its descendants
fn encloses(outer: &NodeData, inner: &NodeData) -> bool {
    outer.entity_id == inner.entity_id
        && (inner.path == outer.path || inner.path.starts_with(&format!("{}.", outer.path)))
}

fn removal_for(flow: &VisualFlow, handle: NodeHandle) -> Option<Removal> {
    let interaction = flow.node_interaction(handle);
    if interaction.can_remove_step {
        Some(Removal::Step)
    } else if interaction.can_remove_flow {
        Some(Removal::Flow(flow.id().to_string()))
    } else {
        None
    }
}

fn remove_node(document: &mut FlowDocument, node_id: &str, removal: &Removal) -> Result<()> {
    match removal {
        Removal::Step => {
            let (flow, handle) =
                locate_mut(document, node_id).ok_or_else(|| CanvasError::UnresolvedReference(node_id.to_string()))?;
            if flow.remove_child(handle)? {
                Ok(())
            } else {
                Err(CanvasError::invalid_path(node_id, "step cannot be removed"))
            }
        }
        Removal::Flow(id) => match document.remove_entity(Some(&[id.as_str()][..])) {
            0 => Err(CanvasError::UnknownEntity(id.clone())),
            _ => Ok(()),
        },
    }
}

/// Paste then remove when moving forward; remove then paste when moving
/// backward, so the path of whichever side runs second stays valid
fn execute_move(document: &mut FlowDocument, plan: &MovePlan) -> Result<()> {
    let insert = |document: &mut FlowDocument| -> Result<()> {
        let (flow, handle) = locate_mut(document, &plan.anchor)
            .ok_or_else(|| CanvasError::UnresolvedReference(plan.anchor.clone()))?;
        flow.add_base_entity_step(handle, plan.mode, &plan.content)
    };

    match plan.direction {
        DragDirection::Forward => {
            insert(document)?;
            remove_node(document, &plan.dragged, &plan.removal)
        }
        DragDirection::Backward => {
            remove_node(document, &plan.dragged, &plan.removal)?;
            insert(document)
        }
    }
}

/// Clipboard-shaped content for a fresh step made from a catalog tile
fn new_step_content(
    entity_type: EntityType,
    tile: &Tile,
    mode: AddStepMode,
    data: &NodeData,
    taken: &mut HashSet<String>,
) -> ClipboardPayload {
    let uri = match tile.kind {
        CatalogKind::Component => Some(format!("{}:", tile.name)),
        CatalogKind::Kamelet => Some(format!("kamelet:{}", tile.name)),
        CatalogKind::Processor | CatalogKind::Entity => None,
    };
    let replaces_entry = mode == AddStepMode::ReplaceStep && data.processor_name == "from";

    match uri {
        Some(uri) if replaces_entry => ClipboardPayload::new(entity_type, tile.name.clone(), json!({ "uri": uri })),
        Some(uri) => ClipboardPayload::new(
            entity_type,
            "to",
            json!({ "id": ids::unique_id("to", taken), "uri": uri }),
        ),
        None => ClipboardPayload::new(
            entity_type,
            tile.name.clone(),
            json!({ "id": ids::unique_id(&tile.name, taken) }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::RouteBuilder;
    use crate::events::VecDiagnosticSink;
    use crate::layout::LayoutGraph;
    use async_trait::async_trait;

    const LOG: &str = "route-1|route.from.steps.0.log";
    const SET_BODY: &str = "route-1|route.from.steps.1.setBody";
    const TO: &str = "route-1|route.from.steps.2.to";

    struct FailingEngine;

    #[async_trait]
    impl LayoutEngine for FailingEngine {
        async fn layout(&self, _graph: LayoutGraph) -> Result<LayoutGraph> {
            Err(CanvasError::layout("rejected"))
        }
    }

    fn route(id: &str) -> Value {
        json!({
            "route": RouteBuilder::new(id)
                .from("timer:tick")
                .step("log", json!({"id": format!("{}-log", id), "message": "hello"}))
                .step("setBody", json!({"id": format!("{}-body", id), "constant": "x"}))
                .step("to", json!({"id": format!("{}-to", id), "uri": "mock:out"}))
                .into_value()
        })
    }

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn canvas(routes: &[&str]) -> (FlowCanvas, Arc<VecDiagnosticSink>) {
        init_logging();
        let document = FlowDocument::from_value(&Value::Array(routes.iter().map(|id| route(id)).collect())).unwrap();
        let sink = Arc::new(VecDiagnosticSink::new());
        let canvas = FlowCanvas::new(document, CanvasSettings::default().with_drag_and_drop(true))
            .unwrap()
            .with_sink(sink.clone());
        (canvas, sink)
    }

    fn steps(canvas: &FlowCanvas, entity: &str) -> Vec<String> {
        canvas.document().entity(entity).unwrap().entity().root()["from"]["steps"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|step| step.as_object()?.keys().next().cloned())
            .collect()
    }

    #[tokio::test]
    async fn test_mutation_clears_then_rebuilds() {
        let (mut canvas, sink) = canvas(&["route-1"]);
        assert!(canvas.on_animation_frame().await);
        assert_eq!(canvas.canvas_model().nodes.len(), 5);
        assert!(!canvas.on_animation_frame().await);

        assert!(canvas.remove(LOG));
        assert!(canvas.canvas_model().is_empty());
        assert!(canvas.is_rebuild_pending());

        assert!(canvas.on_animation_frame().await);
        assert_eq!(canvas.canvas_model().nodes.len(), 4);
        assert!(canvas.canvas_model().node(LOG).is_none());
        assert_eq!(
            sink.events().last(),
            Some(&CanvasEvent::GraphRebuilt { nodes: 4, edges: 2 })
        );
    }

    #[tokio::test]
    async fn test_copy_paste_round_trip() {
        let (mut canvas, _) = canvas(&["route-1"]);
        let before = canvas.document().collect_ids();

        assert!(canvas.copy(LOG));
        assert_eq!(
            canvas.paste_menu_entries(TO),
            vec![AddStepMode::AppendStep]
        );
        assert!(canvas.paste(TO, AddStepMode::AppendStep));

        assert_eq!(steps(&canvas, "route-1"), vec!["log", "setBody", "to", "log"]);
        let flow = canvas.document().entity("route-1").unwrap();
        let original = flow.entity().step_definition("route.from.steps.0.log").unwrap();
        let pasted = flow.entity().step_definition("route.from.steps.3.log").unwrap();
        assert_eq!(pasted["message"], original["message"]);
        assert!(!before.contains(pasted["id"].as_str().unwrap()));

        // The slot is read non-destructively
        assert!(canvas.paste(TO, AddStepMode::AppendStep));
        assert_eq!(steps(&canvas, "route-1").len(), 5);
    }

    #[tokio::test]
    async fn test_paste_menu_hidden_when_incompatible() {
        let document = FlowDocument::from_value(&json!([{
            "route": RouteBuilder::new("route-1")
                .from("timer:tick")
                .choice(|c| c.when("${body}", |w| w.step("log", json!({}))))
                .into_value()
        }]))
        .unwrap();
        let mut canvas = FlowCanvas::new(document, CanvasSettings::default()).unwrap();
        let choice = "route-1|route.from.steps.0.choice";
        let when = "route-1|route.from.steps.0.choice.when.0";
        let log = "route-1|route.from.steps.0.choice.when.0.steps.0.log";

        assert!(canvas.paste_menu_entries(log).is_empty());

        assert!(canvas.copy(when));
        assert!(canvas.paste_menu_entries(log).is_empty());
        assert_eq!(
            canvas.paste_menu_entries(choice),
            vec![AddStepMode::InsertSpecialChildStep]
        );
        assert!(!canvas.paste(log, AddStepMode::AppendStep));
        assert!(canvas.paste(choice, AddStepMode::InsertSpecialChildStep));
        assert!(canvas.document().entity("route-1").unwrap().find_by_id(&format!("{}.when.1", choice)).is_some());
    }

    #[tokio::test]
    async fn test_clipboard_failures_reported() {
        let (mut canvas, sink) = canvas(&["route-1"]);

        assert!(!canvas.copy("route-1"));
        assert!(canvas.clipboard().is_empty());
        assert!(matches!(sink.events()[0], CanvasEvent::CopyFailed { .. }));

        canvas.clipboard().write_text("not a payload");
        let before = canvas.document().clone();
        assert!(!canvas.paste(TO, AddStepMode::AppendStep));
        assert_eq!(canvas.document(), &before);
        assert!(matches!(sink.events()[1], CanvasEvent::PasteFailed { .. }));
    }

    #[tokio::test]
    async fn test_add_step_from_catalog() {
        let (mut canvas, _) = canvas(&["route-1"]);
        let tiles: Vec<&str> = canvas
            .compatible_tiles(LOG, AddStepMode::AppendStep)
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert!(tiles.contains(&"kafka"));
        assert!(!tiles.contains(&"timer"));
        assert!(!tiles.contains(&"when"));

        assert!(canvas.add_step(LOG, AddStepMode::AppendStep, "kafka"));
        let flow = canvas.document().entity("route-1").unwrap();
        assert_eq!(flow.entity().step_definition("route.from.steps.1.to").unwrap()["uri"], "kafka:");

        assert!(!canvas.add_step(LOG, AddStepMode::AppendStep, "timer"));
        assert!(canvas.add_step("route-1|route.from", AddStepMode::ReplaceStep, "cron"));
        let from = &canvas.document().entity("route-1").unwrap().entity().root()["from"];
        assert_eq!(from["uri"], "cron:");
        assert_eq!(from["steps"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_remove_not_allowed_is_noop() {
        let (mut canvas, _) = canvas(&["route-1"]);
        let before = canvas.document().clone();
        assert!(!canvas.remove("route-1|missing"));
        assert_eq!(canvas.document(), &before);

        // A flow root removes the whole flow
        assert!(canvas.remove("route-1"));
        assert_eq!(canvas.document().flows().count(), 0);
    }

    #[tokio::test]
    async fn test_drop_forward_then_backward() {
        let (mut canvas, _) = canvas(&["route-1"]);

        assert!(canvas.drop_on_node(LOG, TO));
        assert_eq!(steps(&canvas, "route-1"), vec!["setBody", "to", "log"]);

        let log = "route-1|route.from.steps.2.log";
        let set_body = "route-1|route.from.steps.0.setBody";
        assert!(canvas.drop_on_node(log, set_body));
        assert_eq!(steps(&canvas, "route-1"), vec!["log", "setBody", "to"]);

        // Moves keep step ids
        let flow = canvas.document().entity("route-1").unwrap();
        assert_eq!(flow.entity().step_definition("route.from.steps.0.log").unwrap()["id"], "route-1-log");
    }

    #[tokio::test]
    async fn test_drop_across_flows() {
        let (mut canvas, _) = canvas(&["route-1", "route-2"]);
        assert!(canvas.drop_on_node(TO, "route-2|route.from.steps.0.log"));
        assert_eq!(steps(&canvas, "route-1"), vec!["log", "setBody"]);
        assert_eq!(steps(&canvas, "route-2"), vec!["log", "to", "setBody", "to"]);
    }

    #[tokio::test]
    async fn test_incompatible_drops_rejected() {
        let (mut canvas, sink) = canvas(&["route-1"]);
        let before = canvas.document().clone();

        assert!(!canvas.check_node_drop_compatibility(LOG, "route-1|route.from"));
        assert!(!canvas.check_node_drop_compatibility(LOG, "route-1"));
        assert!(!canvas.check_node_drop_compatibility(LOG, LOG));
        assert!(!canvas.drop_on_node("route-1|route.from", TO));
        assert_eq!(canvas.document(), &before);
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_drop_on_edge() {
        let (mut canvas, _) = canvas(&["route-1"]);
        canvas.on_animation_frame().await;

        let first = format!("route-1|route.from >>> {}", LOG);
        let middle = format!("{} >>> {}", LOG, SET_BODY);
        assert!(!canvas.can_drop_on_edge(LOG, &first));
        assert!(!canvas.can_drop_on_edge(LOG, &middle));
        assert!(!canvas.can_drop_on_edge(SET_BODY, &middle));

        assert!(canvas.drop_on_edge(TO, &middle));
        assert_eq!(steps(&canvas, "route-1"), vec!["log", "to", "setBody"]);
    }

    fn choice_canvas(route: Value) -> FlowCanvas {
        init_logging();
        let document = FlowDocument::from_value(&json!([{ "route": route }])).unwrap();
        FlowCanvas::new(document, CanvasSettings::default().with_drag_and_drop(true)).unwrap()
    }

    fn from_steps(canvas: &FlowCanvas) -> Value {
        canvas.document().entity("route-1").unwrap().entity().root()["from"]["steps"].clone()
    }

    fn expressions(choice: &Value) -> Vec<String> {
        choice["when"]
            .as_array()
            .unwrap()
            .iter()
            .map(|w| w["expression"]["simple"]["expression"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_drop_into_empty_branches() {
        let mut canvas = choice_canvas(
            RouteBuilder::new("route-1")
                .from("timer:tick")
                .step("log", json!({"id": "log-1", "message": "hello"}))
                .choice(|c| c.when("${header.a}", |w| w).otherwise(|o| o))
                .into_value(),
        );
        let log = "route-1|route.from.steps.0.log";
        let when_slot = "route-1|route.from.steps.1.choice.when.0.steps.0";
        let otherwise_slot = "route-1|route.from.steps.1.choice.otherwise.steps.0";
        assert!(canvas.check_node_drop_compatibility(log, when_slot));
        assert!(canvas.check_node_drop_compatibility(log, otherwise_slot));
        // Clauses do not fit inside a branch
        assert!(!canvas.check_node_drop_compatibility("route-1|route.from.steps.1.choice.when.0", otherwise_slot));

        assert!(canvas.drop_on_node(log, otherwise_slot));
        let steps = from_steps(&canvas);
        assert_eq!(steps.as_array().unwrap().len(), 1);
        assert_eq!(steps[0]["choice"]["otherwise"]["steps"][0]["log"]["id"], "log-1");

        let log = "route-1|route.from.steps.0.choice.otherwise.steps.0.log";
        let when_slot = "route-1|route.from.steps.0.choice.when.0.steps.0";
        assert!(canvas.drop_on_node(log, when_slot));
        let choice = &from_steps(&canvas)[0]["choice"];
        assert_eq!(choice["when"][0]["steps"][0]["log"]["id"], "log-1");
        assert!(choice["otherwise"]["steps"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drag_when_reorders_clauses() {
        let mut canvas = choice_canvas(
            RouteBuilder::new("route-1")
                .from("timer:tick")
                .choice(|c| {
                    c.when("${header.a}", |w| w)
                        .when("${header.b}", |w| w.step("to", json!({"id": "to-b", "uri": "mock:b"})))
                        .otherwise(|o| o)
                })
                .into_value(),
        );
        let first = "route-1|route.from.steps.0.choice.when.0";
        let second = "route-1|route.from.steps.0.choice.when.1";

        assert!(canvas.drop_on_node(first, second));
        let choice = &from_steps(&canvas)[0]["choice"];
        assert_eq!(expressions(choice), vec!["${header.b}", "${header.a}"]);
        assert_eq!(choice["when"][0]["steps"][0]["to"]["id"], "to-b");
        assert!(choice.get("otherwise").is_some());
    }

    #[tokio::test]
    async fn test_special_child_moves_between_choices() {
        let mut canvas = choice_canvas(
            RouteBuilder::new("route-1")
                .from("timer:tick")
                .choice(|c| {
                    c.when("${header.a}", |w| w.step("log", json!({"id": "log-a"})))
                        .otherwise(|o| o.step("log", json!({"id": "log-o"})))
                })
                .choice(|c| c.when("${header.b}", |w| w.step("log", json!({"id": "log-b"}))).otherwise(|o| o))
                .into_value(),
        );
        let first_when = "route-1|route.from.steps.0.choice.when.0";
        let first_otherwise = "route-1|route.from.steps.0.choice.otherwise";
        let second_when = "route-1|route.from.steps.1.choice.when.0";

        // The second choice already has its otherwise
        let before = canvas.document().clone();
        assert!(!canvas.check_node_drop_compatibility(first_otherwise, second_when));
        assert!(!canvas.drop_on_node(first_otherwise, second_when));
        assert_eq!(canvas.document(), &before);

        assert!(canvas.drop_on_node(first_when, second_when));
        let steps = from_steps(&canvas);
        assert!(steps[0]["choice"]["when"].as_array().unwrap().is_empty());
        assert_eq!(steps[0]["choice"]["otherwise"]["steps"][0]["log"]["id"], "log-o");
        assert_eq!(expressions(&steps[1]["choice"]), vec!["${header.b}", "${header.a}"]);
        assert_eq!(steps[1]["choice"]["when"][1]["steps"][0]["log"]["id"], "log-a");
    }

    #[tokio::test]
    async fn test_drop_on_edge_both_directions() {
        let (mut canvas, _) = canvas(&["route-1"]);
        canvas.on_animation_frame().await;

        // Backward: the dragged step is removed before it is inserted
        let first = format!("route-1|route.from >>> {}", LOG);
        assert!(canvas.drop_on_edge(TO, &first));
        assert_eq!(steps(&canvas, "route-1"), vec!["to", "log", "setBody"]);

        canvas.on_animation_frame().await;
        let to = "route-1|route.from.steps.0.to";
        let middle = "route-1|route.from.steps.1.log >>> route-1|route.from.steps.2.setBody";
        assert!(canvas.drop_on_edge(to, middle));
        assert_eq!(steps(&canvas, "route-1"), vec!["log", "to", "setBody"]);

        let flow = canvas.document().entity("route-1").unwrap();
        assert_eq!(flow.entity().step_definition("route.from.steps.1.to").unwrap()["id"], "route-1-to");
    }

    #[tokio::test]
    async fn test_failed_mutation_restores_document() {
        let (mut canvas, _) = canvas(&["route-1"]);
        let before = canvas.document().clone();
        canvas.document.add_entity(EntityType::Route);

        let result = canvas.settle(before.clone(), Err(CanvasError::layout("boom")));
        assert!(result.is_err());
        assert_eq!(canvas.document(), &before);
        assert!(!canvas.can_undo());
    }

    #[tokio::test]
    async fn test_update_document_rebuilds() {
        let (mut canvas, _) = canvas(&["route-1"]);
        canvas.on_animation_frame().await;

        let replacement = FlowDocument::from_value(&json!([route("route-1"), route("route-2")])).unwrap();
        canvas.update_document(replacement);
        assert!(canvas.canvas_model().is_empty());

        assert!(canvas.on_animation_frame().await);
        assert_eq!(canvas.visible_flows().visible_ids(), vec!["route-1", "route-2"]);
        assert!(canvas.canvas_model().node("route-2").is_some());
        assert!(canvas.can_undo());
    }

    #[tokio::test]
    async fn test_undo_redo() {
        let (mut canvas, _) = canvas(&["route-1"]);
        assert!(!canvas.undo());

        assert!(canvas.remove(LOG));
        assert_eq!(steps(&canvas, "route-1"), vec!["setBody", "to"]);

        assert!(canvas.undo());
        assert_eq!(steps(&canvas, "route-1"), vec!["log", "setBody", "to"]);
        assert!(canvas.is_rebuild_pending());

        assert!(canvas.redo());
        assert_eq!(steps(&canvas, "route-1"), vec!["setBody", "to"]);
        assert!(!canvas.can_redo());
    }

    #[tokio::test]
    async fn test_layout_failure_falls_back() {
        let (canvas, sink) = canvas(&["route-1"]);
        let mut canvas = canvas.with_layout_engine(Arc::new(FailingEngine));

        assert!(canvas.on_animation_frame().await);
        assert_eq!(canvas.canvas_model().nodes.len(), 5);
        assert!(check_complete(canvas.graph(), canvas.positions()).is_ok());
        assert!(matches!(sink.events()[0], CanvasEvent::LayoutFailed { .. }));

        // Previous positions are reused while they still cover the graph
        let previous = canvas.positions().to_vec();
        canvas.remove(TO);
        assert!(canvas.on_animation_frame().await);
        assert_eq!(canvas.positions(), previous.as_slice());
    }

    #[tokio::test]
    async fn test_hidden_flows_not_rendered() {
        let (mut canvas, _) = canvas(&["route-1", "route-2"]);
        canvas.update_visible_flows(|flows| flows.hide("route-2"));
        canvas.on_animation_frame().await;

        assert!(canvas.canvas_model().node("route-1").is_some());
        assert!(canvas.canvas_model().node("route-2").is_none());
        assert_eq!(canvas.pipeline_flow().primary_pipeline, "route-1");
    }

    #[tokio::test]
    async fn test_drag_gesture_drops_on_nearest_node() {
        let (mut canvas, _) = canvas(&["route-1"]);
        canvas.on_animation_frame().await;

        let rects = absolute_rects(canvas.positions());
        let target = rects[TO];
        assert!(canvas.start_drag(LOG, (rects[LOG].x, rects[LOG].y)));
        assert_eq!(
            canvas.drag_to((target.x, target.y)),
            Some(DropTarget::Node(TO.to_string()))
        );
        assert!(canvas.drop_drag());
        assert_eq!(steps(&canvas, "route-1"), vec!["setBody", "to", "log"]);
        assert_eq!(canvas.drag_state(), &DragState::Idle);
    }

    #[test]
    fn test_drag_disabled_is_inert() {
        let document = FlowDocument::from_value(&Value::Array(vec![route("route-1")])).unwrap();
        let mut canvas = FlowCanvas::new(document, CanvasSettings::default()).unwrap();
        assert!(tokio_test::block_on(canvas.on_animation_frame()));

        assert!(!canvas.start_drag(LOG, (0.0, 0.0)));
        assert_eq!(canvas.drag_to((0.0, 0.0)), None);
        assert!(!canvas.drop_drag());
    }
}
