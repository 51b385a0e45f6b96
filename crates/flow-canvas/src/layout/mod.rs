//! Layout engine adapter
//!
//! The flat neutral graph is nested into a containment forest, handed to a
//! [`LayoutEngine`], and the nested result is flattened back into one
//! [`PositionedNode`] per graph node. Positions of nested nodes are relative
//! to their parent container.

pub mod layered;
pub mod scheduler;

pub use layered::LayeredLayout;
pub use scheduler::LayoutScheduler;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{LayoutDirection, LayoutSettings, Padding};
use crate::error::{CanvasError, Result};
use crate::graph::{FlowGraph, GraphNode, GraphNodeKind};

/// Options attached to every layout node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutOptions {
    pub direction: LayoutDirection,
    pub layer_spacing: f64,
    pub node_spacing: f64,
    pub aspect_ratio: f64,
    pub padding: Padding,
    /// Placement priority among siblings; higher goes first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

impl LayoutOptions {
    fn from_settings(settings: &LayoutSettings) -> Self {
        Self {
            direction: settings.direction,
            layer_spacing: settings.layer_spacing,
            node_spacing: settings.node_spacing,
            aspect_ratio: settings.aspect_ratio,
            padding: settings.padding,
            priority: None,
        }
    }
}

/// An edge handed to the layout engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}

/// A node of the nested layout input and output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutNode {
    pub id: String,
    pub layout_options: LayoutOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default)]
    pub children: Vec<LayoutNode>,
    /// Edges between direct children of this node
    #[serde(default)]
    pub edges: Vec<LayoutEdge>,
}

/// The root of a layout request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutGraph {
    pub id: String,
    pub layout_options: LayoutOptions,
    pub children: Vec<LayoutNode>,
    pub edges: Vec<LayoutEdge>,
}

/// Axis-aligned box
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// A graph node with its computed box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionedNode {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Relative to the parent container
    pub rect: Rect,
}

/// Computes geometry for a nested layout graph
#[async_trait]
pub trait LayoutEngine: Send + Sync {
    /// Fill `x`, `y`, `width` and `height` of every node
    async fn layout(&self, graph: LayoutGraph) -> Result<LayoutGraph>;
}

/// Nest a flat graph into a layout request
///
/// Only parentless nodes become roots; each carries its subtree inline.
/// Leaves without a measured size get the default size plus room for the
/// label.
pub fn to_layout_graph(graph: &FlowGraph, settings: &LayoutSettings, measured: &HashMap<String, (f64, f64)>) -> LayoutGraph {
    let options = LayoutOptions::from_settings(settings);
    let by_id: HashMap<&str, &GraphNode> = graph.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let roots: Vec<&GraphNode> = graph.roots().collect();
    let count = roots.len() as i64;
    let mut placed = HashSet::new();
    let children = roots
        .into_iter()
        .enumerate()
        .map(|(i, root)| {
            let mut node = nest(root, &by_id, graph, &options, settings, measured, &mut placed);
            node.layout_options.priority = Some(count - i as i64);
            node
        })
        .collect();

    LayoutGraph {
        id: "root".to_string(),
        layout_options: options,
        children,
        edges: edges_among(graph, graph.roots().map(|n| n.id.as_str())),
    }
}

fn nest(
    node: &GraphNode,
    by_id: &HashMap<&str, &GraphNode>,
    graph: &FlowGraph,
    options: &LayoutOptions,
    settings: &LayoutSettings,
    measured: &HashMap<String, (f64, f64)>,
    placed: &mut HashSet<String>,
) -> LayoutNode {
    placed.insert(node.id.clone());
    let mut layout = LayoutNode {
        id: node.id.clone(),
        layout_options: options.clone(),
        x: None,
        y: None,
        width: None,
        height: None,
        children: Vec::new(),
        edges: Vec::new(),
    };

    if node.kind == GraphNodeKind::Group {
        let children: Vec<&GraphNode> = node
            .children
            .iter()
            .filter_map(|c| by_id.get(c.as_str()).copied())
            .filter(|c| !placed.contains(&c.id))
            .collect();
        layout.edges = edges_among(graph, children.iter().map(|c| c.id.as_str()));
        layout.children = children
            .into_iter()
            .map(|c| nest(c, by_id, graph, options, settings, measured, placed))
            .collect();
    } else {
        let (width, height) = measured
            .get(&node.id)
            .copied()
            .unwrap_or((settings.default_node_width, settings.default_node_height));
        layout.width = Some(width);
        layout.height = Some(height + settings.label_height);
    }
    layout
}

fn edges_among<'a>(graph: &FlowGraph, ids: impl Iterator<Item = &'a str>) -> Vec<LayoutEdge> {
    let ids: HashSet<&str> = ids.collect();
    graph
        .edges
        .iter()
        .filter(|e| ids.contains(e.source.as_str()) && ids.contains(e.target.as_str()))
        .map(|e| LayoutEdge {
            id: e.id.clone(),
            source: e.source.clone(),
            target: e.target.clone(),
        })
        .collect()
}

/// Flatten a laid-out graph, parents before children
pub fn flatten(graph: &LayoutGraph) -> Result<Vec<PositionedNode>> {
    let mut out = Vec::new();
    for child in &graph.children {
        flatten_node(child, None, &mut out)?;
    }
    Ok(out)
}

fn flatten_node(node: &LayoutNode, parent_id: Option<&str>, out: &mut Vec<PositionedNode>) -> Result<()> {
    let (Some(x), Some(y), Some(width), Some(height)) = (node.x, node.y, node.width, node.height) else {
        return Err(CanvasError::layout(format!("node '{}' was not positioned", node.id)));
    };
    out.push(PositionedNode {
        id: node.id.clone(),
        parent_id: parent_id.map(str::to_string),
        rect: Rect { x, y, width, height },
    });
    for child in &node.children {
        flatten_node(child, Some(&node.id), out)?;
    }
    Ok(())
}

/// Lay out a graph with `engine`
///
/// Fails when the engine fails or leaves a graph node without a position.
pub async fn layout(
    engine: &dyn LayoutEngine,
    graph: &FlowGraph,
    settings: &LayoutSettings,
    measured: &HashMap<String, (f64, f64)>,
) -> Result<Vec<PositionedNode>> {
    let request = to_layout_graph(graph, settings, measured);
    let result = engine.layout(request).await?;
    let positioned = flatten(&result)?;
    check_complete(graph, &positioned)?;
    Ok(positioned)
}

/// Every graph node must have exactly one position
pub fn check_complete(graph: &FlowGraph, positioned: &[PositionedNode]) -> Result<()> {
    let ids: HashSet<&str> = positioned.iter().map(|p| p.id.as_str()).collect();
    match graph.nodes.iter().find(|n| !ids.contains(n.id.as_str())) {
        Some(missing) => Err(CanvasError::layout(format!("node '{}' missing from layout", missing.id))),
        None => Ok(()),
    }
}

/// Un-laid-out fallback: siblings stacked in a column inside their container
pub fn grid_positions(graph: &FlowGraph, settings: &LayoutSettings) -> Vec<PositionedNode> {
    let mut out = Vec::new();
    let mut y = settings.padding.top;
    for root in graph.roots() {
        let size = grid_node(graph, root, None, settings.padding.left, y, settings, &mut out);
        y += size.1 + settings.layer_spacing;
    }
    out
}

fn grid_node(
    graph: &FlowGraph,
    node: &GraphNode,
    parent_id: Option<&str>,
    x: f64,
    y: f64,
    settings: &LayoutSettings,
    out: &mut Vec<PositionedNode>,
) -> (f64, f64) {
    let index = out.len();
    out.push(PositionedNode {
        id: node.id.clone(),
        parent_id: parent_id.map(str::to_string),
        rect: Rect {
            x,
            y,
            width: settings.default_node_width,
            height: settings.default_node_height + settings.label_height,
        },
    });

    let children = graph.children_of(&node.id);
    if children.is_empty() {
        return (out[index].rect.width, out[index].rect.height);
    }

    let padding = settings.padding;
    let (mut width, mut cursor) = (0.0_f64, padding.top);
    for child in children {
        let size = grid_node(graph, child, Some(&node.id), padding.left, cursor, settings, out);
        width = width.max(size.0);
        cursor += size.1 + settings.node_spacing;
    }
    let size = (
        width + padding.left + padding.right,
        cursor - settings.node_spacing + padding.bottom,
    );
    out[index].rect.width = size.0;
    out[index].rect.height = size.1;
    size
}

/// Boxes in canvas coordinates, keyed by node id
///
/// Parents must precede their children, as produced by [`flatten`] and
/// [`grid_positions`]. A child whose parent is missing keeps its relative box.
pub fn absolute_rects(positioned: &[PositionedNode]) -> HashMap<String, Rect> {
    let mut out: HashMap<String, Rect> = HashMap::with_capacity(positioned.len());
    for node in positioned {
        let origin = node
            .parent_id
            .as_deref()
            .and_then(|p| out.get(p))
            .map(|r| (r.x, r.y))
            .unwrap_or((0.0, 0.0));
        out.insert(
            node.id.clone(),
            Rect {
                x: origin.0 + node.rect.x,
                y: origin.1 + node.rect.y,
                ..node.rect
            },
        );
    }
    out
}
