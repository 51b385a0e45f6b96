//! Parent-id containment adapter
//!
//! Maps the neutral graph to a node/edge model where containers are
//! `cgroup` nodes and children point at them through `parentId`. Parents
//! must precede their children in the node list.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{FlowGraph, GraphNodeKind};
use crate::layout::{PositionedNode, Rect};
use crate::node::NodeData;

/// Node of the containment model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasNode {
    pub id: String,
    /// `node` or `cgroup`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// `parent` when the node must stay inside its container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extent: Option<String>,
    pub position: Point,
    pub width: f64,
    pub height: f64,
    pub data: CanvasNodeData,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasNodeData {
    pub label: String,
    pub viz_node: NodeData,
    pub last_update: u64,
}

/// Edge of the containment model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasEdge {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    pub target: String,
}

/// Complete containment model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanvasModel {
    pub nodes: Vec<CanvasNode>,
    pub edges: Vec<CanvasEdge>,
}

impl CanvasModel {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&CanvasNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Map a neutral graph and its positions to the containment model
///
/// Nodes without a position sit at the origin with a zero size.
pub fn to_canvas(graph: &FlowGraph, positions: &[PositionedNode]) -> CanvasModel {
    let rects: HashMap<&str, Rect> = positions.iter().map(|p| (p.id.as_str(), p.rect)).collect();
    let parents: HashMap<&str, &str> = graph
        .nodes
        .iter()
        .filter_map(|n| n.parent_id.as_deref().map(|p| (n.id.as_str(), p)))
        .collect();
    let depth = |id: &str| {
        let mut depth = 0;
        let mut current = id;
        while let Some(parent) = parents.get(current) {
            depth += 1;
            current = *parent;
            if depth > parents.len() {
                break;
            }
        }
        depth
    };

    let mut nodes: Vec<(usize, CanvasNode)> = graph
        .nodes
        .iter()
        .map(|node| {
            let rect = rects.get(node.id.as_str()).copied().unwrap_or_default();
            let canvas = CanvasNode {
                id: node.id.clone(),
                kind: match node.kind {
                    GraphNodeKind::Group => "cgroup".to_string(),
                    GraphNodeKind::Node => "node".to_string(),
                },
                parent_id: node.parent_id.clone(),
                extent: node.parent_id.as_ref().map(|_| "parent".to_string()),
                position: Point { x: rect.x, y: rect.y },
                width: rect.width,
                height: rect.height,
                data: CanvasNodeData {
                    label: node.label.clone(),
                    viz_node: node.data.clone(),
                    last_update: node.last_update,
                },
            };
            (depth(&node.id), canvas)
        })
        .collect();
    nodes.sort_by_key(|(depth, _)| *depth);

    let edges = graph
        .edges
        .iter()
        .map(|e| CanvasEdge {
            id: e.id.clone(),
            kind: "smoothstep".to_string(),
            source: e.source.clone(),
            target: e.target.clone(),
        })
        .collect();

    CanvasModel {
        nodes: nodes.into_iter().map(|(_, n)| n).collect(),
        edges,
    }
}
