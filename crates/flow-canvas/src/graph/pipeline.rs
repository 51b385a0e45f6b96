//! Super-node pipeline adapter
//!
//! Maps the neutral graph to a pipeline-flow document: plain steps become
//! `binding` nodes, containers become `super_node`s referencing a
//! sub-pipeline, and chained steps are connected through input and output
//! ports. Every nesting level is its own pipeline; the level holding the
//! flow roots is the primary one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{FlowGraph, GraphNode, GraphNodeKind};
use crate::layout::{PositionedNode, Rect};
use crate::node::NodeData;

/// A link from a port to another node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortLink {
    pub id: String,
    pub node_id_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub links: Vec<PortLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubflowRef {
    pub pipeline_id_ref: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiData {
    pub label: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_expanded: Option<bool>,
    pub x_pos: f64,
    pub y_pos: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded_height: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppData {
    pub ui_data: UiData,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub group: bool,
    pub children: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_node: Option<String>,
    pub viz_node: NodeData,
}

/// A node of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineNode {
    pub id: String,
    /// `binding` or `super_node`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subflow_ref: Option<SubflowRef>,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    pub app_data: AppData,
}

/// One nesting level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    pub nodes: Vec<PipelineNode>,
    pub runtime_ref: String,
}

/// The pipeline-flow document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineFlow {
    pub id: String,
    pub primary_pipeline: String,
    pub pipelines: Vec<Pipeline>,
    pub doc_type: String,
    pub version: String,
}

/// Edge of the pipeline backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineEdge {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    pub target: String,
    pub edge_style: String,
}

fn port(node: &str, direction: &str, other: Option<&str>) -> Vec<Port> {
    other
        .map(|other| Port {
            id: format!("{}-{}-1", node, direction),
            links: vec![PortLink {
                id: format!("{} >>> {}", node, other),
                node_id_ref: other.to_string(),
            }],
        })
        .into_iter()
        .collect()
}

/// Map one neutral node
pub fn to_pipeline_node(node: &GraphNode, rect: Option<Rect>) -> PipelineNode {
    let is_group = node.kind == GraphNodeKind::Group;
    let rect = rect.unwrap_or_default();
    PipelineNode {
        id: node.id.clone(),
        kind: if is_group { "super_node" } else { "binding" }.to_string(),
        subflow_ref: is_group.then(|| SubflowRef {
            pipeline_id_ref: node.children.first().unwrap_or(&node.id).clone(),
        }),
        inputs: port(&node.id, "input", node.input.as_deref()),
        outputs: port(&node.id, "output", node.output.as_deref()),
        app_data: AppData {
            ui_data: UiData {
                label: node.label.clone(),
                image: node.data.icon.clone(),
                is_expanded: is_group.then_some(true),
                x_pos: rect.x,
                y_pos: rect.y,
                expanded_width: is_group.then_some(rect.width),
                expanded_height: is_group.then_some(rect.height),
            },
            group: is_group,
            children: node.children.clone(),
            parent_node: node.parent_id.clone(),
            viz_node: node.data.clone(),
        },
    }
}

/// Map the neutral edges
pub fn to_pipeline_edges(graph: &FlowGraph) -> Vec<PipelineEdge> {
    graph
        .edges
        .iter()
        .map(|e| PipelineEdge {
            id: e.id.clone(),
            kind: "edge".to_string(),
            source: e.source.clone(),
            target: e.target.clone(),
            edge_style: "solid".to_string(),
        })
        .collect()
}

/// Assemble the pipeline-flow document
///
/// Pipelines are listed level by level: the roots first, then the
/// children of each container in order. A pipeline takes the id of its
/// first node, which is what `subflow_ref.pipeline_id_ref` points at.
pub fn to_pipeline_flow(graph: &FlowGraph, positions: &[PositionedNode]) -> PipelineFlow {
    let rects: HashMap<&str, Rect> = positions.iter().map(|p| (p.id.as_str(), p.rect)).collect();
    let mut pipelines = Vec::new();
    append_pipelines(graph, graph.roots().collect(), &rects, &mut pipelines);

    PipelineFlow {
        id: "pipeline-1".to_string(),
        primary_pipeline: pipelines.first().map(|p: &Pipeline| p.id.clone()).unwrap_or_default(),
        pipelines,
        doc_type: "pipeline".to_string(),
        version: "3.0".to_string(),
    }
}

fn append_pipelines(graph: &FlowGraph, level: Vec<&GraphNode>, rects: &HashMap<&str, Rect>, out: &mut Vec<Pipeline>) {
    let Some(first) = level.first() else {
        return;
    };
    out.push(Pipeline {
        id: first.id.clone(),
        nodes: level
            .iter()
            .map(|n| to_pipeline_node(n, rects.get(n.id.as_str()).copied()))
            .collect(),
        runtime_ref: String::new(),
    });

    for node in level {
        let children = graph.children_of(&node.id);
        if !children.is_empty() {
            append_pipelines(graph, children, rects, out);
        }
    }
}
