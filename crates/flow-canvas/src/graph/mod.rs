//! Graph building
//!
//! A single depth-first traversal turns a node tree into a neutral
//! [`FlowGraph`]: a flat node list where groups follow their children, and
//! one edge per chained pair. The backend adapters in [`canvas`] and
//! [`pipeline`] only map that neutral graph; they never walk the tree.
//!
//! Malformed trees never make the traversal fail. Cycles, duplicate ids and
//! dangling references are skipped and reported to the diagnostic sink.

pub mod canvas;
pub mod pipeline;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::NodeLabelType;
use crate::events::{CanvasEvent, DiagnosticSink};
use crate::node::{NodeData, NodeHandle, NodeTree, VisualFlow};

/// Whether a graph node contains other nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GraphNodeKind {
    Node,
    Group,
}

/// A node of the neutral graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub kind: GraphNodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Ids of emitted children, in document order
    pub children: Vec<String>,
    /// Id of the previous chained node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Id of the next chained node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub label: String,
    pub data: NodeData,
    pub last_update: u64,
}

/// An edge between two chained nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}

impl GraphEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let (source, target) = (source.into(), target.into());
        Self {
            id: format!("{} >>> {}", source, target),
            source,
            target,
        }
    }
}

/// Neutral graph shared by every backend adapter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl FlowGraph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Nodes without a parent, in emission order
    pub fn roots(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(|n| n.parent_id.is_none())
    }

    /// Emitted children of `id`, in document order
    pub fn children_of<'a>(&'a self, id: &str) -> Vec<&'a GraphNode> {
        self.node(id)
            .map(|n| n.children.iter().filter_map(|c| self.node(c)).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Builds neutral graphs
///
/// All accumulators are local to one call, so a builder can be shared
/// between threads and reused for independent trees.
pub struct GraphBuilder<'a> {
    sink: &'a dyn DiagnosticSink,
    label_type: NodeLabelType,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(sink: &'a dyn DiagnosticSink) -> Self {
        Self {
            sink,
            label_type: NodeLabelType::Id,
        }
    }

    pub fn with_label_type(mut self, label_type: NodeLabelType) -> Self {
        self.label_type = label_type;
        self
    }

    /// Traverse a tree from its root
    pub fn build(&self, tree: &NodeTree) -> FlowGraph {
        let mut emitted = HashSet::new();
        self.build_tree(tree, &mut emitted)
    }

    /// Traverse a flow and label its nodes
    pub fn build_flow(&self, flow: &VisualFlow) -> FlowGraph {
        let mut emitted = HashSet::new();
        self.build_labelled(flow, &mut emitted)
    }

    /// Traverse several flows into one graph
    ///
    /// Ids are unique across the whole result, first flow wins.
    pub fn build_flows<'f>(&self, flows: impl IntoIterator<Item = &'f VisualFlow>) -> FlowGraph {
        let mut emitted = HashSet::new();
        let mut graph = FlowGraph::default();
        for flow in flows {
            let part = self.build_labelled(flow, &mut emitted);
            graph.nodes.extend(part.nodes);
            graph.edges.extend(part.edges);
        }
        graph
    }

    fn build_labelled(&self, flow: &VisualFlow, emitted: &mut HashSet<String>) -> FlowGraph {
        let mut graph = self.build_tree(flow.tree(), emitted);
        for node in &mut graph.nodes {
            node.label = flow.entity().node_label(&node.data, self.label_type);
        }
        graph
    }

    fn build_tree(&self, tree: &NodeTree, emitted: &mut HashSet<String>) -> FlowGraph {
        let mut traversal = Traversal {
            tree,
            sink: self.sink,
            visited: HashSet::new(),
            emitted,
            emitted_handles: HashSet::new(),
            pending_edges: Vec::new(),
            nodes: Vec::new(),
        };
        if let Some(root) = tree.root() {
            traversal.visit(root, None);
        }

        let Traversal {
            mut nodes,
            pending_edges,
            emitted_handles,
            ..
        } = traversal;

        // Chain targets dropped later in the walk take their edge with them
        let edges: Vec<GraphEdge> = pending_edges
            .into_iter()
            .filter(|(target, _)| emitted_handles.contains(target))
            .map(|(_, edge)| edge)
            .collect();
        for node in &mut nodes {
            if !edges.iter().any(|e| e.source == node.id) {
                node.output = None;
            }
            if !edges.iter().any(|e| e.target == node.id) {
                node.input = None;
            }
        }

        log::debug!("Built graph with {} nodes and {} edges", nodes.len(), edges.len());
        FlowGraph { nodes, edges }
    }
}

struct Traversal<'t, 'e> {
    tree: &'t NodeTree,
    sink: &'t dyn DiagnosticSink,
    visited: HashSet<NodeHandle>,
    emitted: &'e mut HashSet<String>,
    emitted_handles: HashSet<NodeHandle>,
    pending_edges: Vec<(NodeHandle, GraphEdge)>,
    nodes: Vec<GraphNode>,
}

impl Traversal<'_, '_> {
    /// Emit `handle` and its subtree; returns the emitted id
    fn visit(&mut self, handle: NodeHandle, parent_id: Option<&str>) -> Option<String> {
        let tree = self.tree;
        let Some(node) = tree.get(handle) else {
            log::warn!("Skipping unresolved node #{}", handle.index());
            self.sink.report(CanvasEvent::UnresolvedReference {
                node_id: parent_id.unwrap_or_default().to_string(),
                reference: format!("#{}", handle.index()),
            });
            return None;
        };

        if !self.visited.insert(handle) {
            log::warn!("Cycle detected at node '{}'", node.id);
            self.sink.report(CanvasEvent::CycleDetected {
                node_id: node.id.clone(),
            });
            return None;
        }

        if !self.emitted.insert(node.id.clone()) {
            log::warn!("Dropping duplicate node id '{}' at {}", node.id, node.data.path);
            self.sink.report(CanvasEvent::DuplicateNodeId {
                node_id: node.id.clone(),
                path: node.data.path.clone(),
            });
            return None;
        }
        self.emitted_handles.insert(handle);

        if let Some(declared) = node.parent() {
            if tree.get(declared).is_none() {
                log::warn!("Node '{}' has an unreachable parent", node.id);
                self.sink.report(CanvasEvent::UnresolvedReference {
                    node_id: node.id.clone(),
                    reference: format!("#{}", declared.index()),
                });
            }
        }

        let kind = if node.data.is_group && !node.children().is_empty() {
            GraphNodeKind::Group
        } else {
            GraphNodeKind::Node
        };

        let mut children = Vec::new();
        if kind == GraphNodeKind::Group {
            for child in node.children() {
                if let Some(child_id) = self.visit(*child, Some(&node.id)) {
                    children.push(child_id);
                }
            }
        }

        let input = node.previous().and_then(|h| tree.get(h)).map(|n| n.id.clone());
        let output = node.next().and_then(|h| tree.get(h).map(|n| (h, n.id.clone())));
        if let Some((next, next_id)) = &output {
            self.pending_edges
                .push((*next, GraphEdge::new(node.id.clone(), next_id.clone())));
        }

        self.nodes.push(GraphNode {
            id: node.id.clone(),
            kind,
            parent_id: parent_id.map(str::to_string),
            children,
            input,
            output: output.map(|(_, id)| id),
            label: node.id.clone(),
            data: node.data.clone(),
            last_update: node.last_update,
        });
        Some(node.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::RouteBuilder;
    use crate::entity::EntityType;
    use crate::events::{NullDiagnosticSink, VecDiagnosticSink};
    use serde_json::json;

    fn flow() -> VisualFlow {
        VisualFlow::new(
            RouteBuilder::new("route-1")
                .from("timer:tick")
                .step("log", json!({"id": "log-1"}))
                .choice(|c| {
                    c.when("${body}", |w| w.step("to", json!({"uri": "mock:a"})).step("log", json!({})))
                        .otherwise(|o| o)
                })
                .step("to", json!({"uri": "mock:end"}))
                .build(),
        )
    }

    fn chained_pairs(tree: &NodeTree) -> usize {
        tree.iter().filter(|(_, n)| n.next().is_some()).count()
    }

    #[test]
    fn test_every_node_once() {
        let flow = flow();
        let graph = GraphBuilder::new(&NullDiagnosticSink).build(flow.tree());

        assert_eq!(graph.nodes.len(), flow.tree().len());
        let ids: HashSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids.len(), graph.nodes.len());
        assert_eq!(graph.edges.len(), chained_pairs(flow.tree()));
    }

    #[test]
    fn test_children_before_group() {
        let graph = GraphBuilder::new(&NullDiagnosticSink).build(flow().tree());
        let position = |id: &str| graph.nodes.iter().position(|n| n.id == id).unwrap();

        let choice = position("route-1|route.from.steps.1.choice");
        let when = position("route-1|route.from.steps.1.choice.when.0");
        assert!(when < choice);
        assert_eq!(graph.nodes.last().unwrap().id, "route-1");

        let choice_node = &graph.nodes[choice];
        assert_eq!(choice_node.kind, GraphNodeKind::Group);
        assert_eq!(
            choice_node.children,
            vec![
                "route-1|route.from.steps.1.choice.when.0",
                "route-1|route.from.steps.1.choice.otherwise",
            ]
        );
        assert_eq!(graph.nodes[when].parent_id.as_deref(), Some("route-1|route.from.steps.1.choice"));
    }

    #[test]
    fn test_edges_follow_chain() {
        let graph = GraphBuilder::new(&NullDiagnosticSink).build(flow().tree());
        let edge = graph
            .edges
            .iter()
            .find(|e| e.source == "route-1|route.from")
            .unwrap();
        assert_eq!(edge.target, "route-1|route.from.steps.0.log");
        assert_eq!(edge.id, "route-1|route.from >>> route-1|route.from.steps.0.log");
    }

    #[test]
    fn test_build_is_deterministic() {
        let flow = flow();
        let builder = GraphBuilder::new(&NullDiagnosticSink);
        let a = serde_json::to_string(&builder.build_flow(&flow)).unwrap();
        let b = serde_json::to_string(&builder.build_flow(&flow)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicate_id_first_wins() {
        let mut tree = NodeTree::new();
        let root = tree.add("root", NodeData::root("r", EntityType::Route));
        let a = tree.add("dup", NodeData::step("r", EntityType::Route, "route.from.steps.0.log", "log"));
        let b = tree.add("dup", NodeData::step("r", EntityType::Route, "route.from.steps.1.log", "log"));
        tree.attach(root, a);
        tree.attach(root, b);
        tree.link(a, b);

        let sink = VecDiagnosticSink::new();
        let graph = GraphBuilder::new(&sink).build(&tree);

        let dups: Vec<_> = graph.nodes.iter().filter(|n| n.id == "dup").collect();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].data.path, "route.from.steps.0.log");
        assert_eq!(graph.node("root").unwrap().children, vec!["dup"]);
        assert!(graph.edges.iter().all(|e| e.source != e.target));
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, CanvasEvent::DuplicateNodeId { node_id, .. } if node_id == "dup")));
    }

    #[test]
    fn test_cycle_is_skipped() {
        let mut tree = NodeTree::new();
        let root = tree.add("root", NodeData::root("r", EntityType::Route));
        let group = tree.add("filter", NodeData::step("r", EntityType::Route, "route.from.steps.0.filter", "filter"));
        tree.attach(root, group);
        tree.attach(group, root);

        let sink = VecDiagnosticSink::new();
        let graph = GraphBuilder::new(&sink).build(&tree);

        assert_eq!(graph.nodes.len(), 2);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, CanvasEvent::CycleDetected { node_id } if node_id == "root")));
    }

    #[test]
    fn test_multiple_flows() {
        let other = VisualFlow::new(
            RouteBuilder::new("route-2")
                .from("direct:a")
                .step("log", json!({}))
                .build(),
        );
        let flows = [flow(), other];
        let graph = GraphBuilder::new(&NullDiagnosticSink).build_flows(flows.iter());
        assert_eq!(graph.roots().count(), 2);
        assert_eq!(graph.node("route-2|route.from").unwrap().label, "direct:a");
    }
}
