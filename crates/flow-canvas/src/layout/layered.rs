//! Built-in layered layout
//!
//! Containers are laid out bottom-up. Inside a container, each connected
//! component of the sibling edges is layered by longest path; components
//! are then packed into rows whose width follows the aspect ratio.

use std::collections::HashMap;

use async_trait::async_trait;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use petgraph::Direction;

use super::{LayoutEdge, LayoutEngine, LayoutGraph, LayoutNode, LayoutOptions};
use crate::config::LayoutDirection;
use crate::error::{CanvasError, Result};

/// Deterministic layered layout engine
#[derive(Debug, Clone, Default)]
pub struct LayeredLayout;

impl LayeredLayout {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LayoutEngine for LayeredLayout {
    async fn layout(&self, mut graph: LayoutGraph) -> Result<LayoutGraph> {
        let options = graph.layout_options.clone();
        layout_children(&mut graph.children, &graph.edges, &options)?;
        let padding = options.padding;
        for child in &mut graph.children {
            offset(child, padding.left, padding.top);
        }
        Ok(graph)
    }
}

fn offset(node: &mut LayoutNode, dx: f64, dy: f64) {
    node.x = Some(node.x.unwrap_or_default() + dx);
    node.y = Some(node.y.unwrap_or_default() + dy);
}

/// Size and position of one placed box along the layout axes
#[derive(Debug, Clone, Copy)]
struct Extent {
    /// Along the flow direction
    main: f64,
    /// Across the flow direction
    cross: f64,
}

fn extent(node: &LayoutNode, direction: LayoutDirection) -> Extent {
    let (width, height) = (node.width.unwrap_or_default(), node.height.unwrap_or_default());
    match direction {
        LayoutDirection::Down => Extent { main: height, cross: width },
        LayoutDirection::Right => Extent { main: width, cross: height },
    }
}

fn to_xy(main: f64, cross: f64, direction: LayoutDirection) -> (f64, f64) {
    match direction {
        LayoutDirection::Down => (cross, main),
        LayoutDirection::Right => (main, cross),
    }
}

/// Position `children` relative to the content origin; returns the content size
fn layout_children(children: &mut [LayoutNode], edges: &[LayoutEdge], options: &LayoutOptions) -> Result<(f64, f64)> {
    if children.is_empty() {
        return Ok((0.0, 0.0));
    }

    for child in children.iter_mut() {
        size_node(child)?;
    }

    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let index: HashMap<&str, NodeIndex> = children
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.as_str(), graph.add_node(i)))
        .collect();
    for edge in edges {
        let (Some(&source), Some(&target)) = (index.get(edge.source.as_str()), index.get(edge.target.as_str())) else {
            return Err(CanvasError::layout(format!("edge '{}' leaves its container", edge.id)));
        };
        graph.add_edge(source, target, ());
    }

    let order = toposort(&graph, None).map_err(|cycle| {
        let id = &children[graph[cycle.node_id()]].id;
        CanvasError::layout(format!("cycle through '{}'", id))
    })?;

    let mut layer = vec![0usize; children.len()];
    for idx in &order {
        let depth = graph
            .neighbors_directed(*idx, Direction::Incoming)
            .map(|p| layer[graph[p]] + 1)
            .max()
            .unwrap_or(0);
        layer[graph[*idx]] = depth;
    }

    let mut components = UnionFind::<usize>::new(children.len());
    for edge in graph.raw_edges() {
        components.union(graph[edge.source()], graph[edge.target()]);
    }

    // Higher priority first, then document order
    let mut ranked: Vec<usize> = (0..children.len()).collect();
    ranked.sort_by_key(|i| (std::cmp::Reverse(children[*i].layout_options.priority.unwrap_or(0)), *i));
    let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();
    for i in ranked {
        let rep = components.find(i);
        match groups.iter_mut().find(|(r, _)| *r == rep) {
            Some((_, members)) => members.push(i),
            None => groups.push((rep, vec![i])),
        }
    }

    let direction = options.direction;
    let mut placed: Vec<((f64, f64), Vec<(usize, f64, f64)>)> = Vec::new();
    for (_, mut members) in groups {
        members.sort_unstable();
        placed.push(layer_component(children, &members, &layer, options));
    }

    let area: f64 = placed.iter().map(|((w, h), _)| w * h).sum();
    let widest = placed.iter().map(|((w, _), _)| *w).fold(0.0, f64::max);
    let row_limit = (area * options.aspect_ratio.max(0.1)).sqrt().max(widest);

    let (mut cursor_x, mut cursor_y, mut row_height) = (0.0_f64, 0.0_f64, 0.0_f64);
    let (mut content_w, mut content_h) = (0.0_f64, 0.0_f64);
    for ((width, height), nodes) in placed {
        if cursor_x > 0.0 && cursor_x + width > row_limit {
            cursor_x = 0.0;
            cursor_y += row_height + options.layer_spacing;
            row_height = 0.0;
        }
        for (i, x, y) in nodes {
            children[i].x = Some(cursor_x + x);
            children[i].y = Some(cursor_y + y);
        }
        content_w = content_w.max(cursor_x + width);
        content_h = content_h.max(cursor_y + height);
        row_height = row_height.max(height);
        cursor_x += width + options.node_spacing;
    }

    log::debug!(
        "Laid out {} nodes ({:?}) in {:.0}x{:.0}",
        children.len(),
        direction,
        content_w,
        content_h
    );
    Ok((content_w, content_h))
}

/// Place the members of one component by layer; returns its size and the
/// member positions relative to the component origin
fn layer_component(
    children: &[LayoutNode],
    members: &[usize],
    layer: &[usize],
    options: &LayoutOptions,
) -> ((f64, f64), Vec<(usize, f64, f64)>) {
    let direction = options.direction;
    let depth = members.iter().map(|i| layer[*i]).max().unwrap_or(0) + 1;
    let mut layers: Vec<Vec<usize>> = vec![Vec::new(); depth];
    for i in members {
        layers[layer[*i]].push(*i);
    }

    let cross_size = |nodes: &[usize]| -> f64 {
        let sum: f64 = nodes.iter().map(|i| extent(&children[*i], direction).cross).sum();
        sum + options.node_spacing * nodes.len().saturating_sub(1) as f64
    };
    let total_cross = layers.iter().map(|l| cross_size(l.as_slice())).fold(0.0, f64::max);

    let mut positions = Vec::with_capacity(members.len());
    let mut main = 0.0;
    for nodes in &layers {
        let thickness = nodes
            .iter()
            .map(|i| extent(&children[*i], direction).main)
            .fold(0.0, f64::max);
        let mut cross = (total_cross - cross_size(nodes.as_slice())) / 2.0;
        for i in nodes {
            let e = extent(&children[*i], direction);
            let (x, y) = to_xy(main + (thickness - e.main) / 2.0, cross, direction);
            positions.push((*i, x, y));
            cross += e.cross + options.node_spacing;
        }
        main += thickness + options.layer_spacing;
    }
    let total_main = main - options.layer_spacing;

    (to_xy(total_main, total_cross, direction), positions)
}

/// Size a node, laying out its children first when it is a container
fn size_node(node: &mut LayoutNode) -> Result<()> {
    if node.children.is_empty() {
        if node.width.is_none() || node.height.is_none() {
            return Err(CanvasError::layout(format!("node '{}' has no size", node.id)));
        }
        return Ok(());
    }

    let options = node.layout_options.clone();
    let edges = std::mem::take(&mut node.edges);
    let result = layout_children(&mut node.children, &edges, &options);
    node.edges = edges;
    let (width, height) = result?;

    let padding = options.padding;
    for child in &mut node.children {
        offset(child, padding.left, padding.top);
    }
    node.width = Some(width + padding.left + padding.right);
    node.height = Some(height + padding.top + padding.bottom);
    Ok(())
}
