//! Drag gesture state and geometry

use serde::{Deserialize, Serialize};

use crate::layout::Rect;
use crate::node::NodeData;
use crate::path;

/// Relative document order of a dragged node and its drop target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DragDirection {
    /// The dragged node comes first
    Forward,
    /// The dragged node comes after the target
    Backward,
}

impl DragDirection {
    pub fn reverse(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }
}

/// Order of `dragged` relative to `target`
///
/// Paths are compared segment by segment; the first pair of numeric
/// segments that differ decides. Nodes of different entities always move
/// forward, and so do paths that never diverge on an index.
pub fn drag_and_drop_direction(dragged: &NodeData, target: &NodeData) -> DragDirection {
    if dragged.entity_id != target.entity_id {
        return DragDirection::Forward;
    }

    let a = path::segments(&dragged.path);
    let b = path::segments(&target.path);
    for (x, y) in a.iter().zip(b.iter()) {
        if x == y {
            continue;
        }
        if let (Ok(x), Ok(y)) = (x.parse::<usize>(), y.parse::<usize>()) {
            return if x < y {
                DragDirection::Forward
            } else {
                DragDirection::Backward
            };
        }
    }
    DragDirection::Forward
}

/// Where a dragged node would land
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum DropTarget {
    Node(String),
    Edge(String),
}

/// State of one drag gesture
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        node_id: String,
        /// Origin of the dragged box, absolute
        position: (f64, f64),
        target: Option<DropTarget>,
    },
}

/// How a gesture ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragOutcome {
    /// Dropped on a target; the caller applies the move
    Dropped { node_id: String, target: DropTarget },
    /// Released away from any compatible target
    Rejected,
    /// No gesture was in progress
    Inert,
}

/// Drag gesture state machine: `Idle -> Dragging -> Idle`
#[derive(Debug, Clone, Default)]
pub struct DragGesture {
    state: DragState,
}

impl DragGesture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn dragged(&self) -> Option<&str> {
        match &self.state {
            DragState::Dragging { node_id, .. } => Some(node_id),
            DragState::Idle => None,
        }
    }

    /// Begin dragging; a non-draggable node leaves the gesture idle
    pub fn start(&mut self, node_id: impl Into<String>, position: (f64, f64), draggable: bool) -> bool {
        if !draggable {
            self.state = DragState::Idle;
            return false;
        }
        self.state = DragState::Dragging {
            node_id: node_id.into(),
            position,
            target: None,
        };
        true
    }

    /// Record a new position and the target found for it
    pub fn update(&mut self, new_position: (f64, f64), new_target: Option<DropTarget>) {
        if let DragState::Dragging { position, target, .. } = &mut self.state {
            *position = new_position;
            *target = new_target;
        }
    }

    /// End the gesture
    pub fn finish(&mut self) -> DragOutcome {
        match std::mem::take(&mut self.state) {
            DragState::Dragging {
                node_id,
                target: Some(target),
                ..
            } => DragOutcome::Dropped { node_id, target },
            DragState::Dragging { target: None, .. } => DragOutcome::Rejected,
            DragState::Idle => DragOutcome::Inert,
        }
    }

    pub fn cancel(&mut self) {
        self.state = DragState::Idle;
    }
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (a.0 - b.0, a.1 - b.1);
    (dx * dx + dy * dy).sqrt()
}

/// Closest candidate strictly within `max_distance` of `origin`
///
/// Candidates are `(id, absolute box)`; distance is measured between box
/// origins. Ties keep the first candidate.
pub fn nearest_node<'a>(
    origin: (f64, f64),
    candidates: impl IntoIterator<Item = (&'a str, Rect)>,
    max_distance: f64,
) -> Option<&'a str> {
    candidates
        .into_iter()
        .map(|(id, rect)| (id, distance(origin, (rect.x, rect.y))))
        .filter(|(_, d)| *d < max_distance)
        .fold(None::<(&str, f64)>, |best, (id, d)| match best {
            Some((_, best_d)) if best_d <= d => best,
            _ => Some((id, d)),
        })
        .map(|(id, _)| id)
}

/// Edge whose midpoint lies under the dragged box, closest to its center
///
/// Candidates are `(id, source box, target box)` in absolute coordinates.
pub fn edge_under<'a>(
    dragged: Rect,
    candidates: impl IntoIterator<Item = (&'a str, Rect, Rect)>,
) -> Option<&'a str> {
    let center = dragged.center();
    let contains = |(x, y): (f64, f64)| {
        x >= dragged.x && x <= dragged.x + dragged.width && y >= dragged.y && y <= dragged.y + dragged.height
    };

    candidates
        .into_iter()
        .map(|(id, source, target)| {
            let (s, t) = (source.center(), target.center());
            (id, ((s.0 + t.0) / 2.0, (s.1 + t.1) / 2.0))
        })
        .filter(|(_, midpoint)| contains(*midpoint))
        .fold(None::<(&str, f64)>, |best, (id, midpoint)| {
            let d = distance(center, midpoint);
            match best {
                Some((_, best_d)) if best_d <= d => best,
                _ => Some((id, d)),
            }
        })
        .map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;

    fn data(entity: &str, path: &str) -> NodeData {
        let processor = path::last_segment(path).unwrap_or_default().to_string();
        NodeData::step(entity, EntityType::Route, path, processor)
    }

    fn rect(x: f64, y: f64) -> Rect {
        Rect {
            x,
            y,
            width: 100.0,
            height: 100.0,
        }
    }

    #[test]
    fn test_direction_by_index() {
        let a = data("route-1", "route.from.steps.0.log");
        let b = data("route-1", "route.from.steps.2.setHeader");
        assert_eq!(drag_and_drop_direction(&a, &b), DragDirection::Forward);
        assert_eq!(drag_and_drop_direction(&b, &a), DragDirection::Backward);
    }

    #[test]
    fn test_direction_is_antisymmetric_when_nested() {
        let paths = [
            "route.from.steps.0.log",
            "route.from.steps.1.choice.when.0.steps.0.log",
            "route.from.steps.1.choice.when.1.steps.0.to",
            "route.from.steps.3.to",
        ];
        for (i, x) in paths.iter().enumerate() {
            for y in &paths[i + 1..] {
                let (a, b) = (data("route-1", x), data("route-1", y));
                assert_eq!(drag_and_drop_direction(&a, &b), DragDirection::Forward);
                assert_eq!(
                    drag_and_drop_direction(&b, &a),
                    drag_and_drop_direction(&a, &b).reverse()
                );
            }
        }
    }

    #[test]
    fn test_direction_across_entities() {
        let a = data("route-1", "route.from.steps.1.choice.when.0.steps.0.log");
        let b = data("route-2", "route.from.steps.1.choice.otherwise.steps.0.log");
        assert_eq!(drag_and_drop_direction(&a, &b), DragDirection::Forward);
        assert_eq!(drag_and_drop_direction(&b, &a), DragDirection::Forward);

        let c = data("route-2", "route.from.steps.0.log");
        let d = data("route-1", "route.from.steps.5.log");
        assert_eq!(drag_and_drop_direction(&d, &c), DragDirection::Forward);
    }

    #[test]
    fn test_direction_without_numeric_divergence() {
        let a = data("route-1", "route.from.steps.1.choice.when.0.steps.0.log");
        let b = data("route-1", "route.from.steps.1.choice.otherwise.steps.0.log");
        assert_eq!(drag_and_drop_direction(&a, &b), DragDirection::Forward);
    }

    #[test]
    fn test_gesture_lifecycle() {
        let mut gesture = DragGesture::new();
        assert_eq!(gesture.finish(), DragOutcome::Inert);

        assert!(!gesture.start("from", (0.0, 0.0), false));
        assert!(!gesture.is_dragging());

        assert!(gesture.start("log", (0.0, 0.0), true));
        gesture.update((10.0, 10.0), Some(DropTarget::Node("to".to_string())));
        assert_eq!(gesture.dragged(), Some("log"));
        assert_eq!(
            gesture.finish(),
            DragOutcome::Dropped {
                node_id: "log".to_string(),
                target: DropTarget::Node("to".to_string()),
            }
        );
        assert_eq!(gesture.state(), &DragState::Idle);

        gesture.start("log", (0.0, 0.0), true);
        gesture.update((500.0, 500.0), None);
        assert_eq!(gesture.finish(), DragOutcome::Rejected);
    }

    #[test]
    fn test_nearest_node_bounded() {
        let candidates = vec![("far", rect(400.0, 0.0)), ("near", rect(30.0, 40.0)), ("nearer", rect(10.0, 0.0))];
        assert_eq!(nearest_node((0.0, 0.0), candidates.clone(), 150.0), Some("nearer"));
        assert_eq!(nearest_node((0.0, 0.0), candidates, 5.0), None);
    }

    #[test]
    fn test_edge_under_dragged_box() {
        let dragged = rect(0.0, 100.0);
        let edges = vec![
            ("hit", rect(0.0, 0.0), rect(0.0, 200.0)),
            ("miss", rect(500.0, 0.0), rect(500.0, 200.0)),
        ];
        assert_eq!(edge_under(dragged, edges), Some("hit"));
    }
}
