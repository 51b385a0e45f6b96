//! Diagnostic events for graph building, clipboard and layout
//!
//! Structural anomalies never surface as errors to the render surface.
//! They are reported to a [`DiagnosticSink`] supplied by the host and the
//! canvas keeps going.

use serde::{Deserialize, Serialize};

/// Trait for receiving canvas diagnostics
///
/// This abstracts over wherever the host collects warnings (a log panel,
/// a channel, a test vector).
pub trait DiagnosticSink: Send + Sync {
    /// Report an event
    fn report(&self, event: CanvasEvent);
}

/// Events reported while the canvas builds, lays out or mutates a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CanvasEvent {
    /// A second node with an already emitted id was dropped
    #[serde(rename_all = "camelCase")]
    DuplicateNodeId { node_id: String, path: String },

    /// A node was reached again through its own descendants
    #[serde(rename_all = "camelCase")]
    CycleDetected { node_id: String },

    /// A parent or child reference did not resolve to a live node
    #[serde(rename_all = "camelCase")]
    UnresolvedReference { node_id: String, reference: String },

    /// Copying a node failed; the clipboard was left untouched
    #[serde(rename_all = "camelCase")]
    CopyFailed { node_id: String, error: String },

    /// Pasting failed; the document was left untouched
    #[serde(rename_all = "camelCase")]
    PasteFailed { node_id: String, error: String },

    /// A drag and drop mutation failed and was rolled back
    #[serde(rename_all = "camelCase")]
    DropFailed {
        dragged_id: String,
        target_id: String,
        error: String,
    },

    /// The layout engine rejected the graph
    #[serde(rename_all = "camelCase")]
    LayoutFailed { error: String },

    /// A layout result arrived after a newer request and was discarded
    #[serde(rename_all = "camelCase")]
    LayoutSuperseded { request: u64 },

    /// The render model was rebuilt from the document
    #[serde(rename_all = "camelCase")]
    GraphRebuilt { nodes: usize, edges: usize },
}

/// A no-op sink that discards all events
pub struct NullDiagnosticSink;

impl DiagnosticSink for NullDiagnosticSink {
    fn report(&self, _event: CanvasEvent) {}
}

/// A vector-based sink that collects events
///
/// Useful for testing to verify warnings were reported.
pub struct VecDiagnosticSink {
    events: parking_lot::Mutex<Vec<CanvasEvent>>,
}

impl VecDiagnosticSink {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<CanvasEvent> {
        self.events.lock().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecDiagnosticSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticSink for VecDiagnosticSink {
    fn report(&self, event: CanvasEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_sink_collects() {
        let sink = VecDiagnosticSink::new();
        sink.report(CanvasEvent::CycleDetected {
            node_id: "log-1".to_string(),
        });

        let events = sink.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            CanvasEvent::CycleDetected { node_id } => assert_eq!(node_id, "log-1"),
            _ => panic!("Expected CycleDetected event"),
        }

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_event_serializes_tagged() {
        let event = CanvasEvent::GraphRebuilt { nodes: 3, edges: 2 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "graphRebuilt");
        assert_eq!(json["nodes"], 3);
    }
}
