//! Flow Canvas - Visual editing core for integration flows
//!
//! This crate turns route, kamelet, route-configuration and REST
//! definitions into an editable tree of visualization nodes and renders
//! that tree as a graph. It supports:
//!
//! - Path-addressed step mutations (append, prepend, child, clause, replace, remove)
//! - Compatibility filtering of catalog tiles per insertion mode
//! - An injected single-slot clipboard with id regeneration on paste
//! - One traversal feeding two graph backends (parent-id and super-node)
//! - Async layout with a built-in layered engine and latest-wins scheduling
//! - Drag and drop, paste menus and compressed snapshot-based undo/redo
//!
//! # Architecture
//!
//! - `VisualFlow`: an entity definition and the node tree mapped from it
//! - `GraphBuilder`: depth-first traversal producing a neutral `FlowGraph`
//! - `LayoutEngine`: async trait computing geometry for the nested graph
//! - `FlowCanvas`: gesture handling, clear-then-rebuild rendering, history
//! - `DiagnosticSink`: host-supplied receiver for non-fatal anomalies
//!
//! # Example
//!
//! ```ignore
//! use flow_canvas::{CanvasSettings, FlowCanvas, FlowDocument};
//!
//! let document = FlowDocument::from_value(&serde_json::from_str(text)?)?;
//! let mut canvas = FlowCanvas::new(document, CanvasSettings::default())?;
//! canvas.on_animation_frame().await;
//! let model = canvas.canvas_model();
//! ```

pub mod builder;
pub mod catalog;
pub mod clipboard;
pub mod compatibility;
pub mod config;
pub mod document;
pub mod entity;
pub mod error;
pub mod events;
pub mod graph;
pub mod ids;
pub mod interaction;
pub mod layout;
pub mod node;
pub mod path;
pub mod undo;

// Re-export key types
pub use builder::RouteBuilder;
pub use catalog::{Catalog, CatalogKind, Tile};
pub use clipboard::{Clipboard, ClipboardPayload};
pub use compatibility::{AddStepMode, TileFilter};
pub use config::{CanvasSettings, LayoutSettings, NodeLabelType};
pub use document::FlowDocument;
pub use entity::{EntityType, NodeInteraction, VisualEntity};
pub use error::{CanvasError, Result};
pub use events::{CanvasEvent, DiagnosticSink, NullDiagnosticSink, VecDiagnosticSink};
pub use graph::{FlowGraph, GraphBuilder};
pub use interaction::{DragDirection, FlowCanvas, VisibleFlows};
pub use layout::{LayeredLayout, LayoutEngine, LayoutScheduler, PositionedNode};
pub use node::{NodeData, NodeHandle, NodeTree, VisualFlow, VisualizationNode};
pub use undo::UndoStack;
