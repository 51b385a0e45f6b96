//! Error types for the flow canvas

use thiserror::Error;

/// Result type alias using CanvasError
pub type Result<T> = std::result::Result<T, CanvasError>;

/// Errors that can occur while editing or rendering a flow
#[derive(Debug, Error)]
pub enum CanvasError {
    /// The selected node could not be serialized into the clipboard
    #[error("Clipboard copy failed: {0}")]
    CopyFailed(String),

    /// The clipboard holds malformed content
    #[error("Clipboard paste failed: {0}")]
    PasteFailed(String),

    /// A drop or paste was rejected by the compatibility rules
    #[error("Incompatible drop of '{dragged}' on '{target}'")]
    IncompatibleDrop { dragged: String, target: String },

    /// A node was reached twice while walking a tree
    #[error("Cycle detected at node '{0}'")]
    CycleDetected(String),

    /// A path or node handle does not resolve
    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    /// Two distinct nodes share an id
    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(String),

    /// A path cannot be used for the requested mutation
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// No entity with this id exists in the document
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// The node does not accept this kind of insertion
    #[error("Node '{node}' does not support {mode}")]
    UnsupportedMode { node: String, mode: String },

    /// The layout engine rejected its input
    #[error("Layout error: {0}")]
    Layout(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CanvasError {
    /// Create an invalid path error with a reason
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a layout error with a message
    pub fn layout(msg: impl Into<String>) -> Self {
        Self::Layout(msg.into())
    }
}
