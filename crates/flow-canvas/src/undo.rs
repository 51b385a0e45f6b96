//! Undo/redo over compressed document snapshots
//!
//! Each entry is the serialized document after a committed mutation,
//! compressed with zstd. Restoring a snapshot re-parses the document and
//! remaps every flow, so node trees never need inverse operations.

use std::collections::VecDeque;

use crate::document::FlowDocument;
use crate::error::{CanvasError, Result};

/// Undo/redo stack of compressed document snapshots
pub struct UndoStack {
    snapshots: VecDeque<Vec<u8>>,
    current: usize,
    max_snapshots: usize,
}

impl UndoStack {
    pub fn new(max_snapshots: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            current: 0,
            max_snapshots: max_snapshots.max(1),
        }
    }

    /// Record `document` as the newest state, dropping any redo history
    pub fn push(&mut self, document: &FlowDocument) -> Result<()> {
        let json = serde_json::to_vec(&document.to_value())?;
        let compressed = zstd::encode_all(&json[..], 3).map_err(|e| CanvasError::Compression(e.to_string()))?;

        self.snapshots.truncate(self.current + 1);
        self.snapshots.push_back(compressed);
        self.current = self.snapshots.len() - 1;

        while self.snapshots.len() > self.max_snapshots {
            self.snapshots.pop_front();
            self.current = self.current.saturating_sub(1);
        }
        Ok(())
    }

    /// Step back one snapshot
    pub fn undo(&mut self) -> Option<Result<FlowDocument>> {
        if !self.can_undo() {
            return None;
        }
        self.current -= 1;
        Some(self.decompress(self.current))
    }

    /// Step forward one snapshot
    pub fn redo(&mut self) -> Option<Result<FlowDocument>> {
        if !self.can_redo() {
            return None;
        }
        self.current += 1;
        Some(self.decompress(self.current))
    }

    pub fn current(&self) -> Option<Result<FlowDocument>> {
        if self.snapshots.is_empty() {
            None
        } else {
            Some(self.decompress(self.current))
        }
    }

    pub fn can_undo(&self) -> bool {
        self.current > 0
    }

    pub fn can_redo(&self) -> bool {
        self.current + 1 < self.snapshots.len()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.current = 0;
    }

    /// Total compressed size of all snapshots in bytes
    pub fn compressed_size(&self) -> usize {
        self.snapshots.iter().map(Vec::len).sum()
    }

    fn decompress(&self, index: usize) -> Result<FlowDocument> {
        let compressed = self
            .snapshots
            .get(index)
            .ok_or_else(|| CanvasError::Compression(format!("no snapshot at {}", index)))?;
        let json = zstd::decode_all(&compressed[..]).map_err(|e| CanvasError::Compression(e.to_string()))?;
        let value: serde_json::Value = serde_json::from_slice(&json)?;
        FlowDocument::from_value(&value)
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(100)
    }
}
