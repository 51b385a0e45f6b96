//! Clipboard transfer
//!
//! The clipboard is a single slot holding the serialized form of the last
//! copied step. It is injected into the canvas rather than being global, so
//! every test and every editor window can own its own slot.

use std::collections::HashSet;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::EntityType;
use crate::error::{CanvasError, Result};
use crate::ids;

/// Content of a copied step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardPayload {
    /// Kind of entity the step was copied from
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Step kind (`log`, `choice`, `when`)
    pub name: String,
    /// The step definition
    pub default_value: Value,
}

impl ClipboardPayload {
    pub fn new(entity_type: EntityType, name: impl Into<String>, default_value: Value) -> Self {
        Self {
            entity_type,
            name: name.into(),
            default_value,
        }
    }
}

/// Single-slot clipboard, last write wins
#[derive(Debug, Default)]
pub struct Clipboard {
    slot: Mutex<Option<String>>,
}

impl Clipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload, replacing the previous one
    ///
    /// On failure the previous content is kept.
    pub fn copy(&self, payload: &ClipboardPayload) -> Result<()> {
        if payload.name.is_empty() {
            return Err(CanvasError::CopyFailed("step has no name".to_string()));
        }
        let text = serde_json::to_string(payload).map_err(|e| CanvasError::CopyFailed(e.to_string()))?;
        *self.slot.lock() = Some(text);
        log::debug!("Copied '{}' to clipboard", payload.name);
        Ok(())
    }

    /// Read the stored payload as it was copied
    pub fn peek(&self) -> Result<Option<ClipboardPayload>> {
        let slot = self.slot.lock();
        let Some(text) = slot.as_deref() else {
            return Ok(None);
        };
        serde_json::from_str(text)
            .map(Some)
            .map_err(|e| CanvasError::PasteFailed(e.to_string()))
    }

    /// Read the stored payload with every id replaced by one not in `taken`
    ///
    /// The slot is left intact, so the same content can be pasted again.
    pub fn paste(&self, taken: &mut HashSet<String>) -> Result<Option<ClipboardPayload>> {
        let Some(mut payload) = self.peek()? else {
            return Ok(None);
        };
        ids::regenerate_ids(&mut payload.default_value, &payload.name, taken);
        Ok(Some(payload))
    }

    /// Replace the slot with raw text
    pub fn write_text(&self, text: impl Into<String>) {
        *self.slot.lock() = Some(text.into());
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }

    pub fn clear(&self) {
        *self.slot.lock() = None;
    }
}
