//! Canvas settings
//!
//! Settings are plain serde structs with defaults for every field, so a
//! partial JSON document (or none at all) yields a usable configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default values shared by settings and the layout adapter
pub mod defaults {
    /// Maximum pixel distance for the nearest-node drop search
    pub const DROP_DISTANCE: f64 = 150.0;
    /// Size given to nodes that have not been measured yet
    pub const NODE_WIDTH: f64 = 100.0;
    pub const NODE_HEIGHT: f64 = 100.0;
    /// Extra height reserved below a node for its label
    pub const LABEL_HEIGHT: f64 = 20.0;
    pub const LAYER_SPACING: f64 = 100.0;
    pub const NODE_SPACING: f64 = 80.0;
    /// Width/height ratio the layout aims for; high values favour rows
    pub const ASPECT_RATIO: f64 = 3.0;
}

/// Which value a node shows as its label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeLabelType {
    /// The step id (or uri/processor name when no id is set)
    #[default]
    Id,
    /// The step description, falling back to the id
    Description,
}

/// When the per-node toolbar is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeToolbarTrigger {
    OnHover,
    #[default]
    OnSelection,
}

/// Flow direction of the layered layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LayoutDirection {
    #[default]
    Down,
    Right,
}

/// Padding inside a container node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Padding {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Default for Padding {
    fn default() -> Self {
        Self {
            top: 50.0,
            right: 20.0,
            bottom: 20.0,
            left: 20.0,
        }
    }
}

/// Options applied uniformly to every laid-out subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutSettings {
    pub direction: LayoutDirection,
    /// Spacing between consecutive layers
    pub layer_spacing: f64,
    /// Spacing between nodes in the same layer
    pub node_spacing: f64,
    pub aspect_ratio: f64,
    pub padding: Padding,
    pub default_node_width: f64,
    pub default_node_height: f64,
    pub label_height: f64,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            direction: LayoutDirection::Down,
            layer_spacing: defaults::LAYER_SPACING,
            node_spacing: defaults::NODE_SPACING,
            aspect_ratio: defaults::ASPECT_RATIO,
            padding: Padding::default(),
            default_node_width: defaults::NODE_WIDTH,
            default_node_height: defaults::NODE_HEIGHT,
            label_height: defaults::LABEL_HEIGHT,
        }
    }
}

/// Features still behind a flag
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExperimentalFeatures {
    pub enable_drag_and_drop: bool,
}

/// Canvas configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CanvasSettings {
    pub node_label: NodeLabelType,
    pub node_toolbar_trigger: NodeToolbarTrigger,
    pub experimental_features: ExperimentalFeatures,
    pub drop_distance: f64,
    pub layout: LayoutSettings,
}

impl Default for CanvasSettings {
    fn default() -> Self {
        Self {
            node_label: NodeLabelType::default(),
            node_toolbar_trigger: NodeToolbarTrigger::default(),
            experimental_features: ExperimentalFeatures::default(),
            drop_distance: defaults::DROP_DISTANCE,
            layout: LayoutSettings::default(),
        }
    }
}

impl CanvasSettings {
    /// Parse settings from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load settings from a JSON file, returning defaults if it does not exist
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                let settings = Self::from_json(&text)?;
                log::debug!("Loaded canvas settings from {:?}", path);
                Ok(settings)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No canvas settings at {:?}, using defaults", path);
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Save settings as pretty JSON
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path.as_ref(), text).await?;
        Ok(())
    }

    /// Builder-style toggle for drag and drop
    pub fn with_drag_and_drop(mut self, enabled: bool) -> Self {
        self.experimental_features.enable_drag_and_drop = enabled;
        self
    }
}
