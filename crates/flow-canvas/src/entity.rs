//! Top-level flow entities
//!
//! An entity owns the JSON definition of one flow (a route, a kamelet
//! template, a route configuration or a REST block) and knows how to
//! mutate it at a step path. Behaviour that differs per kind is a `match`
//! on [`EntityType`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::catalog::{self, Catalog, CatalogKind, StepsPropertyKind};
use crate::clipboard::ClipboardPayload;
use crate::compatibility::{is_special_processor, special_children, AddStepMode};
use crate::config::NodeLabelType;
use crate::error::{CanvasError, Result};
use crate::ids;
use crate::node::NodeData;
use crate::path::{self, StepLocation};

/// Kind of top-level entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    Route,
    Kamelet,
    RouteConfiguration,
    Rest,
}

impl EntityType {
    /// Key under which the entity definition lives
    pub fn root_path(&self) -> &'static str {
        match self {
            Self::Route => "route",
            Self::Kamelet => "template",
            Self::RouteConfiguration => "routeConfiguration",
            Self::Rest => "rest",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Route => "Route",
            Self::Kamelet => "Kamelet",
            Self::RouteConfiguration => "Route Configuration",
            Self::Rest => "Rest",
        }
    }

    /// Whether content copied from `self` may be pasted into `other`
    ///
    /// Routes and kamelets share the step grammar; every other kind only
    /// accepts its own content.
    pub fn is_paste_compatible(&self, other: EntityType) -> bool {
        let route_family = |t: &EntityType| matches!(t, Self::Route | Self::Kamelet);
        *self == other || (route_family(self) && route_family(&other))
    }
}

/// What each node permits the user to do with it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInteraction {
    pub can_have_next_step: bool,
    pub can_have_previous_step: bool,
    pub can_have_children: bool,
    pub can_have_special_children: bool,
    pub can_remove_step: bool,
    pub can_replace_step: bool,
    pub can_remove_flow: bool,
    pub can_be_disabled: bool,
    pub can_be_copied: bool,
    pub can_be_pasted_as_child: bool,
    pub can_be_pasted_as_next_step: bool,
    pub can_be_pasted_as_special_child: bool,
}

impl NodeInteraction {
    /// Whether a node with these capabilities accepts `mode`
    pub fn allows(&self, mode: AddStepMode) -> bool {
        match mode {
            AddStepMode::AppendStep => self.can_have_next_step,
            AddStepMode::PrependStep => self.can_have_previous_step,
            AddStepMode::InsertChildStep => self.can_have_children,
            AddStepMode::InsertSpecialChildStep => self.can_have_special_children,
            AddStepMode::ReplaceStep => self.can_replace_step,
        }
    }
}

/// Schema and current definition of a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualComponentSchema {
    pub schema: Value,
    pub definition: Value,
}

/// One flow entity and its definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualEntity {
    id: String,
    entity_type: EntityType,
    /// `{ <root path>: { ... } }`
    definition: Value,
    /// Kamelet document minus its template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    envelope: Option<Value>,
}

impl VisualEntity {
    /// Create an entity from the body found under its root path
    ///
    /// A missing `id` is generated and written back into the body.
    pub fn new(entity_type: EntityType, body: Value) -> Self {
        let root = entity_type.root_path();
        let mut body = if body.is_object() { body } else { json!({}) };
        let id = match body.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = ids::random_id(root);
                body["id"] = Value::String(id.clone());
                id
            }
        };

        let mut definition = Map::new();
        definition.insert(root.to_string(), body);
        Self {
            id,
            entity_type,
            definition: Value::Object(definition),
            envelope: None,
        }
    }

    /// Create a kamelet entity from a full kamelet document
    pub fn kamelet(document: Value) -> Self {
        let mut envelope = if document.is_object() { document } else { json!({}) };
        let name = envelope
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| ids::random_id("kamelet"));

        let mut template = envelope
            .pointer_mut("/spec/template")
            .map(Value::take)
            .filter(Value::is_object)
            .unwrap_or_else(|| json!({}));
        if template.get("from").map_or(true, |f| !f.is_object()) {
            template["from"] = json!({"uri": ""});
        }

        envelope["kind"] = json!("Kamelet");
        if envelope.get("metadata").map_or(true, |m| !m.is_object()) {
            envelope["metadata"] = json!({});
        }
        envelope["metadata"]["name"] = Value::String(name.clone());

        Self {
            id: name,
            entity_type: EntityType::Kamelet,
            definition: json!({ "template": template }),
            envelope: Some(envelope),
        }
    }

    /// Recognize an entity in a document item
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        if map.get("kind").and_then(Value::as_str) == Some("Kamelet") {
            return Some(Self::kamelet(value.clone()));
        }
        if map.len() != 1 {
            return None;
        }
        let (key, body) = map.iter().next()?;
        let entity_type = match key.as_str() {
            "route" => EntityType::Route,
            "routeConfiguration" => EntityType::RouteConfiguration,
            "rest" => EntityType::Rest,
            _ => return None,
        };
        body.is_object().then(|| Self::new(entity_type, body.clone()))
    }

    /// Serialize back to the document form
    pub fn to_value(&self) -> Value {
        match (&self.entity_type, &self.envelope) {
            (EntityType::Kamelet, Some(envelope)) => {
                let mut document = envelope.clone();
                if document.get("spec").map_or(true, |s| !s.is_object()) {
                    document["spec"] = json!({});
                }
                document["spec"]["template"] = self.root().clone();
                document
            }
            _ => self.definition.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Rename the entity, keeping the definition in sync
    pub fn set_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        match self.entity_type {
            EntityType::Kamelet => {
                if let Some(envelope) = self.envelope.as_mut() {
                    envelope["metadata"]["name"] = Value::String(id.clone());
                }
            }
            _ => {
                let root = self.entity_type.root_path();
                self.definition[root]["id"] = Value::String(id.clone());
            }
        }
        self.id = id;
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn root_path(&self) -> &'static str {
        self.entity_type.root_path()
    }

    /// The whole `{ <root>: ... }` definition
    pub fn definition(&self) -> &Value {
        &self.definition
    }

    /// The body under the root path
    pub fn root(&self) -> &Value {
        &self.definition[self.root_path()]
    }

    /// Definition of the step at `path`
    pub fn step_definition(&self, path: &str) -> Option<&Value> {
        path::get(&self.definition, path)
    }

    fn description(&self) -> Option<&str> {
        match (&self.entity_type, &self.envelope) {
            (EntityType::Kamelet, Some(envelope)) => envelope
                .pointer("/spec/definition/description")
                .and_then(Value::as_str),
            _ => self.root().get("description").and_then(Value::as_str),
        }
    }

    /// Ids of every step and of the entity itself
    pub fn collect_ids(&self, out: &mut HashSet<String>) {
        out.insert(self.id.clone());
        ids::collect_ids(&self.definition, out);
    }

    fn is_entry_point(&self, path: &str) -> bool {
        path == format!("{}.from", self.root_path())
    }

    /// Capabilities of the node described by `data`
    pub fn node_interaction(&self, data: &NodeData) -> NodeInteraction {
        if data.path == self.root_path() {
            let has_special = matches!(
                self.entity_type,
                EntityType::RouteConfiguration | EntityType::Rest
            );
            return NodeInteraction {
                can_have_special_children: has_special,
                can_remove_flow: true,
                ..NodeInteraction::default()
            };
        }

        if data.is_placeholder {
            return NodeInteraction {
                can_replace_step: true,
                ..NodeInteraction::default()
            };
        }

        let name = data.processor_name.as_str();
        let is_from = self.is_entry_point(&data.path);
        let special = is_special_processor(name);
        let can_have_children = !is_from
            && catalog::steps_properties(name)
                .iter()
                .any(|p| p.kind == StepsPropertyKind::Branch);
        let can_have_special_children = special_children(name).is_some();

        NodeInteraction {
            can_have_next_step: !special,
            can_have_previous_step: !special && !is_from,
            can_have_children,
            can_have_special_children,
            can_remove_step: true,
            can_replace_step: !special,
            can_remove_flow: false,
            can_be_disabled: !is_from,
            can_be_copied: !is_from,
            can_be_pasted_as_child: can_have_children,
            can_be_pasted_as_next_step: !special,
            can_be_pasted_as_special_child: can_have_special_children,
        }
    }

    /// Label of the node at `path`
    pub fn node_label(&self, data: &NodeData, label_type: NodeLabelType) -> String {
        if data.path == self.root_path() {
            if label_type == NodeLabelType::Description {
                if let Some(description) = self.description() {
                    return description.to_string();
                }
            }
            if self.entity_type == EntityType::Rest {
                if let Some(p) = self.root().get("path").and_then(Value::as_str) {
                    return p.to_string();
                }
            }
            return self.id.clone();
        }

        if data.is_placeholder {
            return "placeholder".to_string();
        }

        let definition = self.step_definition(&data.path);
        let field = |key: &str| {
            definition
                .and_then(|d| d.get(key))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        if label_type == NodeLabelType::Description {
            if let Some(description) = field("description") {
                return description;
            }
        }
        field("id")
            .or_else(|| field("uri"))
            .or_else(|| field("path"))
            .unwrap_or_else(|| data.processor_name.clone())
    }

    /// Title of the node at `path`
    pub fn node_title(&self, data: &NodeData, catalog: &Catalog) -> String {
        if data.path == self.root_path() {
            return self.entity_type.title().to_string();
        }
        match data.catalog_kind {
            CatalogKind::Component | CatalogKind::Kamelet => catalog
                .get(data.catalog_kind, &data.name)
                .map(|t| t.title.clone())
                .unwrap_or_else(|| data.name.clone()),
            _ => catalog.processor_title(&data.processor_name),
        }
    }

    /// Schema and definition of the step at `path`
    pub fn component_schema(&self, data: &NodeData, catalog: &Catalog) -> Option<VisualComponentSchema> {
        let definition = if data.path == self.root_path() {
            self.root().clone()
        } else {
            self.step_definition(&data.path)?.clone()
        };
        let schema = json!({
            "title": self.node_title(data, catalog),
            "type": "object",
        });
        Some(VisualComponentSchema { schema, definition })
    }

    /// Current definition of the step at `path` as clipboard content
    pub fn copied_content(&self, data: &NodeData) -> Option<ClipboardPayload> {
        if data.is_placeholder || data.path == self.root_path() {
            return None;
        }
        let definition = self.step_definition(&data.path)?;
        Some(ClipboardPayload::new(
            self.entity_type,
            data.processor_name.clone(),
            definition.clone(),
        ))
    }

    /// Insert `content` relative to the node described by `data`
    pub fn add_step(&mut self, mode: AddStepMode, data: &NodeData, content: &ClipboardPayload) -> Result<()> {
        let target = data.path.as_str();
        let unsupported = || CanvasError::UnsupportedMode {
            node: target.to_string(),
            mode: mode.to_string(),
        };
        let wrapped = || json!({ (content.name.clone()): content.default_value.clone() });

        match mode {
            AddStepMode::ReplaceStep if data.is_placeholder => match StepLocation::of(target)? {
                StepLocation::ArrayElement {
                    array_path, index, ..
                } => path::insert_into_array(&mut self.definition, &array_path, index, wrapped()),
                StepLocation::Property { .. } => Err(unsupported()),
            },
            AddStepMode::ReplaceStep if self.is_entry_point(target) => {
                self.replace_entry_point(target, content)
            }
            AddStepMode::ReplaceStep => match StepLocation::of(target)? {
                StepLocation::ArrayElement {
                    array_path,
                    index,
                    wrapper,
                } => {
                    let element = match wrapper {
                        Some(_) => wrapped(),
                        None => content.default_value.clone(),
                    };
                    path::set(&mut self.definition, &path::join(&array_path, index), element)
                }
                StepLocation::Property { .. } => {
                    path::set(&mut self.definition, target, content.default_value.clone())
                }
            },
            AddStepMode::AppendStep if self.is_entry_point(target) => path::insert_into_array(
                &mut self.definition,
                &path::join(target, "steps"),
                0,
                wrapped(),
            ),
            AddStepMode::AppendStep | AddStepMode::PrependStep => match StepLocation::of(target)? {
                StepLocation::ArrayElement {
                    array_path,
                    index,
                    wrapper: Some(_),
                } => {
                    let index = if mode == AddStepMode::AppendStep { index + 1 } else { index };
                    path::insert_into_array(&mut self.definition, &array_path, index, wrapped())
                }
                _ => Err(unsupported()),
            },
            AddStepMode::InsertChildStep => {
                let steps_path = path::join(target, "steps");
                let len = path::get(&self.definition, &steps_path)
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                path::insert_into_array(&mut self.definition, &steps_path, len, wrapped())
            }
            AddStepMode::InsertSpecialChildStep => {
                let property = catalog::steps_properties(&data.processor_name)
                    .iter()
                    .find(|p| p.name == content.name)
                    .ok_or_else(unsupported)?;
                let clause_path = path::join(target, property.name);
                match property.kind {
                    StepsPropertyKind::SingleClause => {
                        path::set(&mut self.definition, &clause_path, content.default_value.clone())
                    }
                    StepsPropertyKind::ArrayClause | StepsPropertyKind::WrappedClause => {
                        let element = if property.kind == StepsPropertyKind::WrappedClause {
                            wrapped()
                        } else {
                            content.default_value.clone()
                        };
                        let len = path::get(&self.definition, &clause_path)
                            .and_then(Value::as_array)
                            .map_or(0, Vec::len);
                        path::insert_into_array(&mut self.definition, &clause_path, len, element)
                    }
                    StepsPropertyKind::Branch => Err(unsupported()),
                }
            }
        }
    }

    fn replace_entry_point(&mut self, target: &str, content: &ClipboardPayload) -> Result<()> {
        let current = path::get(&self.definition, target).cloned().unwrap_or_else(|| json!({}));
        let mut replacement = match content.default_value.as_object() {
            Some(map) => map.clone(),
            None => Map::new(),
        };

        let value = match self.entity_type {
            // Kamelet sources merge into the existing `from`
            EntityType::Kamelet => {
                let mut merged = current.as_object().cloned().unwrap_or_default();
                merged.extend(replacement);
                Value::Object(merged)
            }
            _ => {
                if !replacement.contains_key("uri") {
                    let uri = match content.name.as_str() {
                        name if name.contains(':') => name.to_string(),
                        name => format!("{}:", name),
                    };
                    replacement.insert("uri".to_string(), Value::String(uri));
                }
                if let Some(steps) = current.get("steps") {
                    replacement.insert("steps".to_string(), steps.clone());
                }
                Value::Object(replacement)
            }
        };
        path::set(&mut self.definition, target, value)
    }

    /// Remove the step at `path`
    ///
    /// Removing the entry point only clears its endpoint; its steps stay.
    pub fn remove_step(&mut self, target: &str) -> Result<()> {
        if target == self.root_path() {
            return Err(CanvasError::invalid_path(target, "use remove_entity to remove a flow"));
        }
        if self.is_entry_point(target) {
            let uri_path = path::join(target, "uri");
            path::set(&mut self.definition, &uri_path, json!(""))?;
            if let Some(Value::Object(from)) = path::get_mut(&mut self.definition, target) {
                from.remove("parameters");
            }
            return Ok(());
        }
        path::remove(&mut self.definition, target).map(|_| ())
    }
}
