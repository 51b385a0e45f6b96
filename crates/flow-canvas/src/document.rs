//! The edited document
//!
//! A document is an ordered list of items. Items recognized as flow
//! entities become [`VisualFlow`]s; anything else (beans, error handlers)
//! is kept verbatim so it survives a round trip.

use std::collections::HashSet;

use serde_json::{json, Value};

use crate::catalog::Catalog;
use crate::compatibility::{self, AddStepMode, TileFilter};
use crate::entity::{EntityType, VisualEntity};
use crate::error::{CanvasError, Result};
use crate::ids;
use crate::node::{NodeData, VisualFlow};

#[derive(Debug, Clone, PartialEq)]
enum Item {
    Flow(VisualFlow),
    Other(Value),
}

/// Ordered collection of flows and passthrough items
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowDocument {
    items: Vec<Item>,
}

impl FlowDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a document from its JSON form
    ///
    /// Accepts either an array of items or a single kamelet document.
    pub fn from_value(value: &Value) -> Result<Self> {
        let items: Vec<Value> = match value {
            Value::Array(items) => items.clone(),
            Value::Object(_) => vec![value.clone()],
            Value::Null => Vec::new(),
            _ => {
                return Err(CanvasError::invalid_path("", "document must be an array or an object"));
            }
        };

        let mut taken = HashSet::new();
        let mut document = Self::new();
        for item in items {
            match VisualEntity::from_value(&item) {
                Some(mut entity) => {
                    if !taken.insert(entity.id().to_string()) {
                        let id = ids::unique_id(entity.root_path(), &mut taken);
                        log::warn!("Entity id '{}' is used twice; renamed to '{}'", entity.id(), id);
                        entity.set_id(id);
                    }
                    document.items.push(Item::Flow(VisualFlow::new(entity)));
                }
                None => document.items.push(Item::Other(item)),
            }
        }
        log::debug!("Loaded document with {} flows", document.flows().count());
        Ok(document)
    }

    /// Serialize the document back to JSON
    ///
    /// A document holding only a kamelet serializes as that kamelet.
    pub fn to_value(&self) -> Value {
        let values: Vec<Value> = self
            .items
            .iter()
            .map(|item| match item {
                Item::Flow(flow) => flow.entity().to_value(),
                Item::Other(value) => value.clone(),
            })
            .collect();

        match self.items.as_slice() {
            [Item::Flow(flow)] if flow.entity().entity_type() == EntityType::Kamelet => {
                values.into_iter().next().unwrap_or(Value::Null)
            }
            _ => Value::Array(values),
        }
    }

    pub fn flows(&self) -> impl Iterator<Item = &VisualFlow> {
        self.items.iter().filter_map(|item| match item {
            Item::Flow(flow) => Some(flow),
            Item::Other(_) => None,
        })
    }

    pub fn flow_ids(&self) -> Vec<String> {
        self.flows().map(|f| f.id().to_string()).collect()
    }

    /// The flow with this entity id
    pub fn entity(&self, id: &str) -> Option<&VisualFlow> {
        self.flows().find(|f| f.id() == id)
    }

    pub fn entity_mut(&mut self, id: &str) -> Option<&mut VisualFlow> {
        self.items.iter_mut().find_map(|item| match item {
            Item::Flow(flow) if flow.id() == id => Some(flow),
            _ => None,
        })
    }

    /// Append a new empty entity, returning its id
    pub fn add_entity(&mut self, entity_type: EntityType) -> String {
        let mut taken = self.collect_ids();
        let id = ids::unique_id(entity_type.root_path(), &mut taken);
        let entity = match entity_type {
            EntityType::Route => VisualEntity::new(
                entity_type,
                json!({"id": id.clone(), "from": {"id": ids::unique_id("from", &mut taken), "uri": "", "steps": []}}),
            ),
            EntityType::Kamelet => {
                VisualEntity::kamelet(json!({"metadata": {"name": id.clone()}, "spec": {"template": {"from": {"uri": "", "steps": []}}}}))
            }
            EntityType::RouteConfiguration | EntityType::Rest => VisualEntity::new(entity_type, json!({"id": id.clone()})),
        };
        log::debug!("Added {} '{}'", entity_type.title(), id);
        self.items.push(Item::Flow(VisualFlow::new(entity)));
        id
    }

    /// Insert an existing entity
    pub fn push_entity(&mut self, entity: VisualEntity) -> Result<()> {
        if self.entity(entity.id()).is_some() {
            return Err(CanvasError::DuplicateNodeId(entity.id().to_string()));
        }
        self.items.push(Item::Flow(VisualFlow::new(entity)));
        Ok(())
    }

    /// Remove the given flows, or every flow when `ids` is `None`
    ///
    /// Returns the number of flows removed.
    pub fn remove_entity(&mut self, ids: Option<&[&str]>) -> usize {
        let before = self.items.len();
        self.items.retain(|item| match (item, ids) {
            (Item::Flow(_), None) => false,
            (Item::Flow(flow), Some(ids)) => !ids.iter().any(|id| *id == flow.id()),
            (Item::Other(_), _) => true,
        });
        before - self.items.len()
    }

    /// Filter for candidates insertable at `data` with `mode`
    pub fn get_compatible_components(&self, mode: AddStepMode, data: &NodeData, definition: Option<&Value>) -> TileFilter {
        compatibility::compatible_components(mode, data, definition)
    }

    /// Whether the catalog entry `name` is accepted by `filter`
    pub fn check_compatibility(&self, catalog: &Catalog, name: &str, filter: &TileFilter) -> bool {
        catalog.check_compatibility(name, filter)
    }

    /// Every id present in the document, entity ids included
    pub fn collect_ids(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        for item in &self.items {
            match item {
                Item::Flow(flow) => flow.collect_ids(&mut out),
                Item::Other(value) => ids::collect_ids(value, &mut out),
            }
        }
        out
    }
}
