//! Compatibility filtering
//!
//! Given a requested mutation and the node it targets, produce a predicate
//! over catalog tiles. The rules encode the flow grammar: which step kinds
//! may start a flow, which only live under a specific parent, and which
//! parents allow at most one instance of a clause.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{CatalogKind, Tile};
use crate::entity::EntityType;
use crate::node::NodeData;

/// Where a new or pasted step goes relative to the target node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddStepMode {
    /// After the target, in the same chain
    AppendStep,
    /// Before the target, in the same chain
    PrependStep,
    /// At the end of the target's `steps` branch
    InsertChildStep,
    /// As a clause of the target (`when`, `doCatch`, `onException`)
    InsertSpecialChildStep,
    /// In place of the target (or filling a placeholder)
    ReplaceStep,
}

impl fmt::Display for AddStepMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AppendStep => "append",
            Self::PrependStep => "prepend",
            Self::InsertChildStep => "insert-child",
            Self::InsertSpecialChildStep => "insert-special-child",
            Self::ReplaceStep => "replace",
        };
        f.write_str(name)
    }
}

pub const REST_DSL_METHODS: &[&str] = &["delete", "get", "head", "patch", "post", "put"];

/// Step kinds only valid under a specific parent
pub const SPECIAL_PROCESSORS: &[&str] = &[
    "onFallback",
    "when",
    "otherwise",
    "doCatch",
    "doFinally",
    "intercept",
    "interceptFrom",
    "interceptSendToEndpoint",
    "onException",
    "onCompletion",
    "delete",
    "get",
    "head",
    "patch",
    "post",
    "put",
];

/// Clauses that may appear at most once under their parent
const SINGLETON_CHILDREN: &[(&str, &str)] = &[
    ("circuitBreaker", "onFallback"),
    ("choice", "otherwise"),
    ("doTry", "doFinally"),
];

const CIRCUIT_BREAKER_CHILDREN: &[&str] = &["onFallback"];
const CHOICE_CHILDREN: &[&str] = &["when", "otherwise"];
const DO_TRY_CHILDREN: &[&str] = &["doCatch", "doFinally"];
const ROUTE_CONFIGURATION_CHILDREN: &[&str] = &[
    "intercept",
    "interceptFrom",
    "interceptSendToEndpoint",
    "onException",
    "onCompletion",
];

/// Special children allowed under a parent processor
pub fn special_children(parent: &str) -> Option<&'static [&'static str]> {
    match parent {
        "circuitBreaker" => Some(CIRCUIT_BREAKER_CHILDREN),
        "choice" => Some(CHOICE_CHILDREN),
        "doTry" => Some(DO_TRY_CHILDREN),
        "routeConfiguration" => Some(ROUTE_CONFIGURATION_CHILDREN),
        "rest" => Some(REST_DSL_METHODS),
        _ => None,
    }
}

pub fn is_special_processor(name: &str) -> bool {
    SPECIAL_PROCESSORS.iter().any(|p| *p == name)
}

/// Special children of `parent` still available given its current definition
fn available_special_children(parent: &str, definition: Option<&Value>) -> Vec<&'static str> {
    let Some(children) = special_children(parent) else {
        return Vec::new();
    };
    let has_key = |key: &str| {
        definition
            .and_then(Value::as_object)
            .is_some_and(|map| map.contains_key(key))
    };

    children
        .iter()
        .copied()
        .filter(|child| {
            !SINGLETON_CHILDREN
                .iter()
                .any(|(p, c)| *p == parent && c == child && has_key(*c))
        })
        .collect()
}

/// A predicate over candidate tiles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileFilter {
    /// Nothing is accepted
    Nothing,
    /// Components and kamelets able to start a flow
    EntryPoint { kamelet: bool },
    /// Exactly these special children
    SpecialChildren(Vec<&'static str>),
    /// Regular steps: no special children, no consumer-only endpoints
    Steps { kamelet: bool },
}

impl TileFilter {
    /// Whether the tile passes this filter
    pub fn matches(&self, tile: &Tile) -> bool {
        match self {
            Self::Nothing => false,
            Self::EntryPoint { kamelet } => {
                (*kamelet && tile.kind == CatalogKind::Kamelet && tile.name == "source")
                    || (tile.kind == CatalogKind::Component && !tile.has_tag("producerOnly"))
                    || (tile.kind == CatalogKind::Kamelet
                        && tile.has_tag("source")
                        && tile.name != "source")
            }
            Self::SpecialChildren(names) => names.iter().any(|n| *n == tile.name),
            Self::Steps { kamelet } => {
                (*kamelet && tile.kind == CatalogKind::Kamelet && tile.name == "sink")
                    || (tile.kind == CatalogKind::Processor && !is_special_processor(&tile.name))
                    || (tile.kind == CatalogKind::Component && !tile.has_tag("consumerOnly"))
                    || (tile.kind == CatalogKind::Kamelet
                        && !tile.has_tag("source")
                        && tile.name != "sink")
            }
        }
    }
}

fn is_entry_point(data: &NodeData) -> bool {
    data.path == "route.from" || data.path == "template.from"
}

/// Filter for candidates that may be inserted at `data` with `mode`
pub fn compatible_components(mode: AddStepMode, data: &NodeData, definition: Option<&Value>) -> TileFilter {
    let kamelet = data.entity_type == EntityType::Kamelet;

    match mode {
        AddStepMode::ReplaceStep if is_entry_point(data) => TileFilter::EntryPoint {
            kamelet: kamelet && data.path == "template.from",
        },
        AddStepMode::InsertSpecialChildStep => {
            if special_children(&data.processor_name).is_none() {
                return TileFilter::Nothing;
            }
            TileFilter::SpecialChildren(available_special_children(&data.processor_name, definition))
        }
        _ => TileFilter::Steps { kamelet },
    }
}

/// Whether a copied step named `copied_name` may be pasted at `data` with `mode`
///
/// Only the modes offered by the paste menu are accepted.
pub fn is_compatible(
    copied_name: &str,
    mode: AddStepMode,
    data: &NodeData,
    definition: Option<&Value>,
) -> bool {
    match mode {
        AddStepMode::InsertChildStep | AddStepMode::AppendStep => !is_special_processor(copied_name),
        AddStepMode::InsertSpecialChildStep => {
            available_special_children(&data.processor_name, definition)
                .iter()
                .any(|child| *child == copied_name)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use serde_json::json;

    fn data(entity_type: EntityType, path: &str, processor: &str) -> NodeData {
        NodeData::step("e1", entity_type, path, processor)
    }

    fn names(filter: &TileFilter) -> Vec<String> {
        Catalog::builtin()
            .compatible_tiles(filter)
            .map(|t| t.name.clone())
            .collect()
    }

    #[test]
    fn test_otherwise_excluded_when_present() {
        let choice = data(EntityType::Route, "route.from.steps.0.choice", "choice");
        let definition = json!({"when": [{"steps": []}], "otherwise": {"steps": []}});

        let filter = compatible_components(AddStepMode::InsertSpecialChildStep, &choice, Some(&definition));
        let accepted = names(&filter);
        assert!(accepted.contains(&"when".to_string()));
        assert!(!accepted.contains(&"otherwise".to_string()));

        let filter = compatible_components(AddStepMode::InsertSpecialChildStep, &choice, None);
        assert!(names(&filter).contains(&"otherwise".to_string()));
    }

    #[test]
    fn test_special_child_of_non_parent() {
        let log = data(EntityType::Route, "route.from.steps.0.log", "log");
        let filter = compatible_components(AddStepMode::InsertSpecialChildStep, &log, None);
        assert_eq!(filter, TileFilter::Nothing);
        assert!(names(&filter).is_empty());
    }

    #[test]
    fn test_replace_from_excludes_producer_only() {
        let from = data(EntityType::Route, "route.from", "from");
        let filter = compatible_components(AddStepMode::ReplaceStep, &from, None);
        let accepted = names(&filter);
        assert!(accepted.contains(&"timer".to_string()));
        assert!(accepted.contains(&"beer-source".to_string()));
        assert!(!accepted.contains(&"exec".to_string()));
        assert!(!accepted.contains(&"source".to_string()));
        assert!(!accepted.contains(&"log-action".to_string()));
    }

    #[test]
    fn test_kamelet_replace_from_includes_source() {
        let from = data(EntityType::Kamelet, "template.from", "from");
        let filter = compatible_components(AddStepMode::ReplaceStep, &from, None);
        let accepted = names(&filter);
        assert!(accepted.contains(&"source".to_string()));
        assert!(!accepted.contains(&"sql-stored".to_string()));
    }

    #[test]
    fn test_default_excludes_special_and_consumer_only() {
        let log = data(EntityType::Route, "route.from.steps.0.log", "log");
        let filter = compatible_components(AddStepMode::AppendStep, &log, None);
        let accepted = names(&filter);
        assert!(accepted.contains(&"setHeader".to_string()));
        assert!(accepted.contains(&"exec".to_string()));
        assert!(accepted.contains(&"log-sink".to_string()));
        assert!(!accepted.contains(&"when".to_string()));
        assert!(!accepted.contains(&"timer".to_string()));
        assert!(!accepted.contains(&"beer-source".to_string()));
        assert!(!accepted.contains(&"sink".to_string()));

        let kamelet_log = data(EntityType::Kamelet, "template.from.steps.0.log", "log");
        let filter = compatible_components(AddStepMode::PrependStep, &kamelet_log, None);
        assert!(names(&filter).contains(&"sink".to_string()));
    }

    #[test]
    fn test_is_compatible_for_paste() {
        let choice = data(EntityType::Route, "route.from.steps.0.choice", "choice");
        let definition = json!({"otherwise": {}});

        assert!(is_compatible("log", AddStepMode::AppendStep, &choice, None));
        assert!(!is_compatible("when", AddStepMode::AppendStep, &choice, None));
        assert!(!is_compatible("when", AddStepMode::InsertChildStep, &choice, None));
        assert!(is_compatible("when", AddStepMode::InsertSpecialChildStep, &choice, Some(&definition)));
        assert!(!is_compatible("otherwise", AddStepMode::InsertSpecialChildStep, &choice, Some(&definition)));
        assert!(!is_compatible("doCatch", AddStepMode::InsertSpecialChildStep, &choice, None));
        assert!(!is_compatible("log", AddStepMode::ReplaceStep, &choice, None));
    }
}
