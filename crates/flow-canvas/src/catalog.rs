//! Step catalog and processor structure
//!
//! The catalog answers two questions: which step kinds exist (as [`Tile`]s
//! that compatibility filters are evaluated against) and how a processor
//! nests other steps (its [`StepsProperty`] table).

use serde::{Deserialize, Serialize};

use crate::compatibility::TileFilter;

/// Kind of catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CatalogKind {
    /// Endpoint component (`timer`, `log`, `kafka`)
    Component,
    /// EIP processor (`log`, `choice`, `filter`)
    Processor,
    /// Kamelet (`source`, `sink`, `beer-source`)
    Kamelet,
    /// Top-level entity (`route`, `routeConfiguration`)
    Entity,
}

/// A candidate step descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    #[serde(rename = "type")]
    pub kind: CatalogKind,
    pub name: String,
    pub title: String,
    pub tags: Vec<String>,
}

impl Tile {
    pub fn new(kind: CatalogKind, name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            title: title.into(),
            tags: Vec::new(),
        }
    }

    /// Add a tag to this tile
    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// How a processor property holds nested steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepsPropertyKind {
    /// Array of single-key step objects (`steps: [{log: {}}]`)
    Branch,
    /// Array of plain clause objects (`when: [{steps: []}]`)
    ArrayClause,
    /// One clause object (`otherwise: {steps: []}`)
    SingleClause,
    /// Array of single-key clause objects (`onException: [{onException: {}}]`)
    WrappedClause,
}

/// A property of a processor that holds nested steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepsProperty {
    pub name: &'static str,
    pub kind: StepsPropertyKind,
}

const fn prop(name: &'static str, kind: StepsPropertyKind) -> StepsProperty {
    StepsProperty { name, kind }
}

use StepsPropertyKind::{ArrayClause, Branch, SingleClause, WrappedClause};

const BRANCH_ONLY: &[StepsProperty] = &[prop("steps", Branch)];
const CHOICE: &[StepsProperty] = &[prop("when", ArrayClause), prop("otherwise", SingleClause)];
const DO_TRY: &[StepsProperty] = &[
    prop("steps", Branch),
    prop("doCatch", ArrayClause),
    prop("doFinally", SingleClause),
];
const CIRCUIT_BREAKER: &[StepsProperty] = &[prop("steps", Branch), prop("onFallback", SingleClause)];
const ROUTE_CONFIGURATION: &[StepsProperty] = &[
    prop("intercept", WrappedClause),
    prop("interceptFrom", WrappedClause),
    prop("interceptSendToEndpoint", WrappedClause),
    prop("onException", WrappedClause),
    prop("onCompletion", WrappedClause),
];
const REST: &[StepsProperty] = &[
    prop("get", ArrayClause),
    prop("post", ArrayClause),
    prop("put", ArrayClause),
    prop("delete", ArrayClause),
    prop("patch", ArrayClause),
    prop("head", ArrayClause),
];

/// Processors whose `steps` property is a branch
const BRANCHING_PROCESSORS: &[&str] = &[
    "from",
    "when",
    "otherwise",
    "doCatch",
    "doFinally",
    "onFallback",
    "filter",
    "split",
    "loop",
    "multicast",
    "aggregate",
    "resequence",
    "saga",
    "step",
    "pipeline",
    "idempotentConsumer",
    "threads",
    "throttle",
    "delay",
    "intercept",
    "interceptFrom",
    "interceptSendToEndpoint",
    "onException",
    "onCompletion",
];

/// Nested-step properties of a processor, in document order
pub fn steps_properties(processor_name: &str) -> &'static [StepsProperty] {
    match processor_name {
        "choice" => CHOICE,
        "doTry" => DO_TRY,
        "circuitBreaker" => CIRCUIT_BREAKER,
        "routeConfiguration" => ROUTE_CONFIGURATION,
        "rest" => REST,
        name if BRANCHING_PROCESSORS.iter().any(|p| *p == name) => BRANCH_ONLY,
        _ => &[],
    }
}

/// Whether a processor renders as a container of other nodes
pub fn is_group_processor(processor_name: &str) -> bool {
    processor_name != "from" && !steps_properties(processor_name).is_empty()
}

/// The catalog of available step kinds
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tiles: Vec<Tile>,
}

impl Catalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self { tiles: Vec::new() }
    }

    /// Catalog pre-populated with common processors, components and kamelets
    pub fn builtin() -> Self {
        use CatalogKind::{Component, Kamelet, Processor};

        let processors = [
            ("aggregate", "Aggregate"),
            ("choice", "Choice"),
            ("circuitBreaker", "Circuit Breaker"),
            ("delay", "Delay"),
            ("doCatch", "Do Catch"),
            ("doFinally", "Do Finally"),
            ("doTry", "Do Try"),
            ("filter", "Filter"),
            ("intercept", "Intercept"),
            ("interceptFrom", "Intercept From"),
            ("interceptSendToEndpoint", "Intercept Send To Endpoint"),
            ("log", "Logger"),
            ("loop", "Loop"),
            ("marshal", "Marshal"),
            ("multicast", "Multicast"),
            ("onCompletion", "On Completion"),
            ("onException", "On Exception"),
            ("onFallback", "On Fallback"),
            ("otherwise", "Otherwise"),
            ("setBody", "Set Body"),
            ("setHeader", "Set Header"),
            ("split", "Split"),
            ("to", "To"),
            ("toD", "To D"),
            ("unmarshal", "Unmarshal"),
            ("when", "When"),
            ("get", "GET"),
            ("post", "POST"),
            ("put", "PUT"),
            ("delete", "DELETE"),
            ("patch", "PATCH"),
            ("head", "HEAD"),
        ];

        let mut catalog = Self::new();
        for (name, title) in processors {
            catalog.register(Tile::new(Processor, name, title));
        }

        catalog.register(Tile::new(Component, "timer", "Timer").tagged("consumerOnly"));
        catalog.register(Tile::new(Component, "cron", "Cron").tagged("consumerOnly"));
        catalog.register(Tile::new(Component, "log", "Log"));
        catalog.register(Tile::new(Component, "direct", "Direct"));
        catalog.register(Tile::new(Component, "kafka", "Kafka"));
        catalog.register(Tile::new(Component, "exec", "Exec").tagged("producerOnly"));
        catalog.register(Tile::new(Component, "sql-stored", "SQL Stored Procedure").tagged("producerOnly"));

        catalog.register(Tile::new(Kamelet, "source", "Kamelet Source").tagged("source"));
        catalog.register(Tile::new(Kamelet, "sink", "Kamelet Sink").tagged("sink"));
        catalog.register(Tile::new(Kamelet, "beer-source", "Beer Source").tagged("source"));
        catalog.register(Tile::new(Kamelet, "log-sink", "Log Sink").tagged("sink"));
        catalog.register(Tile::new(Kamelet, "log-action", "Log Action").tagged("action"));

        catalog
    }

    /// Register a tile, replacing one with the same kind and name
    pub fn register(&mut self, tile: Tile) {
        if let Some(existing) = self
            .tiles
            .iter_mut()
            .find(|t| t.kind == tile.kind && t.name == tile.name)
        {
            *existing = tile;
        } else {
            self.tiles.push(tile);
        }
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Find a tile by kind and name
    pub fn get(&self, kind: CatalogKind, name: &str) -> Option<&Tile> {
        self.tiles.iter().find(|t| t.kind == kind && t.name == name)
    }

    /// Human-readable title for a processor, falling back to its name
    pub fn processor_title(&self, name: &str) -> String {
        self.get(CatalogKind::Processor, name)
            .map(|t| t.title.clone())
            .unwrap_or_else(|| name.to_string())
    }

    /// Tiles accepted by a filter, in catalog order
    pub fn compatible_tiles<'a>(&'a self, filter: &'a TileFilter) -> impl Iterator<Item = &'a Tile> + 'a {
        self.tiles.iter().filter(move |t| filter.matches(t))
    }

    /// Whether any tile named `name` passes the filter
    ///
    /// Processors are looked up first, then components and kamelets, so a
    /// name shared by a processor and a component (`log`) is judged as the
    /// processor.
    pub fn check_compatibility(&self, name: &str, filter: &TileFilter) -> bool {
        let by_kind = |kind| self.get(kind, name);
        by_kind(CatalogKind::Processor)
            .or_else(|| by_kind(CatalogKind::Component))
            .or_else(|| by_kind(CatalogKind::Kamelet))
            .is_some_and(|tile| filter.matches(tile))
    }
}
