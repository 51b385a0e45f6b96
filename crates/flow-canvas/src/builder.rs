//! Fluent builders for flow entities
//!
//! Provides a fluent API for constructing route definitions programmatically.

use serde_json::{json, Map, Value};

use crate::entity::{EntityType, VisualEntity};

/// Fluent builder for constructing routes
///
/// # Example
///
/// ```ignore
/// let route = RouteBuilder::new("route-1")
///     .from("timer:tick")
///     .step("log", serde_json::json!({"message": "tick"}))
///     .choice(|c| c.when("${header.a}", |w| w.step("to", json!({"uri": "mock:a"}))).otherwise(|o| o))
///     .build();
/// ```
pub struct RouteBuilder {
    id: String,
    description: Option<String>,
    uri: String,
    steps: StepsBuilder,
}

impl RouteBuilder {
    /// Create a new route builder
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            uri: String::new(),
            steps: StepsBuilder::default(),
        }
    }

    /// Set the route description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the endpoint the route consumes from
    pub fn from(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    /// Append a step
    pub fn step(mut self, name: &str, definition: Value) -> Self {
        self.steps = self.steps.step(name, definition);
        self
    }

    /// Append a `choice` built by `f`
    pub fn choice(mut self, f: impl FnOnce(ChoiceBuilder) -> ChoiceBuilder) -> Self {
        self.steps = self.steps.choice(f);
        self
    }

    /// Append a processor whose nested steps are built by `f`
    pub fn branch(mut self, name: &str, definition: Value, f: impl FnOnce(StepsBuilder) -> StepsBuilder) -> Self {
        self.steps = self.steps.branch(name, definition, f);
        self
    }

    /// Build the route body (`{id, from}`)
    pub fn into_value(self) -> Value {
        let mut body = json!({
            "id": self.id,
            "from": {"uri": self.uri, "steps": self.steps.build()},
        });
        if let Some(description) = self.description {
            body["description"] = Value::String(description);
        }
        body
    }

    /// Build the route entity
    pub fn build(self) -> VisualEntity {
        VisualEntity::new(EntityType::Route, self.into_value())
    }
}

/// Builder for a list of steps
#[derive(Default)]
pub struct StepsBuilder {
    steps: Vec<Value>,
}

impl StepsBuilder {
    /// Append a step
    pub fn step(mut self, name: &str, definition: Value) -> Self {
        let mut wrapper = Map::new();
        wrapper.insert(name.to_string(), definition);
        self.steps.push(Value::Object(wrapper));
        self
    }

    /// Append a processor with nested steps
    pub fn branch(self, name: &str, definition: Value, f: impl FnOnce(StepsBuilder) -> StepsBuilder) -> Self {
        let mut definition = if definition.is_object() { definition } else { json!({}) };
        definition["steps"] = f(StepsBuilder::default()).build();
        self.step(name, definition)
    }

    /// Append a `choice`
    pub fn choice(self, f: impl FnOnce(ChoiceBuilder) -> ChoiceBuilder) -> Self {
        self.step("choice", f(ChoiceBuilder::default()).build())
    }

    pub fn build(self) -> Value {
        Value::Array(self.steps)
    }
}

/// Builder for `choice` clauses
#[derive(Default)]
pub struct ChoiceBuilder {
    when: Vec<Value>,
    otherwise: Option<Value>,
}

impl ChoiceBuilder {
    /// Add a `when` clause with a simple expression
    pub fn when(mut self, expression: &str, f: impl FnOnce(StepsBuilder) -> StepsBuilder) -> Self {
        self.when.push(json!({
            "expression": {"simple": {"expression": expression}},
            "steps": f(StepsBuilder::default()).build(),
        }));
        self
    }

    /// Set the `otherwise` clause
    pub fn otherwise(mut self, f: impl FnOnce(StepsBuilder) -> StepsBuilder) -> Self {
        self.otherwise = Some(json!({"steps": f(StepsBuilder::default()).build()}));
        self
    }

    pub fn build(self) -> Value {
        let mut choice = json!({"when": self.when});
        if let Some(otherwise) = self.otherwise {
            choice["otherwise"] = otherwise;
        }
        choice
    }
}
