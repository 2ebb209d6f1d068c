//! Execution context threaded through composition patterns.
//!
//! The context is a key-value state map (agent outputs are published under
//! the producing agent's id), plus the optional service handles and the
//! nesting guard. Cloning produces an independent snapshot — parallel
//! branches each receive their own copy and cannot observe one another's
//! writes.

use serde_json::{Map, Value};

use crate::nesting::NestingContext;
use crate::services::Services;

/// Context key flagging broadened tool access for a single agent.
pub const TOOL_ACCESS_KEY: &str = "tool_access";

/// Context key holding the shared blob for prompt-cached sequential runs.
pub const SHARED_CONTEXT_KEY: &str = "_shared_context";

/// Mutable per-run state passed to composition patterns.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    values: Map<String, Value>,
    /// Optional service handles (cache, telemetry, state, coordination).
    pub services: Services,
    /// Depth/cycle guard for nested workflows.
    pub nesting: NestingContext,
    /// Label used for telemetry attribution ("adhoc" when unset).
    pub workflow_label: Option<String>,
}

impl ExecutionContext {
    /// Create an empty context with no services.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context seeded with initial values.
    pub fn with_values(values: Map<String, Value>) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }

    /// Builder: attach service handles.
    pub fn with_services(mut self, services: Services) -> Self {
        self.services = services;
        self
    }

    /// Builder: set the telemetry workflow label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.workflow_label = Some(label.into());
        self
    }

    /// Telemetry label, defaulting to "adhoc".
    pub fn label(&self) -> &str {
        self.workflow_label.as_deref().unwrap_or("adhoc")
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Set a value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Publish an agent's output map under its id.
    pub fn publish(&mut self, agent_id: &str, output: Map<String, Value>) {
        self.values
            .insert(agent_id.to_string(), Value::Object(output));
    }

    /// Snapshot of the state map, as passed to capability invocations.
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Consume the context, returning the state map.
    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_is_a_snapshot() {
        let mut ctx = ExecutionContext::new();
        ctx.set("seed", Value::from(1));
        let mut branch = ctx.clone();
        branch.set("branch_only", Value::from(2));
        assert!(ctx.get("branch_only").is_none());
        assert_eq!(branch.get("seed"), Some(&Value::from(1)));
    }

    #[test]
    fn test_publish_wraps_output_in_object() {
        let mut ctx = ExecutionContext::new();
        let mut out = Map::new();
        out.insert("content".to_string(), Value::String("x".into()));
        ctx.publish("agent-1", out);
        assert!(matches!(ctx.get("agent-1"), Some(Value::Object(_))));
    }

    #[test]
    fn test_default_label() {
        let ctx = ExecutionContext::new();
        assert_eq!(ctx.label(), "adhoc");
        let ctx = ctx.with_label("review");
        assert_eq!(ctx.label(), "review");
    }
}
