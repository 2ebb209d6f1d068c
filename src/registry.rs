//! Workflow registry and references.
//!
//! The registry is an explicitly constructed value with an owned lifecycle
//! at the process entry point — no module-level mutable statics. It is
//! read-mostly: populated at startup, read by nested composition.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::Agent;
use crate::strategies::StrategyKind;

/// A registered workflow: the agents it runs and the pattern it runs them in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique workflow id.
    pub id: String,
    /// Agents executed by this workflow, in declaration order.
    pub agents: Vec<Agent>,
    /// Composition pattern.
    pub strategy: StrategyKind,
}

impl WorkflowDefinition {
    /// Create a workflow definition.
    pub fn new(id: impl Into<String>, agents: Vec<Agent>, strategy: StrategyKind) -> Self {
        Self {
            id: id.into(),
            agents,
            strategy,
        }
    }
}

/// Reference to a workflow for nested composition: either a registered id
/// or an inline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkflowReference {
    /// A workflow id resolved through the registry.
    Registered(String),
    /// An inline workflow carried by value.
    Inline(WorkflowDefinition),
}

impl WorkflowReference {
    /// The workflow id this reference names.
    pub fn id(&self) -> &str {
        match self {
            WorkflowReference::Registered(id) => id,
            WorkflowReference::Inline(def) => &def.id,
        }
    }
}

/// Process-wide, read-mostly workflow lookup table.
#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    workflows: RwLock<HashMap<String, Arc<WorkflowDefinition>>>,
}

impl WorkflowRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow, replacing any previous definition with the
    /// same id.
    pub fn register(&self, definition: WorkflowDefinition) {
        log::debug!("registering workflow '{}'", definition.id);
        self.workflows
            .write()
            .insert(definition.id.clone(), Arc::new(definition));
    }

    /// Look up a workflow by id.
    pub fn get(&self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows.read().get(id).cloned()
    }

    /// Whether a workflow id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.workflows.read().contains_key(id)
    }

    /// Registered workflow ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workflows.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let registry = WorkflowRegistry::new();
        assert!(!registry.contains("triage"));

        registry.register(WorkflowDefinition::new(
            "triage",
            vec![Agent::new("t1", "triager")],
            StrategyKind::Sequential,
        ));
        assert!(registry.contains("triage"));
        let def = registry.get("triage").unwrap();
        assert_eq!(def.agents.len(), 1);
        assert_eq!(def.strategy, StrategyKind::Sequential);
    }

    #[test]
    fn test_reference_id() {
        let by_id = WorkflowReference::Registered("audit".into());
        assert_eq!(by_id.id(), "audit");
        let inline = WorkflowReference::Inline(WorkflowDefinition::new(
            "inline-wf",
            vec![],
            StrategyKind::Parallel,
        ));
        assert_eq!(inline.id(), "inline-wf");
    }
}
