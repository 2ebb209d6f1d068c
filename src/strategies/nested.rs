//! Nested composition: invoking one workflow from within another, bounded
//! by depth and cycle checks.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::agent::{Agent, StrategyResult};
use crate::capability::AgentCapability;
use crate::context::ExecutionContext;
use crate::errors::EnsembleError;
use crate::registry::{WorkflowDefinition, WorkflowReference, WorkflowRegistry};

use super::{build_strategy, invoke_agent, ExecutionStrategy, StrategyKind};

/// Output key tagging the executed workflow id.
pub const WORKFLOW_ID_KEY: &str = "_workflow_id";
/// Output key tagging the nesting depth the workflow ran at.
pub const DEPTH_KEY: &str = "_depth";
/// Output key tagging the caller's active workflow stack.
pub const PARENT_STACK_KEY: &str = "_parent_stack";

/// Resolves a workflow reference and executes it one nesting level deeper.
///
/// Refusal (depth exceeded or cycle) raises a recursion fault naming the
/// active workflow stack; unlike per-agent faults, this is a hard stop that
/// propagates to the enclosing run. The nested result is tagged with the
/// workflow id, depth, and parent stack, and its aggregated output may be
/// folded back into the caller's context under a chosen key.
pub struct NestedStrategy {
    capability: Arc<dyn AgentCapability>,
    registry: Arc<WorkflowRegistry>,
    reference: WorkflowReference,
    output_key: Option<String>,
}

impl NestedStrategy {
    /// Create a nested strategy for one workflow reference.
    pub fn new(
        capability: Arc<dyn AgentCapability>,
        registry: Arc<WorkflowRegistry>,
        reference: WorkflowReference,
    ) -> Self {
        Self {
            capability,
            registry,
            reference,
            output_key: None,
        }
    }

    /// Builder: fold the nested output into the caller's context under
    /// this key.
    pub fn with_output_key(mut self, output_key: impl Into<String>) -> Self {
        self.output_key = Some(output_key.into());
        self
    }

    fn resolve(&self) -> Result<Arc<WorkflowDefinition>, EnsembleError> {
        match &self.reference {
            WorkflowReference::Registered(id) => self
                .registry
                .get(id)
                .ok_or_else(|| EnsembleError::UnknownWorkflow(id.clone())),
            WorkflowReference::Inline(def) => Ok(Arc::new(def.clone())),
        }
    }
}

#[async_trait]
impl ExecutionStrategy for NestedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Nested
    }

    async fn execute(
        &self,
        _agents: &[Agent],
        ctx: &mut ExecutionContext,
    ) -> Result<StrategyResult, EnsembleError> {
        let definition = self.resolve()?;
        let workflow_id = definition.id.clone();

        if !ctx.nesting.can_nest(&workflow_id) {
            let reason = if ctx.nesting.is_active(&workflow_id) {
                format!("cycle detected for workflow '{}'", workflow_id)
            } else {
                format!(
                    "nesting depth limit {} reached entering '{}'",
                    ctx.nesting.max_depth(),
                    workflow_id
                )
            };
            return Err(EnsembleError::Recursion {
                reason,
                stack: ctx.nesting.stack().to_vec(),
            });
        }

        let parent_stack = ctx.nesting.stack().to_vec();
        let mut child = ctx.clone();
        child.nesting = ctx.nesting.enter(&workflow_id);
        child.workflow_label = Some(workflow_id.clone());
        log::debug!(
            "entering nested workflow '{}' at depth {}",
            workflow_id,
            child.nesting.depth()
        );

        let strategy = build_strategy(definition.strategy, self.capability.clone())?;
        let mut result = strategy.execute(&definition.agents, &mut child).await?;

        result.tag(WORKFLOW_ID_KEY, Value::String(workflow_id));
        result.tag(DEPTH_KEY, Value::from(child.nesting.depth()));
        result.tag(
            PARENT_STACK_KEY,
            Value::Array(parent_stack.into_iter().map(Value::String).collect()),
        );

        if let Some(ref key) = self.output_key {
            ctx.set(key.clone(), Value::Object(result.output.clone()));
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Nested sequential
// ---------------------------------------------------------------------------

/// One step of a nested sequential chain: either a direct agent or a
/// workflow reference, never both, never neither.
#[derive(Debug, Clone)]
pub struct WorkflowStep {
    /// Step name; a nested step's output folds into context under it.
    pub name: String,
    agent: Option<Agent>,
    workflow: Option<WorkflowReference>,
}

impl WorkflowStep {
    /// Create a step, validating the agent/workflow exclusivity at
    /// construction.
    pub fn new(
        name: impl Into<String>,
        agent: Option<Agent>,
        workflow: Option<WorkflowReference>,
    ) -> Result<Self, EnsembleError> {
        let name = name.into();
        match (&agent, &workflow) {
            (Some(_), Some(_)) => Err(EnsembleError::Validation(format!(
                "step '{}' declares both an agent and a workflow reference",
                name
            ))),
            (None, None) => Err(EnsembleError::Validation(format!(
                "step '{}' declares neither an agent nor a workflow reference",
                name
            ))),
            _ => Ok(Self {
                name,
                agent,
                workflow,
            }),
        }
    }

    /// A direct agent step.
    pub fn agent(name: impl Into<String>, agent: Agent) -> Self {
        Self {
            name: name.into(),
            agent: Some(agent),
            workflow: None,
        }
    }

    /// A nested workflow step.
    pub fn workflow(name: impl Into<String>, reference: WorkflowReference) -> Self {
        Self {
            name: name.into(),
            agent: None,
            workflow: Some(reference),
        }
    }
}

/// Sequential chain whose steps are direct agents or nested workflows.
///
/// Nested steps run through [`NestedStrategy`] and fold their aggregated
/// output into context under the step name; their recursion faults
/// propagate and abort the chain.
pub struct NestedSequentialStrategy {
    capability: Arc<dyn AgentCapability>,
    registry: Arc<WorkflowRegistry>,
    steps: Vec<WorkflowStep>,
}

impl NestedSequentialStrategy {
    /// Create a nested sequential strategy over the given steps.
    pub fn new(
        capability: Arc<dyn AgentCapability>,
        registry: Arc<WorkflowRegistry>,
        steps: Vec<WorkflowStep>,
    ) -> Self {
        Self {
            capability,
            registry,
            steps,
        }
    }
}

#[async_trait]
impl ExecutionStrategy for NestedSequentialStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::NestedSequential
    }

    async fn execute(
        &self,
        _agents: &[Agent],
        ctx: &mut ExecutionContext,
    ) -> Result<StrategyResult, EnsembleError> {
        if self.steps.is_empty() {
            return Err(EnsembleError::Validation(
                "nested sequential pattern requires at least one step".to_string(),
            ));
        }

        let mut results = Vec::new();
        let mut last_output = serde_json::Map::new();

        for step in &self.steps {
            if let Some(ref agent) = step.agent {
                let result = invoke_agent(&self.capability, agent, ctx).await;
                if result.success {
                    ctx.publish(&agent.id, result.output.clone());
                    last_output = result.output.clone();
                }
                results.push(result);
            } else if let Some(ref reference) = step.workflow {
                let nested = NestedStrategy::new(
                    self.capability.clone(),
                    self.registry.clone(),
                    reference.clone(),
                )
                .with_output_key(step.name.clone());
                let sub = nested.execute(&[], ctx).await?;
                last_output = sub.output.clone();
                results.extend(sub.agent_results);
            }
        }

        Ok(StrategyResult::from_results(results).with_output(last_output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ScriptedCapability;
    use crate::nesting::NestingContext;

    fn simple_workflow(id: &str, agent_id: &str) -> WorkflowDefinition {
        WorkflowDefinition::new(
            id,
            vec![Agent::new(agent_id, "worker")],
            StrategyKind::Sequential,
        )
    }

    #[tokio::test]
    async fn test_unknown_workflow_id() {
        let registry = Arc::new(WorkflowRegistry::new());
        let strategy = NestedStrategy::new(
            Arc::new(ScriptedCapability::new()),
            registry,
            WorkflowReference::Registered("ghost".into()),
        );
        let err = strategy
            .execute(&[], &mut ExecutionContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EnsembleError::UnknownWorkflow(_)));
    }

    #[tokio::test]
    async fn test_nested_tags_and_output_key() {
        let registry = Arc::new(WorkflowRegistry::new());
        registry.register(simple_workflow("audit", "auditor"));
        let strategy = NestedStrategy::new(
            Arc::new(ScriptedCapability::new()),
            registry,
            WorkflowReference::Registered("audit".into()),
        )
        .with_output_key("audit_findings");

        let mut ctx = ExecutionContext::new();
        let result = strategy.execute(&[], &mut ctx).await.unwrap();

        assert!(result.success);
        assert_eq!(
            result.output.get(WORKFLOW_ID_KEY),
            Some(&Value::String("audit".into()))
        );
        assert_eq!(result.output.get(DEPTH_KEY), Some(&Value::from(1)));
        assert!(ctx.contains("audit_findings"));
    }

    #[tokio::test]
    async fn test_cycle_raises_recursion_fault_naming_stack() {
        let registry = Arc::new(WorkflowRegistry::new());
        registry.register(simple_workflow("audit", "auditor"));
        let strategy = NestedStrategy::new(
            Arc::new(ScriptedCapability::new()),
            registry,
            WorkflowReference::Registered("audit".into()),
        );

        let mut ctx = ExecutionContext::new();
        ctx.nesting = NestingContext::default().enter("root").enter("audit");
        let err = strategy.execute(&[], &mut ctx).await.unwrap_err();

        match err {
            EnsembleError::Recursion { reason, stack } => {
                assert!(reason.contains("cycle"));
                assert_eq!(stack, vec!["root".to_string(), "audit".to_string()]);
            }
            other => panic!("expected recursion fault, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_depth_limit_raises_recursion_fault() {
        let registry = Arc::new(WorkflowRegistry::new());
        registry.register(simple_workflow("deep", "worker"));
        let strategy = NestedStrategy::new(
            Arc::new(ScriptedCapability::new()),
            registry,
            WorkflowReference::Registered("deep".into()),
        );

        let mut ctx = ExecutionContext::new();
        ctx.nesting = NestingContext::new(1).enter("root");
        let err = strategy.execute(&[], &mut ctx).await.unwrap_err();
        match err {
            EnsembleError::Recursion { reason, .. } => assert!(reason.contains("depth")),
            other => panic!("expected recursion fault, got {:?}", other),
        }
    }

    #[test]
    fn test_step_exclusivity_validated_at_construction() {
        let both = WorkflowStep::new(
            "bad",
            Some(Agent::new("a", "worker")),
            Some(WorkflowReference::Registered("wf".into())),
        );
        assert!(matches!(both, Err(EnsembleError::Validation(_))));

        let neither = WorkflowStep::new("bad", None, None);
        assert!(matches!(neither, Err(EnsembleError::Validation(_))));

        assert!(WorkflowStep::new("ok", Some(Agent::new("a", "worker")), None).is_ok());
    }

    #[tokio::test]
    async fn test_nested_sequential_mixes_agents_and_workflows() {
        let registry = Arc::new(WorkflowRegistry::new());
        registry.register(simple_workflow("research", "researcher"));
        let capability = ScriptedCapability::new().reply("writer", "summary", 0.9);
        let counts = capability.invocations();
        let strategy = NestedSequentialStrategy::new(
            Arc::new(capability),
            registry,
            vec![
                WorkflowStep::workflow(
                    "research_phase",
                    WorkflowReference::Registered("research".into()),
                ),
                WorkflowStep::agent("write_phase", Agent::new("writer", "writer")),
            ],
        );

        let mut ctx = ExecutionContext::new();
        let result = strategy.execute(&[], &mut ctx).await.unwrap();

        assert!(result.success);
        assert_eq!(result.agent_results.len(), 2);
        assert_eq!(counts.count("researcher"), 1);
        assert_eq!(counts.count("writer"), 1);
        // Nested output folded under the step name.
        assert!(ctx.contains("research_phase"));
    }
}
