//! Sequential composition: a strict chain of agent invocations.

use async_trait::async_trait;
use std::sync::Arc;

use crate::agent::{Agent, StrategyResult};
use crate::capability::AgentCapability;
use crate::context::ExecutionContext;
use crate::errors::EnsembleError;

use super::{invoke_agent, ExecutionStrategy, StrategyKind};

/// Runs agents in order. Each success publishes its output into context
/// under the agent's id, where later agents can read it. A failure is
/// recorded and the chain continues; overall success is the AND of all
/// member results.
pub struct SequentialStrategy {
    capability: Arc<dyn AgentCapability>,
}

impl SequentialStrategy {
    /// Create a sequential strategy over the given capability.
    pub fn new(capability: Arc<dyn AgentCapability>) -> Self {
        Self { capability }
    }
}

#[async_trait]
impl ExecutionStrategy for SequentialStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sequential
    }

    async fn execute(
        &self,
        agents: &[Agent],
        ctx: &mut ExecutionContext,
    ) -> Result<StrategyResult, EnsembleError> {
        if agents.is_empty() {
            return Err(EnsembleError::Validation(
                "sequential pattern requires at least one agent".to_string(),
            ));
        }

        let mut results = Vec::with_capacity(agents.len());
        for agent in agents {
            let result = invoke_agent(&self.capability, agent, ctx).await;
            if result.success {
                ctx.publish(&agent.id, result.output.clone());
            } else {
                log::debug!(
                    "sequential member '{}' failed, continuing chain",
                    agent.id
                );
            }
            results.push(result);
        }

        let last_output = results
            .iter()
            .rev()
            .find(|r| r.success)
            .map(|r| r.output.clone())
            .unwrap_or_default();

        Ok(StrategyResult::from_results(results).with_output(last_output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ScriptedCapability;
    use serde_json::Value;

    #[tokio::test]
    async fn test_empty_agent_list_fails_fast() {
        let capability: Arc<dyn AgentCapability> = Arc::new(ScriptedCapability::new());
        let strategy = SequentialStrategy::new(capability);
        let err = strategy
            .execute(&[], &mut ExecutionContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EnsembleError::Validation(_)));
    }

    #[tokio::test]
    async fn test_failure_is_recorded_but_does_not_abort() {
        let capability: Arc<dyn AgentCapability> = Arc::new(
            ScriptedCapability::new()
                .reply("a", "first", 0.9)
                .fail("b", "b exploded"),
        );
        let strategy = SequentialStrategy::new(capability);
        let agents = vec![Agent::new("a", "writer"), Agent::new("b", "editor")];

        let result = strategy
            .execute(&agents, &mut ExecutionContext::new())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.agent_results.len(), 2);
        assert_eq!(result.errors, vec!["b exploded".to_string()]);
        assert_eq!(result.agent_results[1].confidence, 0.0);
        // The last successful output is carried as the aggregate.
        assert_eq!(
            result.output.get("content"),
            Some(&Value::String("first".into()))
        );
    }

    #[tokio::test]
    async fn test_outputs_published_for_later_agents() {
        let capability = ScriptedCapability::new().reply("a", "upstream", 0.9);
        let counts = capability.invocations();
        let capability: Arc<dyn AgentCapability> = Arc::new(capability);
        let strategy = SequentialStrategy::new(capability);
        let agents = vec![Agent::new("a", "writer"), Agent::new("b", "editor")];
        let mut ctx = ExecutionContext::new();

        let result = strategy.execute(&agents, &mut ctx).await.unwrap();
        assert!(result.success);
        // a's output landed in context under its id before b ran.
        assert!(ctx.contains("a"));
        assert_eq!(counts.total(), 2);
    }
}
