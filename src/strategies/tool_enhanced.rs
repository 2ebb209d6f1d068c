//! Tool-enhanced composition: one agent with broadened capability access.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::agent::{Agent, StrategyResult};
use crate::capability::AgentCapability;
use crate::context::{ExecutionContext, TOOL_ACCESS_KEY};
use crate::errors::EnsembleError;

use super::{invoke_agent, ExecutionStrategy, StrategyKind};

/// A single agent invoked with the tool-access flag set in its context.
/// What "tool access" unlocks is the capability's business; the engine only
/// flags it.
pub struct ToolEnhancedStrategy {
    capability: Arc<dyn AgentCapability>,
}

impl ToolEnhancedStrategy {
    /// Create a tool-enhanced strategy over the given capability.
    pub fn new(capability: Arc<dyn AgentCapability>) -> Self {
        Self { capability }
    }
}

#[async_trait]
impl ExecutionStrategy for ToolEnhancedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ToolEnhanced
    }

    async fn execute(
        &self,
        agents: &[Agent],
        ctx: &mut ExecutionContext,
    ) -> Result<StrategyResult, EnsembleError> {
        if agents.len() != 1 {
            return Err(EnsembleError::Validation(format!(
                "tool-enhanced pattern requires exactly 1 agent, got {}",
                agents.len()
            )));
        }
        let agent = &agents[0];

        ctx.set(TOOL_ACCESS_KEY, Value::Bool(true));
        let result = invoke_agent(&self.capability, agent, ctx).await;
        let output = result.output.clone();
        if result.success {
            ctx.publish(&agent.id, output.clone());
        }
        Ok(StrategyResult::from_results(vec![result]).with_output(output))
    }
}
