//! Refinement composition: staged rewriting of one artifact.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::agent::{Agent, StrategyResult};
use crate::capability::AgentCapability;
use crate::context::ExecutionContext;
use crate::errors::EnsembleError;

use super::{invoke_agent, ExecutionStrategy, StrategyKind};

/// Context key each stage finds the prior stage's output under.
pub const PREVIOUS_OUTPUT_KEY: &str = "previous_output";

/// At least two stages. Each stage consumes the prior stage's output as
/// `previous_output`. Unlike the sequential pattern, a stage failure aborts
/// the remaining stages; the aggregate output is the last successful stage.
pub struct RefinementStrategy {
    capability: Arc<dyn AgentCapability>,
}

impl RefinementStrategy {
    /// Create a refinement strategy over the given capability.
    pub fn new(capability: Arc<dyn AgentCapability>) -> Self {
        Self { capability }
    }
}

#[async_trait]
impl ExecutionStrategy for RefinementStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Refinement
    }

    async fn execute(
        &self,
        agents: &[Agent],
        ctx: &mut ExecutionContext,
    ) -> Result<StrategyResult, EnsembleError> {
        if agents.len() < 2 {
            return Err(EnsembleError::Validation(format!(
                "refinement pattern requires at least 2 stages, got {}",
                agents.len()
            )));
        }

        let mut results = Vec::with_capacity(agents.len());
        let mut last_output = None;

        for agent in agents {
            let result = invoke_agent(&self.capability, agent, ctx).await;
            let failed = !result.success;
            if result.success {
                ctx.set(PREVIOUS_OUTPUT_KEY, Value::Object(result.output.clone()));
                ctx.publish(&agent.id, result.output.clone());
                last_output = Some(result.output.clone());
            }
            results.push(result);
            if failed {
                log::debug!(
                    "refinement stage '{}' failed; aborting remaining stages",
                    agent.id
                );
                break;
            }
        }

        Ok(StrategyResult::from_results(results).with_output(last_output.unwrap_or_default()))
    }
}
