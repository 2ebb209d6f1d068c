//! Parallel composition: fan out, fault-isolate, always join on everyone.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{Agent, AgentResult, StrategyResult};
use crate::capability::AgentCapability;
use crate::context::ExecutionContext;
use crate::errors::EnsembleError;

use super::{invoke_agent, ExecutionStrategy, StrategyKind};

/// Fans out all agents against an identical context snapshot and joins on
/// every member — no early cancellation of siblings. Any fault becomes a
/// failed member result. Total duration is the maximum member duration,
/// not the sum.
pub struct ParallelStrategy {
    capability: Arc<dyn AgentCapability>,
}

impl ParallelStrategy {
    /// Create a parallel strategy over the given capability.
    pub fn new(capability: Arc<dyn AgentCapability>) -> Self {
        Self { capability }
    }

    /// Fan out `agents` against a snapshot of `ctx`, preserving agent order
    /// in the returned results. Shared with the debate pattern.
    pub(crate) async fn fan_out(
        capability: &Arc<dyn AgentCapability>,
        agents: &[Agent],
        ctx: &ExecutionContext,
    ) -> Vec<AgentResult> {
        let snapshot = ctx.clone();
        let futures = agents
            .iter()
            .map(|agent| invoke_agent(capability, agent, &snapshot));
        join_all(futures).await
    }
}

#[async_trait]
impl ExecutionStrategy for ParallelStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Parallel
    }

    async fn execute(
        &self,
        agents: &[Agent],
        ctx: &mut ExecutionContext,
    ) -> Result<StrategyResult, EnsembleError> {
        if agents.is_empty() {
            return Err(EnsembleError::Validation(
                "parallel pattern requires at least one agent".to_string(),
            ));
        }

        let results = Self::fan_out(&self.capability, agents, ctx).await;
        let max_duration = results
            .iter()
            .map(|r| r.duration)
            .max()
            .unwrap_or(Duration::ZERO);

        // Publish each success back into the caller's context.
        for result in &results {
            if result.success {
                ctx.publish(&result.agent_id, result.output.clone());
            }
        }

        let mut aggregated = StrategyResult::from_results(results);
        aggregated.total_duration = max_duration;
        Ok(aggregated)
    }
}
