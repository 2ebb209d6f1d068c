//! Delegation-chain composition: a coordinator's findings seed the rest of
//! the team.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{Agent, StrategyResult};
use crate::capability::AgentCapability;
use crate::context::ExecutionContext;
use crate::errors::EnsembleError;

use super::{invoke_agent, ExecutionStrategy, ParallelStrategy, StrategyKind};

/// Context key the delegated agents find the coordinator's output under.
pub const COORDINATOR_FINDINGS_KEY: &str = "coordinator_findings";

/// First agent is the coordinator. Its output seeds context as
/// `coordinator_findings`; the remaining agents then run (concurrently by
/// default, or sequentially) against the enriched context. Results are
/// concatenated with the coordinator first.
pub struct DelegationChainStrategy {
    capability: Arc<dyn AgentCapability>,
    concurrent: bool,
}

impl DelegationChainStrategy {
    /// Create a delegation chain with concurrent delegates.
    pub fn new(capability: Arc<dyn AgentCapability>) -> Self {
        Self {
            capability,
            concurrent: true,
        }
    }

    /// Builder: run delegates sequentially instead of concurrently.
    pub fn sequential_delegates(mut self) -> Self {
        self.concurrent = false;
        self
    }
}

#[async_trait]
impl ExecutionStrategy for DelegationChainStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DelegationChain
    }

    async fn execute(
        &self,
        agents: &[Agent],
        ctx: &mut ExecutionContext,
    ) -> Result<StrategyResult, EnsembleError> {
        if agents.len() < 2 {
            return Err(EnsembleError::Validation(format!(
                "delegation chain requires a coordinator and at least one delegate, got {}",
                agents.len()
            )));
        }
        let coordinator = &agents[0];
        let delegates = &agents[1..];

        let coordinator_result = invoke_agent(&self.capability, coordinator, ctx).await;
        ctx.set(
            COORDINATOR_FINDINGS_KEY,
            Value::Object(coordinator_result.output.clone()),
        );

        let delegate_results = if self.concurrent {
            ParallelStrategy::fan_out(&self.capability, delegates, ctx).await
        } else {
            let mut results = Vec::with_capacity(delegates.len());
            for delegate in delegates {
                let result = invoke_agent(&self.capability, delegate, ctx).await;
                if result.success {
                    ctx.publish(&delegate.id, result.output.clone());
                }
                results.push(result);
            }
            results
        };

        // Coordinator phase, then the delegates' phase (max when concurrent).
        let delegate_duration = if self.concurrent {
            delegate_results
                .iter()
                .map(|r| r.duration)
                .max()
                .unwrap_or(Duration::ZERO)
        } else {
            delegate_results.iter().map(|r| r.duration).sum()
        };
        let total_duration = coordinator_result.duration + delegate_duration;

        for result in &delegate_results {
            if result.success {
                ctx.publish(&result.agent_id, result.output.clone());
            }
        }

        let mut all = Vec::with_capacity(agents.len());
        all.push(coordinator_result);
        all.extend(delegate_results);

        let mut aggregated = StrategyResult::from_results(all);
        aggregated.total_duration = total_duration;
        Ok(aggregated)
    }
}
