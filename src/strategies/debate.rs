//! Debate composition: parallel opinions plus consensus synthesis.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{Agent, StrategyResult};
use crate::capability::AgentCapability;
use crate::context::ExecutionContext;
use crate::errors::EnsembleError;

use super::{ExecutionStrategy, ParallelStrategy, StrategyKind};

/// Runs all agents in parallel, then synthesizes a consensus: participant
/// ids, raw opinions, a majority vote (strictly more than half the members
/// succeeding), and the mean confidence. The debate's success is the
/// majority vote.
pub struct DebateStrategy {
    capability: Arc<dyn AgentCapability>,
}

impl DebateStrategy {
    /// Create a debate strategy over the given capability.
    pub fn new(capability: Arc<dyn AgentCapability>) -> Self {
        Self { capability }
    }
}

#[async_trait]
impl ExecutionStrategy for DebateStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Debate
    }

    async fn execute(
        &self,
        agents: &[Agent],
        ctx: &mut ExecutionContext,
    ) -> Result<StrategyResult, EnsembleError> {
        if agents.len() < 2 {
            return Err(EnsembleError::Validation(
                "debate pattern requires at least two agents".to_string(),
            ));
        }

        let results = ParallelStrategy::fan_out(&self.capability, agents, ctx).await;
        let max_duration = results
            .iter()
            .map(|r| r.duration)
            .max()
            .unwrap_or(Duration::ZERO);

        let successes = results.iter().filter(|r| r.success).count();
        let majority = successes * 2 > results.len();
        let mean_confidence =
            results.iter().map(|r| r.confidence).sum::<f64>() / results.len() as f64;

        let mut opinions = Map::new();
        for result in &results {
            opinions.insert(
                result.agent_id.clone(),
                Value::Object(result.output.clone()),
            );
        }

        let mut consensus = Map::new();
        consensus.insert(
            "participants".to_string(),
            Value::Array(
                results
                    .iter()
                    .map(|r| Value::String(r.agent_id.clone()))
                    .collect(),
            ),
        );
        consensus.insert("opinions".to_string(), Value::Object(opinions));
        consensus.insert("majority_success".to_string(), Value::Bool(majority));
        consensus.insert("mean_confidence".to_string(), Value::from(mean_confidence));

        let errors = results.iter().filter_map(|r| r.error.clone()).collect();
        Ok(StrategyResult {
            success: majority,
            agent_results: results,
            output: consensus,
            total_duration: max_duration,
            errors,
        })
    }
}
