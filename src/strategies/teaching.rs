//! Teaching composition: junior attempts first, expert steps in only when
//! the junior's confidence is insufficient.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::agent::{Agent, StrategyResult};
use crate::capability::AgentCapability;
use crate::context::ExecutionContext;
use crate::errors::EnsembleError;

use super::{invoke_agent, ExecutionStrategy, StrategyKind};

/// Context key the expert finds the junior's attempt under.
pub const JUNIOR_ATTEMPT_KEY: &str = "junior_attempt";

/// Default junior confidence threshold above which the expert never runs.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.7;

/// Exactly two agents: `[junior, expert]`. The junior runs first; if it
/// succeeds with confidence at or above the threshold the expert never
/// runs. Otherwise the expert runs with the junior's attempt injected and
/// its output becomes the aggregate. Duration is the sum of the phases
/// actually executed.
pub struct TeachingStrategy {
    capability: Arc<dyn AgentCapability>,
    quality_threshold: f64,
}

impl TeachingStrategy {
    /// Create a teaching strategy with the default threshold.
    pub fn new(capability: Arc<dyn AgentCapability>) -> Self {
        Self {
            capability,
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
        }
    }

    /// Builder: override the junior confidence threshold.
    pub fn with_quality_threshold(mut self, quality_threshold: f64) -> Self {
        self.quality_threshold = quality_threshold;
        self
    }
}

#[async_trait]
impl ExecutionStrategy for TeachingStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Teaching
    }

    async fn execute(
        &self,
        agents: &[Agent],
        ctx: &mut ExecutionContext,
    ) -> Result<StrategyResult, EnsembleError> {
        if agents.len() != 2 {
            return Err(EnsembleError::Validation(format!(
                "teaching pattern requires exactly 2 agents [junior, expert], got {}",
                agents.len()
            )));
        }
        let (junior, expert) = (&agents[0], &agents[1]);

        let junior_result = invoke_agent(&self.capability, junior, ctx).await;
        if junior_result.success && junior_result.confidence >= self.quality_threshold {
            log::debug!(
                "junior '{}' passed at confidence {:.2}; expert '{}' not invoked",
                junior.id,
                junior_result.confidence,
                expert.id
            );
            let output = junior_result.output.clone();
            ctx.publish(&junior.id, output.clone());
            return Ok(StrategyResult::from_results(vec![junior_result]).with_output(output));
        }

        ctx.set(
            JUNIOR_ATTEMPT_KEY,
            Value::Object(junior_result.output.clone()),
        );
        let expert_result = invoke_agent(&self.capability, expert, ctx).await;
        let output = expert_result.output.clone();
        if expert_result.success {
            ctx.publish(&expert.id, output.clone());
        }

        let total_duration = junior_result.duration + expert_result.duration;
        let success = expert_result.success;
        let errors = [&junior_result, &expert_result]
            .iter()
            .filter_map(|r| r.error.clone())
            .collect();
        Ok(StrategyResult {
            success,
            agent_results: vec![junior_result, expert_result],
            output,
            total_duration,
            errors,
        })
    }
}
