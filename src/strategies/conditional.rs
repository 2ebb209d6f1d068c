//! Conditional composition: branch on evaluated predicates.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::agent::{Agent, StrategyResult};
use crate::capability::AgentCapability;
use crate::conditions::{Condition, ConditionEvaluator};
use crate::context::ExecutionContext;
use crate::errors::EnsembleError;

use super::{build_strategy, Branch, ExecutionStrategy, StrategyKind};

/// Output key recording which branch a conditional took.
pub const BRANCH_TAKEN_KEY: &str = "branch_taken";

/// Output key recording the matched pair index of a multi-conditional.
pub const MATCHED_INDEX_KEY: &str = "_matched_index";

/// Evaluates one condition: true runs the then-branch, false runs the
/// else-branch, or yields a neutral no-op result (`branch_taken = null`)
/// when no else-branch exists. The result is tagged with the branch taken.
pub struct ConditionalStrategy {
    capability: Arc<dyn AgentCapability>,
    evaluator: ConditionEvaluator,
    condition: Condition,
    then_branch: Branch,
    else_branch: Option<Branch>,
}

impl ConditionalStrategy {
    /// Create a conditional strategy.
    pub fn new(
        capability: Arc<dyn AgentCapability>,
        evaluator: ConditionEvaluator,
        condition: Condition,
        then_branch: Branch,
    ) -> Self {
        Self {
            capability,
            evaluator,
            condition,
            then_branch,
            else_branch: None,
        }
    }

    /// Builder: attach an else-branch.
    pub fn with_else_branch(mut self, else_branch: Branch) -> Self {
        self.else_branch = Some(else_branch);
        self
    }
}

/// Run a branch by building its strategy and executing its agents.
async fn run_branch(
    capability: &Arc<dyn AgentCapability>,
    branch: &Branch,
    ctx: &mut ExecutionContext,
) -> Result<StrategyResult, EnsembleError> {
    let strategy = build_strategy(branch.strategy, capability.clone())?;
    strategy.execute(&branch.agents, ctx).await
}

#[async_trait]
impl ExecutionStrategy for ConditionalStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Conditional
    }

    async fn execute(
        &self,
        _agents: &[Agent],
        ctx: &mut ExecutionContext,
    ) -> Result<StrategyResult, EnsembleError> {
        let taken = self.evaluator.evaluate(&self.condition, ctx).await?;

        let (mut result, tag) = if taken {
            let result = run_branch(&self.capability, &self.then_branch, ctx).await?;
            (result, Value::String("then".to_string()))
        } else if let Some(ref else_branch) = self.else_branch {
            let result = run_branch(&self.capability, else_branch, ctx).await?;
            (result, Value::String("else".to_string()))
        } else {
            (StrategyResult::neutral(), Value::Null)
        };

        result.tag(BRANCH_TAKEN_KEY, tag);
        Ok(result)
    }
}

/// Ordered (condition, branch) pairs: the first branch whose condition is
/// true runs (first match wins). With no match, the optional default branch
/// runs; otherwise a neutral "no match" result is returned. The result is
/// tagged with the matched pair index (`null` for default/no-match).
pub struct MultiConditionalStrategy {
    capability: Arc<dyn AgentCapability>,
    evaluator: ConditionEvaluator,
    pairs: Vec<(Condition, Branch)>,
    default_branch: Option<Branch>,
}

impl MultiConditionalStrategy {
    /// Create a multi-conditional strategy.
    pub fn new(
        capability: Arc<dyn AgentCapability>,
        evaluator: ConditionEvaluator,
        pairs: Vec<(Condition, Branch)>,
    ) -> Self {
        Self {
            capability,
            evaluator,
            pairs,
            default_branch: None,
        }
    }

    /// Builder: attach a default branch taken when no condition matches.
    pub fn with_default_branch(mut self, default_branch: Branch) -> Self {
        self.default_branch = Some(default_branch);
        self
    }
}

#[async_trait]
impl ExecutionStrategy for MultiConditionalStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MultiConditional
    }

    async fn execute(
        &self,
        _agents: &[Agent],
        ctx: &mut ExecutionContext,
    ) -> Result<StrategyResult, EnsembleError> {
        if self.pairs.is_empty() {
            return Err(EnsembleError::Validation(
                "multi-conditional pattern requires at least one (condition, branch) pair"
                    .to_string(),
            ));
        }

        for (index, (condition, branch)) in self.pairs.iter().enumerate() {
            if self.evaluator.evaluate(condition, ctx).await? {
                let mut result = run_branch(&self.capability, branch, ctx).await?;
                result.tag(MATCHED_INDEX_KEY, Value::from(index));
                return Ok(result);
            }
        }

        let mut result = if let Some(ref default_branch) = self.default_branch {
            run_branch(&self.capability, default_branch, ctx).await?
        } else {
            log::debug!("multi-conditional matched no pair and has no default branch");
            StrategyResult::neutral()
        };
        result.tag(MATCHED_INDEX_KEY, Value::Null);
        Ok(result)
    }
}
