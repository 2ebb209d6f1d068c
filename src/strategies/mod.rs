//! The composition pattern grammar.
//!
//! Thirteen fixed topologies combine agent executions into one
//! [`StrategyResult`]. Every pattern validates its arity precondition before
//! touching an agent and fails fast with a validation error. Per-agent
//! faults are captured as failed [`AgentResult`]s and never abort siblings;
//! the one hard stop is the recursion fault raised by nested composition.

mod adaptive;
mod cached;
mod conditional;
mod debate;
mod delegation;
mod nested;
mod parallel;
mod refinement;
mod sequential;
mod teaching;
mod tool_enhanced;

pub use adaptive::AdaptiveStrategy;
pub use cached::PromptCachedSequentialStrategy;
pub use conditional::{ConditionalStrategy, MultiConditionalStrategy};
pub use debate::DebateStrategy;
pub use delegation::DelegationChainStrategy;
pub use nested::{NestedSequentialStrategy, NestedStrategy, WorkflowStep};
pub use parallel::ParallelStrategy;
pub use refinement::RefinementStrategy;
pub use sequential::SequentialStrategy;
pub use teaching::TeachingStrategy;
pub use tool_enhanced::ToolEnhancedStrategy;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use crate::agent::{Agent, AgentResult, StrategyResult};
use crate::capability::AgentCapability;
use crate::context::ExecutionContext;
use crate::errors::EnsembleError;
use crate::services::CallRecord;

/// Names of the thirteen composition patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Strict chain; each success feeds later agents through context.
    Sequential,
    /// Fan out all agents against an identical context snapshot.
    Parallel,
    /// Parallel plus consensus synthesis (majority vote, mean confidence).
    Debate,
    /// Junior/expert pair with a confidence threshold.
    Teaching,
    /// Staged rewriting; each stage consumes the prior stage's output.
    Refinement,
    /// Classifier routes to the cheapest or strongest specialist.
    Adaptive,
    /// One condition, then/else branches.
    Conditional,
    /// Ordered condition list, first match wins.
    MultiConditional,
    /// Invoke a registered or inline workflow under depth/cycle guards.
    Nested,
    /// Sequential where steps are agents or workflow references.
    NestedSequential,
    /// Single agent with broadened tool access.
    ToolEnhanced,
    /// Sequential sharing one context blob attached once.
    PromptCachedSequential,
    /// Coordinator first, findings seed the concurrent remainder.
    DelegationChain,
}

impl StrategyKind {
    /// All pattern kinds, in declaration order.
    pub const ALL: [StrategyKind; 13] = [
        StrategyKind::Sequential,
        StrategyKind::Parallel,
        StrategyKind::Debate,
        StrategyKind::Teaching,
        StrategyKind::Refinement,
        StrategyKind::Adaptive,
        StrategyKind::Conditional,
        StrategyKind::MultiConditional,
        StrategyKind::Nested,
        StrategyKind::NestedSequential,
        StrategyKind::ToolEnhanced,
        StrategyKind::PromptCachedSequential,
        StrategyKind::DelegationChain,
    ];
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::Sequential => "sequential",
            StrategyKind::Parallel => "parallel",
            StrategyKind::Debate => "debate",
            StrategyKind::Teaching => "teaching",
            StrategyKind::Refinement => "refinement",
            StrategyKind::Adaptive => "adaptive",
            StrategyKind::Conditional => "conditional",
            StrategyKind::MultiConditional => "multi_conditional",
            StrategyKind::Nested => "nested",
            StrategyKind::NestedSequential => "nested_sequential",
            StrategyKind::ToolEnhanced => "tool_enhanced",
            StrategyKind::PromptCachedSequential => "prompt_cached_sequential",
            StrategyKind::DelegationChain => "delegation_chain",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .iter()
            .find(|kind| kind.to_string() == s.to_lowercase())
            .copied()
            .ok_or_else(|| format!("unknown strategy kind: {}", s))
    }
}

/// A composition pattern: `execute(agents, context) -> StrategyResult`.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    /// Pattern name for logging and result tagging.
    fn kind(&self) -> StrategyKind;

    /// Execute the pattern over the given agents.
    ///
    /// Arity violations return `Err(Validation)` before any agent runs.
    async fn execute(
        &self,
        agents: &[Agent],
        ctx: &mut ExecutionContext,
    ) -> Result<StrategyResult, EnsembleError>;
}

/// Invoke one agent through the capability, fault-isolated.
///
/// A capability fault becomes a failed [`AgentResult`] (confidence 0.0);
/// it never propagates out of this function. The call is also recorded to
/// telemetry when a backend is wired.
pub(crate) async fn invoke_agent(
    capability: &Arc<dyn AgentCapability>,
    agent: &Agent,
    ctx: &ExecutionContext,
) -> AgentResult {
    let started = Instant::now();
    let (result, tokens_in, tokens_out) = match capability.run(agent, ctx.values()).await {
        Ok(out) => {
            let duration = started.elapsed();
            (
                AgentResult::ok(&agent.id, out.output, out.confidence, duration),
                out.tokens_in,
                out.tokens_out,
            )
        }
        Err(fault) => {
            let duration = started.elapsed();
            log::warn!("agent '{}' faulted: {}", agent.id, fault);
            (
                AgentResult::failed(&agent.id, fault.message, duration),
                0,
                0,
            )
        }
    };

    ctx.services.log_call(CallRecord {
        workflow: ctx.label().to_string(),
        stage: agent.id.clone(),
        agent_id: agent.id.clone(),
        tier: agent.tier,
        tokens_in,
        tokens_out,
        cost: agent.tier.unit_cost(),
        duration: result.duration,
        success: result.success,
        timestamp: Utc::now(),
    });

    result
}

/// Build a strategy from its kind alone.
///
/// Patterns that need inline configuration (conditions, branches, workflow
/// steps, a workflow reference) cannot be built from a bare kind and return
/// a validation error; construct those directly.
pub fn build_strategy(
    kind: StrategyKind,
    capability: Arc<dyn AgentCapability>,
) -> Result<Box<dyn ExecutionStrategy>, EnsembleError> {
    let strategy: Box<dyn ExecutionStrategy> = match kind {
        StrategyKind::Sequential => Box::new(SequentialStrategy::new(capability)),
        StrategyKind::Parallel => Box::new(ParallelStrategy::new(capability)),
        StrategyKind::Debate => Box::new(DebateStrategy::new(capability)),
        StrategyKind::Teaching => Box::new(TeachingStrategy::new(capability)),
        StrategyKind::Refinement => Box::new(RefinementStrategy::new(capability)),
        StrategyKind::Adaptive => Box::new(AdaptiveStrategy::new(capability)),
        StrategyKind::ToolEnhanced => Box::new(ToolEnhancedStrategy::new(capability)),
        StrategyKind::PromptCachedSequential => {
            Box::new(PromptCachedSequentialStrategy::new(capability, None))
        }
        StrategyKind::DelegationChain => Box::new(DelegationChainStrategy::new(capability)),
        StrategyKind::Conditional
        | StrategyKind::MultiConditional
        | StrategyKind::Nested
        | StrategyKind::NestedSequential => {
            return Err(EnsembleError::Validation(format!(
                "pattern '{}' requires inline configuration and cannot be built from a kind alone",
                kind
            )))
        }
    };
    Ok(strategy)
}

/// A (strategy, agents) pair used by conditional patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    /// Pattern to run when the branch is taken.
    pub strategy: StrategyKind,
    /// Agents for the branch.
    pub agents: Vec<Agent>,
}

impl Branch {
    /// Create a branch.
    pub fn new(strategy: StrategyKind, agents: Vec<Agent>) -> Self {
        Self { strategy, agents }
    }
}
