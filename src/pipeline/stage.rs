//! Stage descriptors and per-run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::Agent;
use crate::tier::Tier;

use super::validator::StageValidator;

/// One named stage of a workflow pipeline.
///
/// The tier hint is the starting point for routing; the router may override
/// it with a static mapping, a dynamic strategy, or an adaptive upgrade. A
/// stage-specific validator replaces the pipeline default for fallback runs.
#[derive(Clone)]
pub struct StageSpec {
    /// Stage name; also the context key its output is published under.
    pub name: String,
    /// Agent descriptor the stage runs.
    pub agent: Agent,
    /// Preferred tier when no routing rule says otherwise.
    pub tier_hint: Tier,
    /// Validator override for tier fallback; `None` uses the pipeline default.
    pub validator: Option<Arc<dyn StageValidator>>,
    /// When set, the stage is skipped with this reason.
    pub skip_reason: Option<String>,
}

impl StageSpec {
    /// Create a stage; the tier hint starts from the agent's own tier.
    pub fn new(name: impl Into<String>, agent: Agent) -> Self {
        let tier_hint = agent.tier;
        Self {
            name: name.into(),
            agent,
            tier_hint,
            validator: None,
            skip_reason: None,
        }
    }

    /// Builder: override the tier hint.
    pub fn with_tier_hint(mut self, tier: Tier) -> Self {
        self.tier_hint = tier;
        self
    }

    /// Builder: attach a stage-specific output validator.
    pub fn with_validator(mut self, validator: Arc<dyn StageValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Builder: mark the stage skipped.
    pub fn skipped(mut self, reason: impl Into<String>) -> Self {
        self.skip_reason = Some(reason.into());
        self
    }
}

impl fmt::Debug for StageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageSpec")
            .field("name", &self.name)
            .field("agent", &self.agent.id)
            .field("tier_hint", &self.tier_hint)
            .field("validator", &self.validator.is_some())
            .field("skip_reason", &self.skip_reason)
            .finish()
    }
}

/// One tier attempt within a stage, pass or fail.
///
/// Appended to the tier-progression log on every attempt and consumed later
/// by the adaptive router's failure-rate accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierAttempt {
    /// Workflow the attempt belongs to.
    pub workflow: String,
    /// Stage name.
    pub stage: String,
    /// Tier tried.
    pub tier: Tier,
    /// Whether the attempt passed (capability succeeded and output validated).
    pub success: bool,
    /// Failure reason when it did not.
    pub error: Option<String>,
    /// When the attempt finished.
    pub timestamp: DateTime<Utc>,
}

/// Completed (or skipped) stage as recorded in run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStage {
    /// Stage name.
    pub name: String,
    /// Tier that produced the accepted output; `None` for skipped stages.
    pub tier: Option<Tier>,
    /// Prompt-side tokens across all attempts.
    pub tokens_in: u64,
    /// Completion-side tokens across all attempts.
    pub tokens_out: u64,
    /// Cost accumulated across all attempts, passing and failing.
    pub cost: f64,
    /// Wall time across all attempts.
    pub duration: Duration,
    /// Whether the stage ended with an accepted output.
    pub success: bool,
    /// Whether the stage was skipped.
    pub skipped: bool,
    /// Skip reason, when skipped.
    pub skip_reason: Option<String>,
    /// Accepted output map (empty for skipped or failed stages).
    pub output: Map<String, Value>,
    /// Number of tier attempts made (0 for skipped stages).
    pub attempts: usize,
    /// Whether the accepted output came from the response cache.
    pub cached: bool,
}

impl WorkflowStage {
    /// Record for a skipped stage: zero cost, zero attempts, reason retained.
    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tier: None,
            tokens_in: 0,
            tokens_out: 0,
            cost: 0.0,
            duration: Duration::ZERO,
            success: true,
            skipped: true,
            skip_reason: Some(reason.into()),
            output: Map::new(),
            attempts: 0,
            cached: false,
        }
    }
}

/// Cost summary computed at the end of a pipeline run.
///
/// The baseline is what the run would have cost had every executed stage run
/// once at premium; savings may go negative when fallback retries pile up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostReport {
    /// Actual cost across all attempts.
    pub total_cost: f64,
    /// All-premium baseline for the executed stages.
    pub baseline_cost: f64,
    /// `baseline_cost - total_cost`.
    pub savings: f64,
    /// Cost per stage, in stage order.
    pub by_stage: Vec<(String, f64)>,
    /// Cost per tier.
    pub by_tier: HashMap<Tier, f64>,
    /// Response-cache hits during the run.
    pub cache_hits: usize,
    /// Response-cache misses during the run.
    pub cache_misses: usize,
}

impl CostReport {
    /// Compute the report from the run's stage history.
    pub fn from_stages(stages: &[WorkflowStage], cache_hits: usize, cache_misses: usize) -> Self {
        let total_cost: f64 = stages.iter().map(|s| s.cost).sum();
        let executed = stages.iter().filter(|s| !s.skipped).count();
        let baseline_cost = executed as f64 * Tier::Premium.unit_cost();

        let by_stage = stages
            .iter()
            .filter(|s| !s.skipped)
            .map(|s| (s.name.clone(), s.cost))
            .collect();

        let mut by_tier: HashMap<Tier, f64> = HashMap::new();
        for stage in stages {
            if let Some(tier) = stage.tier {
                *by_tier.entry(tier).or_default() += stage.cost;
            }
        }

        Self {
            total_cost,
            baseline_cost,
            savings: baseline_cost - total_cost,
            by_stage,
            by_tier,
            cache_hits,
            cache_misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done(name: &str, tier: Tier, cost: f64) -> WorkflowStage {
        WorkflowStage {
            name: name.to_string(),
            tier: Some(tier),
            tokens_in: 0,
            tokens_out: 0,
            cost,
            duration: Duration::ZERO,
            success: true,
            skipped: false,
            skip_reason: None,
            output: Map::new(),
            attempts: 1,
            cached: false,
        }
    }

    #[test]
    fn test_cost_report_savings_vs_premium_baseline() {
        let stages = vec![
            done("draft", Tier::Cheap, 1.0),
            done("review", Tier::Capable, 3.0),
        ];
        let report = CostReport::from_stages(&stages, 0, 2);
        assert_eq!(report.total_cost, 4.0);
        assert_eq!(report.baseline_cost, 20.0);
        assert_eq!(report.savings, 16.0);
        assert_eq!(report.by_tier.get(&Tier::Cheap), Some(&1.0));
        assert_eq!(report.cache_misses, 2);
    }

    #[test]
    fn test_skipped_stages_excluded_from_totals() {
        let stages = vec![
            done("draft", Tier::Cheap, 1.0),
            WorkflowStage::skipped("review", "disabled by config"),
        ];
        let report = CostReport::from_stages(&stages, 0, 1);
        assert_eq!(report.total_cost, 1.0);
        // Baseline counts executed stages only.
        assert_eq!(report.baseline_cost, 10.0);
        assert_eq!(report.by_stage.len(), 1);
    }
}
