//! Tier routing: static maps, dynamic strategies, and adaptive upgrades.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::tier::Tier;

use super::stage::{StageSpec, TierAttempt};

/// Pluggable dynamic routing: return `Some(tier)` to claim a stage,
/// `None` to fall through to static routing.
pub trait RoutingStrategy: Send + Sync {
    /// Resolve a tier for one stage, or decline.
    fn resolve(&self, workflow: &str, stage: &StageSpec) -> Option<Tier>;
}

/// Tunables for the adaptive router.
///
/// The upgrade threshold is an empirically chosen constant carried over
/// as-is; treat it as a starting point, not an optimum.
#[derive(Debug, Clone)]
pub struct RouterTuning {
    /// Failure rate above which a stage's tier is upgraded one step.
    pub upgrade_threshold: f64,
    /// Minimum recorded attempts before the failure rate is trusted.
    pub min_samples: usize,
}

impl Default for RouterTuning {
    fn default() -> Self {
        Self {
            upgrade_threshold: 0.20,
            min_samples: 3,
        }
    }
}

/// Failure-rate accounting over the tier-progression log.
///
/// Every attempt (pass or fail, any mode) is recorded here; once a
/// (workflow, stage) pair's failure rate exceeds the threshold, the router
/// upgrades that stage's resolved tier by one step.
#[derive(Default)]
pub struct AdaptiveTierRouter {
    tuning: RouterTuning,
    history: Mutex<HashMap<(String, String), Vec<TierAttempt>>>,
}

impl AdaptiveTierRouter {
    /// Create a router with default tuning.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a router with explicit tuning.
    pub fn with_tuning(tuning: RouterTuning) -> Self {
        Self {
            tuning,
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Append one attempt to the progression log.
    pub fn record(&self, attempt: TierAttempt) {
        let key = (attempt.workflow.clone(), attempt.stage.clone());
        self.history.lock().entry(key).or_default().push(attempt);
    }

    /// Snapshot of recorded attempts for one (workflow, stage) pair.
    pub fn attempts(&self, workflow: &str, stage: &str) -> Vec<TierAttempt> {
        self.history
            .lock()
            .get(&(workflow.to_string(), stage.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Observed failure rate, or `None` below the sample floor.
    pub fn failure_rate(&self, workflow: &str, stage: &str) -> Option<f64> {
        let history = self.history.lock();
        let attempts = history.get(&(workflow.to_string(), stage.to_string()))?;
        if attempts.len() < self.tuning.min_samples {
            return None;
        }
        let failures = attempts.iter().filter(|a| !a.success).count();
        Some(failures as f64 / attempts.len() as f64)
    }

    /// Whether the stage's resolved tier should be upgraded one step.
    pub fn should_upgrade(&self, workflow: &str, stage: &str) -> bool {
        self.failure_rate(workflow, stage)
            .is_some_and(|rate| rate > self.tuning.upgrade_threshold)
    }
}

/// Tier resolution for pipeline stages.
///
/// Order: a dynamic strategy (when configured) wins outright; otherwise the
/// static per-stage map, falling back to the stage's own hint, optionally
/// upgraded one step by the adaptive router.
pub struct TierRouter {
    dynamic: Option<Arc<dyn RoutingStrategy>>,
    static_map: HashMap<String, Tier>,
    adaptive: Arc<AdaptiveTierRouter>,
}

impl Default for TierRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl TierRouter {
    /// A router with no dynamic strategy and an empty static map.
    pub fn new() -> Self {
        Self {
            dynamic: None,
            static_map: HashMap::new(),
            adaptive: Arc::new(AdaptiveTierRouter::new()),
        }
    }

    /// Builder: attach a dynamic routing strategy.
    pub fn with_dynamic(mut self, dynamic: Arc<dyn RoutingStrategy>) -> Self {
        self.dynamic = Some(dynamic);
        self
    }

    /// Builder: pin one stage to a tier.
    pub fn with_static_tier(mut self, stage: impl Into<String>, tier: Tier) -> Self {
        self.static_map.insert(stage.into(), tier);
        self
    }

    /// Builder: share an adaptive router (e.g. across pipelines).
    pub fn with_adaptive(mut self, adaptive: Arc<AdaptiveTierRouter>) -> Self {
        self.adaptive = adaptive;
        self
    }

    /// Handle to the adaptive router and its progression log.
    pub fn adaptive(&self) -> &Arc<AdaptiveTierRouter> {
        &self.adaptive
    }

    /// Resolve the tier one stage should run at.
    pub fn resolve(&self, workflow: &str, stage: &StageSpec) -> Tier {
        if let Some(ref dynamic) = self.dynamic {
            if let Some(tier) = dynamic.resolve(workflow, stage) {
                return tier;
            }
        }
        let base = self
            .static_map
            .get(&stage.name)
            .copied()
            .unwrap_or(stage.tier_hint);
        if self.adaptive.should_upgrade(workflow, &stage.name) {
            let upgraded = base.escalate().unwrap_or(base);
            log::info!(
                "upgrading stage '{}' from {} to {} (failure rate over threshold)",
                stage.name,
                base,
                upgraded
            );
            upgraded
        } else {
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use chrono::Utc;

    fn attempt(workflow: &str, stage: &str, success: bool) -> TierAttempt {
        TierAttempt {
            workflow: workflow.to_string(),
            stage: stage.to_string(),
            tier: Tier::Cheap,
            success,
            error: (!success).then(|| "rejected".to_string()),
            timestamp: Utc::now(),
        }
    }

    fn spec(name: &str, hint: Tier) -> StageSpec {
        StageSpec::new(name, Agent::new("a", "worker")).with_tier_hint(hint)
    }

    #[test]
    fn test_failure_rate_needs_samples() {
        let adaptive = AdaptiveTierRouter::new();
        adaptive.record(attempt("wf", "draft", false));
        assert_eq!(adaptive.failure_rate("wf", "draft"), None);
        assert!(!adaptive.should_upgrade("wf", "draft"));
    }

    #[test]
    fn test_upgrade_above_threshold() {
        let adaptive = Arc::new(AdaptiveTierRouter::new());
        adaptive.record(attempt("wf", "draft", true));
        adaptive.record(attempt("wf", "draft", false));
        adaptive.record(attempt("wf", "draft", false));
        assert_eq!(adaptive.failure_rate("wf", "draft"), Some(2.0 / 3.0));
        assert!(adaptive.should_upgrade("wf", "draft"));

        let router = TierRouter::new().with_adaptive(adaptive);
        assert_eq!(router.resolve("wf", &spec("draft", Tier::Cheap)), Tier::Capable);
        // Premium has nowhere to go.
        assert_eq!(router.resolve("wf", &spec("draft", Tier::Premium)), Tier::Premium);
    }

    #[test]
    fn test_resolution_order() {
        let router = TierRouter::new().with_static_tier("review", Tier::Capable);
        // Static map beats the hint; absent stages use the hint.
        assert_eq!(router.resolve("wf", &spec("review", Tier::Cheap)), Tier::Capable);
        assert_eq!(router.resolve("wf", &spec("draft", Tier::Cheap)), Tier::Cheap);

        struct AlwaysPremium;
        impl RoutingStrategy for AlwaysPremium {
            fn resolve(&self, _workflow: &str, _stage: &StageSpec) -> Option<Tier> {
                Some(Tier::Premium)
            }
        }
        let router = router.with_dynamic(Arc::new(AlwaysPremium));
        assert_eq!(router.resolve("wf", &spec("review", Tier::Cheap)), Tier::Premium);
    }
}
