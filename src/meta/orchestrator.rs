//! Meta-orchestration: from a task description to an execution plan.

use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::strategies::StrategyKind;

use super::analysis::{analyze_task, Complexity, TaskAnalysis};
use super::templates::TemplateRegistry;

/// Shared-context size above which prompt caching pays off.
const SHARED_CONTEXT_CHARS: usize = 2000;

/// Task keywords suggesting the work decomposes into independent pieces.
const PARALLELIZABLE_KEYWORDS: &[&str] = &[
    "independent",
    "in parallel",
    "simultaneously",
    "separately",
    "compare",
    "each of",
];

/// Patterns added later than the original grammar; plans using them get a
/// confidence bonus for being purpose-picked rather than defaulted into.
const NEWER_PATTERNS: [StrategyKind; 3] = [
    StrategyKind::ToolEnhanced,
    StrategyKind::PromptCachedSequential,
    StrategyKind::DelegationChain,
];

/// Confidence multipliers and the review threshold.
///
/// The defaults are empirically chosen constants carried over unchanged;
/// they are configurable precisely because nobody has shown them optimal.
#[derive(Debug, Clone)]
pub struct OrchestratorTuning {
    /// Multiplier when the domain fell back to "general".
    pub general_domain_factor: f64,
    /// Multiplier when the team exceeds `large_team_size`.
    pub large_team_factor: f64,
    /// Team size above which the large-team multiplier applies.
    pub large_team_size: usize,
    /// Multiplier for complex tasks.
    pub complex_factor: f64,
    /// Multiplier for the newer patterns.
    pub newer_pattern_factor: f64,
    /// Multiplier for domain-matched Teaching/Refinement picks.
    pub domain_match_factor: f64,
    /// Below this confidence, a reviewer must be consulted.
    pub review_threshold: f64,
}

impl Default for OrchestratorTuning {
    fn default() -> Self {
        Self {
            general_domain_factor: 0.7,
            large_team_factor: 0.8,
            large_team_size: 5,
            complex_factor: 0.85,
            newer_pattern_factor: 1.1,
            domain_match_factor: 1.05,
            review_threshold: 0.8,
        }
    }
}

/// A concrete plan: agents, pattern, and estimates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Task description the plan was derived from.
    pub task: String,
    /// Analysis that drove the plan.
    pub analysis: TaskAnalysis,
    /// Instantiated agents.
    pub agents: Vec<Agent>,
    /// Chosen composition pattern.
    pub pattern: StrategyKind,
    /// Flat cost estimate: sum of per-agent tier unit costs.
    pub estimated_cost: f64,
    /// Duration estimate in seconds, by pattern formula over agent timeouts.
    pub estimated_duration_secs: f64,
    /// Plan confidence in `(0, 1]`.
    pub confidence: f64,
}

/// Reviewer's verdict on a low-confidence plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanDecision {
    /// Proceed with the plan as proposed.
    Accept,
    /// Replace the pattern with this one.
    Customize(StrategyKind),
    /// Ask to pick from the full pattern list.
    Browse,
}

/// External decision point consulted when plan confidence is below the
/// review threshold.
pub trait PlanReviewer {
    /// Judge a proposed plan.
    fn review(&self, plan: &ExecutionPlan) -> PlanDecision;
    /// Pick a pattern from the full list (the browse path).
    fn pick_pattern(&self, options: &[StrategyKind]) -> StrategyKind;
}

/// Plans multi-agent work from a bare task description.
#[derive(Debug, Clone, Default)]
pub struct MetaOrchestrator {
    templates: TemplateRegistry,
    tuning: OrchestratorTuning,
}

impl MetaOrchestrator {
    /// An orchestrator over the built-in templates.
    pub fn new() -> Self {
        Self {
            templates: TemplateRegistry::builtin(),
            tuning: OrchestratorTuning::default(),
        }
    }

    /// Builder: replace the template registry.
    pub fn with_templates(mut self, templates: TemplateRegistry) -> Self {
        self.templates = templates;
        self
    }

    /// Builder: replace the tuning.
    pub fn with_tuning(mut self, tuning: OrchestratorTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Produce a plan for a task. `shared_context` is the amount of common
    /// material the agents would all need (documents, code), used only for
    /// the prompt-caching decision.
    pub fn plan(&self, task: &str, shared_context: Option<&str>) -> ExecutionPlan {
        let analysis = analyze_task(task);
        let agents: Vec<Agent> = self
            .templates
            .resolve(&analysis.capabilities, &analysis.domain)
            .iter()
            .map(|t| t.instantiate())
            .collect();
        let shared_chars = shared_context.map_or(0, str::len);
        let pattern = choose_pattern(task, &analysis, &agents, shared_chars);
        self.finish_plan(task, analysis, agents, pattern)
    }

    /// Plan with an external review step: plans below the confidence
    /// threshold are put to the reviewer instead of proceeding automatically.
    pub fn plan_reviewed(
        &self,
        task: &str,
        shared_context: Option<&str>,
        reviewer: &dyn PlanReviewer,
    ) -> ExecutionPlan {
        let plan = self.plan(task, shared_context);
        if plan.confidence >= self.tuning.review_threshold {
            return plan;
        }
        log::info!(
            "plan confidence {:.2} below threshold {:.2}, consulting reviewer",
            plan.confidence,
            self.tuning.review_threshold
        );
        match reviewer.review(&plan) {
            PlanDecision::Accept => plan,
            PlanDecision::Customize(pattern) => {
                self.finish_plan(&plan.task, plan.analysis, plan.agents, pattern)
            }
            PlanDecision::Browse => {
                let pattern = reviewer.pick_pattern(&StrategyKind::ALL);
                self.finish_plan(&plan.task, plan.analysis, plan.agents, pattern)
            }
        }
    }

    fn finish_plan(
        &self,
        task: &str,
        analysis: TaskAnalysis,
        agents: Vec<Agent>,
        pattern: StrategyKind,
    ) -> ExecutionPlan {
        let estimated_cost = agents.iter().map(|a| a.tier.unit_cost()).sum();
        let estimated_duration_secs = estimate_duration_secs(pattern, &agents);
        let confidence = self.confidence(&analysis, &agents, pattern);
        log::info!(
            "planned '{}' as {} with {} agents (cost {:.1}, ~{:.0}s, confidence {:.2})",
            analysis.domain,
            pattern,
            agents.len(),
            estimated_cost,
            estimated_duration_secs,
            confidence
        );
        ExecutionPlan {
            task: task.to_string(),
            analysis,
            agents,
            pattern,
            estimated_cost,
            estimated_duration_secs,
            confidence,
        }
    }

    fn confidence(
        &self,
        analysis: &TaskAnalysis,
        agents: &[Agent],
        pattern: StrategyKind,
    ) -> f64 {
        let mut confidence = 1.0;
        if analysis.domain == "general" {
            confidence *= self.tuning.general_domain_factor;
        }
        if agents.len() > self.tuning.large_team_size {
            confidence *= self.tuning.large_team_factor;
        }
        if analysis.complexity == Complexity::Complex {
            confidence *= self.tuning.complex_factor;
        }
        if NEWER_PATTERNS.contains(&pattern) {
            confidence *= self.tuning.newer_pattern_factor;
        }
        let domain_matched = (pattern == StrategyKind::Teaching
            && analysis.domain == "documentation")
            || (pattern == StrategyKind::Refinement && analysis.domain == "refactoring");
        if domain_matched {
            confidence *= self.tuning.domain_match_factor;
        }
        confidence.min(1.0)
    }
}

/// Ordered pattern decision list; the first matching rule wins.
pub fn choose_pattern(
    task: &str,
    analysis: &TaskAnalysis,
    agents: &[Agent],
    shared_context_chars: usize,
) -> StrategyKind {
    let lowered = task.to_lowercase();
    let has_coordinator = agents.iter().any(|a| a.role.contains("coordinator"));
    let parallelizable = PARALLELIZABLE_KEYWORDS
        .iter()
        .any(|kw| lowered.contains(kw));
    let duplicate_capability = agents.iter().enumerate().any(|(i, a)| {
        agents[i + 1..]
            .iter()
            .any(|b| a.capabilities.iter().any(|c| b.has_capability(c)))
    });

    if agents.len() == 1 && agents[0].capabilities.iter().any(|c| c.contains("tool")) {
        StrategyKind::ToolEnhanced
    } else if analysis.complexity == Complexity::Complex && has_coordinator && agents.len() >= 2 {
        StrategyKind::DelegationChain
    } else if agents.len() >= 3 && shared_context_chars > SHARED_CONTEXT_CHARS {
        StrategyKind::PromptCachedSequential
    } else if parallelizable && agents.len() >= 2 {
        StrategyKind::Parallel
    } else if matches!(analysis.domain.as_str(), "security" | "architecture") && agents.len() >= 2 {
        StrategyKind::Parallel
    } else if analysis.domain == "documentation" && agents.len() >= 2 {
        StrategyKind::Teaching
    } else if analysis.domain == "refactoring" && agents.len() >= 2 {
        StrategyKind::Refinement
    } else if agents.len() == 1 {
        StrategyKind::Sequential
    } else if duplicate_capability {
        StrategyKind::Debate
    } else if analysis.domain == "testing" {
        StrategyKind::Sequential
    } else if analysis.complexity == Complexity::Complex {
        StrategyKind::Adaptive
    } else {
        StrategyKind::Sequential
    }
}

/// Duration estimate in seconds for a pattern over the given agents.
pub fn estimate_duration_secs(pattern: StrategyKind, agents: &[Agent]) -> f64 {
    let sum: f64 = agents.iter().map(|a| a.timeout_secs as f64).sum();
    let max = agents
        .iter()
        .map(|a| a.timeout_secs as f64)
        .fold(0.0, f64::max);
    match pattern {
        StrategyKind::Parallel => max,
        StrategyKind::Debate => 2.0 * max,
        StrategyKind::Teaching => 1.5 * max,
        StrategyKind::Refinement => 3.0 * max,
        StrategyKind::Adaptive => 1.2 * max,
        StrategyKind::Conditional => 1.1 * max,
        StrategyKind::PromptCachedSequential => 0.8 * sum,
        // Sequential, DelegationChain, and the rest walk the full chain.
        _ => sum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::templates::AgentTemplate;
    use crate::tier::Tier;

    fn agent(id: &str, role: &str, caps: &[&str], timeout: u64) -> Agent {
        Agent::new(id, role)
            .with_capabilities(caps.iter().map(|c| c.to_string()).collect())
            .with_timeout_secs(timeout)
    }

    fn analysis(complexity: Complexity, domain: &str) -> TaskAnalysis {
        TaskAnalysis {
            complexity,
            domain: domain.to_string(),
            capabilities: vec![],
        }
    }

    #[test]
    fn test_decision_list_order() {
        // Single agent with tool capability wins rule one.
        let solo = [agent("op", "operator", &["tool_runner"], 60)];
        assert_eq!(
            choose_pattern("run it", &analysis(Complexity::Simple, "general"), &solo, 0),
            StrategyKind::ToolEnhanced
        );

        // Complex + coordinator beats shared context.
        let team = [
            agent("lead", "coordinator", &["planning"], 60),
            agent("d1", "analyst", &["analysis"], 60),
        ];
        assert_eq!(
            choose_pattern("x", &analysis(Complexity::Complex, "general"), &team, 99_999),
            StrategyKind::DelegationChain
        );

        // Three agents over a big shared corpus cache the prompt.
        let trio = [
            agent("a", "worker", &["one"], 60),
            agent("b", "worker", &["two"], 60),
            agent("c", "worker", &["three"], 60),
        ];
        assert_eq!(
            choose_pattern("x", &analysis(Complexity::Moderate, "general"), &trio, 2001),
            StrategyKind::PromptCachedSequential
        );

        // Duplicate capabilities turn into a debate.
        let rivals = [
            agent("a", "reviewer", &["code_review"], 60),
            agent("b", "reviewer", &["code_review"], 60),
        ];
        assert_eq!(
            choose_pattern("x", &analysis(Complexity::Moderate, "general"), &rivals, 0),
            StrategyKind::Debate
        );

        // Complex without any earlier rule goes adaptive.
        let pair = [
            agent("a", "worker", &["one"], 60),
            agent("b", "worker", &["two"], 60),
        ];
        assert_eq!(
            choose_pattern("x", &analysis(Complexity::Complex, "general"), &pair, 0),
            StrategyKind::Adaptive
        );
        assert_eq!(
            choose_pattern("x", &analysis(Complexity::Moderate, "general"), &pair, 0),
            StrategyKind::Sequential
        );
    }

    #[test]
    fn test_domain_rules() {
        let pair = [
            agent("a", "worker", &["one"], 60),
            agent("b", "worker", &["two"], 60),
        ];
        assert_eq!(
            choose_pattern("x", &analysis(Complexity::Moderate, "security"), &pair, 0),
            StrategyKind::Parallel
        );
        assert_eq!(
            choose_pattern("x", &analysis(Complexity::Moderate, "documentation"), &pair, 0),
            StrategyKind::Teaching
        );
        assert_eq!(
            choose_pattern("x", &analysis(Complexity::Moderate, "refactoring"), &pair, 0),
            StrategyKind::Refinement
        );
    }

    #[test]
    fn test_duration_formulas() {
        let agents = [
            agent("a", "worker", &[], 10),
            agent("b", "worker", &[], 30),
        ];
        assert_eq!(estimate_duration_secs(StrategyKind::Sequential, &agents), 40.0);
        assert_eq!(estimate_duration_secs(StrategyKind::Parallel, &agents), 30.0);
        assert_eq!(estimate_duration_secs(StrategyKind::Debate, &agents), 60.0);
        assert_eq!(estimate_duration_secs(StrategyKind::Teaching, &agents), 45.0);
        assert_eq!(estimate_duration_secs(StrategyKind::Refinement, &agents), 90.0);
        assert!((estimate_duration_secs(StrategyKind::Adaptive, &agents) - 36.0).abs() < 1e-9);
        assert!(
            (estimate_duration_secs(StrategyKind::PromptCachedSequential, &agents) - 32.0).abs()
                < 1e-9
        );
        assert_eq!(
            estimate_duration_secs(StrategyKind::DelegationChain, &agents),
            40.0
        );
    }

    #[test]
    fn test_plan_estimates_cost_from_tiers() {
        let orchestrator = MetaOrchestrator::new();
        let plan = orchestrator.plan("audit the service for a security vulnerability", None);
        assert_eq!(plan.analysis.domain, "security");
        // security-analyst covers both capabilities: two premium agents.
        assert_eq!(plan.agents.len(), 2);
        assert_eq!(plan.estimated_cost, 20.0);
        assert_eq!(plan.pattern, StrategyKind::Parallel);
    }

    #[test]
    fn test_confidence_multipliers() {
        let orchestrator = MetaOrchestrator::new();
        // General domain, simple task, sequential single agent: 1.0 * 0.7.
        let plan = orchestrator.plan("summarize the notes", None);
        assert_eq!(plan.analysis.domain, "general");
        assert!((plan.confidence - 0.7).abs() < 1e-9);

        // Matched domain without penalties stays at 1.0 (capped).
        let plan = orchestrator.plan("write documentation and a tutorial for the module", None);
        assert_eq!(plan.pattern, StrategyKind::Teaching);
        assert!(plan.confidence <= 1.0);
    }

    struct PickParallel;

    impl PlanReviewer for PickParallel {
        fn review(&self, _plan: &ExecutionPlan) -> PlanDecision {
            PlanDecision::Browse
        }
        fn pick_pattern(&self, options: &[StrategyKind]) -> StrategyKind {
            assert_eq!(options.len(), 13);
            StrategyKind::Parallel
        }
    }

    #[test]
    fn test_low_confidence_consults_reviewer() {
        let orchestrator = MetaOrchestrator::new();
        // General domain forces confidence 0.7, below the 0.8 threshold.
        let plan = orchestrator.plan_reviewed("summarize the notes", None, &PickParallel);
        assert_eq!(plan.pattern, StrategyKind::Parallel);

        struct AcceptAll;
        impl PlanReviewer for AcceptAll {
            fn review(&self, _plan: &ExecutionPlan) -> PlanDecision {
                PlanDecision::Accept
            }
            fn pick_pattern(&self, _options: &[StrategyKind]) -> StrategyKind {
                unreachable!()
            }
        }
        let plan = orchestrator.plan_reviewed("summarize the notes", None, &AcceptAll);
        assert_eq!(plan.pattern, StrategyKind::Sequential);
    }

    #[test]
    fn test_confident_plan_skips_reviewer() {
        struct Panicking;
        impl PlanReviewer for Panicking {
            fn review(&self, _plan: &ExecutionPlan) -> PlanDecision {
                panic!("reviewer must not be consulted")
            }
            fn pick_pattern(&self, _options: &[StrategyKind]) -> StrategyKind {
                unreachable!()
            }
        }
        let orchestrator = MetaOrchestrator::new();
        let plan = orchestrator.plan_reviewed(
            "audit the service for a security vulnerability",
            None,
            &Panicking,
        );
        assert_eq!(plan.pattern, StrategyKind::Parallel);
    }

    #[test]
    fn test_custom_templates_flow_through() {
        let mut registry = TemplateRegistry::new();
        registry.register(AgentTemplate::new(
            "tool-op",
            "operator",
            vec!["general_reasoning".into(), "tool_runner".into()],
            Tier::Cheap,
            "general",
        ));
        let orchestrator = MetaOrchestrator::new().with_templates(registry);
        let plan = orchestrator.plan("bake a cake for the office", None);
        assert_eq!(plan.agents.len(), 1);
        assert_eq!(plan.pattern, StrategyKind::ToolEnhanced);
    }
}
