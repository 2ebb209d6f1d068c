//! Dynamic teams with quality-gate evaluation.
//!
//! A team pairs an agent list with one of four team strategies and a list of
//! quality gates. After execution every gate compares a metric against its
//! threshold; team success is the AND over gates marked required, with
//! non-required gates reported but never decisive.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{Agent, AgentResult, StrategyResult};
use crate::capability::AgentCapability;
use crate::context::ExecutionContext;
use crate::errors::EnsembleError;
use crate::strategies::{
    DelegationChainStrategy, ExecutionStrategy, ParallelStrategy, SequentialStrategy,
};

/// Context key holding the gather phase's findings in a two-phase run.
pub const GATHERED_FINDINGS_KEY: &str = "gathered_findings";

/// How a team's agents are composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamStrategy {
    /// All agents fan out concurrently.
    Parallel,
    /// Strict chain in list order.
    Sequential,
    /// Concurrent gather half, then a sequential reason half seeded with
    /// the gathered findings.
    TwoPhase,
    /// First agent coordinates; its findings seed the concurrent remainder.
    Delegation,
}

/// Metric a quality gate measures over the team's results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMetric {
    /// Mean confidence; passes when >= threshold.
    MeanConfidence,
    /// Fraction of successful results; passes when >= threshold.
    SuccessRate,
    /// Longest result duration in seconds; passes when <= threshold.
    MaxDurationSecs,
    /// Mean of a numeric output field; passes when >= threshold.
    OutputField(String),
}

/// One acceptance criterion over a team's results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGate {
    /// Gate name, used in reporting and failure messages.
    pub name: String,
    /// Restrict the gate to agents with this role; `None` checks all.
    pub role: Option<String>,
    /// Metric to measure.
    pub metric: GateMetric,
    /// Threshold the metric is compared against.
    pub threshold: f64,
    /// Whether the gate participates in team success.
    pub required: bool,
}

impl QualityGate {
    /// A required gate over all agents.
    pub fn required(name: impl Into<String>, metric: GateMetric, threshold: f64) -> Self {
        Self {
            name: name.into(),
            role: None,
            metric,
            threshold,
            required: true,
        }
    }

    /// An informational gate over all agents.
    pub fn informational(name: impl Into<String>, metric: GateMetric, threshold: f64) -> Self {
        Self {
            required: false,
            ..Self::required(name, metric, threshold)
        }
    }

    /// Builder: scope the gate to one role.
    pub fn for_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// Measured outcome of one gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateOutcome {
    /// Gate name.
    pub name: String,
    /// Measured metric value.
    pub value: f64,
    /// Whether the gate passed.
    pub passed: bool,
    /// Whether the gate counts toward team success.
    pub required: bool,
}

/// Team run outcome: the strategy result plus per-gate verdicts.
#[derive(Debug, Clone)]
pub struct TeamReport {
    /// Aggregate result of the underlying strategy.
    pub strategy_result: StrategyResult,
    /// One outcome per configured gate, in gate order.
    pub gates: Vec<GateOutcome>,
    /// AND over required gates; falls back to the strategy result's own
    /// success when no gate is required.
    pub success: bool,
}

/// Executes a team and evaluates its quality gates.
pub struct DynamicTeamExecutor {
    capability: Arc<dyn AgentCapability>,
    agents: Vec<Agent>,
    strategy: TeamStrategy,
    gates: Vec<QualityGate>,
}

impl DynamicTeamExecutor {
    /// Create a team executor.
    pub fn new(
        capability: Arc<dyn AgentCapability>,
        agents: Vec<Agent>,
        strategy: TeamStrategy,
    ) -> Self {
        Self {
            capability,
            agents,
            strategy,
            gates: Vec::new(),
        }
    }

    /// Builder: add one gate.
    pub fn with_gate(mut self, gate: QualityGate) -> Self {
        self.gates.push(gate);
        self
    }

    /// Builder: replace the gate list.
    pub fn with_gates(mut self, gates: Vec<QualityGate>) -> Self {
        self.gates = gates;
        self
    }

    /// Run the team and evaluate its gates.
    pub async fn execute(
        &self,
        ctx: &mut ExecutionContext,
    ) -> Result<TeamReport, EnsembleError> {
        if self.agents.is_empty() {
            return Err(EnsembleError::Validation(
                "team requires at least one agent".to_string(),
            ));
        }

        let strategy_result = match self.strategy {
            TeamStrategy::Parallel => {
                ParallelStrategy::new(self.capability.clone())
                    .execute(&self.agents, ctx)
                    .await?
            }
            TeamStrategy::Sequential => {
                SequentialStrategy::new(self.capability.clone())
                    .execute(&self.agents, ctx)
                    .await?
            }
            TeamStrategy::Delegation => {
                DelegationChainStrategy::new(self.capability.clone())
                    .execute(&self.agents, ctx)
                    .await?
            }
            TeamStrategy::TwoPhase => self.execute_two_phase(ctx).await?,
        };

        let roles: HashMap<&str, &str> = self
            .agents
            .iter()
            .map(|a| (a.id.as_str(), a.role.as_str()))
            .collect();
        let gates: Vec<GateOutcome> = self
            .gates
            .iter()
            .map(|gate| evaluate_gate(gate, &strategy_result.agent_results, &roles))
            .collect();

        let required: Vec<&GateOutcome> = gates.iter().filter(|g| g.required).collect();
        let success = if required.is_empty() {
            strategy_result.success
        } else {
            required.iter().all(|g| g.passed)
        };
        for gate in gates.iter().filter(|g| !g.passed) {
            log::warn!(
                "team gate '{}' failed: value {:.3} vs threshold",
                gate.name,
                gate.value
            );
        }

        Ok(TeamReport {
            strategy_result,
            gates,
            success,
        })
    }

    /// Two-phase: first half gathers concurrently, second half reasons
    /// sequentially over the gathered findings.
    async fn execute_two_phase(
        &self,
        ctx: &mut ExecutionContext,
    ) -> Result<StrategyResult, EnsembleError> {
        if self.agents.len() < 2 {
            return Err(EnsembleError::Validation(format!(
                "two-phase team requires at least 2 agents, got {}",
                self.agents.len()
            )));
        }
        // Odd team sizes put the extra agent in the gather half.
        let split = self.agents.len().div_ceil(2);
        let (gatherers, reasoners) = self.agents.split_at(split);

        let gather_results =
            ParallelStrategy::fan_out(&self.capability, gatherers, ctx).await;
        let mut findings = Map::new();
        for result in &gather_results {
            if result.success {
                findings.insert(
                    result.agent_id.clone(),
                    Value::Object(result.output.clone()),
                );
                ctx.publish(&result.agent_id, result.output.clone());
            }
        }
        ctx.set(GATHERED_FINDINGS_KEY, Value::Object(findings));
        let gather_duration = gather_results
            .iter()
            .map(|r| r.duration)
            .max()
            .unwrap_or(Duration::ZERO);

        let reason_result = SequentialStrategy::new(self.capability.clone())
            .execute(reasoners, ctx)
            .await?;

        let mut all = gather_results;
        all.extend(reason_result.agent_results);
        let mut aggregated = StrategyResult::from_results(all);
        aggregated.total_duration = gather_duration + reason_result.total_duration;
        aggregated.output = reason_result.output;
        Ok(aggregated)
    }
}

/// Measure one gate against the (optionally role-filtered) results.
fn evaluate_gate(
    gate: &QualityGate,
    results: &[AgentResult],
    roles: &HashMap<&str, &str>,
) -> GateOutcome {
    let scoped: Vec<&AgentResult> = results
        .iter()
        .filter(|r| match gate.role {
            Some(ref role) => roles.get(r.agent_id.as_str()) == Some(&role.as_str()),
            None => true,
        })
        .collect();

    if scoped.is_empty() {
        log::warn!("gate '{}' matched no agent results", gate.name);
        return GateOutcome {
            name: gate.name.clone(),
            value: 0.0,
            passed: false,
            required: gate.required,
        };
    }

    let count = scoped.len() as f64;
    let (value, passed) = match gate.metric {
        GateMetric::MeanConfidence => {
            let mean = scoped.iter().map(|r| r.confidence).sum::<f64>() / count;
            (mean, mean >= gate.threshold)
        }
        GateMetric::SuccessRate => {
            let rate = scoped.iter().filter(|r| r.success).count() as f64 / count;
            (rate, rate >= gate.threshold)
        }
        GateMetric::MaxDurationSecs => {
            let max = scoped
                .iter()
                .map(|r| r.duration.as_secs_f64())
                .fold(0.0, f64::max);
            (max, max <= gate.threshold)
        }
        GateMetric::OutputField(ref field) => {
            let values: Vec<f64> = scoped
                .iter()
                .filter_map(|r| r.output.get(field).and_then(Value::as_f64))
                .collect();
            if values.is_empty() {
                (0.0, false)
            } else {
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                (mean, mean >= gate.threshold)
            }
        }
    };

    GateOutcome {
        name: gate.name.clone(),
        value,
        passed,
        required: gate.required,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ScriptedCapability;

    fn team_agents() -> Vec<Agent> {
        vec![
            Agent::new("scout", "researcher"),
            Agent::new("judge", "reviewer"),
        ]
    }

    #[tokio::test]
    async fn test_required_gate_failure_flips_with_required_flag() {
        let build = |required: bool| {
            let capability = ScriptedCapability::new()
                .reply("scout", "findings", 0.9)
                .reply("judge", "verdict", 0.9);
            DynamicTeamExecutor::new(Arc::new(capability), team_agents(), TeamStrategy::Parallel)
                .with_gates(vec![
                    QualityGate::required("confident", GateMetric::MeanConfidence, 0.5),
                    QualityGate {
                        name: "impossible".to_string(),
                        role: None,
                        metric: GateMetric::MeanConfidence,
                        threshold: 0.99,
                        required,
                    },
                ])
        };

        let report = build(true)
            .execute(&mut ExecutionContext::new())
            .await
            .unwrap();
        assert!(!report.success);
        assert!(report.gates[0].passed);
        assert!(!report.gates[1].passed);

        // Same failing gate demoted to informational: team now succeeds.
        let report = build(false)
            .execute(&mut ExecutionContext::new())
            .await
            .unwrap();
        assert!(report.success);
        assert!(!report.gates[1].passed);
    }

    #[tokio::test]
    async fn test_role_scoped_gate() {
        let capability = ScriptedCapability::new()
            .reply("scout", "findings", 0.3)
            .reply("judge", "verdict", 0.95);
        let executor = DynamicTeamExecutor::new(
            Arc::new(capability),
            team_agents(),
            TeamStrategy::Sequential,
        )
        .with_gate(
            QualityGate::required("reviewer confident", GateMetric::MeanConfidence, 0.9)
                .for_role("reviewer"),
        );

        let report = executor
            .execute(&mut ExecutionContext::new())
            .await
            .unwrap();
        // The scout's 0.3 is out of scope; only the judge's 0.95 counts.
        assert!(report.success);
        assert!((report.gates[0].value - 0.95).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_two_phase_seeds_findings() {
        let capability = ScriptedCapability::new()
            .reply("g1", "datapoint one", 0.9)
            .reply("g2", "datapoint two", 0.9)
            .reply("r1", "synthesis", 0.9);
        let agents = vec![
            Agent::new("g1", "researcher"),
            Agent::new("g2", "researcher"),
            Agent::new("r1", "analyst"),
        ];
        let executor =
            DynamicTeamExecutor::new(Arc::new(capability), agents, TeamStrategy::TwoPhase);

        let mut ctx = ExecutionContext::new();
        let report = executor.execute(&mut ctx).await.unwrap();
        assert!(report.success);
        assert_eq!(report.strategy_result.agent_results.len(), 3);

        let findings = ctx.get(GATHERED_FINDINGS_KEY).unwrap();
        let findings = findings.as_object().unwrap();
        assert!(findings.contains_key("g1"));
        assert!(findings.contains_key("g2"));
    }

    #[tokio::test]
    async fn test_success_rate_gate_counts_failures() {
        let capability = ScriptedCapability::new()
            .reply("scout", "ok", 0.9)
            .fail("judge", "crashed");
        let executor = DynamicTeamExecutor::new(
            Arc::new(capability),
            team_agents(),
            TeamStrategy::Parallel,
        )
        .with_gate(QualityGate::required(
            "mostly working",
            GateMetric::SuccessRate,
            0.75,
        ));

        let report = executor
            .execute(&mut ExecutionContext::new())
            .await
            .unwrap();
        assert!(!report.success);
        assert!((report.gates[0].value - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_no_gates_falls_back_to_strategy_success() {
        let capability = ScriptedCapability::new().reply("scout", "ok", 0.9).reply(
            "judge",
            "ok",
            0.9,
        );
        let executor = DynamicTeamExecutor::new(
            Arc::new(capability),
            team_agents(),
            TeamStrategy::Delegation,
        );
        let report = executor
            .execute(&mut ExecutionContext::new())
            .await
            .unwrap();
        assert!(report.success);
        assert!(report.gates.is_empty());
    }
}
