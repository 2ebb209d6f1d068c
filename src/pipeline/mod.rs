//! Staged workflow execution with tier routing, fallback, and cost tracking.
//!
//! A pipeline is an ordered list of named stages, each backed by one agent
//! and a cost-tier hint. Standard mode resolves a tier per stage and runs it
//! once; tier-fallback mode walks cheap to capable to premium until a stage
//! validator accepts the output, and fails the whole run when premium is
//! exhausted. Every attempt lands in the tier-progression log that feeds the
//! adaptive router. Cache, telemetry, and state-store services are optional
//! and never fatal.

mod router;
mod stage;
mod validator;

pub use router::{AdaptiveTierRouter, RouterTuning, RoutingStrategy, TierRouter};
pub use stage::{CostReport, StageSpec, TierAttempt, WorkflowStage};
pub use validator::{DefaultValidator, StageValidator};

use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::agent::Agent;
use crate::capability::AgentCapability;
use crate::context::ExecutionContext;
use crate::errors::EnsembleError;
use crate::services::{prompt_key, CallRecord, Services, WorkflowRecord};
use crate::tier::Tier;

/// How the pipeline treats tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineMode {
    /// Resolve one tier per stage and run it once.
    #[default]
    Standard,
    /// Walk cheap to premium until the stage validator accepts an output.
    TierFallback,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Workflow name.
    pub workflow: String,
    /// Run id assigned at start.
    pub run_id: String,
    /// Whether every executed stage ended with an accepted output.
    pub success: bool,
    /// Per-stage history, skipped stages included.
    pub stages: Vec<WorkflowStage>,
    /// Tier attempts made during this run, in order.
    pub tier_log: Vec<TierAttempt>,
    /// Cost summary.
    pub cost_report: CostReport,
    /// Wall time of the run.
    pub total_duration: Duration,
    /// First stage failure, in standard mode.
    pub error: Option<String>,
    /// Final context state after the last executed stage.
    pub output: Map<String, Value>,
}

/// One attempt at a stage, before validation.
struct AttemptOutcome {
    output: Map<String, Value>,
    success: bool,
    error: Option<String>,
    cost: f64,
    tokens_in: u64,
    tokens_out: u64,
    duration: Duration,
    cached: bool,
}

/// Ordered, named stages executed against a shared context.
pub struct WorkflowStagePipeline {
    name: String,
    stages: Vec<StageSpec>,
    mode: PipelineMode,
    router: TierRouter,
    capability: Arc<dyn AgentCapability>,
    services: Services,
    default_validator: Arc<dyn StageValidator>,
}

impl WorkflowStagePipeline {
    /// Create a standard-mode pipeline with no services wired.
    pub fn new(
        name: impl Into<String>,
        stages: Vec<StageSpec>,
        capability: Arc<dyn AgentCapability>,
    ) -> Self {
        Self {
            name: name.into(),
            stages,
            mode: PipelineMode::Standard,
            router: TierRouter::new(),
            capability,
            services: Services::none(),
            default_validator: Arc::new(DefaultValidator),
        }
    }

    /// Builder: set the execution mode.
    pub fn with_mode(mut self, mode: PipelineMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builder: replace the tier router.
    pub fn with_router(mut self, router: TierRouter) -> Self {
        self.router = router;
        self
    }

    /// Builder: attach service handles.
    pub fn with_services(mut self, services: Services) -> Self {
        self.services = services;
        self
    }

    /// Builder: replace the default stage validator.
    pub fn with_default_validator(mut self, validator: Arc<dyn StageValidator>) -> Self {
        self.default_validator = validator;
        self
    }

    /// The router, exposing the tier-progression history.
    pub fn router(&self) -> &TierRouter {
        &self.router
    }

    /// Run the pipeline over the given input.
    ///
    /// Standard-mode stage failures end the run with `success == false`;
    /// tier-fallback exhaustion is the one pipeline-level hard failure and
    /// returns a quality-gate error naming the stage and the tried tiers.
    pub async fn run(
        &self,
        input: Map<String, Value>,
    ) -> Result<PipelineRun, EnsembleError> {
        let run_id = Uuid::new_v4().to_string();
        log::info!("pipeline '{}' starting run {}", self.name, run_id);
        if let Some(ref state) = self.services.state {
            state.record_start(&self.name, &run_id);
        }

        let mut ctx = ExecutionContext::with_values(input)
            .with_services(self.services.clone())
            .with_label(&self.name);
        let started = Instant::now();
        let mut stages: Vec<WorkflowStage> = Vec::new();
        let mut tier_log: Vec<TierAttempt> = Vec::new();
        let mut cache_hits = 0usize;
        let mut cache_misses = 0usize;
        let mut error: Option<String> = None;

        for spec in &self.stages {
            if let Some(ref reason) = spec.skip_reason {
                log::debug!("skipping stage '{}': {}", spec.name, reason);
                stages.push(WorkflowStage::skipped(&spec.name, reason));
                continue;
            }

            match self.mode {
                PipelineMode::Standard => {
                    let tier = self.router.resolve(&self.name, spec);
                    let attempt = self
                        .attempt_stage(spec, tier, &ctx, &mut cache_hits, &mut cache_misses)
                        .await;
                    let record = TierAttempt {
                        workflow: self.name.clone(),
                        stage: spec.name.clone(),
                        tier,
                        success: attempt.success,
                        error: attempt.error.clone(),
                        timestamp: Utc::now(),
                    };
                    self.router.adaptive().record(record.clone());
                    tier_log.push(record);

                    let ok = attempt.success;
                    if ok {
                        ctx.publish(&spec.name, attempt.output.clone());
                        self.checkpoint(&run_id, &spec.name, &ctx);
                    } else {
                        error = attempt
                            .error
                            .clone()
                            .or_else(|| Some(format!("stage '{}' failed", spec.name)));
                    }
                    stages.push(Self::stage_record(spec, Some(tier), attempt, 1));
                    if !ok {
                        break;
                    }
                }
                PipelineMode::TierFallback => {
                    let accepted = self
                        .run_fallback_stage(
                            spec,
                            &mut ctx,
                            &run_id,
                            &mut stages,
                            &mut tier_log,
                            &mut cache_hits,
                            &mut cache_misses,
                        )
                        .await;
                    if let Err(fault) = accepted {
                        self.finish(&run_id, false, &stages, started.elapsed());
                        return Err(fault);
                    }
                }
            }
        }

        let success = error.is_none();
        let total_duration = started.elapsed();
        self.finish(&run_id, success, &stages, total_duration);

        Ok(PipelineRun {
            workflow: self.name.clone(),
            run_id,
            success,
            cost_report: CostReport::from_stages(&stages, cache_hits, cache_misses),
            stages,
            tier_log,
            total_duration,
            error,
            output: ctx.into_values(),
        })
    }

    /// Tier-fallback loop for one stage. `Ok` once a tier's output passes
    /// validation; quality-gate error when premium is exhausted.
    #[allow(clippy::too_many_arguments)]
    async fn run_fallback_stage(
        &self,
        spec: &StageSpec,
        ctx: &mut ExecutionContext,
        run_id: &str,
        stages: &mut Vec<WorkflowStage>,
        tier_log: &mut Vec<TierAttempt>,
        cache_hits: &mut usize,
        cache_misses: &mut usize,
    ) -> Result<(), EnsembleError> {
        let validator = spec
            .validator
            .clone()
            .unwrap_or_else(|| self.default_validator.clone());
        let mut tried: Vec<Tier> = Vec::new();
        let mut cost = 0.0;
        let mut tokens_in = 0u64;
        let mut tokens_out = 0u64;
        let mut duration = Duration::ZERO;

        for tier in Tier::ALL {
            tried.push(tier);
            let attempt = self
                .attempt_stage(spec, tier, ctx, cache_hits, cache_misses)
                .await;
            cost += attempt.cost;
            tokens_in += attempt.tokens_in;
            tokens_out += attempt.tokens_out;
            duration += attempt.duration;

            let verdict = if attempt.success {
                validator.validate(&attempt.output)
            } else {
                Err(attempt
                    .error
                    .clone()
                    .unwrap_or_else(|| "capability fault".to_string()))
            };
            let record = TierAttempt {
                workflow: self.name.clone(),
                stage: spec.name.clone(),
                tier,
                success: verdict.is_ok(),
                error: verdict.clone().err(),
                timestamp: Utc::now(),
            };
            self.router.adaptive().record(record.clone());
            tier_log.push(record);

            match verdict {
                Ok(()) => {
                    ctx.publish(&spec.name, attempt.output.clone());
                    self.checkpoint(run_id, &spec.name, ctx);
                    stages.push(WorkflowStage {
                        name: spec.name.clone(),
                        tier: Some(tier),
                        tokens_in,
                        tokens_out,
                        cost,
                        duration,
                        success: true,
                        skipped: false,
                        skip_reason: None,
                        output: attempt.output,
                        attempts: tried.len(),
                        cached: attempt.cached,
                    });
                    return Ok(());
                }
                Err(reason) => {
                    log::warn!(
                        "stage '{}' rejected at tier {}: {}",
                        spec.name,
                        tier,
                        reason
                    );
                }
            }
        }

        let tried_names = tried
            .iter()
            .map(Tier::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        stages.push(WorkflowStage {
            name: spec.name.clone(),
            tier: Some(Tier::Premium),
            tokens_in,
            tokens_out,
            cost,
            duration,
            success: false,
            skipped: false,
            skip_reason: None,
            output: Map::new(),
            attempts: tried.len(),
            cached: false,
        });
        Err(EnsembleError::QualityGate {
            subject: spec.name.clone(),
            detail: format!("tier fallback exhausted ({})", tried_names),
        })
    }

    /// One attempt at a stage, at one tier: cache lookup, capability call,
    /// telemetry. Capability faults are folded into the outcome.
    async fn attempt_stage(
        &self,
        spec: &StageSpec,
        tier: Tier,
        ctx: &ExecutionContext,
        cache_hits: &mut usize,
        cache_misses: &mut usize,
    ) -> AttemptOutcome {
        let key = prompt_key(ctx.values());
        let model = tier.to_string();
        if let Some(ref cache) = self.services.cache {
            if let Some(output) = cache.get(&self.name, &spec.name, &key, &model) {
                *cache_hits += 1;
                log::debug!("cache hit for stage '{}' at tier {}", spec.name, tier);
                return AttemptOutcome {
                    output,
                    success: true,
                    error: None,
                    cost: 0.0,
                    tokens_in: 0,
                    tokens_out: 0,
                    duration: Duration::ZERO,
                    cached: true,
                };
            }
            *cache_misses += 1;
        }

        let agent: Agent = spec.agent.clone().with_tier(tier);
        let started = Instant::now();
        let outcome = match self.capability.run(&agent, ctx.values()).await {
            Ok(out) => {
                if let Some(ref cache) = self.services.cache {
                    cache.put(&self.name, &spec.name, &key, &model, out.output.clone());
                }
                AttemptOutcome {
                    output: out.output,
                    success: true,
                    error: None,
                    cost: tier.unit_cost(),
                    tokens_in: out.tokens_in,
                    tokens_out: out.tokens_out,
                    duration: started.elapsed(),
                    cached: false,
                }
            }
            Err(fault) => {
                log::warn!(
                    "stage '{}' capability fault at tier {}: {}",
                    spec.name,
                    tier,
                    fault
                );
                AttemptOutcome {
                    output: Map::new(),
                    success: false,
                    error: Some(fault.message),
                    cost: tier.unit_cost(),
                    tokens_in: 0,
                    tokens_out: 0,
                    duration: started.elapsed(),
                    cached: false,
                }
            }
        };

        self.services.log_call(CallRecord {
            workflow: self.name.clone(),
            stage: spec.name.clone(),
            agent_id: agent.id.clone(),
            tier,
            tokens_in: outcome.tokens_in,
            tokens_out: outcome.tokens_out,
            cost: outcome.cost,
            duration: outcome.duration,
            success: outcome.success,
            timestamp: Utc::now(),
        });
        outcome
    }

    fn stage_record(
        spec: &StageSpec,
        tier: Option<Tier>,
        attempt: AttemptOutcome,
        attempts: usize,
    ) -> WorkflowStage {
        WorkflowStage {
            name: spec.name.clone(),
            tier,
            tokens_in: attempt.tokens_in,
            tokens_out: attempt.tokens_out,
            cost: attempt.cost,
            duration: attempt.duration,
            success: attempt.success,
            skipped: false,
            skip_reason: None,
            output: attempt.output,
            attempts,
            cached: attempt.cached,
        }
    }

    fn checkpoint(&self, run_id: &str, stage: &str, ctx: &ExecutionContext) {
        if let Some(ref state) = self.services.state {
            state.save_checkpoint(
                &self.name,
                run_id,
                stage,
                &Value::Object(ctx.values().clone()),
            );
        }
    }

    fn finish(&self, run_id: &str, success: bool, stages: &[WorkflowStage], elapsed: Duration) {
        let executed = stages.iter().filter(|s| !s.skipped).count();
        self.services.log_workflow(WorkflowRecord {
            workflow: self.name.clone(),
            success,
            total_cost: stages.iter().map(|s| s.cost).sum(),
            total_duration: elapsed,
            stages_run: executed,
            timestamp: Utc::now(),
        });
        if let Some(ref state) = self.services.state {
            if success {
                state.record_completion(&self.name, run_id);
            } else {
                state.record_failure(&self.name, run_id, "pipeline failed");
            }
        }
        log::info!(
            "pipeline '{}' run {} finished: success={} stages={}",
            self.name,
            run_id,
            success,
            executed
        );
    }
}
