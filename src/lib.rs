//! # Ensemble
//!
//! A composition engine for multi-agent workflows.
//!
//! Ensemble turns a pool of agent descriptors and one pluggable
//! [`AgentCapability`] into structured executions: thirteen composition
//! patterns (sequential, parallel, debate, teaching, and friends), a staged
//! pipeline with tier routing and cheap-to-premium fallback, dynamic teams
//! with quality gates, and a meta-orchestrator that plans all of the above
//! from a bare task description.

pub mod agent;
pub mod capability;
pub mod conditions;
pub mod context;
pub mod errors;
pub mod meta;
pub mod nesting;
pub mod pipeline;
pub mod registry;
pub mod services;
pub mod strategies;
pub mod team;
pub mod tier;

pub use agent::{Agent, AgentResult, StrategyResult};
pub use capability::{AgentCapability, CapabilityFault, CapabilityOutput};
pub use conditions::{Comparator, Condition, ConditionEvaluator};
pub use context::ExecutionContext;
pub use errors::EnsembleError;
pub use meta::{ExecutionPlan, MetaOrchestrator};
pub use nesting::NestingContext;
pub use pipeline::{PipelineMode, StageSpec, TierRouter, WorkflowStagePipeline};
pub use registry::{WorkflowDefinition, WorkflowReference, WorkflowRegistry};
pub use services::Services;
pub use strategies::{build_strategy, ExecutionStrategy, StrategyKind};
pub use team::{DynamicTeamExecutor, QualityGate, TeamStrategy};
pub use tier::Tier;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
