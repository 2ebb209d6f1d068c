//! Meta-orchestration: analyze a task, assemble a team from templates,
//! pick a composition pattern, and estimate cost and duration.

mod analysis;
mod orchestrator;
mod templates;

pub use analysis::{analyze_task, Complexity, TaskAnalysis};
pub use orchestrator::{
    choose_pattern, estimate_duration_secs, ExecutionPlan, MetaOrchestrator, OrchestratorTuning,
    PlanDecision, PlanReviewer,
};
pub use templates::{AgentTemplate, TemplateRegistry};
