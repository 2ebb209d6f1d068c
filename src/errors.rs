//! Error types for the ensemble engine.
//!
//! Expected, recoverable outcomes (a failed agent invocation inside a group,
//! a non-required quality gate missing its threshold) are represented as
//! values — failed [`AgentResult`](crate::agent::AgentResult)s, gate
//! outcomes — not as `Err`. Only faults that invalidate the enclosing run
//! travel through this enum.

use thiserror::Error;

/// Top-level error for composition and pipeline execution.
#[derive(Debug, Error)]
pub enum EnsembleError {
    /// Bad arity or configuration, detected before any agent runs.
    /// Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// An agent capability invocation errored and the failure could not be
    /// absorbed into a failed result (e.g. a lone refinement stage).
    #[error("capability fault for agent '{agent_id}': {message}")]
    Capability {
        /// Id of the agent whose invocation faulted.
        agent_id: String,
        /// Human-readable fault description.
        message: String,
        /// Whether the fault looks transient (timeout, rate limit) rather
        /// than permanent (bad config). Callers use this to decide on
        /// whole-run retry.
        transient: bool,
    },

    /// Nesting depth exceeded or a workflow cycle detected. Always
    /// propagates and aborts the enclosing run.
    #[error("recursion fault: {reason} (active workflow stack: [{}])", stack.join(" -> "))]
    Recursion {
        /// Why nesting was refused.
        reason: String,
        /// The full active workflow stack at the point of refusal.
        stack: Vec<String>,
    },

    /// A tier-fallback stage exhausted every tier, or a required team gate
    /// failed.
    #[error("quality gate failure at '{subject}': {detail}")]
    QualityGate {
        /// Failing stage or gate name.
        subject: String,
        /// What was tried / what threshold was missed.
        detail: String,
    },

    /// A workflow reference named an id the registry does not know.
    /// Validation-class: never retried.
    #[error("unknown workflow '{0}'")]
    UnknownWorkflow(String),
}

impl EnsembleError {
    /// Whether a whole-run retry could plausibly succeed.
    ///
    /// Validation, recursion, and unknown-workflow faults are permanent by
    /// construction; capability faults carry their own classification.
    pub fn is_transient(&self) -> bool {
        match self {
            EnsembleError::Capability { transient, .. } => *transient,
            EnsembleError::QualityGate { .. } => true,
            EnsembleError::Validation(_)
            | EnsembleError::Recursion { .. }
            | EnsembleError::UnknownWorkflow(_) => false,
        }
    }
}
