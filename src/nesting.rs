//! Depth and cycle guarding for nested workflow execution.
//!
//! A [`NestingContext`] is an immutable value threaded through nested calls.
//! Entering a workflow returns a *new* context; the parent is never mutated,
//! so sibling nested calls in parallel branches cannot leak state into one
//! another.

use serde::{Deserialize, Serialize};

/// Default maximum nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Immutable depth/cycle tracker for nested workflows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestingContext {
    /// Current depth (0 at the top level).
    depth: usize,
    /// Maximum permitted depth.
    max_depth: usize,
    /// Stack of active workflow ids, outermost first.
    stack: Vec<String>,
}

impl Default for NestingContext {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl NestingContext {
    /// Create a root context with the given depth limit.
    pub fn new(max_depth: usize) -> Self {
        Self {
            depth: 0,
            max_depth,
            stack: Vec::new(),
        }
    }

    /// Current depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Maximum permitted depth.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Active workflow id stack, outermost first.
    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    /// Whether `workflow_id` is already on the active stack.
    pub fn is_active(&self, workflow_id: &str) -> bool {
        self.stack.iter().any(|id| id == workflow_id)
    }

    /// Whether entering `workflow_id` is permitted: false when the depth
    /// limit is reached or the id is already active (a cycle).
    pub fn can_nest(&self, workflow_id: &str) -> bool {
        self.depth < self.max_depth && !self.is_active(workflow_id)
    }

    /// Enter a workflow, returning a new context at depth+1 with the id
    /// pushed. The receiver is unchanged.
    pub fn enter(&self, workflow_id: impl Into<String>) -> NestingContext {
        let mut stack = self.stack.clone();
        stack.push(workflow_id.into());
        NestingContext {
            depth: self.depth + 1,
            max_depth: self.max_depth,
            stack,
        }
    }
}
