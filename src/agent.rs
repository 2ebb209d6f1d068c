//! Agent descriptors and per-invocation results.
//!
//! An [`Agent`] is a named unit of work: it declares a role, capability tags,
//! a preferred cost tier, and a timeout. It is immutable once registered —
//! execution state lives in [`AgentResult`] values, one per invocation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::tier::Tier;

/// Default per-agent timeout in seconds, used for duration estimation.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// A named unit of work wrapping a call to an external capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique identifier, also the context key its output is published under.
    pub id: String,
    /// Role of the agent (e.g. "researcher", "coordinator").
    pub role: String,
    /// Capability tags used for team assembly and pattern selection.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Preferred cost tier for invocations of this agent.
    #[serde(default)]
    pub tier: Tier,
    /// Declared timeout in seconds. Used for duration estimation only;
    /// enforcement is the capability's responsibility.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Agent {
    /// Create a new agent with the given id and role.
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            capabilities: Vec::new(),
            tier: Tier::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Builder: set capability tags.
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Builder: set the preferred tier.
    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    /// Builder: set the declared timeout.
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Whether this agent carries a given capability tag.
    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities.iter().any(|c| c == tag)
    }
}

/// Result of a single agent invocation.
///
/// Created per invocation, consumed by aggregation and telemetry, then
/// discardable. Confidence is always clamped to `[0, 1]` on construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    /// Id of the agent that produced this result.
    pub agent_id: String,
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Opaque output map from the capability.
    pub output: Map<String, Value>,
    /// Self-reported confidence in `[0, 1]`.
    pub confidence: f64,
    /// Wall time of the invocation.
    pub duration: Duration,
    /// Error description when `success` is false.
    pub error: Option<String>,
}

impl AgentResult {
    /// Build a successful result. Confidence is clamped to `[0, 1]`.
    pub fn ok(
        agent_id: impl Into<String>,
        output: Map<String, Value>,
        confidence: f64,
        duration: Duration,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            success: true,
            output,
            confidence: confidence.clamp(0.0, 1.0),
            duration,
            error: None,
        }
    }

    /// Build a failed result. Confidence is pinned to 0.0.
    pub fn failed(agent_id: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            agent_id: agent_id.into(),
            success: false,
            output: Map::new(),
            confidence: 0.0,
            duration,
            error: Some(error.into()),
        }
    }
}

/// Aggregated result of one composition pattern execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyResult {
    /// Overall success of the composition.
    pub success: bool,
    /// Ordered per-agent results.
    pub agent_results: Vec<AgentResult>,
    /// Aggregated output map (pattern-specific shape).
    pub output: Map<String, Value>,
    /// Total duration attributed to the composition. For parallel groups
    /// this is the maximum member duration, not the sum.
    pub total_duration: Duration,
    /// Errors collected from failed members, in result order.
    pub errors: Vec<String>,
}

impl StrategyResult {
    /// Aggregate a list of member results.
    ///
    /// `success` is the AND over all members, `errors` collects each failed
    /// member's error in order, and `total_duration` is the sum of member
    /// durations (callers with parallel semantics override it).
    pub fn from_results(agent_results: Vec<AgentResult>) -> Self {
        let success = !agent_results.is_empty() && agent_results.iter().all(|r| r.success);
        let errors = agent_results
            .iter()
            .filter_map(|r| r.error.clone())
            .collect();
        let total_duration = agent_results.iter().map(|r| r.duration).sum();
        Self {
            success,
            agent_results,
            output: Map::new(),
            total_duration,
            errors,
        }
    }

    /// A neutral no-op result (used by conditional patterns when no branch
    /// applies). Succeeds with no agent results and zero duration.
    pub fn neutral() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    /// Builder: replace the aggregated output map.
    pub fn with_output(mut self, output: Map<String, Value>) -> Self {
        self.output = output;
        self
    }

    /// Insert one key into the aggregated output map.
    pub fn tag(&mut self, key: impl Into<String>, value: Value) {
        self.output.insert(key.into(), value);
    }
}
