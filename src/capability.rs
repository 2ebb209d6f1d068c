//! The capability contract — the single seam between the composition engine
//! and whatever actually performs the work (a model call, an HTTP service,
//! a local function).
//!
//! Domain-specific behavior is plugged in behind [`AgentCapability`] rather
//! than subclassed: new agent types are data (an [`Agent`](crate::agent::Agent)
//! descriptor plus a capability handler), not new types.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::agent::Agent;

/// Output of one capability invocation.
#[derive(Debug, Clone, Default)]
pub struct CapabilityOutput {
    /// Opaque output map.
    pub output: Map<String, Value>,
    /// Self-reported confidence in `[0, 1]`.
    pub confidence: f64,
    /// Prompt-side token count.
    pub tokens_in: u64,
    /// Completion-side token count.
    pub tokens_out: u64,
}

impl CapabilityOutput {
    /// Convenience constructor for a text payload.
    pub fn text(content: impl Into<String>, confidence: f64) -> Self {
        let mut output = Map::new();
        output.insert("content".to_string(), Value::String(content.into()));
        Self {
            output,
            confidence,
            tokens_in: 0,
            tokens_out: 0,
        }
    }
}

/// A fault raised by a capability invocation.
///
/// Faults carry a transient/permanent classification so callers can decide
/// whether a whole-run retry makes sense.
#[derive(Debug, Clone)]
pub struct CapabilityFault {
    /// Human-readable fault description.
    pub message: String,
    /// Whether the fault looks transient (timeout, rate limit).
    pub transient: bool,
}

impl CapabilityFault {
    /// A permanent fault (bad input, rejected request).
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }

    /// A transient fault (timeout, rate limit, flaky upstream).
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }
}

impl fmt::Display for CapabilityFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CapabilityFault {}

/// The pluggable unit-of-work contract.
///
/// Implementations receive the agent descriptor and the caller's context
/// snapshot, and return an output map with confidence and token counts.
/// Timeout enforcement is the implementation's responsibility.
#[async_trait]
pub trait AgentCapability: Send + Sync {
    /// Perform the work for one agent invocation.
    async fn run(
        &self,
        agent: &Agent,
        input: &Map<String, Value>,
    ) -> Result<CapabilityOutput, CapabilityFault>;
}

// ---------------------------------------------------------------------------
// Scripted capability (tests / demos)
// ---------------------------------------------------------------------------

/// One scripted behavior for a [`ScriptedCapability`].
#[derive(Debug, Clone)]
pub enum Script {
    /// Succeed with the given content and confidence.
    Reply { content: String, confidence: f64 },
    /// Fail with the given message.
    Fail { message: String, transient: bool },
    /// Echo the input map back as output, with the given confidence.
    Echo { confidence: f64 },
}

/// In-memory capability keyed by agent id, for tests and demos.
///
/// Records per-agent invocation counts so tests can assert which agents
/// actually ran.
#[derive(Default)]
pub struct ScriptedCapability {
    scripts: HashMap<String, Script>,
    fallback_confidence: f64,
    invocations: Arc<InvocationCounter>,
}

/// Thread-safe per-agent invocation counter.
#[derive(Default)]
pub struct InvocationCounter {
    counts: parking_lot::Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
}

impl InvocationCounter {
    /// Invocation count for one agent id.
    pub fn count(&self, agent_id: &str) -> usize {
        self.counts.lock().get(agent_id).copied().unwrap_or(0)
    }

    /// Total invocations across all agents.
    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    fn record(&self, agent_id: &str) {
        self.counts
            .lock()
            .entry(agent_id.to_string())
            .and_modify(|c| *c += 1)
            .or_insert(1);
        self.total.fetch_add(1, Ordering::SeqCst);
    }
}

impl ScriptedCapability {
    /// Create an empty scripted capability. Unscripted agents echo their
    /// input with confidence 0.9.
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            fallback_confidence: 0.9,
            invocations: Arc::new(InvocationCounter::default()),
        }
    }

    /// Script a behavior for one agent id.
    pub fn script(mut self, agent_id: impl Into<String>, script: Script) -> Self {
        self.scripts.insert(agent_id.into(), script);
        self
    }

    /// Script a plain successful reply.
    pub fn reply(self, agent_id: impl Into<String>, content: &str, confidence: f64) -> Self {
        self.script(
            agent_id,
            Script::Reply {
                content: content.to_string(),
                confidence,
            },
        )
    }

    /// Script a permanent failure.
    pub fn fail(self, agent_id: impl Into<String>, message: &str) -> Self {
        self.script(
            agent_id,
            Script::Fail {
                message: message.to_string(),
                transient: false,
            },
        )
    }

    /// Handle to the invocation counter, cloneable before the capability is
    /// moved behind an `Arc<dyn AgentCapability>`.
    pub fn invocations(&self) -> Arc<InvocationCounter> {
        self.invocations.clone()
    }
}

#[async_trait]
impl AgentCapability for ScriptedCapability {
    async fn run(
        &self,
        agent: &Agent,
        input: &Map<String, Value>,
    ) -> Result<CapabilityOutput, CapabilityFault> {
        self.invocations.record(&agent.id);
        match self.scripts.get(&agent.id) {
            Some(Script::Reply {
                content,
                confidence,
            }) => Ok(CapabilityOutput {
                tokens_in: (input.len() as u64) * 8,
                tokens_out: (content.len() as u64).div_ceil(4),
                ..CapabilityOutput::text(content.clone(), *confidence)
            }),
            Some(Script::Fail { message, transient }) => Err(CapabilityFault {
                message: message.clone(),
                transient: *transient,
            }),
            Some(Script::Echo { confidence }) => Ok(CapabilityOutput {
                output: input.clone(),
                confidence: *confidence,
                tokens_in: (input.len() as u64) * 8,
                tokens_out: (input.len() as u64) * 8,
            }),
            None => Ok(CapabilityOutput::text(
                format!("{} done", agent.role),
                self.fallback_confidence,
            )),
        }
    }
}
