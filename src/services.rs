//! Optional service handles threaded through execution.
//!
//! The engine talks to its surroundings through four narrow interfaces:
//! a response cache, an append-only telemetry backend, a state store for
//! observability/recovery, and a pub/sub-like coordination channel. Each is
//! explicitly optional — absence degrades to a no-op, and a failing backend
//! is logged and ignored, never fatal. A run must behave identically whether
//! or not these services are wired.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use md5::{Digest, Md5};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::tier::Tier;

// ---------------------------------------------------------------------------
// Telemetry records
// ---------------------------------------------------------------------------

/// One agent/stage invocation, as recorded by telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    /// Workflow the call belongs to ("adhoc" for bare strategies).
    pub workflow: String,
    /// Stage name or agent id.
    pub stage: String,
    /// Agent id that ran.
    pub agent_id: String,
    /// Tier the call ran at.
    pub tier: Tier,
    /// Prompt-side tokens.
    pub tokens_in: u64,
    /// Completion-side tokens.
    pub tokens_out: u64,
    /// Unit cost charged for the call.
    pub cost: f64,
    /// Wall time of the call.
    pub duration: Duration,
    /// Whether the call succeeded.
    pub success: bool,
    /// When the record was created.
    pub timestamp: DateTime<Utc>,
}

/// One completed workflow run, as recorded by telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    /// Workflow name.
    pub workflow: String,
    /// Whether the run succeeded.
    pub success: bool,
    /// Total cost across stages.
    pub total_cost: f64,
    /// Total run duration.
    pub total_duration: Duration,
    /// Number of executed (non-skipped) stages.
    pub stages_run: usize,
    /// When the record was created.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Service traits
// ---------------------------------------------------------------------------

/// Response cache keyed by (workflow, stage, prompt key, model/tier).
///
/// Writes must be idempotent; last-writer-wins under concurrent access from
/// parallel branches is acceptable.
pub trait ResponseCache: Send + Sync {
    /// Look up a cached output map.
    fn get(&self, workflow: &str, stage: &str, prompt_key: &str, model: &str)
        -> Option<Map<String, Value>>;

    /// Store an output map.
    fn put(
        &self,
        workflow: &str,
        stage: &str,
        prompt_key: &str,
        model: &str,
        output: Map<String, Value>,
    );
}

/// Append-only telemetry sink.
pub trait TelemetryBackend: Send + Sync {
    /// Record one agent/stage invocation.
    fn log_call(&self, record: CallRecord);
    /// Record one completed workflow run.
    fn log_workflow(&self, record: WorkflowRecord);
}

/// Observability/recovery store. Never influences control flow.
pub trait StateStore: Send + Sync {
    /// A run started.
    fn record_start(&self, workflow: &str, run_id: &str);
    /// A run completed successfully.
    fn record_completion(&self, workflow: &str, run_id: &str);
    /// A run failed.
    fn record_failure(&self, workflow: &str, run_id: &str, error: &str);
    /// Save a named checkpoint with arbitrary state.
    fn save_checkpoint(&self, workflow: &str, run_id: &str, stage: &str, state: &Value);
    /// The most recent checkpoint for a workflow run, if any.
    fn get_last_checkpoint(&self, workflow: &str, run_id: &str) -> Option<(String, Value)>;
}

/// Pub/sub-like coordination channel for heartbeat-style signaling.
///
/// Single-process coordination only; its absence degrades to no-ops.
#[async_trait::async_trait]
pub trait CoordinationChannel: Send + Sync {
    /// Publish a signal. Fire-and-forget.
    fn send_signal(&self, topic: &str, payload: Value);
    /// Wait up to `timeout` for a signal on `topic`. `None` on timeout.
    async fn wait_for_signal(&self, topic: &str, timeout: Duration) -> Option<Value>;
    /// Non-blocking check for a pending signal on `topic`.
    fn check_signal(&self, topic: &str) -> Option<Value>;
}

// ---------------------------------------------------------------------------
// Services bundle
// ---------------------------------------------------------------------------

/// Optional service handles carried in the execution context.
///
/// Explicit composition rather than inherited fallback: a missing handle is
/// `None`, and every call site tolerates absence.
#[derive(Clone, Default)]
pub struct Services {
    /// Response cache, if wired.
    pub cache: Option<Arc<dyn ResponseCache>>,
    /// Telemetry sink, if wired.
    pub telemetry: Option<Arc<dyn TelemetryBackend>>,
    /// State store, if wired.
    pub state: Option<Arc<dyn StateStore>>,
    /// Coordination channel, if wired.
    pub coordination: Option<Arc<dyn CoordinationChannel>>,
}

impl Services {
    /// An empty bundle: every interface absent.
    pub fn none() -> Self {
        Self::default()
    }

    /// Builder: attach a response cache.
    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Builder: attach a telemetry backend.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetryBackend>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Builder: attach a state store.
    pub fn with_state(mut self, state: Arc<dyn StateStore>) -> Self {
        self.state = Some(state);
        self
    }

    /// Builder: attach a coordination channel.
    pub fn with_coordination(mut self, coordination: Arc<dyn CoordinationChannel>) -> Self {
        self.coordination = Some(coordination);
        self
    }

    /// Log a call record if telemetry is wired.
    pub fn log_call(&self, record: CallRecord) {
        if let Some(ref telemetry) = self.telemetry {
            telemetry.log_call(record);
        }
    }

    /// Log a workflow record if telemetry is wired.
    pub fn log_workflow(&self, record: WorkflowRecord) {
        if let Some(ref telemetry) = self.telemetry {
            telemetry.log_workflow(record);
        }
    }

    /// Send a coordination signal if a channel is wired.
    pub fn send_signal(&self, topic: &str, payload: Value) {
        if let Some(ref coordination) = self.coordination {
            coordination.send_signal(topic, payload);
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("cache", &self.cache.is_some())
            .field("telemetry", &self.telemetry.is_some())
            .field("state", &self.state.is_some())
            .field("coordination", &self.coordination.is_some())
            .finish()
    }
}

/// MD5 hex digest of an input map, used as the cache prompt key.
///
/// Keys are sorted before hashing so logically equal maps hash equally.
pub fn prompt_key(input: &Map<String, Value>) -> String {
    let mut keys: Vec<&String> = input.keys().collect();
    keys.sort();
    let mut hasher = Md5::new();
    for key in keys {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(input[key].to_string().as_bytes());
        hasher.update(b"|");
    }
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

/// Thread-safe in-memory response cache.
#[derive(Debug, Default)]
pub struct MemoryResponseCache {
    entries: DashMap<String, Map<String, Value>>,
}

impl MemoryResponseCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn key(workflow: &str, stage: &str, prompt_key: &str, model: &str) -> String {
        format!("{}::{}::{}::{}", workflow, stage, prompt_key, model)
    }
}

impl ResponseCache for MemoryResponseCache {
    fn get(
        &self,
        workflow: &str,
        stage: &str,
        prompt_key: &str,
        model: &str,
    ) -> Option<Map<String, Value>> {
        self.entries
            .get(&Self::key(workflow, stage, prompt_key, model))
            .map(|entry| entry.clone())
    }

    fn put(
        &self,
        workflow: &str,
        stage: &str,
        prompt_key: &str,
        model: &str,
        output: Map<String, Value>,
    ) {
        self.entries
            .insert(Self::key(workflow, stage, prompt_key, model), output);
    }
}

/// In-memory append-only telemetry sink.
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    calls: Mutex<Vec<CallRecord>>,
    workflows: Mutex<Vec<WorkflowRecord>>,
}

impl MemoryTelemetry {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded call records.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().clone()
    }

    /// Snapshot of recorded workflow records.
    pub fn workflows(&self) -> Vec<WorkflowRecord> {
        self.workflows.lock().clone()
    }
}

impl TelemetryBackend for MemoryTelemetry {
    fn log_call(&self, record: CallRecord) {
        self.calls.lock().push(record);
    }

    fn log_workflow(&self, record: WorkflowRecord) {
        self.workflows.lock().push(record);
    }
}

/// In-memory state store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    events: Mutex<Vec<String>>,
    checkpoints: Mutex<HashMap<String, (String, Value)>>,
}

impl MemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded lifecycle events (for assertions).
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn run_key(workflow: &str, run_id: &str) -> String {
        format!("{}::{}", workflow, run_id)
    }
}

impl StateStore for MemoryStateStore {
    fn record_start(&self, workflow: &str, run_id: &str) {
        self.events
            .lock()
            .push(format!("start {} {}", workflow, run_id));
    }

    fn record_completion(&self, workflow: &str, run_id: &str) {
        self.events
            .lock()
            .push(format!("complete {} {}", workflow, run_id));
    }

    fn record_failure(&self, workflow: &str, run_id: &str, error: &str) {
        self.events
            .lock()
            .push(format!("fail {} {}: {}", workflow, run_id, error));
    }

    fn save_checkpoint(&self, workflow: &str, run_id: &str, stage: &str, state: &Value) {
        self.checkpoints.lock().insert(
            Self::run_key(workflow, run_id),
            (stage.to_string(), state.clone()),
        );
    }

    fn get_last_checkpoint(&self, workflow: &str, run_id: &str) -> Option<(String, Value)> {
        self.checkpoints
            .lock()
            .get(&Self::run_key(workflow, run_id))
            .cloned()
    }
}

/// In-memory coordination channel backed by per-topic queues.
#[derive(Debug, Default)]
pub struct MemoryCoordination {
    queues: Mutex<HashMap<String, Vec<Value>>>,
}

impl MemoryCoordination {
    /// Create an empty channel.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CoordinationChannel for MemoryCoordination {
    fn send_signal(&self, topic: &str, payload: Value) {
        self.queues
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(payload);
    }

    async fn wait_for_signal(&self, topic: &str, timeout: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(signal) = self.check_signal(topic) {
                return Some(signal);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn check_signal(&self, topic: &str) -> Option<Value> {
        let mut queues = self.queues.lock();
        let queue = queues.get_mut(topic)?;
        if queue.is_empty() {
            None
        } else {
            Some(queue.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_key_is_order_insensitive() {
        let mut a = Map::new();
        a.insert("x".to_string(), Value::from(1));
        a.insert("y".to_string(), Value::from(2));
        let mut b = Map::new();
        b.insert("y".to_string(), Value::from(2));
        b.insert("x".to_string(), Value::from(1));
        assert_eq!(prompt_key(&a), prompt_key(&b));

        b.insert("x".to_string(), Value::from(3));
        assert_ne!(prompt_key(&a), prompt_key(&b));
    }

    #[test]
    fn test_memory_cache_round_trip() {
        let cache = MemoryResponseCache::new();
        assert!(cache.get("wf", "s1", "k", "cheap").is_none());

        let mut output = Map::new();
        output.insert("content".to_string(), Value::String("cached".into()));
        cache.put("wf", "s1", "k", "cheap", output.clone());
        assert_eq!(cache.get("wf", "s1", "k", "cheap"), Some(output));
        // Different tier is a different entry.
        assert!(cache.get("wf", "s1", "k", "premium").is_none());
    }

    #[test]
    fn test_state_store_checkpoints() {
        let store = MemoryStateStore::new();
        assert!(store.get_last_checkpoint("wf", "r1").is_none());
        store.save_checkpoint("wf", "r1", "stage-a", &Value::from(1));
        store.save_checkpoint("wf", "r1", "stage-b", &Value::from(2));
        let (stage, state) = store.get_last_checkpoint("wf", "r1").unwrap();
        assert_eq!(stage, "stage-b");
        assert_eq!(state, Value::from(2));
    }

    #[tokio::test]
    async fn test_coordination_queue_semantics() {
        let channel = MemoryCoordination::new();
        assert!(channel.check_signal("heartbeat").is_none());
        channel.send_signal("heartbeat", Value::from("alive"));
        assert_eq!(channel.check_signal("heartbeat"), Some(Value::from("alive")));
        assert!(channel.check_signal("heartbeat").is_none());

        let none = channel
            .wait_for_signal("heartbeat", Duration::from_millis(20))
            .await;
        assert!(none.is_none());
    }
}
