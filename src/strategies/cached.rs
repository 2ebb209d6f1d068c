//! Prompt-cached sequential composition: one large shared context blob,
//! attached once and referenced by every step.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::agent::{Agent, StrategyResult};
use crate::capability::AgentCapability;
use crate::context::{ExecutionContext, SHARED_CONTEXT_KEY};
use crate::errors::EnsembleError;

use super::{invoke_agent, ExecutionStrategy, StrategyKind};

/// Sequential variant for steps sharing a large common context.
///
/// The shared blob is attached to context exactly once, under
/// [`SHARED_CONTEXT_KEY`]; steps read it through that single entry instead
/// of each carrying a copy. The roughly 20% latency discount this buys
/// shows up only in the meta-orchestrator's duration estimate.
pub struct PromptCachedSequentialStrategy {
    capability: Arc<dyn AgentCapability>,
    shared_context: Option<Value>,
}

impl PromptCachedSequentialStrategy {
    /// Create the strategy. With `shared_context = None`, a blob already
    /// present in the execution context is used as-is.
    pub fn new(capability: Arc<dyn AgentCapability>, shared_context: Option<Value>) -> Self {
        Self {
            capability,
            shared_context,
        }
    }
}

#[async_trait]
impl ExecutionStrategy for PromptCachedSequentialStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PromptCachedSequential
    }

    async fn execute(
        &self,
        agents: &[Agent],
        ctx: &mut ExecutionContext,
    ) -> Result<StrategyResult, EnsembleError> {
        if agents.is_empty() {
            return Err(EnsembleError::Validation(
                "prompt-cached sequential pattern requires at least one agent".to_string(),
            ));
        }

        // Attach the blob once; never overwrite one the caller already set.
        if let Some(ref blob) = self.shared_context {
            if !ctx.contains(SHARED_CONTEXT_KEY) {
                ctx.set(SHARED_CONTEXT_KEY, blob.clone());
            }
        }

        let mut results = Vec::with_capacity(agents.len());
        for agent in agents {
            let result = invoke_agent(&self.capability, agent, ctx).await;
            if result.success {
                ctx.publish(&agent.id, result.output.clone());
            }
            results.push(result);
        }

        let last_output = results
            .iter()
            .rev()
            .find(|r| r.success)
            .map(|r| r.output.clone())
            .unwrap_or_default();

        Ok(StrategyResult::from_results(results).with_output(last_output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityFault, CapabilityOutput};
    use parking_lot::Mutex;
    use serde_json::Map;

    /// Capability that records how many inputs carried the shared blob.
    #[derive(Default)]
    struct BlobWatcher {
        sightings: Mutex<usize>,
    }

    #[async_trait]
    impl AgentCapability for BlobWatcher {
        async fn run(
            &self,
            _agent: &Agent,
            input: &Map<String, Value>,
        ) -> Result<CapabilityOutput, CapabilityFault> {
            if input.contains_key(SHARED_CONTEXT_KEY) {
                *self.sightings.lock() += 1;
            }
            Ok(CapabilityOutput::text("ok", 0.9))
        }
    }

    #[tokio::test]
    async fn test_blob_attached_once_and_seen_by_all_steps() {
        let watcher = Arc::new(BlobWatcher::default());
        let strategy = PromptCachedSequentialStrategy::new(
            watcher.clone(),
            Some(Value::String("big shared corpus".into())),
        );
        let agents = vec![
            Agent::new("a", "worker"),
            Agent::new("b", "worker"),
            Agent::new("c", "worker"),
        ];
        let mut ctx = ExecutionContext::new();

        let result = strategy.execute(&agents, &mut ctx).await.unwrap();
        assert!(result.success);
        // Every step saw the single shared entry.
        assert_eq!(*watcher.sightings.lock(), 3);
        assert_eq!(
            ctx.get(SHARED_CONTEXT_KEY),
            Some(&Value::String("big shared corpus".into()))
        );
    }

    #[tokio::test]
    async fn test_existing_blob_not_overwritten() {
        let watcher = Arc::new(BlobWatcher::default());
        let strategy = PromptCachedSequentialStrategy::new(
            watcher,
            Some(Value::String("late blob".into())),
        );
        let mut ctx = ExecutionContext::new();
        ctx.set(SHARED_CONTEXT_KEY, Value::String("caller blob".into()));

        strategy
            .execute(&[Agent::new("a", "worker")], &mut ctx)
            .await
            .unwrap();
        assert_eq!(
            ctx.get(SHARED_CONTEXT_KEY),
            Some(&Value::String("caller blob".into()))
        );
    }
}
