//! Adaptive composition: a classifier routes to a specialist by task
//! difficulty.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::agent::{Agent, StrategyResult};
use crate::capability::AgentCapability;
use crate::context::ExecutionContext;
use crate::errors::EnsembleError;

use super::{invoke_agent, ExecutionStrategy, StrategyKind};

/// Context key the chosen specialist finds the classification under.
pub const CLASSIFICATION_KEY: &str = "classification";

/// Classifier confidence above which the task is considered simple.
pub const SIMPLE_TASK_CONFIDENCE: f64 = 0.8;

/// First agent is the classifier, the rest are specialists. A confident
/// classification (> 0.8) routes to the lowest-tier specialist; anything
/// else routes to the highest-tier one. A failed classifier falls back to
/// the lowest-tier specialist. The chosen specialist runs with the
/// classification injected into its context.
pub struct AdaptiveStrategy {
    capability: Arc<dyn AgentCapability>,
}

impl AdaptiveStrategy {
    /// Create an adaptive strategy over the given capability.
    pub fn new(capability: Arc<dyn AgentCapability>) -> Self {
        Self { capability }
    }
}

#[async_trait]
impl ExecutionStrategy for AdaptiveStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Adaptive
    }

    async fn execute(
        &self,
        agents: &[Agent],
        ctx: &mut ExecutionContext,
    ) -> Result<StrategyResult, EnsembleError> {
        if agents.len() < 2 {
            return Err(EnsembleError::Validation(format!(
                "adaptive pattern requires a classifier and at least one specialist, got {}",
                agents.len()
            )));
        }
        let classifier = &agents[0];
        let specialists = &agents[1..];

        let mut cheapest = &specialists[0];
        let mut strongest = &specialists[0];
        for a in &specialists[1..] {
            if a.tier < cheapest.tier {
                cheapest = a;
            }
            if a.tier > strongest.tier {
                strongest = a;
            }
        }

        let classifier_result = invoke_agent(&self.capability, classifier, ctx).await;
        let specialist = if !classifier_result.success {
            log::debug!(
                "classifier '{}' failed; defaulting to lowest-tier specialist '{}'",
                classifier.id,
                cheapest.id
            );
            cheapest
        } else if classifier_result.confidence > SIMPLE_TASK_CONFIDENCE {
            cheapest
        } else {
            strongest
        };

        ctx.set(
            CLASSIFICATION_KEY,
            Value::Object(classifier_result.output.clone()),
        );
        let specialist_result = invoke_agent(&self.capability, specialist, ctx).await;
        let output = specialist_result.output.clone();
        if specialist_result.success {
            ctx.publish(&specialist.id, output.clone());
        }

        let mut aggregated =
            StrategyResult::from_results(vec![classifier_result, specialist_result]);
        // The specialist's outcome decides success; a failed classifier
        // already degraded the routing.
        aggregated.success = aggregated.agent_results[1].success;
        aggregated.output = output;
        aggregated.tag("_specialist", Value::String(specialist.id.clone()));
        Ok(aggregated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::Tier;

    fn trio() -> Vec<Agent> {
        vec![
            Agent::new("classifier", "triager"),
            Agent::new("cheap_specialist", "specialist").with_tier(Tier::Cheap),
            Agent::new("premium_specialist", "specialist").with_tier(Tier::Premium),
        ]
    }

    #[tokio::test]
    async fn test_confident_classifier_routes_cheap() {
        let capability = crate::capability::ScriptedCapability::new()
            .reply("classifier", "simple lookup", 0.95);
        let counts = capability.invocations();
        let strategy = AdaptiveStrategy::new(Arc::new(capability));

        let result = strategy
            .execute(&trio(), &mut ExecutionContext::new())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(counts.count("cheap_specialist"), 1);
        assert_eq!(counts.count("premium_specialist"), 0);
        assert_eq!(
            result.output.get("_specialist"),
            Some(&Value::String("cheap_specialist".into()))
        );
    }

    #[tokio::test]
    async fn test_uncertain_classifier_routes_premium() {
        let capability = crate::capability::ScriptedCapability::new()
            .reply("classifier", "ambiguous", 0.4);
        let counts = capability.invocations();
        let strategy = AdaptiveStrategy::new(Arc::new(capability));

        strategy
            .execute(&trio(), &mut ExecutionContext::new())
            .await
            .unwrap();

        assert_eq!(counts.count("premium_specialist"), 1);
        assert_eq!(counts.count("cheap_specialist"), 0);
    }

    #[tokio::test]
    async fn test_failed_classifier_defaults_cheap() {
        let capability = crate::capability::ScriptedCapability::new()
            .fail("classifier", "classifier down");
        let counts = capability.invocations();
        let strategy = AdaptiveStrategy::new(Arc::new(capability));

        let result = strategy
            .execute(&trio(), &mut ExecutionContext::new())
            .await
            .unwrap();

        // The run still succeeds through the default specialist.
        assert!(result.success);
        assert_eq!(counts.count("cheap_specialist"), 1);
    }

    #[tokio::test]
    async fn test_classification_injected_into_specialist_context() {
        let capability = crate::capability::ScriptedCapability::new()
            .reply("classifier", "simple", 0.95)
            .script(
                "cheap_specialist",
                crate::capability::Script::Echo { confidence: 0.9 },
            );
        let strategy = AdaptiveStrategy::new(Arc::new(capability));

        let result = strategy
            .execute(&trio(), &mut ExecutionContext::new())
            .await
            .unwrap();
        assert!(result.output.contains_key(CLASSIFICATION_KEY));
    }
}
