//! Condition model and evaluation for conditional composition patterns.
//!
//! Structural predicates are a small whitelist of deterministic comparisons
//! over named context fields — no arbitrary code execution. Semantic
//! predicates delegate interpretation to an external capability. Composite
//! conditions combine children with AND/OR/NOT.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::agent::Agent;
use crate::capability::AgentCapability;
use crate::context::ExecutionContext;
use crate::errors::EnsembleError;

/// Whitelisted structural comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    /// Field equals the expected value.
    Equals,
    /// Field differs from the expected value.
    NotEquals,
    /// Numeric field is strictly less than the expected value.
    LessThan,
    /// Numeric field is strictly greater than the expected value.
    GreaterThan,
    /// String field contains the expected substring, or array field
    /// contains the expected element.
    Contains,
}

/// A predicate over the execution context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// Deterministic comparison of a named context field.
    Structural {
        /// Context field to inspect. Dotted paths descend into objects
        /// (e.g. "triage.severity").
        field: String,
        /// Comparison operator.
        comparator: Comparator,
        /// Expected value.
        value: Value,
    },
    /// Delegated semantic check, interpreted by an external capability.
    Semantic {
        /// Natural-language predicate handed to the capability.
        predicate: String,
    },
    /// True when every child is true.
    All(Vec<Condition>),
    /// True when any child is true.
    Any(Vec<Condition>),
    /// Negation.
    Not(Box<Condition>),
}

impl Condition {
    /// Shorthand for a field-equals condition.
    pub fn equals(field: impl Into<String>, value: Value) -> Self {
        Condition::Structural {
            field: field.into(),
            comparator: Comparator::Equals,
            value,
        }
    }

    /// Shorthand for a numeric greater-than condition.
    pub fn greater_than(field: impl Into<String>, value: f64) -> Self {
        Condition::Structural {
            field: field.into(),
            comparator: Comparator::GreaterThan,
            value: Value::from(value),
        }
    }
}

/// Evaluates [`Condition`]s against an execution context.
///
/// Built without a semantic judge, semantic predicates evaluate to `false`
/// (with a warning) rather than guessing — a branch is never taken on an
/// unevaluated predicate.
#[derive(Clone, Default)]
pub struct ConditionEvaluator {
    judge: Option<(Arc<dyn AgentCapability>, Agent)>,
}

impl ConditionEvaluator {
    /// Evaluator handling structural and composite conditions only.
    pub fn structural_only() -> Self {
        Self::default()
    }

    /// Evaluator that delegates semantic predicates to `capability`,
    /// invoked as `judge_agent`.
    pub fn with_judge(capability: Arc<dyn AgentCapability>, judge_agent: Agent) -> Self {
        Self {
            judge: Some((capability, judge_agent)),
        }
    }

    /// Evaluate a condition. Missing fields make structural comparisons
    /// false rather than erroring.
    pub async fn evaluate(
        &self,
        condition: &Condition,
        ctx: &ExecutionContext,
    ) -> Result<bool, EnsembleError> {
        match condition {
            Condition::Structural {
                field,
                comparator,
                value,
            } => Ok(Self::compare(lookup(ctx.values(), field), *comparator, value)),
            Condition::Semantic { predicate } => self.evaluate_semantic(predicate, ctx).await,
            Condition::All(children) => {
                for child in children {
                    if !Box::pin(self.evaluate(child, ctx)).await? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Any(children) => {
                for child in children {
                    if Box::pin(self.evaluate(child, ctx)).await? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Not(child) => Ok(!Box::pin(self.evaluate(child, ctx)).await?),
        }
    }

    fn compare(actual: Option<&Value>, comparator: Comparator, expected: &Value) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        match comparator {
            Comparator::Equals => actual == expected,
            Comparator::NotEquals => actual != expected,
            Comparator::LessThan => match (actual.as_f64(), expected.as_f64()) {
                (Some(a), Some(b)) => a < b,
                _ => false,
            },
            Comparator::GreaterThan => match (actual.as_f64(), expected.as_f64()) {
                (Some(a), Some(b)) => a > b,
                _ => false,
            },
            Comparator::Contains => match (actual, expected) {
                (Value::String(haystack), Value::String(needle)) => haystack.contains(needle),
                (Value::Array(items), needle) => items.contains(needle),
                _ => false,
            },
        }
    }

    async fn evaluate_semantic(
        &self,
        predicate: &str,
        ctx: &ExecutionContext,
    ) -> Result<bool, EnsembleError> {
        let Some((capability, judge)) = &self.judge else {
            log::warn!(
                "semantic condition '{}' has no judge configured; evaluating to false",
                predicate
            );
            return Ok(false);
        };

        let mut input = ctx.values().clone();
        input.insert(
            "predicate".to_string(),
            Value::String(predicate.to_string()),
        );

        match capability.run(judge, &input).await {
            Ok(output) => Ok(read_verdict(&output.output, output.confidence)),
            Err(fault) => {
                // A failed judge is a failed predicate, not a failed run.
                log::warn!(
                    "semantic judge failed for '{}': {}; evaluating to false",
                    predicate,
                    fault
                );
                Ok(false)
            }
        }
    }
}

impl std::fmt::Debug for ConditionEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionEvaluator")
            .field("judge", &self.judge.is_some())
            .finish()
    }
}

/// Resolve a possibly-dotted field path against a value map.
fn lookup<'a>(values: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    let mut parts = field.split('.');
    let mut current = values.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Read a boolean verdict from a judge output: an explicit `verdict` field
/// wins, else confidence >= 0.5.
fn read_verdict(output: &Map<String, Value>, confidence: f64) -> bool {
    if let Some(verdict) = output.get("verdict").and_then(Value::as_bool) {
        return verdict;
    }
    confidence >= 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ScriptedCapability;

    fn ctx_with(field: &str, value: Value) -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        ctx.set(field, value);
        ctx
    }

    #[tokio::test]
    async fn test_structural_comparisons() {
        let eval = ConditionEvaluator::structural_only();
        let ctx = ctx_with("severity", Value::from(7));

        assert!(eval
            .evaluate(&Condition::greater_than("severity", 5.0), &ctx)
            .await
            .unwrap());
        assert!(!eval
            .evaluate(&Condition::greater_than("severity", 9.0), &ctx)
            .await
            .unwrap());
        assert!(eval
            .evaluate(&Condition::equals("severity", Value::from(7)), &ctx)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_missing_field_is_false_not_error() {
        let eval = ConditionEvaluator::structural_only();
        let ctx = ExecutionContext::new();
        let cond = Condition::equals("absent", Value::from("x"));
        assert!(!eval.evaluate(&cond, &ctx).await.unwrap());
    }

    #[tokio::test]
    async fn test_contains_on_strings_and_arrays() {
        let eval = ConditionEvaluator::structural_only();
        let ctx = ctx_with("summary", Value::from("critical path regression"));
        let cond = Condition::Structural {
            field: "summary".into(),
            comparator: Comparator::Contains,
            value: Value::from("regression"),
        };
        assert!(eval.evaluate(&cond, &ctx).await.unwrap());

        let ctx = ctx_with("tags", serde_json::json!(["alpha", "beta"]));
        let cond = Condition::Structural {
            field: "tags".into(),
            comparator: Comparator::Contains,
            value: Value::from("beta"),
        };
        assert!(eval.evaluate(&cond, &ctx).await.unwrap());
    }

    #[tokio::test]
    async fn test_dotted_path_lookup() {
        let eval = ConditionEvaluator::structural_only();
        let ctx = ctx_with("triage", serde_json::json!({ "severity": "high" }));
        let cond = Condition::equals("triage.severity", Value::from("high"));
        assert!(eval.evaluate(&cond, &ctx).await.unwrap());
    }

    #[tokio::test]
    async fn test_composite_and_or_not() {
        let eval = ConditionEvaluator::structural_only();
        let ctx = ctx_with("n", Value::from(5));
        let yes = Condition::greater_than("n", 1.0);
        let no = Condition::greater_than("n", 10.0);

        assert!(eval
            .evaluate(&Condition::All(vec![yes.clone(), yes.clone()]), &ctx)
            .await
            .unwrap());
        assert!(!eval
            .evaluate(&Condition::All(vec![yes.clone(), no.clone()]), &ctx)
            .await
            .unwrap());
        assert!(eval
            .evaluate(&Condition::Any(vec![no.clone(), yes.clone()]), &ctx)
            .await
            .unwrap());
        assert!(eval
            .evaluate(&Condition::Not(Box::new(no)), &ctx)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_semantic_without_judge_is_false() {
        let eval = ConditionEvaluator::structural_only();
        let ctx = ExecutionContext::new();
        let cond = Condition::Semantic {
            predicate: "is the draft publishable".into(),
        };
        assert!(!eval.evaluate(&cond, &ctx).await.unwrap());
    }

    #[tokio::test]
    async fn test_semantic_delegates_to_judge() {
        let capability = Arc::new(ScriptedCapability::new().reply("judge", "yes", 0.95));
        let eval =
            ConditionEvaluator::with_judge(capability, Agent::new("judge", "semantic judge"));
        let ctx = ExecutionContext::new();
        let cond = Condition::Semantic {
            predicate: "looks good".into(),
        };
        // Confidence 0.95 with no explicit verdict field reads as true.
        assert!(eval.evaluate(&cond, &ctx).await.unwrap());
    }
}
