//! Stage output validation for tier fallback.

use serde_json::{Map, Value};

/// Predicate deciding whether a stage's output is good enough to accept.
///
/// `Err` carries the rejection reason, recorded in the tier-progression log.
pub trait StageValidator: Send + Sync {
    /// Validate one attempt's output.
    fn validate(&self, output: &Map<String, Value>) -> Result<(), String>;
}

impl<F> StageValidator for F
where
    F: Fn(&Map<String, Value>) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, output: &Map<String, Value>) -> Result<(), String> {
        self(output)
    }
}

/// Default acceptance rule: output is non-empty and carries no explicit
/// `error` field.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValidator;

impl StageValidator for DefaultValidator {
    fn validate(&self, output: &Map<String, Value>) -> Result<(), String> {
        if output.is_empty() {
            return Err("empty output".to_string());
        }
        if let Some(error) = output.get("error") {
            return Err(format!("output carries error field: {}", error));
        }
        Ok(())
    }
}
