//! Input validation at the workflow boundary.
//!
//! Workflow parameters and resume values cross the process boundary as
//! untyped JSON; every plugin may attach a structural validator that is
//! consulted at dispatch and at resume. Any object with a
//! `validate` in the shape below works; the stock implementation compiles
//! a JSON Schema.

use crate::error::{AgentError, AgentResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One structural problem found in an input value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// JSON pointer to the offending location ("" for the root)
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// A structural validator used as a value.
pub trait InputValidator: Send + Sync {
    /// Validate an input, returning the (possibly normalized) value on
    /// success or every issue found on failure. Never panics.
    fn validate(&self, input: &Value) -> Result<Value, Vec<ValidationIssue>>;

    /// The JSON Schema describing accepted inputs, if one exists.
    /// Surfaced to clients inside pause events.
    fn schema(&self) -> Option<Value> {
        None
    }
}

/// JSON Schema backed validator.
pub struct SchemaValidator {
    schema: Value,
    compiled: jsonschema::Validator,
}

impl SchemaValidator {
    /// Compile a schema. Fails on schemas the draft does not accept.
    pub fn new(schema: Value) -> AgentResult<Self> {
        let compiled = jsonschema::validator_for(&schema).map_err(|e| AgentError::InvalidInput {
            reason: format!("invalid input schema: {e}"),
        })?;
        Ok(Self { schema, compiled })
    }
}

impl InputValidator for SchemaValidator {
    fn validate(&self, input: &Value) -> Result<Value, Vec<ValidationIssue>> {
        let issues: Vec<ValidationIssue> = self
            .compiled
            .iter_errors(input)
            .map(|error| ValidationIssue {
                path: error.instance_path().to_string(),
                message: error.to_string(),
            })
            .collect();
        if issues.is_empty() {
            Ok(input.clone())
        } else {
            Err(issues)
        }
    }

    fn schema(&self) -> Option<Value> {
        Some(self.schema.clone())
    }
}
