use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Structural problems that prevent a statement from being stored.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StatementError {
    #[error("statement is missing `{0}`")]
    MissingField(&'static str),

    #[error("statement field `{0}` must be an object")]
    NotAnObject(&'static str),

    #[error("malformed statement: {0}")]
    Malformed(String),
}

//
// ─── STATEMENT ────────────────────────────────────────────────────────────────
//

fn default_stored_by() -> String {
    "api".to_owned()
}

/// A learning-activity statement as received from a client.
///
/// Only the top-level shape is typed. `actor`, `verb`, `object`, `result` and
/// `context` are kept as opaque JSON so that unknown or partially filled
/// payloads survive storage unchanged. Reading signals out of them is the job
/// of [`crate::extract`], which never fails on odd shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(default)]
    pub actor: Value,
    #[serde(default)]
    pub verb: Value,
    #[serde(default)]
    pub object: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    /// Client-supplied timestamp, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default = "default_stored_by")]
    pub stored_by: String,
}

impl Default for Statement {
    fn default() -> Self {
        Self {
            actor: Value::Null,
            verb: Value::Null,
            object: Value::Null,
            result: None,
            context: None,
            timestamp: None,
            stored_by: default_stored_by(),
        }
    }
}

impl Statement {
    /// Parse a statement from arbitrary JSON and check its structural minimum.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::Malformed` if the JSON does not fit the
    /// statement shape (for example a non-string `timestamp`), or the errors
    /// from [`Statement::validate`].
    pub fn from_value(value: Value) -> Result<Self, StatementError> {
        let statement: Self = serde_json::from_value(value)
            .map_err(|err| StatementError::Malformed(err.to_string()))?;
        statement.validate()?;
        Ok(statement)
    }

    /// Parse a statement from a JSON document.
    ///
    /// # Errors
    ///
    /// Same as [`Statement::from_value`], plus `Malformed` for invalid JSON.
    pub fn from_json(raw: &str) -> Result<Self, StatementError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|err| StatementError::Malformed(err.to_string()))?;
        Self::from_value(value)
    }

    /// Check that `actor`, `verb` and `object` are present and are objects.
    ///
    /// # Errors
    ///
    /// Returns `MissingField` for absent/null fields and `NotAnObject` for
    /// fields of any other JSON type.
    pub fn validate(&self) -> Result<(), StatementError> {
        for (name, value) in [
            ("actor", &self.actor),
            ("verb", &self.verb),
            ("object", &self.object),
        ] {
            match value {
                Value::Object(_) => {}
                Value::Null => return Err(StatementError::MissingField(name)),
                _ => return Err(StatementError::NotAnObject(name)),
            }
        }
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
