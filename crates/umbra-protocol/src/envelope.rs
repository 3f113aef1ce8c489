//! Command request and response envelope types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A command sent to a worker.
///
/// The command name selects a handler; all remaining top-level fields are
/// passed through to the handler as its arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Handler name (e.g. `ping`, `get_value`).
    pub command: String,

    /// Handler arguments, flattened into the request object.
    #[serde(flatten)]
    pub args: Map<String, Value>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Map::new(),
        }
    }

    pub fn with_args(command: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

/// The response envelope a worker returns for every request.
///
/// `result` is present iff `success`; `error` (and optionally `traceback`)
/// are present iff not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl Envelope {
    /// Success envelope carrying a result payload.
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            traceback: None,
        }
    }

    /// Failure envelope with an error message.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            traceback: None,
        }
    }

    /// Failure envelope carrying the full error chain for diagnostics.
    pub fn err_with_traceback(error: impl Into<String>, traceback: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            traceback: Some(traceback.into()),
        }
    }
}
