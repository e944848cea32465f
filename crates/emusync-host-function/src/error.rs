use serde_json::{Value, json};

/// Error type reported for function failures that do not name their own type.
pub const UNHANDLED_ERROR_TYPE: &str = "Lambda:Unhandled";

/// Errors from invoking a function data source.
#[derive(Debug, thiserror::Error)]
pub enum FunctionError {
  /// The handler ran and reported an error.
  #[error("{message}")]
  Handler {
    message: String,
    error_type: Option<String>,
    raw: Value,
  },

  /// The process could not be started.
  #[error("failed to spawn '{command}': {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },

  /// Reading from or writing to the process failed.
  #[error("function process I/O failed: {0}")]
  Io(#[from] std::io::Error),

  /// The process exited without producing a usable result.
  #[error("{message}")]
  Exited {
    code: Option<i32>,
    message: String,
    stderr: String,
  },

  /// No in-process handler is registered under the configured name.
  #[error("no handler registered under '{handler}'")]
  HandlerNotFound { handler: String },
}

impl FunctionError {
  /// Error type reported to the GraphQL client.
  pub fn error_type(&self) -> &str {
    match self {
      FunctionError::Handler {
        error_type: Some(error_type),
        ..
      } => error_type,
      _ => UNHANDLED_ERROR_TYPE,
    }
  }

  /// The failure as the handler reported it, for logging and `errorInfo`.
  pub fn raw(&self) -> Value {
    match self {
      FunctionError::Handler { raw, .. } => raw.clone(),
      FunctionError::Exited {
        code,
        message,
        stderr,
      } => json!({ "errorMessage": message, "exitCode": code, "stderr": stderr }),
      other => json!({ "errorMessage": other.to_string() }),
    }
  }
}
