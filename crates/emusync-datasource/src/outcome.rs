use serde::Serialize;
use serde_json::Value;

use crate::error::BackendError;

/// Error type for a dispatch naming a data source that is not registered.
pub const DATA_SOURCE_NOT_FOUND_ERROR_TYPE: &str = "DataSourceNotFound";

/// Error type for a dispatch that did not finish within its timeout.
pub const TIMEOUT_ERROR_TYPE: &str = "ExecutionTimeout";

/// Error type for a non-function backend that panicked.
pub const INTERNAL_FAILURE_ERROR_TYPE: &str = "InternalFailure";

/// A failed dispatch, in the shape the pipeline records on `ctx.error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchError {
  pub message: String,
  pub error_type: String,
  pub raw: Value,
}

impl DispatchError {
  pub fn new(message: impl Into<String>, error_type: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      error_type: error_type.into(),
      raw: Value::Null,
    }
  }
}

impl From<BackendError> for DispatchError {
  fn from(error: BackendError) -> Self {
    Self {
      message: error.to_string(),
      error_type: error.error_type(),
      raw: error.raw(),
    }
  }
}

/// Result of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
  Value(Value),
  Error(DispatchError),
  /// The field's cancellation token fired while the call was in flight.
  Cancelled,
}
