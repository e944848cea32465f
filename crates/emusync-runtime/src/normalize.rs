//! Turns pipeline outcomes into AppSync-shaped results.

use emusync_context::PathSegment;
use emusync_template::RaisedError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pipeline::{PipelineOutcome, StageError};

/// Position in the GraphQL document an error refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLocation {
  pub line: usize,
  pub column: usize,
}

/// One entry of a response's `errors` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLError {
  pub message: String,
  pub error_type: Option<String>,
  pub path: Vec<PathSegment>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error_info: Option<Value>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub locations: Vec<ErrorLocation>,
}

impl GraphQLError {
  fn raised(error: &RaisedError, path: &[PathSegment]) -> Self {
    Self {
      message: error.message.clone(),
      error_type: error.error_type.clone(),
      path: path.to_vec(),
      data: non_null(&error.data),
      error_info: non_null(&error.error_info),
      locations: Vec::new(),
    }
  }

  fn stage(error: &StageError, path: &[PathSegment]) -> Self {
    match error.root_cause() {
      StageError::Raised(raised) => Self::raised(raised, path),
      other => Self {
        message: other.message(),
        error_type: other.error_type(),
        path: path.to_vec(),
        data: None,
        error_info: None,
        locations: Vec::new(),
      },
    }
  }
}

fn non_null(value: &Value) -> Option<Value> {
  match value {
    Value::Null => None,
    other => Some(other.clone()),
  }
}

/// Final value of a field resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
  pub data: Value,
  #[serde(default)]
  pub errors: Vec<GraphQLError>,
}

impl InvocationResult {
  pub fn is_ok(&self) -> bool {
    self.errors.is_empty()
  }

  /// The field value and its most significant error (the aborting one when
  /// the pipeline aborted), for execution layers that take one error per field.
  pub fn to_field_pair(&self) -> (Value, Option<GraphQLError>) {
    (self.data.clone(), self.errors.last().cloned())
  }

  pub fn into_field_pair(mut self) -> (Value, Option<GraphQLError>) {
    let error = self.errors.pop();
    (self.data, error)
  }
}

/// Map a pipeline outcome to `data` and `errors` for the field at `path`.
///
/// Appended errors keep their order and precede the aborting error.
pub fn normalize(outcome: PipelineOutcome, path: &[PathSegment]) -> InvocationResult {
  match outcome {
    PipelineOutcome::Completed {
      value,
      appended_errors,
    } => InvocationResult {
      data: value,
      errors: appended_errors
        .iter()
        .map(|e| GraphQLError::raised(e, path))
        .collect(),
    },
    PipelineOutcome::Aborted {
      data,
      appended_errors,
      error,
    } => {
      let mut errors: Vec<GraphQLError> = appended_errors
        .iter()
        .map(|e| GraphQLError::raised(e, path))
        .collect();
      errors.push(GraphQLError::stage(&error, path));
      InvocationResult { data, errors }
    }
  }
}
