use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::auth::AuthType;
use crate::request::{FieldInfo, FieldRequest};

/// Error visible to templates as `$ctx.error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextError {
  pub message: String,
  #[serde(rename = "type")]
  pub error_type: Option<String>,
}

impl ContextError {
  pub fn new(message: impl Into<String>, error_type: Option<String>) -> Self {
    Self {
      message: message.into(),
      error_type,
    }
  }
}

/// Mutable state of one field resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationContext {
  pub arguments: Value,
  pub identity: Value,
  pub source: Value,
  /// Result of the current stage (dispatch result during response mapping).
  pub result: Value,
  /// Output of the previous stage, `$ctx.prev.result`.
  pub prev: Value,
  pub stash: Map<String, Value>,
  pub error: Option<ContextError>,
  pub info: FieldInfo,
  pub request_headers: HashMap<String, String>,
  pub auth_type: AuthType,
}

impl InvocationContext {
  pub fn new(request: FieldRequest) -> Self {
    Self {
      arguments: request.arguments,
      identity: request.identity,
      source: request.source,
      result: Value::Null,
      prev: Value::Null,
      stash: Map::new(),
      error: None,
      info: request.info,
      request_headers: request.request_headers,
      auth_type: request.auth_type,
    }
  }

  /// Reset per-stage state before a stage's request mapping runs.
  pub fn begin_stage(&mut self) {
    self.error = None;
    self.result = Value::Null;
  }

  /// Record the output of a finished stage; it becomes the next stage's `prev`.
  pub fn complete_stage(&mut self, output: Value) {
    self.error = None;
    self.prev = output.clone();
    self.result = output;
  }

  pub fn set_error(&mut self, error: ContextError) {
    self.error = Some(error);
  }

  /// JSON view of the context handed to the template evaluator.
  ///
  /// `error` is only present when set so that `#if($ctx.error)` is falsy
  /// on the happy path.
  pub fn to_template_value(&self) -> Value {
    let mut root = Map::new();
    root.insert("arguments".to_string(), self.arguments.clone());
    root.insert("identity".to_string(), self.identity.clone());
    root.insert("source".to_string(), self.source.clone());
    root.insert("result".to_string(), self.result.clone());
    root.insert("prev".to_string(), json!({ "result": self.prev }));
    root.insert("stash".to_string(), Value::Object(self.stash.clone()));
    if let Some(error) = &self.error {
      root.insert(
        "error".to_string(),
        json!({ "message": error.message, "type": error.error_type }),
      );
    }
    root.insert(
      "info".to_string(),
      json!({
        "fieldName": self.info.field_name,
        "parentTypeName": self.info.parent_type_name,
        "variables": self.info.variables,
        "selectionSetList": self.info.selection_set_list,
      }),
    );
    root.insert(
      "request".to_string(),
      json!({ "headers": self.request_headers }),
    );
    Value::Object(root)
  }
}
