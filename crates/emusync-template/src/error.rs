use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error type reported for template failures that are not author-raised.
pub const MAPPING_TEMPLATE_ERROR_TYPE: &str = "MappingTemplate";

/// A template that could not be parsed or could not finish evaluating.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemplateError {
  #[error("template syntax error at line {line}, column {column}: {message}")]
  Compile {
    line: usize,
    column: usize,
    message: String,
  },

  #[error("template evaluation failed: {message}")]
  Runtime { message: String },
}

impl TemplateError {
  pub fn runtime(message: impl Into<String>) -> Self {
    TemplateError::Runtime {
      message: message.into(),
    }
  }

  pub fn error_type(&self) -> &'static str {
    MAPPING_TEMPLATE_ERROR_TYPE
  }
}

/// An error raised by the template author through `$util.error`,
/// `$util.appendError`, `$util.unauthorized` or `$util.validate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaisedError {
  pub message: String,
  pub error_type: Option<String>,
  #[serde(default)]
  pub data: Value,
  #[serde(default)]
  pub error_info: Value,
}

impl RaisedError {
  pub fn new(message: impl Into<String>, error_type: Option<String>) -> Self {
    Self {
      message: message.into(),
      error_type,
      data: Value::Null,
      error_info: Value::Null,
    }
  }
}
