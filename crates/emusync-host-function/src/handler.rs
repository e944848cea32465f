use std::future::Future;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Invocation metadata handed to a function alongside its event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LambdaContext {
  pub function_name: String,
  pub request_id: String,
  /// Unix epoch milliseconds after which the invocation is abandoned.
  pub deadline_ms: i64,
}

/// Error returned by an in-process handler.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerError {
  pub message: String,
  /// Reported to the client as `errorType`. `None` means `Lambda:Unhandled`.
  pub error_type: Option<String>,
}

impl HandlerError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      error_type: None,
    }
  }

  pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
    self.error_type = Some(error_type.into());
    self
  }
}

impl From<&str> for HandlerError {
  fn from(message: &str) -> Self {
    HandlerError::new(message)
  }
}

impl From<String> for HandlerError {
  fn from(message: String) -> Self {
    HandlerError::new(message)
  }
}

/// A function implemented in the emulator's own process.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
  async fn invoke(&self, event: Value, context: LambdaContext) -> Result<Value, HandlerError>;
}

#[async_trait]
impl<F, Fut> FunctionHandler for F
where
  F: Fn(Value, LambdaContext) -> Fut + Send + Sync,
  Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
  async fn invoke(&self, event: Value, context: LambdaContext) -> Result<Value, HandlerError> {
    self(event, context).await
  }
}
