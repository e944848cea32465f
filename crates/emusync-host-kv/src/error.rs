/// Error type for key-value table operations.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
  /// The request is malformed or references missing expression names/values.
  #[error("{message}")]
  Validation { message: String },

  /// A condition expression evaluated to false.
  #[error("The conditional request failed")]
  ConditionalCheckFailed,

  /// The request named an operation this backend does not implement.
  #[error("Unknown operation name: {operation}")]
  UnknownOperation { operation: String },
}

impl KvError {
  pub fn validation(message: impl Into<String>) -> Self {
    KvError::Validation {
      message: message.into(),
    }
  }

  /// Error type reported to the GraphQL client.
  pub fn error_type(&self) -> &'static str {
    match self {
      KvError::ConditionalCheckFailed => "DynamoDB:ConditionalCheckFailedException",
      KvError::Validation { .. } | KvError::UnknownOperation { .. } => {
        "DynamoDB:ValidationException"
      }
    }
  }
}
