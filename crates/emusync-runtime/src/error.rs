//! Runtime error types.

/// Errors that stop a resolution from producing an [`InvocationResult`].
///
/// Template and data source failures are not errors at this level; they
/// are folded into the result's `errors`.
///
/// [`InvocationResult`]: crate::InvocationResult
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
  /// Resolution was cancelled.
  #[error("resolution cancelled")]
  Cancelled,

  /// The API has no resolver for the requested field.
  #[error("no resolver for {type_name}.{field_name}")]
  ResolverNotFound {
    type_name: String,
    field_name: String,
  },

  /// A concurrently resolved field panicked or was aborted.
  #[error("field task failed: {message}")]
  Join { message: String },
}
