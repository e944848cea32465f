/// Error type for relational data source calls.
#[derive(Debug, thiserror::Error)]
pub enum SqlError {
  /// The prepared request does not have the expected shape.
  #[error("invalid request: {message}")]
  InvalidRequest { message: String },

  /// A statement referenced a `:name` with no entry in `variableMap`.
  #[error("no value for variable :{name}")]
  MissingVariable { name: String },

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),
}

impl SqlError {
  /// Error type reported to the GraphQL client.
  pub fn error_type(&self) -> &'static str {
    "RDS:Error"
  }
}
