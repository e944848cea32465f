/// Errors raised while reading an API definition.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  /// The document is not a valid API definition.
  #[error("invalid api definition: {source}")]
  Parse {
    #[source]
    source: serde_json::Error,
  },
}
