/// Error type for HTTP data source calls.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
  /// The prepared request does not have the expected shape.
  #[error("invalid {field}: {message}")]
  InvalidRequest { field: String, message: String },

  /// The endpoint plus resource path is not a valid URL.
  #[error("invalid url '{url}': {source}")]
  InvalidUrl {
    url: String,
    #[source]
    source: url::ParseError,
  },

  /// The request could not be sent or the response could not be read.
  #[error("request failed: {0}")]
  Request(#[from] reqwest::Error),

  /// A search response body was not JSON.
  #[error("invalid response body: {message}")]
  InvalidResponse { message: String },
}

impl HttpError {
  /// Error type reported to the GraphQL client.
  pub fn error_type(&self) -> &'static str {
    match self {
      HttpError::InvalidRequest { .. } | HttpError::InvalidUrl { .. } => "HTTP:InvalidRequest",
      HttpError::Request(_) => "HTTP:RequestFailed",
      HttpError::InvalidResponse { .. } => "HTTP:InvalidResponse",
    }
  }
}
