use emusync_api::DataSourceKind;
use emusync_host_function::FunctionError;
use emusync_host_http::HttpError;
use emusync_host_kv::KvError;
use emusync_host_sql::SqlError;
use serde_json::{Value, json};

/// Failure of a backend call.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
  #[error(transparent)]
  Function(#[from] FunctionError),

  #[error(transparent)]
  KvTable(#[from] KvError),

  #[error(transparent)]
  Http(#[from] HttpError),

  #[error(transparent)]
  Sql(#[from] SqlError),

  /// The backend registered for a kind was handed a source of another kind.
  #[error("{backend} backend cannot serve {kind} data source '{name}'")]
  Unsupported {
    backend: &'static str,
    kind: DataSourceKind,
    name: String,
  },
}

impl BackendError {
  /// Error type reported to the GraphQL client.
  pub fn error_type(&self) -> String {
    match self {
      BackendError::Function(e) => e.error_type().to_string(),
      BackendError::KvTable(e) => e.error_type().to_string(),
      BackendError::Http(e) => e.error_type().to_string(),
      BackendError::Sql(e) => e.error_type().to_string(),
      BackendError::Unsupported { .. } => "DataSourceMisconfigured".to_string(),
    }
  }

  /// Backend-specific detail of the failure.
  pub fn raw(&self) -> Value {
    match self {
      BackendError::Function(e) => e.raw(),
      other => json!({ "message": other.to_string(), "errorType": other.error_type() }),
    }
  }
}
