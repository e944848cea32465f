use std::sync::Arc;

use async_trait::async_trait;
use emusync_api::{DataSourceConfig, DataSourceRef};
use emusync_host_function::FunctionInvoker;
use emusync_host_http::HttpBackend;
use emusync_host_kv::{InMemoryTables, KvBackend};
use emusync_host_sql::SqlBackend;
use serde_json::Value;

use crate::error::BackendError;

/// One data source kind's implementation.
#[async_trait]
pub trait DataSourceBackend: Send + Sync {
  async fn call(&self, source: &DataSourceRef, request: &Value) -> Result<Value, BackendError>;
}

fn unsupported(backend: &'static str, source: &DataSourceRef) -> BackendError {
  BackendError::Unsupported {
    backend,
    kind: source.kind(),
    name: source.name.clone(),
  }
}

/// The payload of an `Invoke`/`BatchInvoke` envelope, or the whole request.
fn payload_of(request: &Value) -> Value {
  let is_invoke = matches!(
    request.get("operation").and_then(Value::as_str),
    Some("Invoke" | "BatchInvoke")
  );
  match request.get("payload") {
    Some(payload) if is_invoke => payload.clone(),
    _ => request.clone(),
  }
}

/// Function data sources.
#[derive(Debug, Clone, Default)]
pub struct FunctionBackend {
  invoker: FunctionInvoker,
}

impl FunctionBackend {
  pub fn new(invoker: FunctionInvoker) -> Self {
    Self { invoker }
  }
}

#[async_trait]
impl DataSourceBackend for FunctionBackend {
  async fn call(&self, source: &DataSourceRef, request: &Value) -> Result<Value, BackendError> {
    let DataSourceConfig::Function(config) = &source.config else {
      return Err(unsupported("function", source));
    };
    let timeout_ms = source
      .timeout_ms
      .unwrap_or(crate::dispatcher::DEFAULT_TIMEOUT.as_millis() as u64);
    Ok(
      self
        .invoker
        .invoke(config, payload_of(request), timeout_ms)
        .await?,
    )
  }
}

/// Key-value table data sources.
#[derive(Clone)]
pub struct KvTableBackend {
  tables: Arc<dyn KvBackend>,
}

impl KvTableBackend {
  pub fn new(tables: impl KvBackend + 'static) -> Self {
    Self {
      tables: Arc::new(tables),
    }
  }
}

impl Default for KvTableBackend {
  fn default() -> Self {
    Self::new(InMemoryTables::new())
  }
}

#[async_trait]
impl DataSourceBackend for KvTableBackend {
  async fn call(&self, source: &DataSourceRef, request: &Value) -> Result<Value, BackendError> {
    let DataSourceConfig::KvTable(config) = &source.config else {
      return Err(unsupported("kv_table", source));
    };
    Ok(self.tables.execute(&config.table_name, request).await?)
  }
}

/// HTTP and search data sources.
#[derive(Debug, Clone, Default)]
pub struct HttpSourceBackend {
  http: HttpBackend,
}

impl HttpSourceBackend {
  pub fn new(http: HttpBackend) -> Self {
    Self { http }
  }
}

#[async_trait]
impl DataSourceBackend for HttpSourceBackend {
  async fn call(&self, source: &DataSourceRef, request: &Value) -> Result<Value, BackendError> {
    match &source.config {
      DataSourceConfig::Http(config) => Ok(self.http.execute(&config.endpoint, request).await?),
      DataSourceConfig::Search(config) => Ok(self.http.search(&config.endpoint, request).await?),
      _ => Err(unsupported("http", source)),
    }
  }
}

/// Relational data sources.
#[derive(Debug, Clone, Default)]
pub struct RelationalBackend {
  sql: SqlBackend,
}

#[async_trait]
impl DataSourceBackend for RelationalBackend {
  async fn call(&self, source: &DataSourceRef, request: &Value) -> Result<Value, BackendError> {
    let DataSourceConfig::Relational(config) = &source.config else {
      return Err(unsupported("relational", source));
    };
    Ok(self.sql.execute(&config.database_url, request).await?)
  }
}

/// `NONE` data sources: the result is the request's payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneBackend;

#[async_trait]
impl DataSourceBackend for NoneBackend {
  async fn call(&self, _source: &DataSourceRef, request: &Value) -> Result<Value, BackendError> {
    Ok(request.get("payload").cloned().unwrap_or_else(|| request.clone()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use emusync_config::KvTableConfig;
  use serde_json::json;

  #[test]
  fn test_payload_of_invoke_envelope() {
    assert_eq!(
      payload_of(&json!({ "operation": "Invoke", "payload": { "id": 1 } })),
      json!({ "id": 1 })
    );
    assert_eq!(
      payload_of(&json!({ "operation": "Other", "payload": 1 })),
      json!({ "operation": "Other", "payload": 1 })
    );
    assert_eq!(payload_of(&json!({ "a": 1 })), json!({ "a": 1 }));
  }

  #[tokio::test]
  async fn test_none_backend_echoes_payload() {
    let source = DataSourceRef::new("local", DataSourceConfig::None);
    let backend = NoneBackend;

    assert_eq!(
      backend
        .call(&source, &json!({ "version": "2017-02-28", "payload": { "x": 1 } }))
        .await
        .unwrap(),
      json!({ "x": 1 })
    );
    assert_eq!(
      backend.call(&source, &json!({ "x": 2 })).await.unwrap(),
      json!({ "x": 2 })
    );
  }

  #[tokio::test]
  async fn test_kv_backend_uses_configured_table() {
    let tables = InMemoryTables::new();
    let backend = KvTableBackend::new(tables.clone());
    let source = DataSourceRef::new(
      "posts",
      DataSourceConfig::KvTable(KvTableConfig {
        table_name: "posts-table".to_string(),
      }),
    );

    backend
      .call(
        &source,
        &json!({ "operation": "PutItem", "key": { "id": { "S": "1" } }, "attributeValues": {} }),
      )
      .await
      .unwrap();

    assert_eq!(tables.len("posts-table").await, 1);
  }

  #[tokio::test]
  async fn test_mismatched_kind_is_unsupported() {
    let source = DataSourceRef::new("local", DataSourceConfig::None);
    let err = RelationalBackend::default()
      .call(&source, &json!({}))
      .await
      .unwrap_err();
    assert!(matches!(err, BackendError::Unsupported { .. }));
  }
}
