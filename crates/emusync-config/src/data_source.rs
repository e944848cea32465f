use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceDef {
  pub name: String,
  /// Per-source dispatch timeout. Falls back to the API default.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
  #[serde(flatten)]
  pub kind: DataSourceKindDef,
}

/// Data source kind, tagged with the AppSync type names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DataSourceKindDef {
  #[serde(rename = "AWS_LAMBDA")]
  Function { config: FunctionSourceConfig },
  #[serde(rename = "AMAZON_DYNAMODB")]
  KvTable { config: KvTableConfig },
  #[serde(rename = "HTTP")]
  Http { config: HttpSourceConfig },
  #[serde(rename = "RELATIONAL_DATABASE")]
  Relational { config: RelationalSourceConfig },
  #[serde(rename = "AMAZON_ELASTICSEARCH")]
  Search { config: SearchSourceConfig },
  #[serde(rename = "NONE")]
  None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSourceConfig {
  /// Name reported to the handler as `AWS_LAMBDA_FUNCTION_NAME`.
  pub function_name: String,
  #[serde(flatten)]
  pub target: FunctionTarget,
}

/// How a function data source is executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "runtime", rename_all = "snake_case")]
pub enum FunctionTarget {
  /// Spawn a process per invocation. The event is written to stdin and the
  /// result is read back from stdout.
  Process {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cwd: Option<String>,
    #[serde(default)]
    env: HashMap<String, String>,
  },
  /// Call a handler registered in-process under this name.
  Registered { handler: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvTableConfig {
  pub table_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpSourceConfig {
  /// Base URL; the request's `resourcePath` is appended to it.
  pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationalSourceConfig {
  /// sqlx connection URL, e.g. `sqlite::memory:` or `sqlite://data.db`.
  pub database_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSourceConfig {
  pub endpoint: String,
}
