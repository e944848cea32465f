use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use emusync_config::{
  DataSourceDef, DataSourceKindDef, FunctionSourceConfig, HttpSourceConfig, KvTableConfig,
  RelationalSourceConfig, SearchSourceConfig,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Backend configuration of a bound data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSourceConfig {
  Function(FunctionSourceConfig),
  KvTable(KvTableConfig),
  Http(HttpSourceConfig),
  Relational(RelationalSourceConfig),
  Search(SearchSourceConfig),
  None,
}

impl DataSourceConfig {
  pub fn kind(&self) -> DataSourceKind {
    match self {
      DataSourceConfig::Function(_) => DataSourceKind::Function,
      DataSourceConfig::KvTable(_) => DataSourceKind::KvTable,
      DataSourceConfig::Http(_) => DataSourceKind::Http,
      DataSourceConfig::Relational(_) => DataSourceKind::Relational,
      DataSourceConfig::Search(_) => DataSourceKind::Search,
      DataSourceConfig::None => DataSourceKind::None,
    }
  }
}

impl From<DataSourceKindDef> for DataSourceConfig {
  fn from(def: DataSourceKindDef) -> Self {
    match def {
      DataSourceKindDef::Function { config } => DataSourceConfig::Function(config),
      DataSourceKindDef::KvTable { config } => DataSourceConfig::KvTable(config),
      DataSourceKindDef::Http { config } => DataSourceConfig::Http(config),
      DataSourceKindDef::Relational { config } => DataSourceConfig::Relational(config),
      DataSourceKindDef::Search { config } => DataSourceConfig::Search(config),
      DataSourceKindDef::None => DataSourceConfig::None,
    }
  }
}

/// Discriminant used to route a data source to its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceKind {
  Function,
  KvTable,
  Http,
  Relational,
  Search,
  None,
}

impl fmt::Display for DataSourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      DataSourceKind::Function => "function",
      DataSourceKind::KvTable => "kv_table",
      DataSourceKind::Http => "http",
      DataSourceKind::Relational => "relational",
      DataSourceKind::Search => "search",
      DataSourceKind::None => "none",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceRef {
  pub name: String,
  pub timeout_ms: Option<u64>,
  pub config: DataSourceConfig,
}

impl DataSourceRef {
  pub fn new(name: impl Into<String>, config: DataSourceConfig) -> Self {
    Self {
      name: name.into(),
      timeout_ms: None,
      config,
    }
  }

  pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
    self.timeout_ms = Some(timeout_ms);
    self
  }

  pub fn kind(&self) -> DataSourceKind {
    self.config.kind()
  }
}

impl From<DataSourceDef> for DataSourceRef {
  fn from(def: DataSourceDef) -> Self {
    Self {
      name: def.name,
      timeout_ms: def.timeout_ms,
      config: def.kind.into(),
    }
  }
}

/// Name to data source lookup. Read-only once the API is bound.
#[derive(Debug, Clone, Default)]
pub struct DataSourceRegistry {
  sources: HashMap<String, Arc<DataSourceRef>>,
}

impl DataSourceRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, source: DataSourceRef) -> Result<(), ApiError> {
    if self.sources.contains_key(&source.name) {
      return Err(ApiError::DuplicateDataSource(source.name));
    }
    self.sources.insert(source.name.clone(), Arc::new(source));
    Ok(())
  }

  pub fn get(&self, name: &str) -> Option<Arc<DataSourceRef>> {
    self.sources.get(name).cloned()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.sources.contains_key(name)
  }

  pub fn len(&self) -> usize {
    self.sources.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sources.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Arc<DataSourceRef>> {
    self.sources.values()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_registry_rejects_duplicates() {
    let mut registry = DataSourceRegistry::new();
    registry
      .insert(DataSourceRef::new("local", DataSourceConfig::None))
      .unwrap();

    let err = registry
      .insert(DataSourceRef::new("local", DataSourceConfig::None))
      .unwrap_err();
    assert!(matches!(err, ApiError::DuplicateDataSource(name) if name == "local"));
    assert_eq!(registry.len(), 1);
  }

  #[test]
  fn test_from_config_def() {
    let def: DataSourceDef = serde_json::from_str(
      r#"{ "name": "posts", "type": "AMAZON_DYNAMODB", "timeoutMs": 50, "config": { "tableName": "posts" } }"#,
    )
    .unwrap();

    let source = DataSourceRef::from(def);
    assert_eq!(source.kind(), DataSourceKind::KvTable);
    assert_eq!(source.timeout_ms, Some(50));
  }
}
