use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::AuthType;

/// One element of a GraphQL response path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
  Index(usize),
  Field(String),
}

/// Field metadata exposed to templates as `$ctx.info`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldInfo {
  pub parent_type_name: String,
  pub field_name: String,
  #[serde(default)]
  pub variables: Map<String, Value>,
  #[serde(default)]
  pub selection_set_list: Vec<String>,
  /// Response path of the field; defaults to `[field_name]` when empty.
  #[serde(default)]
  pub path: Vec<PathSegment>,
}

impl FieldInfo {
  pub fn response_path(&self) -> Vec<PathSegment> {
    if self.path.is_empty() {
      vec![PathSegment::Field(self.field_name.clone())]
    } else {
      self.path.clone()
    }
  }
}

/// Everything the execution layer supplies to resolve one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRequest {
  #[serde(default = "empty_object")]
  pub arguments: Value,
  #[serde(default)]
  pub source: Value,
  #[serde(default)]
  pub identity: Value,
  #[serde(default)]
  pub request_headers: HashMap<String, String>,
  #[serde(default)]
  pub auth_type: AuthType,
  #[serde(default)]
  pub info: FieldInfo,
}

fn empty_object() -> Value {
  Value::Object(Map::new())
}

impl FieldRequest {
  pub fn new(parent_type_name: impl Into<String>, field_name: impl Into<String>) -> Self {
    Self {
      arguments: empty_object(),
      source: Value::Null,
      identity: Value::Null,
      request_headers: HashMap::new(),
      auth_type: AuthType::default(),
      info: FieldInfo {
        parent_type_name: parent_type_name.into(),
        field_name: field_name.into(),
        ..FieldInfo::default()
      },
    }
  }

  pub fn with_arguments(mut self, arguments: Value) -> Self {
    self.arguments = arguments;
    self
  }

  pub fn with_source(mut self, source: Value) -> Self {
    self.source = source;
    self
  }

  pub fn with_identity(mut self, identity: Value) -> Self {
    self.identity = identity;
    self
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.request_headers.insert(name.into(), value.into());
    self
  }

  pub fn with_auth_type(mut self, auth_type: AuthType) -> Self {
    self.auth_type = auth_type;
    self
  }

  pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
    self.info.path = path;
    self
  }
}
