use serde::{Deserialize, Serialize};

use crate::data_source::DataSourceDef;
use crate::error::ConfigError;
use crate::resolver::{FunctionDef, ResolverDef};

pub const DEFAULT_MAPPING_TEMPLATES_LOCATION: &str = "mapping-templates";

/// Top-level API definition as written in the JSON config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDef {
  pub name: String,
  /// Directory (relative to the definition file) holding template files.
  #[serde(default = "default_mapping_templates_location")]
  pub mapping_templates_location: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub default_timeout_ms: Option<u64>,
  #[serde(default)]
  pub data_sources: Vec<DataSourceDef>,
  #[serde(default)]
  pub functions: Vec<FunctionDef>,
  #[serde(default)]
  pub resolvers: Vec<ResolverDef>,
}

fn default_mapping_templates_location() -> String {
  DEFAULT_MAPPING_TEMPLATES_LOCATION.to_string()
}

impl ApiDef {
  /// Parse an API definition from JSON text.
  pub fn from_json(text: &str) -> Result<Self, ConfigError> {
    serde_json::from_str(text).map_err(|source| ConfigError::Parse { source })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::data_source::{DataSourceKindDef, FunctionTarget};
  use crate::resolver::ResolverKindDef;
  use crate::template::TemplateSource;

  #[test]
  fn test_parse_full_definition() {
    let json = r#"{
      "name": "blog",
      "defaultTimeoutMs": 5000,
      "dataSources": [
        {
          "name": "posts",
          "type": "AMAZON_DYNAMODB",
          "config": { "tableName": "posts" }
        },
        {
          "name": "composer",
          "type": "AWS_LAMBDA",
          "timeoutMs": 1000,
          "config": {
            "functionName": "composer",
            "runtime": "process",
            "command": "sam",
            "args": ["local", "invoke", "composer"]
          }
        },
        { "name": "local", "type": "NONE" }
      ],
      "functions": [
        { "name": "loadPost", "dataSource": "posts", "request": "loadPost.request.vtl" }
      ],
      "resolvers": [
        {
          "type": "Query",
          "field": "getPost",
          "dataSource": "posts",
          "request": { "inline": "{}" }
        },
        {
          "type": "Mutation",
          "field": "publish",
          "kind": "PIPELINE",
          "functions": ["loadPost"]
        }
      ]
    }"#;

    let api = ApiDef::from_json(json).unwrap();

    assert_eq!(api.name, "blog");
    assert_eq!(api.mapping_templates_location, "mapping-templates");
    assert_eq!(api.default_timeout_ms, Some(5000));
    assert_eq!(api.data_sources.len(), 3);

    match &api.data_sources[1].kind {
      DataSourceKindDef::Function { config } => {
        assert_eq!(config.function_name, "composer");
        match &config.target {
          FunctionTarget::Process { command, args, .. } => {
            assert_eq!(command, "sam");
            assert_eq!(args.len(), 3);
          }
          other => panic!("expected process target, got {:?}", other),
        }
      }
      other => panic!("expected function source, got {:?}", other),
    }
    assert_eq!(api.data_sources[1].timeout_ms, Some(1000));
    assert_eq!(api.data_sources[2].kind, DataSourceKindDef::None);

    assert_eq!(api.resolvers[0].kind, ResolverKindDef::Unit);
    assert_eq!(
      api.resolvers[0].request,
      Some(TemplateSource::inline("{}"))
    );
    assert_eq!(api.resolvers[1].kind, ResolverKindDef::Pipeline);
    assert_eq!(api.resolvers[1].functions, vec!["loadPost".to_string()]);
    assert_eq!(
      api.functions[0].request,
      Some(TemplateSource::file("loadPost.request.vtl"))
    );
  }

  #[test]
  fn test_registered_function_target() {
    let json = r#"{
      "name": "fn",
      "type": "AWS_LAMBDA",
      "config": { "functionName": "echo", "runtime": "registered", "handler": "echo" }
    }"#;

    let def: DataSourceDef = serde_json::from_str(json).unwrap();
    match def.kind {
      DataSourceKindDef::Function { config } => {
        assert_eq!(
          config.target,
          FunctionTarget::Registered {
            handler: "echo".to_string()
          }
        );
      }
      other => panic!("expected function source, got {:?}", other),
    }
  }

  #[test]
  fn test_unknown_source_type_is_rejected() {
    let json = r#"{ "name": "x", "dataSources": [{ "name": "a", "type": "AMAZON_S3" }] }"#;
    assert!(matches!(
      ApiDef::from_json(json),
      Err(ConfigError::Parse { .. })
    ));
  }
}
