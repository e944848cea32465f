use serde::{Deserialize, Serialize};

use crate::template::TemplateSource;

/// A named pipeline function: one data source call framed by its own
/// request and response templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDef {
  pub name: String,
  pub data_source: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub request: Option<TemplateSource>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub response: Option<TemplateSource>,
}

/// A resolver attached to `type.field`.
///
/// For `UNIT` resolvers `request`/`response` frame the single data source call.
/// For `PIPELINE` resolvers they are the before/after templates around the
/// listed functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverDef {
  #[serde(rename = "type")]
  pub type_name: String,
  pub field: String,
  #[serde(default)]
  pub kind: ResolverKindDef,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data_source: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub functions: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub request: Option<TemplateSource>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub response: Option<TemplateSource>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolverKindDef {
  #[default]
  Unit,
  Pipeline,
}
