use serde::{Deserialize, Serialize};

/// One request-template / data-source / response-template triple.
///
/// A unit resolver is a single `FunctionUnit`; a pipeline resolver runs an
/// ordered list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionUnit {
  pub name: String,
  pub data_source: String,
  pub request: Option<String>,
  pub response: Option<String>,
}

impl FunctionUnit {
  pub fn new(name: impl Into<String>, data_source: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      data_source: data_source.into(),
      request: None,
      response: None,
    }
  }

  pub fn with_request(mut self, template: impl Into<String>) -> Self {
    self.request = Some(template.into());
    self
  }

  pub fn with_response(mut self, template: impl Into<String>) -> Self {
    self.response = Some(template.into());
    self
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolverKind {
  Unit(FunctionUnit),
  Pipeline {
    before: Option<String>,
    functions: Vec<FunctionUnit>,
    after: Option<String>,
  },
}

/// A bound resolver for one `type.field`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverDefinition {
  pub type_name: String,
  pub field_name: String,
  pub kind: ResolverKind,
}

impl ResolverDefinition {
  pub fn unit(
    type_name: impl Into<String>,
    field_name: impl Into<String>,
    function: FunctionUnit,
  ) -> Self {
    Self {
      type_name: type_name.into(),
      field_name: field_name.into(),
      kind: ResolverKind::Unit(function),
    }
  }

  pub fn pipeline(
    type_name: impl Into<String>,
    field_name: impl Into<String>,
    before: Option<String>,
    functions: Vec<FunctionUnit>,
    after: Option<String>,
  ) -> Self {
    Self {
      type_name: type_name.into(),
      field_name: field_name.into(),
      kind: ResolverKind::Pipeline {
        before,
        functions,
        after,
      },
    }
  }

  /// Stages in execution order. A unit resolver has exactly one.
  pub fn stages(&self) -> &[FunctionUnit] {
    match &self.kind {
      ResolverKind::Unit(function) => std::slice::from_ref(function),
      ResolverKind::Pipeline { functions, .. } => functions,
    }
  }

  pub fn before_template(&self) -> Option<&str> {
    match &self.kind {
      ResolverKind::Unit(_) => None,
      ResolverKind::Pipeline { before, .. } => before.as_deref(),
    }
  }

  pub fn after_template(&self) -> Option<&str> {
    match &self.kind {
      ResolverKind::Unit(_) => None,
      ResolverKind::Pipeline { after, .. } => after.as_deref(),
    }
  }

  pub fn is_pipeline(&self) -> bool {
    matches!(self.kind, ResolverKind::Pipeline { .. })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_unit_has_single_stage() {
    let def = ResolverDefinition::unit(
      "Query",
      "getPost",
      FunctionUnit::new("Query.getPost", "posts").with_request("{}"),
    );

    assert_eq!(def.stages().len(), 1);
    assert_eq!(def.stages()[0].data_source, "posts");
    assert_eq!(def.before_template(), None);
    assert!(!def.is_pipeline());
  }

  #[test]
  fn test_pipeline_stages_keep_order() {
    let def = ResolverDefinition::pipeline(
      "Mutation",
      "publish",
      Some("{}".to_string()),
      vec![FunctionUnit::new("a", "one"), FunctionUnit::new("b", "two")],
      None,
    );

    let names: Vec<_> = def.stages().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(def.before_template(), Some("{}"));
    assert_eq!(def.after_template(), None);
  }
}
