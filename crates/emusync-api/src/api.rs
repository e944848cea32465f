use std::collections::HashMap;
use std::sync::Arc;

use crate::data_source::DataSourceRegistry;
use crate::error::ApiError;
use crate::resolver::ResolverDefinition;

/// `(parent type, field)` pair a resolver is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldKey {
  pub type_name: String,
  pub field_name: String,
}

impl FieldKey {
  pub fn new(type_name: impl Into<String>, field_name: impl Into<String>) -> Self {
    Self {
      type_name: type_name.into(),
      field_name: field_name.into(),
    }
  }
}

/// A bound API ready for execution.
#[derive(Debug, Clone)]
pub struct Api {
  pub name: String,
  pub default_timeout_ms: Option<u64>,
  pub data_sources: DataSourceRegistry,
  resolvers: HashMap<FieldKey, Arc<ResolverDefinition>>,
}

impl Api {
  pub fn new(name: impl Into<String>, data_sources: DataSourceRegistry) -> Self {
    Self {
      name: name.into(),
      default_timeout_ms: None,
      data_sources,
      resolvers: HashMap::new(),
    }
  }

  pub fn add_resolver(&mut self, resolver: ResolverDefinition) -> Result<(), ApiError> {
    let key = FieldKey::new(&resolver.type_name, &resolver.field_name);
    if self.resolvers.contains_key(&key) {
      return Err(ApiError::DuplicateResolver {
        type_name: key.type_name,
        field_name: key.field_name,
      });
    }
    self.resolvers.insert(key, Arc::new(resolver));
    Ok(())
  }

  /// Get the resolver attached to `type_name.field_name`.
  pub fn resolver(&self, type_name: &str, field_name: &str) -> Option<Arc<ResolverDefinition>> {
    self
      .resolvers
      .get(&FieldKey::new(type_name, field_name))
      .cloned()
  }

  pub fn resolvers(&self) -> impl Iterator<Item = &Arc<ResolverDefinition>> {
    self.resolvers.values()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resolver::FunctionUnit;

  #[test]
  fn test_resolver_lookup() {
    let mut api = Api::new("test", DataSourceRegistry::new());
    api
      .add_resolver(ResolverDefinition::unit(
        "Query",
        "getPost",
        FunctionUnit::new("Query.getPost", "posts"),
      ))
      .unwrap();

    assert!(api.resolver("Query", "getPost").is_some());
    assert!(api.resolver("Query", "listPosts").is_none());
    assert!(api.resolver("Mutation", "getPost").is_none());
  }

  #[test]
  fn test_duplicate_resolver_is_rejected() {
    let mut api = Api::new("test", DataSourceRegistry::new());
    let def = ResolverDefinition::unit("Query", "getPost", FunctionUnit::new("a", "posts"));
    api.add_resolver(def.clone()).unwrap();

    assert!(matches!(
      api.add_resolver(def),
      Err(ApiError::DuplicateResolver { .. })
    ));
  }
}
