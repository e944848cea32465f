use std::collections::HashMap;

use async_trait::async_trait;
use emusync_api::{Api, DataSourceRef, DataSourceRegistry, FunctionUnit, ResolverDefinition};
use emusync_config::{ApiDef, FunctionDef, ResolverDef, ResolverKindDef, TemplateSource};
use tracing::{debug, info, instrument};

use crate::error::BindError;
use crate::loader::TemplateLoader;

/// Binder transforms an ApiDef into a bound Api.
#[async_trait]
pub trait Binder: Send + Sync {
  /// Bind an API definition.
  ///
  /// This process:
  /// 1. Registers the data sources (names must be unique)
  /// 2. Loads every function's templates and checks its data source
  /// 3. Builds one resolver definition per `type.field`
  async fn bind(&self, def: ApiDef) -> Result<Api, BindError>;
}

/// Standard binder that reads templates through a [`TemplateLoader`].
pub struct StandardBinder<L: TemplateLoader> {
  loader: L,
}

impl<L: TemplateLoader> StandardBinder<L> {
  pub fn new(loader: L) -> Self {
    Self { loader }
  }

  async fn load(&self, source: Option<&TemplateSource>) -> Result<Option<String>, BindError> {
    match source {
      Some(source) => Ok(Some(self.loader.load(source).await?)),
      None => Ok(None),
    }
  }

  fn check_data_source(
    registry: &DataSourceRegistry,
    owner: &str,
    data_source: &str,
  ) -> Result<(), BindError> {
    if registry.contains(data_source) {
      Ok(())
    } else {
      Err(BindError::UnknownDataSource {
        owner: owner.to_string(),
        data_source: data_source.to_string(),
      })
    }
  }

  async fn bind_function(
    &self,
    registry: &DataSourceRegistry,
    def: &FunctionDef,
  ) -> Result<FunctionUnit, BindError> {
    Self::check_data_source(registry, &def.name, &def.data_source)?;
    Ok(FunctionUnit {
      name: def.name.clone(),
      data_source: def.data_source.clone(),
      request: self.load(def.request.as_ref()).await?,
      response: self.load(def.response.as_ref()).await?,
    })
  }

  async fn bind_resolver(
    &self,
    registry: &DataSourceRegistry,
    functions: &HashMap<String, FunctionUnit>,
    def: &ResolverDef,
  ) -> Result<ResolverDefinition, BindError> {
    let owner = format!("{}.{}", def.type_name, def.field);
    let request = self.load(def.request.as_ref()).await?;
    let response = self.load(def.response.as_ref()).await?;

    match def.kind {
      ResolverKindDef::Unit => {
        let data_source = def
          .data_source
          .as_deref()
          .ok_or_else(|| BindError::MissingDataSource {
            owner: owner.clone(),
          })?;
        Self::check_data_source(registry, &owner, data_source)?;
        let unit = FunctionUnit {
          name: owner,
          data_source: data_source.to_string(),
          request,
          response,
        };
        Ok(ResolverDefinition::unit(&def.type_name, &def.field, unit))
      }
      ResolverKindDef::Pipeline => {
        if def.functions.is_empty() {
          return Err(BindError::EmptyPipeline { owner });
        }
        let stages = def
          .functions
          .iter()
          .map(|name| {
            functions
              .get(name)
              .cloned()
              .ok_or_else(|| BindError::UnknownFunction {
                owner: owner.clone(),
                function: name.clone(),
              })
          })
          .collect::<Result<Vec<_>, _>>()?;
        Ok(ResolverDefinition::pipeline(
          &def.type_name,
          &def.field,
          request,
          stages,
          response,
        ))
      }
    }
  }
}

#[async_trait]
impl<L: TemplateLoader> Binder for StandardBinder<L> {
  #[instrument(name = "bind", skip(self, def), fields(api = %def.name))]
  async fn bind(&self, def: ApiDef) -> Result<Api, BindError> {
    let mut registry = DataSourceRegistry::new();
    for source in def.data_sources {
      registry.insert(DataSourceRef::from(source))?;
    }

    let mut functions = HashMap::new();
    for function in &def.functions {
      if functions.contains_key(&function.name) {
        return Err(BindError::DuplicateFunction {
          name: function.name.clone(),
        });
      }
      let unit = self.bind_function(&registry, function).await?;
      debug!(function = %unit.name, data_source = %unit.data_source, "function_bound");
      functions.insert(function.name.clone(), unit);
    }

    let mut resolvers = Vec::with_capacity(def.resolvers.len());
    for resolver in &def.resolvers {
      resolvers.push(self.bind_resolver(&registry, &functions, resolver).await?);
    }

    let mut api = Api::new(def.name, registry);
    api.default_timeout_ms = def.default_timeout_ms;
    for resolver in resolvers {
      api.add_resolver(resolver)?;
    }

    info!(
      data_sources = api.data_sources.len(),
      functions = functions.len(),
      "api_bound"
    );
    Ok(api)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use emusync_api::ResolverKind;

  struct InlineOnly;

  #[async_trait]
  impl TemplateLoader for InlineOnly {
    async fn load(&self, source: &TemplateSource) -> Result<String, BindError> {
      match source {
        TemplateSource::Inline { inline } => Ok(inline.clone()),
        TemplateSource::File(path) => Ok(format!("file:{}", path)),
      }
    }
  }

  fn def(json: &str) -> ApiDef {
    ApiDef::from_json(json).unwrap()
  }

  #[tokio::test]
  async fn test_unit_resolver_is_named_after_field() {
    let api = StandardBinder::new(InlineOnly)
      .bind(def(
        r#"{
          "name": "blog",
          "dataSources": [{ "name": "local", "type": "NONE" }],
          "resolvers": [{
            "type": "Query", "field": "getPost", "dataSource": "local",
            "request": { "inline": "{}" }, "response": "Query.getPost.response.vtl"
          }]
        }"#,
      ))
      .await
      .unwrap();

    let resolver = api.resolver("Query", "getPost").unwrap();
    let ResolverKind::Unit(unit) = &resolver.kind else {
      panic!("expected unit resolver");
    };
    assert_eq!(unit.name, "Query.getPost");
    assert_eq!(unit.request.as_deref(), Some("{}"));
    assert_eq!(unit.response.as_deref(), Some("file:Query.getPost.response.vtl"));
  }

  #[tokio::test]
  async fn test_pipeline_keeps_function_order() {
    let api = StandardBinder::new(InlineOnly)
      .bind(def(
        r#"{
          "name": "blog",
          "defaultTimeoutMs": 2000,
          "dataSources": [{ "name": "local", "type": "NONE" }],
          "functions": [
            { "name": "a", "dataSource": "local" },
            { "name": "b", "dataSource": "local" }
          ],
          "resolvers": [{
            "type": "Mutation", "field": "save", "kind": "PIPELINE",
            "functions": ["b", "a", "b"], "request": { "inline": "before" }
          }]
        }"#,
      ))
      .await
      .unwrap();

    let resolver = api.resolver("Mutation", "save").unwrap();
    let names: Vec<&str> = resolver.stages().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["b", "a", "b"]);
    assert_eq!(resolver.before_template(), Some("before"));
    assert_eq!(resolver.after_template(), None);
    assert_eq!(api.default_timeout_ms, Some(2000));
  }

  #[tokio::test]
  async fn test_unknown_references() {
    let binder = StandardBinder::new(InlineOnly);

    let err = binder
      .bind(def(
        r#"{ "name": "x", "resolvers": [{ "type": "Query", "field": "f", "dataSource": "nope" }] }"#,
      ))
      .await
      .unwrap_err();
    assert!(matches!(err, BindError::UnknownDataSource { .. }));

    let err = binder
      .bind(def(
        r#"{ "name": "x", "resolvers": [{ "type": "Query", "field": "f", "kind": "PIPELINE", "functions": ["nope"] }] }"#,
      ))
      .await
      .unwrap_err();
    assert!(matches!(err, BindError::UnknownFunction { .. }));

    let err = binder
      .bind(def(r#"{ "name": "x", "resolvers": [{ "type": "Query", "field": "f" }] }"#))
      .await
      .unwrap_err();
    assert!(matches!(err, BindError::MissingDataSource { .. }));
  }

  #[tokio::test]
  async fn test_duplicates() {
    let binder = StandardBinder::new(InlineOnly);

    let err = binder
      .bind(def(
        r#"{ "name": "x", "dataSources": [{ "name": "a", "type": "NONE" }, { "name": "a", "type": "NONE" }] }"#,
      ))
      .await
      .unwrap_err();
    assert!(matches!(err, BindError::Api(_)));

    let err = binder
      .bind(def(
        r#"{
          "name": "x",
          "dataSources": [{ "name": "a", "type": "NONE" }],
          "functions": [{ "name": "f", "dataSource": "a" }, { "name": "f", "dataSource": "a" }]
        }"#,
      ))
      .await
      .unwrap_err();
    assert!(matches!(err, BindError::DuplicateFunction { .. }));

    let err = binder
      .bind(def(
        r#"{
          "name": "x",
          "dataSources": [{ "name": "a", "type": "NONE" }],
          "resolvers": [
            { "type": "Query", "field": "f", "dataSource": "a" },
            { "type": "Query", "field": "f", "dataSource": "a" }
          ]
        }"#,
      ))
      .await
      .unwrap_err();
    assert!(matches!(err, BindError::Api(_)));
  }
}
