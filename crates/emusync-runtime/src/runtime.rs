//! Field resolution runtime.
//!
//! The [`Runtime`] struct is the main entry point for resolving fields. It
//! owns the evaluator and dispatcher and provides
//! `resolve_field(definition, request, cancel)` for a single field.

use std::sync::Arc;

use emusync_api::{Api, ResolverDefinition};
use emusync_context::{FieldRequest, InvocationContext};
use emusync_datasource::Dispatcher;
use emusync_template::Evaluator;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::RuntimeError;
use crate::normalize::{InvocationResult, normalize};
use crate::pipeline::{Pipeline, PipelineOutcome};

/// Handle for a concurrently resolved field.
type FieldHandle = tokio::task::JoinHandle<Result<InvocationResult, RuntimeError>>;

/// The resolver runtime.
///
/// Cheap to clone; clones share the template cache and the data source
/// backends.
#[derive(Clone)]
pub struct Runtime {
  evaluator: Evaluator,
  dispatcher: Dispatcher,
}

impl Runtime {
  pub fn new(dispatcher: Dispatcher) -> Self {
    Self {
      evaluator: Evaluator::new(),
      dispatcher,
    }
  }

  /// Use `evaluator` for templates, e.g. one with a fixed clock.
  pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
    self.evaluator = evaluator;
    self
  }

  pub fn evaluator(&self) -> &Evaluator {
    &self.evaluator
  }

  pub fn dispatcher(&self) -> &Dispatcher {
    &self.dispatcher
  }

  /// Resolve one field with a fresh context.
  ///
  /// Template and data source failures end up in the result's `errors`; the
  /// only error returned here is cancellation.
  #[instrument(
    name = "resolve_field",
    skip(self, def, request, cancel),
    fields(
      type_name = %def.type_name,
      field_name = %def.field_name,
      resolution_id = tracing::field::Empty,
    )
  )]
  pub async fn resolve_field(
    &self,
    def: &ResolverDefinition,
    request: FieldRequest,
    cancel: CancellationToken,
  ) -> Result<InvocationResult, RuntimeError> {
    let resolution_id = uuid::Uuid::new_v4().to_string();
    tracing::Span::current().record("resolution_id", resolution_id.as_str());

    info!(
      stages = def.stages().len(),
      pipeline = def.is_pipeline(),
      "field_started"
    );

    let mut request = request;
    if request.info.field_name.is_empty() {
      request.info.parent_type_name = def.type_name.clone();
      request.info.field_name = def.field_name.clone();
    }
    let path = request.info.response_path();
    let ctx = InvocationContext::new(request);

    let outcome = Pipeline::new(&self.evaluator, &self.dispatcher, &cancel, ctx)
      .run(def)
      .await;

    match &outcome {
      Ok(PipelineOutcome::Completed { appended_errors, .. }) => {
        info!(appended_errors = appended_errors.len(), "field_completed")
      }
      Ok(PipelineOutcome::Aborted { error, .. }) => {
        error!(error = %error, "field_aborted")
      }
      Err(e) => warn!(error = %e, "field_cancelled"),
    }

    Ok(normalize(outcome?, &path))
  }

  /// Resolve the field named by `request.info` using `api`'s resolver.
  pub async fn resolve(
    &self,
    api: &Api,
    request: FieldRequest,
    cancel: CancellationToken,
  ) -> Result<InvocationResult, RuntimeError> {
    let type_name = &request.info.parent_type_name;
    let field_name = &request.info.field_name;
    let def = api
      .resolver(type_name, field_name)
      .ok_or_else(|| RuntimeError::ResolverNotFound {
        type_name: type_name.clone(),
        field_name: field_name.clone(),
      })?;
    self.resolve_field(&def, request, cancel).await
  }

  /// Resolve sibling fields concurrently, each with its own context.
  ///
  /// Results come back in input order. Cancelling `cancel` stops every field.
  pub async fn resolve_fields(
    &self,
    fields: Vec<(Arc<ResolverDefinition>, FieldRequest)>,
    cancel: CancellationToken,
  ) -> Result<Vec<InvocationResult>, RuntimeError> {
    let handles: Vec<FieldHandle> = fields
      .into_iter()
      .map(|(def, request)| {
        let runtime = self.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { runtime.resolve_field(&def, request, cancel).await })
      })
      .collect();

    let results = tokio::select! {
      results = futures::future::join_all(handles) => results,
      _ = cancel.cancelled() => {
        warn!("field resolution cancelled");
        return Err(RuntimeError::Cancelled);
      }
    };

    results
      .into_iter()
      .map(|result| match result {
        Ok(result) => result,
        Err(e) => Err(RuntimeError::Join {
          message: e.to_string(),
        }),
      })
      .collect()
  }
}
