//! Resolver state machine.
//!
//! One [`Pipeline`] runs one resolver definition against one context. Stages
//! run strictly in order; the only await points are data source calls.

use emusync_api::{FunctionUnit, ResolverDefinition};
use emusync_context::{ContextError, InvocationContext};
use emusync_datasource::{DispatchError, DispatchOutcome, Dispatcher};
use emusync_template::{
  Evaluator, MAPPING_TEMPLATE_ERROR_TYPE, RaisedError, TemplateError, TemplateOutcome,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::RuntimeError;

const BEFORE_STAGE: &str = "before";
const AFTER_STAGE: &str = "after";

/// An error captured while running a resolver.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageError {
  /// Raised by the template author (`$util.error`, `$util.unauthorized`, ...).
  #[error("{}", .0.message)]
  Raised(RaisedError),

  /// The template did not parse or did not finish evaluating.
  #[error(transparent)]
  Template(TemplateError),

  /// The data source call failed or timed out.
  #[error("{}", .0.message)]
  Dispatch(DispatchError),

  /// The pipeline stopped in `stage` because of `cause`.
  #[error("pipeline aborted in {stage}: {cause}")]
  PipelineAborted {
    stage: String,
    cause: Box<StageError>,
  },
}

impl StageError {
  /// The error that started the abort, looking through `PipelineAborted`.
  pub fn root_cause(&self) -> &StageError {
    match self {
      StageError::PipelineAborted { cause, .. } => cause.root_cause(),
      other => other,
    }
  }

  pub fn message(&self) -> String {
    match self.root_cause() {
      StageError::Raised(e) => e.message.clone(),
      StageError::Dispatch(e) => e.message.clone(),
      other => other.to_string(),
    }
  }

  pub fn error_type(&self) -> Option<String> {
    match self.root_cause() {
      StageError::Raised(e) => e.error_type.clone(),
      StageError::Template(e) => Some(e.error_type().to_string()),
      StageError::Dispatch(e) => Some(e.error_type.clone()),
      StageError::PipelineAborted { .. } => Some(MAPPING_TEMPLATE_ERROR_TYPE.to_string()),
    }
  }

  fn to_context_error(&self) -> ContextError {
    ContextError::new(self.message(), self.error_type())
  }

  fn aborted(stage: &str, cause: StageError) -> Self {
    StageError::PipelineAborted {
      stage: stage.to_string(),
      cause: Box::new(cause),
    }
  }
}

/// How a resolver run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
  /// DONE: the field value, plus any errors appended along the way.
  Completed {
    value: Value,
    appended_errors: Vec<RaisedError>,
  },
  /// ABORTED: `data` is what `ctx.result` held when the pipeline stopped.
  Aborted {
    data: Value,
    appended_errors: Vec<RaisedError>,
    error: StageError,
  },
}

/// What the state machine does after a step.
enum Step {
  Next,
  /// `#return` in the before template: this value is the field value.
  Return(Value),
  Abort(StageError),
}

pub(crate) struct Pipeline<'a> {
  evaluator: &'a Evaluator,
  dispatcher: &'a Dispatcher,
  cancel: &'a CancellationToken,
  ctx: InvocationContext,
  appended: Vec<RaisedError>,
}

impl<'a> Pipeline<'a> {
  pub(crate) fn new(
    evaluator: &'a Evaluator,
    dispatcher: &'a Dispatcher,
    cancel: &'a CancellationToken,
    ctx: InvocationContext,
  ) -> Self {
    Self {
      evaluator,
      dispatcher,
      cancel,
      ctx,
      appended: Vec::new(),
    }
  }

  /// Run `def` to DONE or ABORTED.
  pub(crate) async fn run(
    mut self,
    def: &ResolverDefinition,
  ) -> Result<PipelineOutcome, RuntimeError> {
    if let Some(source) = def.before_template() {
      match self.before(source) {
        Step::Next => {}
        Step::Return(value) => return Ok(self.complete(value)),
        Step::Abort(error) => return Ok(self.abort(error)),
      }
    }

    for (index, unit) in def.stages().iter().enumerate() {
      if self.cancel.is_cancelled() {
        return Err(RuntimeError::Cancelled);
      }
      match self.stage(unit).await? {
        Step::Next => {
          info!(stage = %unit.name, index, data_source = %unit.data_source, "stage_completed");
        }
        Step::Return(value) => return Ok(self.complete(value)),
        Step::Abort(error) => return Ok(self.abort(error)),
      }
    }

    let value = match def.after_template() {
      Some(source) => match self.after(source) {
        Ok(value) => value,
        Err(error) => return Ok(self.abort(error)),
      },
      None => std::mem::take(&mut self.ctx.result),
    };
    Ok(self.complete(value))
  }

  fn before(&mut self, source: &str) -> Step {
    match self.evaluator.evaluate(source, &mut self.ctx) {
      TemplateOutcome::Rendered(rendered) => {
        self.appended.extend(rendered.appended_errors);
        if rendered.returned {
          return Step::Return(rendered.value);
        }
        // The first function sees the before output as `$ctx.prev.result`.
        self.ctx.complete_stage(rendered.value);
        debug!(stage = BEFORE_STAGE, "stage_completed");
        Step::Next
      }
      TemplateOutcome::Raised(e) => Step::Abort(StageError::aborted(BEFORE_STAGE, StageError::Raised(e))),
      TemplateOutcome::Failed(e) => Step::Abort(StageError::aborted(BEFORE_STAGE, StageError::Template(e))),
    }
  }

  fn after(&mut self, source: &str) -> Result<Value, StageError> {
    match self.evaluator.evaluate(source, &mut self.ctx) {
      TemplateOutcome::Rendered(rendered) => {
        self.appended.extend(rendered.appended_errors);
        Ok(rendered.value)
      }
      TemplateOutcome::Raised(e) => Err(StageError::aborted(AFTER_STAGE, StageError::Raised(e))),
      TemplateOutcome::Failed(e) => Err(StageError::aborted(AFTER_STAGE, StageError::Template(e))),
    }
  }

  /// REQUEST_MAPPING → DISPATCH → RESPONSE_MAPPING for one function.
  async fn stage(&mut self, unit: &FunctionUnit) -> Result<Step, RuntimeError> {
    self.ctx.begin_stage();

    let request = match unit.request.as_deref() {
      None => Ok(self.pass_through_request()),
      Some(source) => match self.evaluator.evaluate(source, &mut self.ctx) {
        TemplateOutcome::Rendered(rendered) => {
          self.appended.extend(rendered.appended_errors);
          if rendered.returned {
            self.ctx.complete_stage(rendered.value);
            return Ok(Step::Next);
          }
          Ok(rendered.value)
        }
        TemplateOutcome::Raised(e) => Err(StageError::Raised(e)),
        TemplateOutcome::Failed(e @ TemplateError::Compile { .. }) => {
          return Ok(self.stage_failed(unit, StageError::Template(e)));
        }
        TemplateOutcome::Failed(e) => Err(StageError::Template(e)),
      },
    };

    let stage_error = match request {
      Ok(request) => {
        let field = format!("{}.{}", self.ctx.info.parent_type_name, self.ctx.info.field_name);
        match self
          .dispatcher
          .invoke_for_field(&unit.data_source, &field, &request, self.cancel)
          .await
        {
          DispatchOutcome::Value(value) => {
            self.ctx.result = value;
            None
          }
          DispatchOutcome::Error(e) => {
            self.ctx.result = Value::Null;
            Some(StageError::Dispatch(e))
          }
          DispatchOutcome::Cancelled => return Err(RuntimeError::Cancelled),
        }
      }
      // Dispatch is skipped; the response template decides what happens.
      Err(e) => Some(e),
    };
    if let Some(e) = &stage_error {
      self.ctx.set_error(e.to_context_error());
    }

    let Some(source) = unit.response.as_deref() else {
      return Ok(match stage_error {
        Some(e) => self.stage_failed(unit, e),
        None => {
          let result = std::mem::take(&mut self.ctx.result);
          self.ctx.complete_stage(result);
          Step::Next
        }
      });
    };

    match self.evaluator.evaluate(source, &mut self.ctx) {
      TemplateOutcome::Rendered(rendered) => {
        self.appended.extend(rendered.appended_errors);
        if let Some(e) = stage_error {
          debug!(stage = %unit.name, error = %e, "stage_error_handled");
        }
        self.ctx.complete_stage(rendered.value);
        Ok(Step::Next)
      }
      TemplateOutcome::Raised(e) => Ok(self.stage_failed(unit, StageError::Raised(e))),
      TemplateOutcome::Failed(e) => Ok(self.stage_failed(unit, StageError::Template(e))),
    }
  }

  fn stage_failed(&self, unit: &FunctionUnit, cause: StageError) -> Step {
    let error_type = cause.error_type().unwrap_or_else(|| "null".to_string());
    error!(stage = %unit.name, error = %cause, error_type = %error_type, "stage_failed");
    Step::Abort(StageError::aborted(&unit.name, cause))
  }

  /// Request used when a function has no request template: an `Invoke`
  /// carrying a snapshot of the context.
  fn pass_through_request(&self) -> Value {
    let mut snapshot = self.ctx.to_template_value();
    if let Value::Object(fields) = &mut snapshot {
      fields.remove("result");
      fields.remove("error");
    }
    json!({
      "version": "2018-05-29",
      "operation": "Invoke",
      "payload": snapshot,
    })
  }

  fn complete(self, value: Value) -> PipelineOutcome {
    PipelineOutcome::Completed {
      value,
      appended_errors: self.appended,
    }
  }

  fn abort(self, error: StageError) -> PipelineOutcome {
    PipelineOutcome::Aborted {
      data: self.ctx.result,
      appended_errors: self.appended,
      error,
    }
  }
}
