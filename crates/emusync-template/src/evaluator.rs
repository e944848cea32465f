//! Template evaluation entry point.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use emusync_context::InvocationContext;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::cache::TemplateCache;
use crate::error::{RaisedError, TemplateError};
use crate::interpreter::{Interpreter, Interrupt};
use crate::output::parse_output;
use crate::util::UtilState;
use crate::value::Value;

/// Source of "now" for the `$util.time` functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clock {
  #[default]
  System,
  Fixed(DateTime<Utc>),
}

impl Clock {
  pub fn now(&self) -> DateTime<Utc> {
    match self {
      Clock::System => Utc::now(),
      Clock::Fixed(at) => *at,
    }
  }
}

/// Successful evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rendered {
  pub value: serde_json::Value,
  /// Errors recorded with `$util.appendError`, in call order.
  pub appended_errors: Vec<RaisedError>,
  /// True when the value came from `#return`.
  pub returned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TemplateOutcome {
  Rendered(Rendered),
  Raised(RaisedError),
  Failed(TemplateError),
}

/// Evaluates mapping templates against an [`InvocationContext`].
///
/// Holds only the parsed template cache and the clock; every call builds a
/// fresh interpreter, so evaluation is repeatable for the same context.
#[derive(Clone, Default)]
pub struct Evaluator {
  cache: TemplateCache,
  clock: Clock,
}

impl Evaluator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_clock(clock: Clock) -> Self {
    Self {
      cache: TemplateCache::new(),
      clock,
    }
  }

  pub fn cache(&self) -> &TemplateCache {
    &self.cache
  }

  /// Evaluate `source` against `ctx`.
  ///
  /// Only `ctx.stash` is written back, and it is written back whatever the
  /// outcome.
  #[instrument(
    name = "template_evaluate",
    skip(self, source, ctx),
    fields(
      parent_type = %ctx.info.parent_type_name,
      field = %ctx.info.field_name,
    )
  )]
  pub fn evaluate(&self, source: &str, ctx: &mut InvocationContext) -> TemplateOutcome {
    let template = match self.cache.get_or_compile(source) {
      Ok(template) => template,
      Err(e) => {
        warn!(error = %e, "template_compile_failed");
        return TemplateOutcome::Failed(e);
      }
    };

    let root = match Value::from_json(&ctx.to_template_value()) {
      Value::Map(root) => root,
      _ => Rc::new(RefCell::new(IndexMap::new())),
    };
    {
      let mut entries = root.borrow_mut();
      if let Some(arguments) = entries.get("arguments").cloned() {
        entries.insert("args".to_string(), arguments);
      }
    }

    let mut interpreter = Interpreter::new(UtilState {
      now: self.clock.now(),
      auth_type: ctx.auth_type,
      appended: Vec::new(),
    });
    interpreter.define("context", Value::Map(root.clone()));
    interpreter.define("ctx", Value::Map(root.clone()));

    let mut out = String::new();
    let flow = interpreter.execute(template.nodes(), &mut out);
    let appended_errors = interpreter.take_appended_errors();

    let stash = root.borrow().get("stash").map(Value::to_json);
    if let Some(serde_json::Value::Object(stash)) = stash {
      ctx.stash = stash;
    }

    let outcome = match flow {
      Ok(()) | Err(Interrupt::Break) | Err(Interrupt::Stop) => match parse_output(&out) {
        Ok(value) => TemplateOutcome::Rendered(Rendered {
          value,
          appended_errors,
          returned: false,
        }),
        Err(message) => TemplateOutcome::Failed(TemplateError::Runtime { message }),
      },
      Err(Interrupt::Return(value)) => {
        let json = value.to_json();
        value.release();
        TemplateOutcome::Rendered(Rendered {
          value: json,
          appended_errors,
          returned: true,
        })
      }
      Err(Interrupt::Raise(error)) => TemplateOutcome::Raised(error),
      Err(Interrupt::Fault(message)) => TemplateOutcome::Failed(TemplateError::Runtime { message }),
    };
    interpreter.release();

    match &outcome {
      TemplateOutcome::Rendered(rendered) => {
        debug!(returned = rendered.returned, "template_rendered");
      }
      TemplateOutcome::Raised(error) => {
        debug!(message = %error.message, error_type = ?error.error_type, "template_raised");
      }
      TemplateOutcome::Failed(error) => {
        warn!(error = %error, "template_failed");
      }
    }

    outcome
  }
}
