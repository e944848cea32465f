use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use emusync_config::{FunctionSourceConfig, FunctionTarget};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::error::FunctionError;
use crate::handler::{FunctionHandler, LambdaContext};
use crate::process::{self, ProcessSpec};

/// Runs function data sources, either by spawning their process or by calling
/// a handler registered here.
#[derive(Clone, Default)]
pub struct FunctionInvoker {
  handlers: HashMap<String, Arc<dyn FunctionHandler>>,
}

impl fmt::Debug for FunctionInvoker {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut names: Vec<&String> = self.handlers.keys().collect();
    names.sort();
    f.debug_struct("FunctionInvoker").field("handlers", &names).finish()
  }
}

impl FunctionInvoker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register an in-process handler, replacing any previous one with that name.
  pub fn register(&mut self, name: impl Into<String>, handler: impl FunctionHandler + 'static) {
    self.handlers.insert(name.into(), Arc::new(handler));
  }

  pub fn with_handler(
    mut self,
    name: impl Into<String>,
    handler: impl FunctionHandler + 'static,
  ) -> Self {
    self.register(name, handler);
    self
  }

  pub fn contains(&self, name: &str) -> bool {
    self.handlers.contains_key(name)
  }

  /// Invoke the function described by `config` with `event`.
  #[instrument(
    name = "function_invoke",
    skip(self, config, event),
    fields(
      function_name = %config.function_name,
    )
  )]
  pub async fn invoke(
    &self,
    config: &FunctionSourceConfig,
    event: Value,
    timeout_ms: u64,
  ) -> Result<Value, FunctionError> {
    let context = LambdaContext {
      function_name: config.function_name.clone(),
      request_id: uuid::Uuid::new_v4().to_string(),
      deadline_ms: Utc::now().timestamp_millis() + timeout_ms as i64,
    };
    debug!(request_id = %context.request_id, "function_started");

    let result = match &config.target {
      FunctionTarget::Registered { handler } => {
        let handler = self
          .handlers
          .get(handler)
          .ok_or_else(|| FunctionError::HandlerNotFound {
            handler: handler.clone(),
          })?;
        handler
          .invoke(event, context.clone())
          .await
          .map_err(|e| FunctionError::Handler {
            raw: json!({ "errorMessage": e.message, "errorType": e.error_type }),
            message: e.message,
            error_type: e.error_type,
          })
      }
      FunctionTarget::Process {
        command,
        args,
        cwd,
        env,
      } => {
        let spec = ProcessSpec {
          command,
          args,
          cwd: cwd.as_deref(),
          env,
        };
        process::run(&spec, &event, &context, timeout_ms).await
      }
    };

    match &result {
      Ok(_) => debug!(request_id = %context.request_id, "function_completed"),
      Err(e) => warn!(
        request_id = %context.request_id,
        error = %e,
        error_type = %e.error_type(),
        "function_failed"
      ),
    }

    result
  }
}
