use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use emusync_api::{DataSourceKind, DataSourceRegistry};
use emusync_host_function::{FunctionInvoker, UNHANDLED_ERROR_TYPE};
use futures::FutureExt;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::backend::{
  DataSourceBackend, FunctionBackend, HttpSourceBackend, KvTableBackend, NoneBackend,
  RelationalBackend,
};
use crate::batch::{Batches, DEFAULT_BATCH_WINDOW, is_batch_invoke};
use crate::outcome::{
  DATA_SOURCE_NOT_FOUND_ERROR_TYPE, DispatchError, DispatchOutcome, INTERNAL_FAILURE_ERROR_TYPE,
  TIMEOUT_ERROR_TYPE,
};

/// Timeout for data sources that set none, unless the dispatcher is given another.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Routes rendered requests to data source backends.
#[derive(Clone)]
pub struct Dispatcher {
  registry: Arc<DataSourceRegistry>,
  backends: HashMap<DataSourceKind, Arc<dyn DataSourceBackend>>,
  default_timeout: Duration,
  batches: Batches,
  batch_window: Duration,
}

impl Dispatcher {
  /// Create a dispatcher with the default backend for every kind. Function
  /// sources can only run processes until handlers are registered with
  /// [`Dispatcher::with_function_invoker`].
  pub fn new(registry: DataSourceRegistry) -> Self {
    let mut dispatcher = Self {
      registry: Arc::new(registry),
      backends: HashMap::new(),
      default_timeout: DEFAULT_TIMEOUT,
      batches: Batches::default(),
      batch_window: DEFAULT_BATCH_WINDOW,
    };
    let http: Arc<dyn DataSourceBackend> = Arc::new(HttpSourceBackend::default());
    dispatcher.backends.insert(DataSourceKind::Http, http.clone());
    dispatcher.backends.insert(DataSourceKind::Search, http);
    dispatcher
      .backends
      .insert(DataSourceKind::KvTable, Arc::new(KvTableBackend::default()));
    dispatcher
      .backends
      .insert(DataSourceKind::Relational, Arc::new(RelationalBackend::default()));
    dispatcher
      .backends
      .insert(DataSourceKind::None, Arc::new(NoneBackend));
    dispatcher.with_function_invoker(FunctionInvoker::new())
  }

  /// Replace the backend used for `kind`.
  pub fn with_backend(mut self, kind: DataSourceKind, backend: impl DataSourceBackend + 'static) -> Self {
    self.backends.insert(kind, Arc::new(backend));
    self
  }

  /// Use `invoker` (and its registered handlers) for function data sources.
  pub fn with_function_invoker(mut self, invoker: FunctionInvoker) -> Self {
    self.backends.insert(
      DataSourceKind::Function,
      Arc::new(FunctionBackend::new(invoker)),
    );
    self
  }

  /// Timeout for sources without their own `timeout_ms`.
  pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
    self.default_timeout = timeout;
    self
  }

  /// How long a `BatchInvoke` batch waits for more requests.
  pub fn with_batch_window(mut self, window: Duration) -> Self {
    self.batch_window = window;
    self
  }

  pub fn registry(&self) -> &DataSourceRegistry {
    &self.registry
  }

  pub fn batch_window(&self) -> Duration {
    self.batch_window
  }

  /// Send `request` on behalf of `field` (`Type.field`).
  ///
  /// A `BatchInvoke` request to a function source joins the batch for that
  /// source and field; anything else is sent straight away.
  pub async fn invoke_for_field(
    &self,
    name: &str,
    field: &str,
    request: &Value,
    cancel: &CancellationToken,
  ) -> DispatchOutcome {
    let batched = is_batch_invoke(request)
      && self
        .registry
        .get(name)
        .is_some_and(|source| source.kind() == DataSourceKind::Function);
    if !batched {
      return self.invoke(name, request, cancel).await;
    }
    if cancel.is_cancelled() {
      return DispatchOutcome::Cancelled;
    }
    self.batches.enqueue(self, name, field, request, cancel).await
  }

  /// Send `request` to the data source named `name`.
  #[instrument(
    name = "dispatch",
    skip(self, request, cancel),
    fields(
      data_source = %name,
    )
  )]
  pub async fn invoke(
    &self,
    name: &str,
    request: &Value,
    cancel: &CancellationToken,
  ) -> DispatchOutcome {
    let Some(source) = self.registry.get(name) else {
      error!(error_type = DATA_SOURCE_NOT_FOUND_ERROR_TYPE, "dispatch_failed");
      return DispatchOutcome::Error(DispatchError::new(
        format!("data source '{}' is not registered", name),
        DATA_SOURCE_NOT_FOUND_ERROR_TYPE,
      ));
    };
    let Some(backend) = self.backends.get(&source.kind()) else {
      error!(kind = %source.kind(), "dispatch_failed");
      return DispatchOutcome::Error(DispatchError::new(
        format!("no backend for {} data source '{}'", source.kind(), name),
        "DataSourceMisconfigured",
      ));
    };
    if cancel.is_cancelled() {
      return DispatchOutcome::Cancelled;
    }

    let timeout = source
      .timeout_ms
      .map(Duration::from_millis)
      .unwrap_or(self.default_timeout);
    // Backends see the effective timeout.
    let source = match source.timeout_ms {
      Some(_) => source,
      None => Arc::new((*source).clone().with_timeout_ms(timeout.as_millis() as u64)),
    };
    info!(kind = %source.kind(), timeout_ms = timeout.as_millis() as u64, "dispatch_started");

    // A panicking backend or handler fails this call only.
    let call = AssertUnwindSafe(backend.call(&source, request)).catch_unwind();
    let outcome = tokio::select! {
      _ = cancel.cancelled() => DispatchOutcome::Cancelled,
      result = tokio::time::timeout(timeout, call) => match result {
        Ok(Ok(Ok(value))) => DispatchOutcome::Value(value),
        Ok(Ok(Err(e))) => DispatchOutcome::Error(e.into()),
        Ok(Err(panic)) => DispatchOutcome::Error(panicked(source.kind(), panic)),
        Err(_) => DispatchOutcome::Error(DispatchError::new(
          format!(
            "Execution timed out after {} ms calling data source '{}'",
            timeout.as_millis(),
            name
          ),
          TIMEOUT_ERROR_TYPE,
        )),
      },
    };

    match &outcome {
      DispatchOutcome::Value(_) => info!("dispatch_completed"),
      DispatchOutcome::Error(e) => {
        error!(error = %e.message, error_type = %e.error_type, "dispatch_failed")
      }
      DispatchOutcome::Cancelled => info!("dispatch_cancelled"),
    }

    outcome
  }
}

fn panicked(kind: DataSourceKind, panic: Box<dyn Any + Send>) -> DispatchError {
  let message = match panic.downcast::<String>() {
    Ok(message) => *message,
    Err(panic) => match panic.downcast::<&'static str>() {
      Ok(message) => (*message).to_string(),
      Err(_) => "backend panicked".to_string(),
    },
  };
  let error_type = match kind {
    DataSourceKind::Function => UNHANDLED_ERROR_TYPE,
    _ => INTERNAL_FAILURE_ERROR_TYPE,
  };
  DispatchError {
    raw: json!({ "errorMessage": message, "errorType": error_type }),
    message,
    error_type: error_type.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use emusync_api::{DataSourceConfig, DataSourceRef};
  use emusync_config::{FunctionSourceConfig, FunctionTarget};
  use emusync_host_function::{HandlerError, LambdaContext};
  use serde_json::json;

  use crate::error::BackendError;

  struct Sleepy;

  #[async_trait]
  impl DataSourceBackend for Sleepy {
    async fn call(&self, _: &DataSourceRef, _: &Value) -> Result<Value, BackendError> {
      tokio::time::sleep(Duration::from_secs(60)).await;
      Ok(Value::Null)
    }
  }

  fn registry(sources: Vec<DataSourceRef>) -> DataSourceRegistry {
    let mut registry = DataSourceRegistry::new();
    for source in sources {
      registry.insert(source).unwrap();
    }
    registry
  }

  fn function_source(name: &str, handler: &str) -> DataSourceRef {
    DataSourceRef::new(
      name,
      DataSourceConfig::Function(FunctionSourceConfig {
        function_name: name.to_string(),
        target: FunctionTarget::Registered {
          handler: handler.to_string(),
        },
      }),
    )
  }

  #[tokio::test]
  async fn test_unknown_source_is_error_outcome() {
    let dispatcher = Dispatcher::new(DataSourceRegistry::new());
    let outcome = dispatcher
      .invoke("missing", &json!({}), &CancellationToken::new())
      .await;

    match outcome {
      DispatchOutcome::Error(e) => assert_eq!(e.error_type, "DataSourceNotFound"),
      other => panic!("expected error, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_function_source_gets_invoke_payload() {
    let invoker = FunctionInvoker::new().with_handler("echo", |event: Value, _: LambdaContext| async move {
      Ok::<_, HandlerError>(json!({ "received": event }))
    });
    let dispatcher =
      Dispatcher::new(registry(vec![function_source("lambda", "echo")])).with_function_invoker(invoker);

    let outcome = dispatcher
      .invoke(
        "lambda",
        &json!({ "version": "2017-02-28", "operation": "Invoke", "payload": { "id": "1" } }),
        &CancellationToken::new(),
      )
      .await;

    assert_eq!(outcome, DispatchOutcome::Value(json!({ "received": { "id": "1" } })));
  }

  #[tokio::test]
  async fn test_function_failure_is_unhandled() {
    let invoker = FunctionInvoker::new().with_handler("fail", |_: Value, _: LambdaContext| async {
      Err::<Value, _>(HandlerError::from("error"))
    });
    let dispatcher =
      Dispatcher::new(registry(vec![function_source("lambda", "fail")])).with_function_invoker(invoker);

    let outcome = dispatcher
      .invoke("lambda", &json!({ "operation": "Invoke", "payload": {} }), &CancellationToken::new())
      .await;

    match outcome {
      DispatchOutcome::Error(e) => {
        assert_eq!(e.message, "error");
        assert_eq!(e.error_type, "Lambda:Unhandled");
      }
      other => panic!("expected error, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_panicking_handler_is_unhandled_error() {
    let invoker = FunctionInvoker::new().with_handler("boom", |_: Value, _: LambdaContext| async {
      if true {
        panic!("handler blew up");
      }
      Ok::<Value, HandlerError>(Value::Null)
    });
    let dispatcher =
      Dispatcher::new(registry(vec![function_source("lambda", "boom")])).with_function_invoker(invoker);

    let outcome = dispatcher
      .invoke("lambda", &json!({ "operation": "Invoke", "payload": {} }), &CancellationToken::new())
      .await;

    match outcome {
      DispatchOutcome::Error(e) => {
        assert_eq!(e.message, "handler blew up");
        assert_eq!(e.error_type, "Lambda:Unhandled");
      }
      other => panic!("expected error, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_panicking_backend_is_internal_failure() {
    struct Broken;

    #[async_trait]
    impl DataSourceBackend for Broken {
      async fn call(&self, _: &DataSourceRef, _: &Value) -> Result<Value, BackendError> {
        panic!("index out of range")
      }
    }

    let dispatcher = Dispatcher::new(registry(vec![DataSourceRef::new("local", DataSourceConfig::None)]))
      .with_backend(DataSourceKind::None, Broken);
    let outcome = dispatcher.invoke("local", &json!({}), &CancellationToken::new()).await;

    match outcome {
      DispatchOutcome::Error(e) => {
        assert_eq!(e.message, "index out of range");
        assert_eq!(e.error_type, "InternalFailure");
      }
      other => panic!("expected error, got {:?}", other),
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_batch_invoke_shares_one_call() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let invoker = FunctionInvoker::new().with_handler("authors", move |event: Value, _: LambdaContext| {
      let counter = counter.clone();
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
        let ids = event.as_array().cloned().unwrap_or_default();
        Ok::<_, HandlerError>(Value::Array(
          ids.into_iter().map(|id| json!({ "id": id })).collect(),
        ))
      }
    });
    let dispatcher =
      Dispatcher::new(registry(vec![function_source("lambda", "authors")])).with_function_invoker(invoker);
    let cancel = CancellationToken::new();
    let request = |id: &str| json!({ "version": "2017-02-28", "operation": "BatchInvoke", "payload": id });

    let (req_a, req_b, req_c) = (request("a"), request("b"), request("c"));
    let (a, b, c) = tokio::join!(
      dispatcher.invoke_for_field("lambda", "Post.author", &req_a, &cancel),
      dispatcher.invoke_for_field("lambda", "Post.author", &req_b, &cancel),
      dispatcher.invoke_for_field("lambda", "Post.author", &req_c, &cancel),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(a, DispatchOutcome::Value(json!({ "id": "a" })));
    assert_eq!(b, DispatchOutcome::Value(json!({ "id": "b" })));
    assert_eq!(c, DispatchOutcome::Value(json!({ "id": "c" })));
  }

  #[tokio::test(start_paused = true)]
  async fn test_batch_result_must_match_requests() {
    let invoker = FunctionInvoker::new().with_handler("one", |_: Value, _: LambdaContext| async {
      Ok::<_, HandlerError>(json!([1]))
    });
    let dispatcher =
      Dispatcher::new(registry(vec![function_source("lambda", "one")])).with_function_invoker(invoker);
    let cancel = CancellationToken::new();
    let request = json!({ "operation": "BatchInvoke", "payload": {} });

    let (a, b) = tokio::join!(
      dispatcher.invoke_for_field("lambda", "Post.author", &request, &cancel),
      dispatcher.invoke_for_field("lambda", "Post.author", &request, &cancel),
    );

    for outcome in [a, b] {
      match outcome {
        DispatchOutcome::Error(e) => assert_eq!(e.error_type, "Lambda:BatchResultMismatch"),
        other => panic!("expected error, got {:?}", other),
      }
    }
  }

  #[tokio::test]
  async fn test_invoke_for_field_sends_plain_invoke_directly() {
    let invoker = FunctionInvoker::new().with_handler("echo", |event: Value, _: LambdaContext| async move {
      Ok::<_, HandlerError>(event)
    });
    let dispatcher =
      Dispatcher::new(registry(vec![function_source("lambda", "echo")])).with_function_invoker(invoker);

    let outcome = dispatcher
      .invoke_for_field(
        "lambda",
        "Query.getPost",
        &json!({ "operation": "Invoke", "payload": { "id": "1" } }),
        &CancellationToken::new(),
      )
      .await;
    assert_eq!(outcome, DispatchOutcome::Value(json!({ "id": "1" })));
  }

  #[tokio::test(start_paused = true)]
  async fn test_timeout() {
    let dispatcher = Dispatcher::new(registry(vec![
      DataSourceRef::new("slow", DataSourceConfig::None).with_timeout_ms(50),
    ]))
    .with_backend(DataSourceKind::None, Sleepy);

    let outcome = dispatcher
      .invoke("slow", &json!({}), &CancellationToken::new())
      .await;

    match outcome {
      DispatchOutcome::Error(e) => assert_eq!(e.error_type, "ExecutionTimeout"),
      other => panic!("expected timeout, got {:?}", other),
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancellation() {
    let dispatcher = Dispatcher::new(registry(vec![DataSourceRef::new("slow", DataSourceConfig::None)]))
      .with_backend(DataSourceKind::None, Sleepy);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(10)).await;
      trigger.cancel();
    });

    let outcome = dispatcher.invoke("slow", &json!({}), &cancel).await;
    assert_eq!(outcome, DispatchOutcome::Cancelled);
  }

  #[tokio::test]
  async fn test_none_source() {
    let dispatcher = Dispatcher::new(registry(vec![DataSourceRef::new("local", DataSourceConfig::None)]));
    let outcome = dispatcher
      .invoke("local", &json!({ "payload": [1, 2] }), &CancellationToken::new())
      .await;
    assert_eq!(outcome, DispatchOutcome::Value(json!([1, 2])));
  }
}
