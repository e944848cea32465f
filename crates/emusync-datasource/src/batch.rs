//! Batching of concurrent `BatchInvoke` requests.
//!
//! Requests for the same data source and field that arrive within one batch
//! window are sent as a single call: the first request with its `payload`
//! replaced by the list of every request's payload. The function must answer
//! with a list of the same length; element `i` becomes the result of request
//! `i`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dispatcher::Dispatcher;
use crate::outcome::{DispatchError, DispatchOutcome};

/// How long a batch stays open after its first request.
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(1);

/// Error type for a batch result that cannot be split between its requests.
pub const BATCH_RESULT_ERROR_TYPE: &str = "Lambda:BatchResultMismatch";

pub(crate) fn is_batch_invoke(request: &Value) -> bool {
  request.get("operation").and_then(Value::as_str) == Some("BatchInvoke")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BatchKey {
  data_source: String,
  field: String,
}

struct PendingCall {
  request: Value,
  reply: oneshot::Sender<DispatchOutcome>,
}

/// Open batches, shared by every clone of a dispatcher.
#[derive(Clone, Default)]
pub(crate) struct Batches {
  open: Arc<Mutex<HashMap<BatchKey, Vec<PendingCall>>>>,
}

impl Batches {
  /// Join the open batch for `data_source` and `field`, opening one if needed,
  /// and wait for this request's share of the result.
  pub async fn enqueue(
    &self,
    dispatcher: &Dispatcher,
    data_source: &str,
    field: &str,
    request: &Value,
    cancel: &CancellationToken,
  ) -> DispatchOutcome {
    let key = BatchKey {
      data_source: data_source.to_string(),
      field: field.to_string(),
    };
    let (reply, receiver) = oneshot::channel();
    let call = PendingCall {
      request: request.clone(),
      reply,
    };

    let opened = {
      let Ok(mut open) = self.open.lock() else {
        return DispatchOutcome::Error(DispatchError::new(
          "batch state is unavailable",
          BATCH_RESULT_ERROR_TYPE,
        ));
      };
      let calls = open.entry(key.clone()).or_default();
      calls.push(call);
      calls.len() == 1
    };

    // The batch is flushed by its own task, so a cancelled caller never
    // strands the others.
    if opened {
      let batches = self.clone();
      let dispatcher = dispatcher.clone();
      tokio::spawn(async move {
        tokio::time::sleep(dispatcher.batch_window()).await;
        batches.flush(&dispatcher, key).await;
      });
    }

    tokio::select! {
      _ = cancel.cancelled() => DispatchOutcome::Cancelled,
      outcome = receiver => outcome.unwrap_or(DispatchOutcome::Cancelled),
    }
  }

  async fn flush(&self, dispatcher: &Dispatcher, key: BatchKey) {
    let calls = match self.open.lock() {
      Ok(mut open) => open.remove(&key).unwrap_or_default(),
      Err(_) => return,
    };
    let Some(first) = calls.first() else {
      return;
    };

    let payloads: Vec<Value> = calls
      .iter()
      .map(|call| call.request.get("payload").cloned().unwrap_or(Value::Null))
      .collect();
    let mut request = first.request.clone();
    if let Value::Object(envelope) = &mut request {
      envelope.insert("payload".to_string(), Value::Array(payloads));
    }
    info!(
      data_source = %key.data_source,
      field = %key.field,
      size = calls.len(),
      "batch_flushed"
    );

    let outcome = dispatcher
      .invoke(&key.data_source, &request, &CancellationToken::new())
      .await;

    match outcome {
      DispatchOutcome::Value(Value::Array(items)) if items.len() == calls.len() => {
        for (call, item) in calls.into_iter().zip(items) {
          let _ = call.reply.send(DispatchOutcome::Value(item));
        }
      }
      DispatchOutcome::Value(other) => {
        let received = match &other {
          Value::Array(items) => format!("a list of {}", items.len()),
          _ => "a non-list value".to_string(),
        };
        warn!(expected = calls.len(), received = %received, "batch_result_mismatch");
        let error = DispatchError::new(
          format!(
            "BatchInvoke on data source '{}' expected a list of {} results, got {}",
            key.data_source,
            calls.len(),
            received
          ),
          BATCH_RESULT_ERROR_TYPE,
        );
        for call in calls {
          let _ = call.reply.send(DispatchOutcome::Error(error.clone()));
        }
      }
      outcome => {
        for call in calls {
          let _ = call.reply.send(outcome.clone());
        }
      }
    }
  }
}
