use std::collections::HashMap;
use std::io::ErrorKind;
use std::process::Stdio;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::FunctionError;
use crate::handler::LambdaContext;

/// Command line of a process-backed function.
pub(crate) struct ProcessSpec<'a> {
  pub command: &'a str,
  pub args: &'a [String],
  pub cwd: Option<&'a str>,
  pub env: &'a HashMap<String, String>,
}

/// Spawn the process, write the event to its stdin and interpret what it prints.
///
/// The child is killed if the returned future is dropped, which is how
/// dispatch timeouts and cancellation reach it.
pub(crate) async fn run(
  spec: &ProcessSpec<'_>,
  event: &Value,
  context: &LambdaContext,
  timeout_ms: u64,
) -> Result<Value, FunctionError> {
  let context_json = serde_json::to_string(context).unwrap_or_default();

  let mut command = Command::new(spec.command);
  command
    .args(spec.args)
    .envs(spec.env)
    .env("AWS_LAMBDA_FUNCTION_NAME", &context.function_name)
    .env("AWS_REQUEST_ID", &context.request_id)
    .env("AWS_LAMBDA_FUNCTION_TIMEOUT", (timeout_ms / 1000).max(1).to_string())
    .env("EMUSYNC_CONTEXT", context_json)
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);
  if let Some(cwd) = spec.cwd {
    command.current_dir(cwd);
  }

  let mut child = command.spawn().map_err(|source| FunctionError::Spawn {
    command: spec.command.to_string(),
    source,
  })?;
  debug!(command = %spec.command, pid = ?child.id(), "function_process_spawned");

  if let Some(mut stdin) = child.stdin.take() {
    let input = format!("{}\n", event);
    match stdin.write_all(input.as_bytes()).await {
      // A process that never reads its event is still allowed to answer.
      Err(e) if e.kind() != ErrorKind::BrokenPipe => return Err(FunctionError::Io(e)),
      _ => {}
    }
  }

  let output = child.wait_with_output().await?;
  let stdout = String::from_utf8_lossy(&output.stdout);
  let stderr = String::from_utf8_lossy(&output.stderr);
  debug!(status = %output.status, "function_process_exited");

  interpret(output.status.success(), output.status.code(), &stdout, &stderr)
}

/// Decide what a finished process returned.
///
/// A clean exit whose stdout parses as JSON is the result, unless it is a
/// Lambda error payload (`{"errorMessage": ...}`). Otherwise the first
/// structured error found on stderr, then stdout, is reported; failing that the
/// raw output becomes the message.
pub(crate) fn interpret(
  success: bool,
  code: Option<i32>,
  stdout: &str,
  stderr: &str,
) -> Result<Value, FunctionError> {
  let stdout = stdout.trim();
  let stderr = stderr.trim();

  if success {
    if let Some(value) = parse_json(stdout) {
      return match lambda_error(&value, false) {
        Some(error) => Err(error),
        None => Ok(value),
      };
    }
  }

  for text in [stderr, stdout] {
    if let Some(error) = parse_json(text).and_then(|value| lambda_error(&value, true)) {
      return Err(error);
    }
  }

  let message = if !stderr.is_empty() {
    stderr.to_string()
  } else if !stdout.is_empty() {
    stdout.to_string()
  } else if success {
    "function returned no output".to_string()
  } else {
    match code {
      Some(code) => format!("function exited with status {}", code),
      None => "function was terminated by a signal".to_string(),
    }
  };

  Err(FunctionError::Exited {
    code,
    message,
    stderr: stderr.to_string(),
  })
}

/// The whole text as JSON, or else its last non-empty line.
fn parse_json(text: &str) -> Option<Value> {
  if text.is_empty() {
    return None;
  }
  serde_json::from_str(text).ok().or_else(|| {
    text
      .lines()
      .rev()
      .find(|line| !line.trim().is_empty())
      .and_then(|line| serde_json::from_str(line.trim()).ok())
  })
}

fn lambda_error(value: &Value, allow_typed: bool) -> Option<FunctionError> {
  let object = value.as_object()?;

  if let Some(message) = object.get("errorMessage").and_then(Value::as_str) {
    return Some(FunctionError::Handler {
      message: message.to_string(),
      error_type: None,
      raw: value.clone(),
    });
  }

  if allow_typed {
    if let Some(message) = object.get("message").and_then(Value::as_str) {
      return Some(FunctionError::Handler {
        message: message.to_string(),
        error_type: object
          .get("errorType")
          .and_then(Value::as_str)
          .map(str::to_string),
        raw: value.clone(),
      });
    }
  }

  None
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_clean_exit_with_json_is_result() {
    let value = interpret(true, Some(0), "log line\n{\"a\":1,\"b\":2,\"c\":3}\n", "").unwrap();
    assert_eq!(value, json!({ "a": 1, "b": 2, "c": 3 }));
  }

  #[test]
  fn test_lambda_error_payload_on_stdout() {
    let err = interpret(
      true,
      Some(0),
      r#"{"errorMessage":"error","errorType":"errorString"}"#,
      "",
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "error");
    assert_eq!(err.error_type(), "Lambda:Unhandled");
    assert_eq!(err.raw()["errorType"], "errorString");
  }

  #[test]
  fn test_typed_error_on_stderr_keeps_type() {
    let err = interpret(
      false,
      Some(1),
      "",
      r#"{"message":"not yours","errorType":"Unauthorized"}"#,
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "not yours");
    assert_eq!(err.error_type(), "Unauthorized");
  }

  #[test]
  fn test_message_shaped_success_is_data() {
    let value = interpret(true, Some(0), r#"{"message":"hi","errorType":"x"}"#, "").unwrap();
    assert_eq!(value["message"], "hi");
  }

  #[test]
  fn test_unstructured_failures() {
    let err = interpret(false, Some(2), "", "Traceback: boom").unwrap_err();
    assert!(matches!(err, FunctionError::Exited { code: Some(2), .. }));
    assert_eq!(err.to_string(), "Traceback: boom");

    let err = interpret(true, Some(0), "", "").unwrap_err();
    assert_eq!(err.to_string(), "function returned no output");

    let err = interpret(false, Some(3), "", "").unwrap_err();
    assert_eq!(err.to_string(), "function exited with status 3");
  }
}
