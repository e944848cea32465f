use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use emusync_binder::{Binder, FsTemplateLoader, StandardBinder};
use emusync_config::ApiDef;
use emusync_context::{FieldRequest, InvocationContext};
use emusync_datasource::Dispatcher;
use emusync_runtime::Runtime;
use emusync_template::Evaluator;

/// Emusync - local emulator for AppSync resolvers
#[derive(Parser)]
#[command(name = "emusync")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Resolve one field of an API definition. Arguments are read from stdin.
  Resolve {
    /// Path to the API definition (JSON)
    api_file: PathBuf,

    /// Parent type of the field, e.g. Query
    #[arg(long = "type")]
    type_name: String,

    /// Field name
    #[arg(long)]
    field: String,

    /// Read a full field request (arguments, source, identity, ...) from stdin
    #[arg(long)]
    request: bool,
  },

  /// Render a single mapping template. The context is read from stdin.
  Render {
    /// Path to the template file
    template_file: PathBuf,
  },
}

/// Context accepted by `render`: a field request plus the stage state.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderInput {
  #[serde(flatten)]
  request: FieldRequest,
  #[serde(default)]
  result: Value,
  #[serde(default)]
  prev: Value,
  #[serde(default)]
  stash: Map<String, Value>,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_env("EMUSYNC_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(io::stderr)
    .init();

  match cli.command {
    Some(Commands::Resolve {
      api_file,
      type_name,
      field,
      request,
    }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async { resolve(api_file, type_name, field, request).await })?;
    }
    Some(Commands::Render { template_file }) => {
      render(template_file)?;
    }
    None => {
      println!("emusync - use --help to see available commands");
    }
  }

  Ok(())
}

async fn resolve(api_file: PathBuf, type_name: String, field: String, full_request: bool) -> Result<()> {
  let content = tokio::fs::read_to_string(&api_file)
    .await
    .with_context(|| format!("failed to read api file: {}", api_file.display()))?;
  let def = ApiDef::from_json(&content)
    .with_context(|| format!("failed to parse api file: {}", api_file.display()))?;

  let loader = FsTemplateLoader::for_definition(&api_file, &def.mapping_templates_location);
  let api = StandardBinder::new(loader)
    .bind(def)
    .await
    .context("failed to bind api")?;
  info!(
    api = %api_file.display(),
    data_sources = api.data_sources.len(),
    resolvers = api.resolvers().count(),
    "api_loaded"
  );

  let input = read_json_from_stdin()?;
  let request = if full_request {
    let mut request: FieldRequest =
      serde_json::from_value(input).context("failed to parse field request from stdin")?;
    request.info.parent_type_name = type_name;
    request.info.field_name = field;
    request
  } else {
    FieldRequest::new(type_name, field).with_arguments(input)
  };

  let mut dispatcher = Dispatcher::new(api.data_sources.clone());
  if let Some(timeout_ms) = api.default_timeout_ms {
    dispatcher = dispatcher.with_default_timeout(Duration::from_millis(timeout_ms));
  }
  let runtime = Runtime::new(dispatcher);

  let cancel = CancellationToken::new();
  let result = runtime
    .resolve(&api, request, cancel)
    .await
    .context("field resolution failed")?;
  if result.is_ok() {
    info!("field_resolved");
  } else {
    warn!(errors = result.errors.len(), "field_resolved_with_errors");
  }

  println!("{}", serde_json::to_string_pretty(&result)?);

  Ok(())
}

fn render(template_file: PathBuf) -> Result<()> {
  let template = std::fs::read_to_string(&template_file)
    .with_context(|| format!("failed to read template file: {}", template_file.display()))?;

  let input: RenderInput =
    serde_json::from_value(read_json_from_stdin()?).context("failed to parse context from stdin")?;
  let output = render_template(&template, input);
  println!("{}", serde_json::to_string_pretty(&output)?);

  Ok(())
}

fn render_template(template: &str, input: RenderInput) -> Value {
  let mut ctx = InvocationContext::new(input.request);
  ctx.result = input.result;
  ctx.prev = input.prev;
  ctx.stash = input.stash;

  let outcome = Evaluator::new().evaluate(template, &mut ctx);
  info!(
    parent_type = %ctx.info.parent_type_name,
    field = %ctx.info.field_name,
    "template_rendered"
  );

  serde_json::json!({
    "outcome": outcome,
    "stash": ctx.stash,
  })
}

fn read_json_from_stdin() -> Result<Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(serde_json::json!({}));
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read stdin")?;

  if input.trim().is_empty() {
    Ok(serde_json::json!({}))
  } else {
    serde_json::from_str(&input).context("failed to parse JSON from stdin")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{Arc, Mutex};

  #[derive(Clone, Default)]
  struct Captured(Arc<Mutex<Vec<u8>>>);

  impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
      self.0.lock().unwrap().extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
      Ok(())
    }
  }

  #[test]
  fn test_render_template_logs_and_returns_stash() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
      .with_writer(move || writer.clone())
      .with_ansi(false)
      .finish();

    let input: RenderInput = serde_json::from_value(serde_json::json!({
      "info": { "parentTypeName": "Query", "fieldName": "getPost" },
      "arguments": { "id": "1" },
      "stash": { "seen": 1 }
    }))
    .unwrap();
    let output = tracing::subscriber::with_default(subscriber, || {
      render_template(r#"$util.qr($ctx.stash.put("id", $ctx.args.id)) { "ok": true }"#, input)
    });

    assert_eq!(output["outcome"]["outcome"], "rendered");
    assert_eq!(output["outcome"]["value"], serde_json::json!({ "ok": true }));
    assert_eq!(output["stash"], serde_json::json!({ "seen": 1, "id": "1" }));

    let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
    assert!(logs.contains("template_rendered"), "missing event in {}", logs);
    assert!(logs.contains("getPost"), "missing field in {}", logs);
  }
}
