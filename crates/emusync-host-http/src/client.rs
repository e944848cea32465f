use std::collections::BTreeMap;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};
use url::Url;

use crate::error::HttpError;

/// Expected shape of an HTTP data source request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HttpRequest {
  #[serde(default = "default_get")]
  method: String,
  #[serde(default)]
  resource_path: String,
  #[serde(default)]
  params: HttpParams,
}

#[derive(Debug, Default, Deserialize)]
struct HttpParams {
  #[serde(default)]
  query: Map<String, Value>,
  #[serde(default)]
  headers: Map<String, Value>,
  #[serde(default)]
  body: Option<Value>,
}

/// Expected shape of a search data source request.
#[derive(Debug, Deserialize)]
struct SearchRequest {
  #[serde(default)]
  path: String,
  #[serde(default = "default_post")]
  operation: String,
  #[serde(default)]
  params: SearchParams,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams {
  #[serde(default)]
  body: Option<Value>,
  #[serde(default)]
  query_string: Map<String, Value>,
  #[serde(default)]
  headers: Map<String, Value>,
}

fn default_get() -> String {
  "GET".to_string()
}

fn default_post() -> String {
  "POST".to_string()
}

/// HTTP client shared by every HTTP and search data source.
#[derive(Debug, Clone, Default)]
pub struct HttpBackend {
  client: Client,
}

impl HttpBackend {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_client(client: Client) -> Self {
    Self { client }
  }

  /// Send an HTTP data source request and return `{statusCode, headers, body}`.
  ///
  /// Non-2xx responses are returned as values; the response template decides
  /// what they mean.
  #[instrument(name = "http_execute", skip(self, request), fields(endpoint = %endpoint))]
  pub async fn execute(&self, endpoint: &str, request: &Value) -> Result<Value, HttpError> {
    let input: HttpRequest =
      serde_json::from_value(request.clone()).map_err(|e| HttpError::InvalidRequest {
        field: "request".to_string(),
        message: e.to_string(),
      })?;

    let method = parse_method(&input.method)?;
    let url = build_url(endpoint, &input.resource_path, &input.params.query)?;
    debug!(method = %method, url = %url, "http_request");

    let mut builder = self.client.request(method, url);
    for (name, value) in &input.params.headers {
      builder = builder.header(name.as_str(), scalar_text(value));
    }
    builder = match input.params.body {
      Some(Value::String(text)) => builder.body(text),
      Some(Value::Null) | None => builder,
      Some(other) => {
        let body = serde_json::to_string(&other).map_err(|e| HttpError::InvalidRequest {
          field: "params.body".to_string(),
          message: e.to_string(),
        })?;
        if !has_header(&input.params.headers, CONTENT_TYPE.as_str()) {
          builder = builder.header(CONTENT_TYPE, "application/json");
        }
        builder.body(body)
      }
    };

    let response = builder.send().await?;
    let status = response.status().as_u16();
    let headers: BTreeMap<String, String> = response
      .headers()
      .iter()
      .filter_map(|(k, v)| {
        v.to_str()
          .ok()
          .map(|val| (k.as_str().to_string(), val.to_string()))
      })
      .collect();
    let body = response.text().await?;
    debug!(status, "http_response");

    Ok(json!({
      "statusCode": status,
      "headers": headers,
      "body": body,
    }))
  }

  /// Send a search request and return the parsed JSON response body.
  #[instrument(name = "search_execute", skip(self, request), fields(endpoint = %endpoint))]
  pub async fn search(&self, endpoint: &str, request: &Value) -> Result<Value, HttpError> {
    let input: SearchRequest =
      serde_json::from_value(request.clone()).map_err(|e| HttpError::InvalidRequest {
        field: "request".to_string(),
        message: e.to_string(),
      })?;

    let body = input.params.body.filter(|b| match b {
      Value::Null => false,
      Value::Object(map) => !map.is_empty(),
      _ => true,
    });
    // Search engines accept GET with a body but most clients will not send one.
    let operation = input.operation.to_uppercase();
    let method = if body.is_some() && matches!(operation.as_str(), "GET" | "HEAD") {
      "POST".to_string()
    } else {
      operation
    };

    let mut headers = Map::new();
    headers.insert("Content-Type".to_string(), json!("application/json"));
    headers.extend(input.params.headers);

    let forwarded = json!({
      "method": method,
      "resourcePath": input.path,
      "params": {
        "query": input.params.query_string,
        "headers": headers,
        "body": body.map(|b| match b {
          Value::String(s) => Value::String(s),
          other => Value::String(other.to_string()),
        }),
      },
    });

    let response = self.execute(endpoint, &forwarded).await?;
    let text = response["body"].as_str().unwrap_or_default();
    serde_json::from_str(text).map_err(|e| HttpError::InvalidResponse {
      message: e.to_string(),
    })
  }
}

fn parse_method(method: &str) -> Result<Method, HttpError> {
  match method.to_uppercase().as_str() {
    "GET" => Ok(Method::GET),
    "POST" => Ok(Method::POST),
    "PUT" => Ok(Method::PUT),
    "DELETE" => Ok(Method::DELETE),
    "PATCH" => Ok(Method::PATCH),
    "HEAD" => Ok(Method::HEAD),
    "OPTIONS" => Ok(Method::OPTIONS),
    _ => Err(HttpError::InvalidRequest {
      field: "method".to_string(),
      message: format!("unsupported HTTP method: {}", method),
    }),
  }
}

fn build_url(endpoint: &str, path: &str, query: &Map<String, Value>) -> Result<Url, HttpError> {
  let raw = format!("{}{}", endpoint.trim_end_matches('/'), path);
  let mut url = Url::parse(&raw).map_err(|source| HttpError::InvalidUrl {
    url: raw.clone(),
    source,
  })?;
  if !query.is_empty() {
    let mut pairs = url.query_pairs_mut();
    for (name, value) in query {
      match value {
        Value::Array(items) => {
          for item in items {
            pairs.append_pair(name, &scalar_text(item));
          }
        }
        other => {
          pairs.append_pair(name, &scalar_text(other));
        }
      }
    }
  }
  Ok(url)
}

fn scalar_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

fn has_header(headers: &Map<String, Value>, name: &str) -> bool {
  headers.keys().any(|k| k.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
  use super::*;
  use wiremock::matchers::{body_json, header, method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  #[test]
  fn test_build_url_appends_query() {
    let query = json!({ "q": "a b", "tag": ["x", "y"], "n": 1 });
    let url = build_url("http://localhost:9000/", "/items", query.as_object().unwrap()).unwrap();
    assert_eq!(url.as_str(), "http://localhost:9000/items?q=a+b&tag=x&tag=y&n=1");
  }

  #[test]
  fn test_parse_method_rejects_unknown() {
    assert!(parse_method("get").is_ok());
    assert!(matches!(
      parse_method("BREW"),
      Err(HttpError::InvalidRequest { .. })
    ));
  }

  #[tokio::test]
  async fn test_execute_returns_status_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/posts"))
      .and(query_param("draft", "true"))
      .and(header("x-api-key", "secret"))
      .and(body_json(json!({ "title": "Hello" })))
      .respond_with(
        ResponseTemplate::new(201)
          .insert_header("x-request-id", "abc")
          .set_body_string(r#"{"id":"1"}"#),
      )
      .mount(&server)
      .await;

    let backend = HttpBackend::new();
    let response = backend
      .execute(
        &server.uri(),
        &json!({
          "version": "2018-05-29",
          "method": "POST",
          "resourcePath": "/posts",
          "params": {
            "query": { "draft": "true" },
            "headers": { "x-api-key": "secret" },
            "body": { "title": "Hello" }
          }
        }),
      )
      .await
      .unwrap();

    assert_eq!(response["statusCode"], 201);
    assert_eq!(response["headers"]["x-request-id"], "abc");
    assert_eq!(response["body"], r#"{"id":"1"}"#);
  }

  #[tokio::test]
  async fn test_execute_keeps_error_status_as_value() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
      .mount(&server)
      .await;

    let response = HttpBackend::new()
      .execute(&server.uri(), &json!({ "method": "GET", "resourcePath": "/nope" }))
      .await
      .unwrap();

    assert_eq!(response["statusCode"], 404);
    assert_eq!(response["body"], "missing");
  }

  #[tokio::test]
  async fn test_transport_failure_is_request_failed() {
    let err = HttpBackend::new()
      .execute("http://127.0.0.1:1", &json!({ "resourcePath": "/" }))
      .await
      .unwrap_err();
    assert_eq!(err.error_type(), "HTTP:RequestFailed");
  }

  #[tokio::test]
  async fn test_search_get_with_body_is_sent_as_post() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/posts/_search"))
      .and(header("content-type", "application/json"))
      .and(body_json(json!({ "query": { "match_all": {} } })))
      .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"hits":{"total":0,"hits":[]}}"#))
      .mount(&server)
      .await;

    let result = HttpBackend::new()
      .search(
        &server.uri(),
        &json!({
          "version": "2017-02-28",
          "operation": "GET",
          "path": "/posts/_search",
          "params": { "body": { "query": { "match_all": {} } } }
        }),
      )
      .await
      .unwrap();

    assert_eq!(result, json!({ "hits": { "total": 0, "hits": [] } }));
  }
}
