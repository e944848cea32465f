use serde::{Deserialize, Serialize};

/// How the caller was authorized, as reported by `$util.authType()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthType {
  #[default]
  ApiKey,
  Iam,
  UserPool,
  OpenIdConnect,
  Lambda,
}

impl AuthType {
  pub fn description(&self) -> &'static str {
    match self {
      AuthType::ApiKey => "API Key Authorization",
      AuthType::Iam => "IAM Authorization",
      AuthType::UserPool => "User Pool Authorization",
      AuthType::OpenIdConnect => "Open ID Connect Authorization",
      AuthType::Lambda => "Lambda Authorization",
    }
  }
}
