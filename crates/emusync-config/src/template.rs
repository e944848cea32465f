use serde::{Deserialize, Serialize};

/// Where a mapping template comes from.
///
/// A plain string is a path relative to the API's mapping templates
/// location; an object with an `inline` key carries the template text.
///
/// ```json
/// { "request": "Query.getPost.request.vtl", "response": { "inline": "$util.toJson($ctx.result)" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateSource {
  Inline { inline: String },
  File(String),
}

impl TemplateSource {
  pub fn inline(text: impl Into<String>) -> Self {
    TemplateSource::Inline {
      inline: text.into(),
    }
  }

  pub fn file(path: impl Into<String>) -> Self {
    TemplateSource::File(path.into())
  }
}
