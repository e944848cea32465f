use std::path::{Path, PathBuf};

use async_trait::async_trait;
use emusync_config::TemplateSource;
use tokio::fs;

use crate::error::BindError;

/// Produces template text for a [`TemplateSource`].
#[async_trait]
pub trait TemplateLoader: Send + Sync {
  async fn load(&self, source: &TemplateSource) -> Result<String, BindError>;
}

/// Reads template files from a directory on disk.
///
/// Paths are relative to `root`, normally the definition file's directory
/// joined with its `mappingTemplatesLocation`. Absolute paths are used as-is.
pub struct FsTemplateLoader {
  root: PathBuf,
}

impl FsTemplateLoader {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Loader for an API definition stored at `definition_path`.
  pub fn for_definition(definition_path: &Path, mapping_templates_location: &str) -> Self {
    let base = definition_path.parent().unwrap_or_else(|| Path::new("."));
    Self::new(base.join(mapping_templates_location))
  }

  pub fn root(&self) -> &Path {
    &self.root
  }
}

#[async_trait]
impl TemplateLoader for FsTemplateLoader {
  async fn load(&self, source: &TemplateSource) -> Result<String, BindError> {
    match source {
      TemplateSource::Inline { inline } => Ok(inline.clone()),
      TemplateSource::File(path) => {
        let path = self.root.join(path);
        fs::read_to_string(&path)
          .await
          .map_err(|source| BindError::Template { path, source })
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_inline_template() {
    let loader = FsTemplateLoader::new("/nonexistent");
    let text = loader.load(&TemplateSource::inline("$ctx.args")).await.unwrap();
    assert_eq!(text, "$ctx.args");
  }

  #[tokio::test]
  async fn test_file_template() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Query.getPost.request.vtl"), "{}").unwrap();

    let loader = FsTemplateLoader::new(dir.path());
    let text = loader
      .load(&TemplateSource::file("Query.getPost.request.vtl"))
      .await
      .unwrap();
    assert_eq!(text, "{}");
  }

  #[tokio::test]
  async fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let loader = FsTemplateLoader::new(dir.path());
    let err = loader.load(&TemplateSource::file("nope.vtl")).await.unwrap_err();
    assert!(matches!(err, BindError::Template { .. }));
  }

  #[test]
  fn test_for_definition_root() {
    let loader = FsTemplateLoader::for_definition(Path::new("/apis/blog/api.json"), "mapping-templates");
    assert_eq!(loader.root(), Path::new("/apis/blog/mapping-templates"));
  }
}
