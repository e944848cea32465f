//! Parsed template caching.
//!
//! Templates are parsed once per distinct source text. Each evaluation walks
//! the shared tree with its own fresh interpreter state.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::ast::Node;
use crate::error::TemplateError;
use crate::parser;

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
  nodes: Vec<Node>,
}

impl Template {
  pub fn parse(source: &str) -> Result<Self, TemplateError> {
    Ok(Self {
      nodes: parser::parse(source)?,
    })
  }

  pub(crate) fn nodes(&self) -> &[Node] {
    &self.nodes
  }
}

/// Caches parsed templates keyed by their source text.
#[derive(Clone)]
pub struct TemplateCache {
  cache: Arc<RwLock<HashMap<String, Arc<Template>>>>,
}

impl TemplateCache {
  pub fn new() -> Self {
    Self {
      cache: Arc::new(RwLock::new(HashMap::new())),
    }
  }

  /// Get a parsed template from cache, or parse and cache it.
  ///
  /// Sources that fail to parse are not cached.
  pub fn get_or_compile(&self, source: &str) -> Result<Arc<Template>, TemplateError> {
    {
      let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
      if let Some(template) = cache.get(source) {
        return Ok(template.clone());
      }
    }

    let template = Arc::new(Template::parse(source)?);

    {
      let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
      cache.insert(source.to_string(), template.clone());
    }

    Ok(template)
  }

  pub fn len(&self) -> usize {
    self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Clear the cache.
  pub fn clear(&self) {
    let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
    cache.clear();
  }
}

impl Default for TemplateCache {
  fn default() -> Self {
    Self::new()
  }
}
