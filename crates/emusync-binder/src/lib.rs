//! Emusync Binder
//!
//! Turns an [`emusync_config::ApiDef`] into a bound [`emusync_api::Api`]:
//! every data source and function reference is checked, template files are
//! read, and each resolver becomes a [`emusync_api::ResolverDefinition`].

mod binder;
mod error;
mod loader;

pub use binder::{Binder, StandardBinder};
pub use error::BindError;
pub use loader::{FsTemplateLoader, TemplateLoader};
