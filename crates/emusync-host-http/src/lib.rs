//! HTTP host capability for emusync data sources.
//!
//! [`HttpBackend::execute`] serves HTTP data sources using the resolver
//! request shape `{method, resourcePath, params: {query, headers, body}}`.
//! [`HttpBackend::search`] serves search data sources
//! (`{path, operation, params: {body, queryString, headers}}`) over the same client.

mod client;
mod error;

pub use client::HttpBackend;
pub use error::HttpError;
