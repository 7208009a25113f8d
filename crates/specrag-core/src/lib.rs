//! specrag-core - Core types and traits for the OpenAPI retrieval engine
//!
//! This crate provides the document model (fragments, path documents,
//! component documents), the store and similarity-source traits the engine
//! is built against, configuration, and error handling shared by every
//! other specrag crate.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{RagError, Result};
pub use traits::*;
pub use types::*;
