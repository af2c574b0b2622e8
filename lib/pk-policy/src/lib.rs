//! Declarative `.policy` file loading.
//!
//! This crate owns the on-disk action-declaration format: parsing
//! individual `.policy` XML files ([`parser`]), the in-memory action
//! shape ([`model`]), and the indexed, load-order-preserving cache built
//! from an entire policy directory ([`cache`]).

pub mod cache;
pub mod error;
pub mod model;
pub mod parser;

pub use cache::PolicyCache;
pub use error::PolicyLoadError;
pub use model::{ActionDecl, Defaults, Diagnostic, LocalizedText};
pub use parser::parse_policy_file;
