//! issuetree core - data model, structural validation, dependency graph, fingerprints

pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod input;
pub mod types;

pub use error::{InputError, StructuralError};
pub use fingerprint::{fingerprint, hash_bytes, hash_file};
pub use graph::IssueGraph;
pub use input::{apply_defaults, validate_repository};
pub use types::*;
