//! Error types for the batch model

use thiserror::Error;

/// Problems with the shape of a batch. Always raised before any external call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("circular dependency detected involving issue '{id}'")]
    Cycle { id: String },

    #[error("issue '{id}' references non-existent parent '{parent_id}'")]
    OrphanedParent { id: String, parent_id: String },

    #[error("duplicate issue id: {0}")]
    DuplicateId(String),

    #[error("issue '{0}' has an empty title")]
    EmptyTitle(String),

    #[error("invalid repository '{0}': expected owner/repo")]
    InvalidRepository(String),
}

impl StructuralError {
    pub fn cycle(id: impl Into<String>) -> Self {
        Self::Cycle { id: id.into() }
    }

    pub fn orphaned(id: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self::OrphanedParent {
            id: id.into(),
            parent_id: parent_id.into(),
        }
    }
}

/// Failure to read or decode an input document.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("input file not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON in input file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML in input file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Structural(#[from] StructuralError),
}
