//! Input document loading and default merging.
//!
//! Schema validation happens upstream; this module only decodes the document,
//! merges batch defaults into each item and runs the structural checks.

use crate::error::{InputError, StructuralError};
use crate::graph::IssueGraph;
use crate::types::{BatchInput, Defaults, Item};
use std::collections::BTreeSet;
use std::path::Path;

impl BatchInput {
    /// Read a JSON document, or YAML when the extension is `.yaml` / `.yml`.
    pub fn from_path(path: &Path) -> Result<Self, InputError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(InputError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            Self::from_yaml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self, InputError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, InputError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Items with batch defaults applied, in input order.
    pub fn resolved_items(&self) -> Vec<Item> {
        self.issues
            .iter()
            .map(|item| apply_defaults(item, self.defaults.as_ref()))
            .collect()
    }

    /// Structural checks plus graph construction.
    ///
    /// Rejects a malformed repository, empty titles, duplicate ids, orphaned
    /// parents and cycles, in that order.
    pub fn build_graph(&self) -> Result<IssueGraph, StructuralError> {
        validate_repository(&self.repository)?;
        if let Some(item) = self.issues.iter().find(|i| i.title.trim().is_empty()) {
            return Err(StructuralError::EmptyTitle(item.id.clone()));
        }
        let graph = IssueGraph::new(self.resolved_items())?;
        graph.validate_references()?;
        graph.topological_sort()?;
        Ok(graph)
    }

    pub fn root_count(&self) -> usize {
        self.issues.iter().filter(|i| i.is_root()).count()
    }
}

/// Item-level fields win over defaults, except labels which are merged.
pub fn apply_defaults(item: &Item, defaults: Option<&Defaults>) -> Item {
    let Some(defaults) = defaults else {
        return item.clone();
    };
    let mut out = item.clone();
    if out.milestone.is_none() {
        out.milestone = defaults.milestone.clone();
    }
    if out.assignees.is_empty() {
        out.assignees = defaults.assignees.clone();
    }
    if out.due_date.is_none() {
        out.due_date = defaults.due_date;
    }
    let labels: BTreeSet<String> = defaults
        .labels
        .iter()
        .chain(item.labels.iter())
        .cloned()
        .collect();
    out.labels = labels.into_iter().collect();
    out
}

/// `owner/repo`, both parts non-blank.
pub fn validate_repository(repository: &str) -> Result<(), StructuralError> {
    let parts: Vec<&str> = repository.split('/').collect();
    if parts.len() == 2 && parts.iter().all(|p| !p.trim().is_empty()) {
        Ok(())
    } else {
        Err(StructuralError::InvalidRepository(repository.to_string()))
    }
}
