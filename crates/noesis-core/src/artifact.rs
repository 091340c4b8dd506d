//! File artifacts
//!
//! Stored outputs of an execution, indexed by filename and by workflow.
//! The metadata and the index entries are written as a pair with rollback
//! semantics in the executor's artifact store.

use crate::types::{now, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata for one stored execution output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileArtifact {
    /// Unique identifier
    pub id: Uuid,

    pub filename: String,

    /// Content length in bytes
    pub size: u64,

    pub content_type: String,

    /// Workflow that produced the file
    pub workflow_id: Uuid,

    pub created_at: Timestamp,
}

impl FileArtifact {
    pub fn new(filename: impl Into<String>, content: &str, workflow_id: Uuid) -> Self {
        let filename = filename.into();
        let content_type = guess_content_type(&filename);
        Self {
            id: Uuid::new_v4(),
            filename,
            size: content.len() as u64,
            content_type,
            workflow_id,
            created_at: now(),
        }
    }
}

fn guess_content_type(filename: &str) -> String {
    let ext = filename.rsplit('.').next().unwrap_or_default();
    match ext {
        "json" => "application/json",
        "md" => "text/markdown",
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "py" => "text/x-python",
        "rs" => "text/x-rust",
        "html" => "text/html",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_guessing() {
        let a = FileArtifact::new("report.md", "# hi", Uuid::new_v4());
        assert_eq!(a.content_type, "text/markdown");
        assert_eq!(a.size, 4);

        let b = FileArtifact::new("data.bin", "xx", Uuid::new_v4());
        assert_eq!(b.content_type, "application/octet-stream");
    }
}
