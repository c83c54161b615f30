use serde::{Deserialize, Serialize};

/// One document of the input corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntry {
    /// Stable key, unique within the corpus and across runs
    pub id: String,
    pub content: String,
}

impl CorpusEntry {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }
}
