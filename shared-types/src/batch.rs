use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Counters reported by one complete corpus traversal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalSummary {
    /// Corpus entries handed to the engine
    pub processed_count: u64,
    /// Entries that produced at least one output row
    pub emitted_entries: u64,
    pub emitted_rows: u64,
    /// Entries whose extraction failed and were treated as empty
    pub failed_entries: u64,
    /// Corpus rows that could not be read (malformed or oversized)
    pub skipped_rows: u64,
}

/// Envelope written by an isolated worker on its result channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum WorkerReport<T> {
    Success { result: T },
    Failure { diagnostic: String },
}

impl<T> WorkerReport<T> {
    pub fn into_result(self) -> Result<T, String> {
        match self {
            WorkerReport::Success { result } => Ok(result),
            WorkerReport::Failure { diagnostic } => Err(diagnostic),
        }
    }
}

/// Which engine a worker should instantiate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EngineSettings {
    /// Native Ab3P wrapper loaded at runtime
    Ab3p { library_path: PathBuf },
    /// Built-in regex detector
    Pattern,
}

/// Job description sent from the supervisor to a worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraversalSettings {
    pub corpus_path: PathBuf,
    pub output_path: PathBuf,
    pub id_column: String,
    pub content_column: String,
    pub max_field_size: usize,
    pub max_records: usize,
    pub engine: EngineSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_report_wire_format() {
        let report: WorkerReport<TraversalSummary> = WorkerReport::Success {
            result: TraversalSummary {
                processed_count: 3,
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["result"]["processed_count"], 3);

        let failure: WorkerReport<TraversalSummary> =
            serde_json::from_str(r#"{"status":"failure","diagnostic":"boom"}"#).unwrap();
        assert_eq!(failure.into_result(), Err("boom".to_string()));
    }

    #[test]
    fn test_engine_settings_tagging() {
        let json = serde_json::to_string(&EngineSettings::Pattern).unwrap();
        assert_eq!(json, r#"{"kind":"pattern"}"#);

        let native: EngineSettings =
            serde_json::from_str(r#"{"kind":"ab3p","library_path":"libAb3PWrapper.so"}"#)
                .unwrap();
        assert_eq!(
            native,
            EngineSettings::Ab3p {
                library_path: PathBuf::from("libAb3PWrapper.so")
            }
        );
    }
}
