use serde::{Deserialize, Serialize};

/// Core trait that every abbreviation engine must implement.
///
/// Engines are stateful and not reentrant: text is pushed into an internal
/// buffer with `add_text` and the detected pairs are read back with `fetch`.
/// Callers must not share one engine between threads.
pub trait AbbreviationEngine {
    /// Feed one document into the engine's buffer
    fn add_text(&mut self, text: &str) -> Result<(), ExtractionError>;

    /// Read back the pairs detected for the buffered text, using at most
    /// `capacity` output slots
    fn fetch(&mut self, capacity: usize) -> Result<RawBatch, ExtractionError>;

    /// Release the underlying resource. Called at most once.
    fn close(&mut self) -> Result<(), ExtractionError> {
        Ok(())
    }

    /// Short name used in logs
    fn name(&self) -> &str;
}

/// Extraction error types
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Engine initialization failed: {0}")]
    EngineInit(String),

    #[error("Document extraction failed: {0}")]
    Document(String),

    #[error("Engine teardown failed: {0}")]
    Teardown(String),
}

/// One short-form/long-form pair found in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbbreviationRecord {
    pub short_form: String,
    pub long_form: String,
    #[serde(default)]
    pub strategy: Option<String>,
    pub short_form_offset: u32,
    pub long_form_offset: u32,
    pub precision: f64,
}

/// Engine output before decoding. Null string pointers are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawAbbreviation {
    pub short_form: Option<Vec<u8>>,
    pub long_form: Option<Vec<u8>>,
    pub strategy: Option<Vec<u8>>,
    pub short_form_offset: i32,
    pub long_form_offset: i32,
    pub precision: f64,
}

/// What the engine handed back for one `fetch`: the count it claims to have
/// produced and the slots that were actually read.
#[derive(Debug, Clone, Default)]
pub struct RawBatch {
    pub reported_count: i64,
    pub records: Vec<RawAbbreviation>,
}

impl RawBatch {
    pub fn new(records: Vec<RawAbbreviation>) -> Self {
        Self {
            reported_count: records.len() as i64,
            records,
        }
    }
}
