pub mod abbreviation;
pub mod batch;
pub mod corpus;

pub use abbreviation::{
    AbbreviationEngine, AbbreviationRecord, ExtractionError, RawAbbreviation, RawBatch,
};
pub use batch::{EngineSettings, TraversalSettings, TraversalSummary, WorkerReport};
pub use corpus::CorpusEntry;

/// Column layout of the output ledger
pub const OUTPUT_COLUMNS: [&str; 6] = [
    "id",
    "short_form",
    "long_form",
    "short_form_offset",
    "long_form_offset",
    "precision",
];
