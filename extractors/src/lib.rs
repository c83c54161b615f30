//! Extractors Crate
//!
//! Abbreviation engines and the file plumbing around them.
//!
//! # Architecture
//!
//! - **Types**: records, the engine trait and error enums live in `shared-types`
//! - **Engines**: the native Ab3P wrapper (loaded at runtime) and a built-in
//!   pattern engine, both driven through `ExtractionEngineHandle`
//! - **Files**: `CorpusReader` streams the input corpus, `IncrementalCsvSink`
//!   appends to the output ledger
//!
//! # Example
//!
//! ```rust,ignore
//! use extractors::{ExtractionEngineHandle, DEFAULT_MAX_RECORDS};
//! use shared_types::EngineSettings;
//!
//! let mut handle = ExtractionEngineHandle::create(&EngineSettings::Pattern)?;
//! let records = handle.extract("heart rate (HR)", DEFAULT_MAX_RECORDS)?;
//! ```

pub mod corpus;
pub mod engine;
pub mod sink;

pub use corpus::{CorpusError, CorpusReader, CorpusRows, DEFAULT_MAX_FIELD_SIZE};
pub use engine::{Ab3pEngine, ExtractionEngineHandle, PatternEngine, DEFAULT_MAX_RECORDS};
pub use sink::{IncrementalCsvSink, LedgerRow, SinkError};

// Re-export the engine trait from shared-types for convenience
pub use shared_types::AbbreviationEngine;
