//! Ownership wrapper around a single abbreviation engine instance.
//!
//! The handle is created fresh for every isolated traversal and is never shared
//! across threads. It bounds what is read back from the engine and decodes each
//! record independently so that one bad record does not cost the whole batch.

mod ab3p;
mod pattern;

pub use ab3p::Ab3pEngine;
pub use pattern::PatternEngine;

use shared_types::{
    AbbreviationEngine, AbbreviationRecord, EngineSettings, ExtractionError, RawAbbreviation,
};

/// Default cap on records read back per document
pub const DEFAULT_MAX_RECORDS: usize = 100;

pub struct ExtractionEngineHandle {
    engine: Box<dyn AbbreviationEngine>,
    closed: bool,
}

impl ExtractionEngineHandle {
    pub fn new(engine: Box<dyn AbbreviationEngine>) -> Self {
        Self {
            engine,
            closed: false,
        }
    }

    /// Acquire the engine described by `settings`
    pub fn create(settings: &EngineSettings) -> Result<Self, ExtractionError> {
        let engine: Box<dyn AbbreviationEngine> = match settings {
            EngineSettings::Ab3p { library_path } => Box::new(Ab3pEngine::load(library_path)?),
            EngineSettings::Pattern => Box::new(PatternEngine::new()),
        };
        tracing::info!("Created {} engine", engine.name());
        Ok(Self::new(engine))
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Run one document through the engine, returning at most `max_records`
    /// decoded pairs.
    pub fn extract(
        &mut self,
        text: &str,
        max_records: usize,
    ) -> Result<Vec<AbbreviationRecord>, ExtractionError> {
        if self.closed {
            return Err(ExtractionError::Document(
                "engine handle already destroyed".to_string(),
            ));
        }

        self.engine.add_text(text)?;
        let batch = self.engine.fetch(max_records)?;

        let reported = usize::try_from(batch.reported_count.max(0)).unwrap_or(usize::MAX);
        if reported > max_records {
            tracing::debug!(
                "Engine reported {} records, reading only {}",
                reported,
                max_records
            );
        }
        let readable = reported.min(max_records).min(batch.records.len());

        let mut records = Vec::with_capacity(readable);
        for (index, raw) in batch.records.into_iter().take(readable).enumerate() {
            match decode_record(raw) {
                Ok(record) => records.push(record),
                Err(reason) => tracing::debug!("Dropping record {}: {}", index, reason),
            }
        }

        Ok(records)
    }

    /// Release the engine. Teardown failures are logged, never returned.
    pub fn destroy(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.engine.close() {
            tracing::warn!("Ignoring {} engine teardown failure: {}", self.engine.name(), e);
        }
    }
}

impl Drop for ExtractionEngineHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn decode_text(field: Option<Vec<u8>>, name: &str) -> Result<String, String> {
    let bytes = field.ok_or_else(|| format!("{} is null", name))?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    if text.trim().is_empty() {
        return Err(format!("{} is empty", name));
    }
    Ok(text)
}

fn decode_offset(value: i32, name: &str) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("{} is negative ({})", name, value))
}

/// Convert one raw engine record, rejecting anything outside the record
/// invariants (non-null texts, offsets >= 0, precision within [0, 1]).
pub fn decode_record(raw: RawAbbreviation) -> Result<AbbreviationRecord, String> {
    let short_form = decode_text(raw.short_form, "short form")?;
    let long_form = decode_text(raw.long_form, "long form")?;
    let strategy = raw
        .strategy
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .filter(|s| !s.is_empty());
    let short_form_offset = decode_offset(raw.short_form_offset, "short form offset")?;
    let long_form_offset = decode_offset(raw.long_form_offset, "long form offset")?;

    if !raw.precision.is_finite() || !(0.0..=1.0).contains(&raw.precision) {
        return Err(format!("precision out of range ({})", raw.precision));
    }

    Ok(AbbreviationRecord {
        short_form,
        long_form,
        strategy,
        short_form_offset,
        long_form_offset,
        precision: raw.precision,
    })
}
