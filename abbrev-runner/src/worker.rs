//! The isolated unit of work: one full pass over the corpus.
//!
//! Runs inside the child process started by the executor. Every pass starts at
//! the first corpus row; the output ledger is the only thing that survives a
//! restart.

use anyhow::{Context, Result};
use extractors::{CorpusReader, ExtractionEngineHandle, IncrementalCsvSink, LedgerRow};
use shared_types::{
    ExtractionError, TraversalSettings, TraversalSummary, WorkerReport, OUTPUT_COLUMNS,
};
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::io::{Read, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Once;

/// Traverse the corpus, appending each entry's records to the ledger as one
/// group. Entries that fail to extract count as empty.
pub fn traverse_corpus<F>(settings: &TraversalSettings, open_engine: F) -> Result<TraversalSummary>
where
    F: FnOnce() -> Result<ExtractionEngineHandle, ExtractionError>,
{
    tracing::info!("Starting corpus traversal of {:?}", settings.corpus_path);

    let mut sink = IncrementalCsvSink::open(&settings.output_path)
        .with_context(|| format!("Failed to open output at {:?}", settings.output_path))?;
    if sink.write_header(&OUTPUT_COLUMNS)? {
        tracing::info!("Created output ledger at {:?}", sink.path());
    }

    let mut engine = open_engine().context("Failed to create extraction engine")?;

    let rows = CorpusReader::new(&settings.id_column, &settings.content_column)
        .with_max_field_size(settings.max_field_size)
        .open(&settings.corpus_path)
        .with_context(|| format!("Failed to open corpus at {:?}", settings.corpus_path))?;

    let mut summary = TraversalSummary::default();

    for (idx, row) in rows.enumerate() {
        let entry = match row {
            Ok(entry) => entry,
            Err(e) if e.is_row_error() => {
                tracing::warn!("Skipping corpus row {}: {}", idx, e);
                summary.skipped_rows += 1;
                continue;
            }
            Err(e) => return Err(e).context("Corpus read failed"),
        };

        tracing::info!("idx={}, id={}", idx, entry.id);
        summary.processed_count += 1;

        let records = match engine.extract(&entry.content, settings.max_records) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Extraction failed for {}, treating as empty: {}", entry.id, e);
                summary.failed_entries += 1;
                Vec::new()
            }
        };

        if records.is_empty() {
            continue;
        }

        let written = sink
            .append_rows(records.iter().map(|record| LedgerRow::new(&entry.id, record)))
            .with_context(|| format!("Failed to append rows for {}", entry.id))?;
        summary.emitted_entries += 1;
        summary.emitted_rows += written as u64;
    }

    engine.destroy();

    tracing::info!(
        "Traversal finished: {} entries, {} rows written, {} failed, {} skipped",
        summary.processed_count,
        summary.emitted_rows,
        summary.failed_entries,
        summary.skipped_rows
    );

    Ok(summary)
}

thread_local! {
    static PANIC_DIAGNOSTIC: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Record panic message and backtrace so they can be reported instead of lost
fn install_panic_capture() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture();
            PANIC_DIAGNOSTIC.with(|slot| {
                if let Ok(mut slot) = slot.try_borrow_mut() {
                    *slot = Some(format!("{}\n\nstack backtrace:\n{}", info, trace));
                }
            });
            previous(info);
        }));
    });
}

fn run_settings(input: impl Read) -> Result<TraversalSummary> {
    let mut raw = String::new();
    let mut input = input;
    input
        .read_to_string(&mut raw)
        .context("Failed to read traversal settings")?;
    let settings: TraversalSettings =
        serde_json::from_str(raw.trim()).context("Invalid traversal settings")?;

    traverse_corpus(&settings, || ExtractionEngineHandle::create(&settings.engine))
}

/// Child-process entry: read settings from `input`, traverse, and write exactly
/// one report line to `output`. Returns whether the traversal succeeded.
pub fn run_worker(input: impl Read, mut output: impl Write) -> std::io::Result<bool> {
    install_panic_capture();
    PANIC_DIAGNOSTIC.with(|slot| slot.borrow_mut().take());

    let report = match catch_unwind(AssertUnwindSafe(|| run_settings(input))) {
        Ok(Ok(summary)) => WorkerReport::Success { result: summary },
        Ok(Err(e)) => WorkerReport::Failure {
            diagnostic: format!("{:?}", e),
        },
        Err(payload) => {
            let diagnostic = PANIC_DIAGNOSTIC
                .with(|slot| slot.borrow_mut().take())
                .unwrap_or_else(|| panic_message(payload.as_ref()));
            WorkerReport::Failure { diagnostic }
        }
    };

    let succeeded = matches!(report, WorkerReport::Success { .. });
    let line = serde_json::to_string(&report).map_err(std::io::Error::other)?;
    // Start on a fresh line in case native code left one unterminated
    writeln!(output)?;
    writeln!(output, "{}", line)?;
    output.flush()?;

    Ok(succeeded)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {}", s)
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extractors::PatternEngine;
    use shared_types::{AbbreviationEngine, EngineSettings, RawBatch};
    use std::path::Path;

    fn settings(dir: &Path, corpus: &str) -> TraversalSettings {
        let corpus_path = dir.join("source.csv");
        std::fs::write(&corpus_path, corpus).unwrap();
        TraversalSettings {
            corpus_path,
            output_path: dir.join("result.csv"),
            id_column: "id".to_string(),
            content_column: "content".to_string(),
            max_field_size: 1_000,
            max_records: 100,
            engine: EngineSettings::Pattern,
        }
    }

    fn ledger_ids(path: &Path) -> Vec<String> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        reader
            .records()
            .map(|r| r.unwrap().get(0).unwrap().to_string())
            .collect()
    }

    /// Pattern engine that refuses documents containing a marker
    struct RefusingEngine {
        inner: PatternEngine,
        refuse: &'static str,
    }

    impl AbbreviationEngine for RefusingEngine {
        fn add_text(&mut self, text: &str) -> Result<(), ExtractionError> {
            if text.contains(self.refuse) {
                return Err(ExtractionError::Document("unparseable".to_string()));
            }
            self.inner.add_text(text)
        }

        fn fetch(&mut self, capacity: usize) -> Result<RawBatch, ExtractionError> {
            self.inner.fetch(capacity)
        }

        fn name(&self) -> &str {
            "refusing"
        }
    }

    fn pattern_engine() -> Result<ExtractionEngineHandle, ExtractionError> {
        ExtractionEngineHandle::create(&EngineSettings::Pattern)
    }

    #[test]
    fn test_rows_follow_corpus_order() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(
            dir.path(),
            "id,content\n\
             a,heart rate (HR)\n\
             b,body mass index (BMI) and blood pressure (BP)\n\
             c,computed tomography (CT)\n",
        );

        let summary = traverse_corpus(&settings, pattern_engine).unwrap();

        assert_eq!(summary.processed_count, 3);
        assert_eq!(summary.emitted_entries, 3);
        assert_eq!(summary.emitted_rows, 4);
        assert_eq!(ledger_ids(&settings.output_path), ["a", "b", "b", "c"]);
    }

    #[test]
    fn test_zero_record_documents_emit_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(
            dir.path(),
            "id,content\n1,nothing to see\n2,heart rate (HR)\n3,still nothing\n",
        );

        let summary = traverse_corpus(&settings, pattern_engine).unwrap();

        assert_eq!(summary.processed_count, 3);
        assert_eq!(summary.emitted_entries, 1);
        assert_eq!(ledger_ids(&settings.output_path), ["2"]);
    }

    #[test]
    fn test_document_errors_are_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(
            dir.path(),
            "id,content\n1,heart rate (HR)\n2,POISON blood pressure (BP)\n3,body mass index (BMI)\n",
        );

        let summary = traverse_corpus(&settings, || {
            Ok(ExtractionEngineHandle::new(Box::new(RefusingEngine {
                inner: PatternEngine::new(),
                refuse: "POISON",
            })))
        })
        .unwrap();

        assert_eq!(summary.failed_entries, 1);
        assert_eq!(ledger_ids(&settings.output_path), ["1", "3"]);
    }

    #[test]
    fn test_oversized_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let long = format!("heart rate (HR) {}", "x".repeat(2_000));
        let settings = settings(
            dir.path(),
            &format!("id,content\n1,{}\n2,blood pressure (BP)\n", long),
        );

        let summary = traverse_corpus(&settings, pattern_engine).unwrap();

        assert_eq!(summary.skipped_rows, 1);
        assert_eq!(ledger_ids(&settings.output_path), ["2"]);
    }

    #[test]
    fn test_rerun_appends_duplicates_under_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), "id,content\n1,heart rate (HR)\n");

        traverse_corpus(&settings, pattern_engine).unwrap();
        traverse_corpus(&settings, pattern_engine).unwrap();

        let content = std::fs::read_to_string(&settings.output_path).unwrap();
        assert_eq!(content.matches("short_form").count(), 1);
        assert_eq!(ledger_ids(&settings.output_path), ["1", "1"]);
    }

    #[test]
    fn test_engine_init_failure_fails_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), "id,content\n1,heart rate (HR)\n");

        let err = traverse_corpus(&settings, || {
            Err(ExtractionError::EngineInit("no library".to_string()))
        })
        .unwrap_err();

        assert!(format!("{:?}", err).contains("no library"));
    }

    #[test]
    fn test_run_worker_reports_success() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), "id,content\n1,heart rate (HR)\n");
        let input = serde_json::to_vec(&settings).unwrap();
        let mut output = Vec::new();

        assert!(run_worker(input.as_slice(), &mut output).unwrap());
        assert!(output.starts_with(b"\n{\"status\""));

        let report: WorkerReport<TraversalSummary> = serde_json::from_slice(&output).unwrap();
        let summary = report.into_result().unwrap();
        assert_eq!(summary.emitted_rows, 1);
    }

    #[test]
    fn test_run_worker_reports_failure_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path(), "id,content\n");
        settings.corpus_path = dir.path().join("missing.csv");
        let input = serde_json::to_vec(&settings).unwrap();
        let mut output = Vec::new();

        assert!(!run_worker(input.as_slice(), &mut output).unwrap());

        let report: WorkerReport<TraversalSummary> = serde_json::from_slice(&output).unwrap();
        let diagnostic = report.into_result().unwrap_err();
        assert!(diagnostic.contains("Failed to open corpus"));
    }

    #[test]
    fn test_run_worker_rejects_garbage_settings() {
        let mut output = Vec::new();
        assert!(!run_worker("not json".as_bytes(), &mut output).unwrap());
        let report: WorkerReport<TraversalSummary> = serde_json::from_slice(&output).unwrap();
        assert!(report.into_result().unwrap_err().contains("Invalid traversal settings"));
    }
}
