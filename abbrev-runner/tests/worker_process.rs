use abbrev_runner::{
    IsolatedExecutor, IsolationError, Isolation, ProcessIsolation, WorkerCommand,
};
use shared_types::{EngineSettings, TraversalSettings};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

const BIN: &str = env!("CARGO_BIN_EXE_abbrev-runner");

const CORPUS: &str = "id,content\n\
    1,Patients with chronic kidney disease (CKD) were enrolled.\n\
    2,No abbreviations in this abstract.\n\
    3,Heart rate (HR) and blood pressure (BP) were recorded.\n";

fn settings(dir: &Path) -> TraversalSettings {
    let corpus_path = dir.join("source.csv");
    std::fs::write(&corpus_path, CORPUS).unwrap();
    TraversalSettings {
        corpus_path,
        output_path: dir.join("result.csv"),
        id_column: "id".to_string(),
        content_column: "content".to_string(),
        max_field_size: 5_000_000,
        max_records: 100,
        engine: EngineSettings::Pattern,
    }
}

fn ledger(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

fn worker_isolation() -> ProcessIsolation {
    ProcessIsolation::new(
        IsolatedExecutor::default(),
        WorkerCommand::new(BIN).arg("worker"),
    )
}

#[tokio::test]
async fn test_worker_process_traverses_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path());

    let summary = worker_isolation()
        .run_traversal(&settings, Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(summary.processed_count, 3);
    assert_eq!(summary.emitted_entries, 2);
    assert_eq!(summary.emitted_rows, 3);

    let rows = ledger(&settings.output_path);
    let pairs: Vec<_> = rows
        .iter()
        .map(|r| (r[0].as_str(), r[1].as_str(), r[2].as_str()))
        .collect();
    assert_eq!(
        pairs,
        [
            ("1", "CKD", "chronic kidney disease"),
            ("3", "HR", "Heart rate"),
            ("3", "BP", "blood pressure"),
        ]
    );
}

#[tokio::test]
async fn test_worker_process_reports_engine_init_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = settings(dir.path());
    settings.engine = EngineSettings::Ab3p {
        library_path: dir.path().join("libAb3PWrapper.so"),
    };

    let err = worker_isolation()
        .run_traversal(&settings, Duration::from_secs(60))
        .await
        .unwrap_err();

    match err {
        IsolationError::Crashed(diagnostic) => {
            assert!(diagnostic.contains("Failed to create extraction engine"));
        }
        other => panic!("Expected Crashed, got {:?}", other),
    }
}

#[test]
fn test_run_command_completes_batch() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path());
    let config_path = dir.path().join("runner.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[corpus]
path = "{}"

[output]
path = "{}"

[engine]
kind = "pattern"

[runner]
timeout_secs = 60
max_attempts = 3
"#,
            settings.corpus_path.display(),
            settings.output_path.display()
        ),
    )
    .unwrap();

    for _ in 0..2 {
        let status = Command::new(BIN)
            .arg("--config")
            .arg(&config_path)
            .arg("run")
            .status()
            .unwrap();
        assert!(status.success());
    }

    // Second run appends below the existing header
    let content = std::fs::read_to_string(&settings.output_path).unwrap();
    assert_eq!(content.matches("short_form").count(), 1);
    assert_eq!(ledger(&settings.output_path).len(), 6);
}
