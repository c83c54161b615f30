use config::{Config, ConfigError, Environment, File};
use extractors::{DEFAULT_MAX_FIELD_SIZE, DEFAULT_MAX_RECORDS};
use serde::{Deserialize, Serialize};
use shared_types::{EngineSettings, TraversalSettings};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct RunnerConfig {
    pub corpus: CorpusConfig,
    pub output: OutputConfig,
    pub engine: EngineConfig,
    pub runner: SupervisorConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CorpusConfig {
    pub path: PathBuf,
    pub id_column: String,
    pub content_column: String,
    pub max_field_size: usize,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("source.csv"),
            id_column: "id".to_string(),
            content_column: "content".to_string(),
            max_field_size: DEFAULT_MAX_FIELD_SIZE,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("result.csv"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    Ab3p,
    Pattern,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,
    pub library_path: PathBuf,
    pub max_records: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Ab3p,
            library_path: PathBuf::from("libAb3PWrapper.so"),
            max_records: DEFAULT_MAX_RECORDS,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SupervisorConfig {
    pub timeout_secs: u64,
    pub grace_millis: u64,
    /// Unset means retry until a traversal succeeds
    pub max_attempts: Option<u32>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 1800,
            grace_millis: 1000,
            max_attempts: None,
        }
    }
}

impl SupervisorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_millis)
    }
}

impl RunnerConfig {
    /// Load from `path` when given, otherwise from the default location if
    /// present. `ABBREV_RUNNER__SECTION__KEY` variables override either.
    pub fn load(path: Option<&Path>) -> Result<(Self, PathBuf), ConfigError> {
        let (config_path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (get_config_path(), false),
        };

        let builder = Config::builder()
            .add_source(File::from(config_path.clone()).required(required))
            .add_source(
                Environment::with_prefix("ABBREV_RUNNER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: RunnerConfig = builder.try_deserialize()?;

        Ok((config, config_path))
    }

    pub fn traversal_settings(&self) -> TraversalSettings {
        let engine = match self.engine.kind {
            EngineKind::Ab3p => EngineSettings::Ab3p {
                library_path: self.engine.library_path.clone(),
            },
            EngineKind::Pattern => EngineSettings::Pattern,
        };

        TraversalSettings {
            corpus_path: self.corpus.path.clone(),
            output_path: self.output.path.clone(),
            id_column: self.corpus.id_column.clone(),
            content_column: self.corpus.content_column.clone(),
            max_field_size: self.corpus.max_field_size,
            max_records: self.engine.max_records,
            engine,
        }
    }
}

pub fn get_config_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        config_dir.join("abbrev-runner").join("runner.toml")
    } else {
        PathBuf::from("runner.toml")
    }
}
