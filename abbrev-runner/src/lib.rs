//! Fault-tolerant abbreviation batch runner.
//!
//! - **`executor`**: runs a unit of work in a killable child process with a
//!   wall-clock timeout and a one-shot result channel.
//! - **`worker`**: the unit of work itself, one pass over the corpus that
//!   appends each document's abbreviations to the output ledger.
//! - **`runner`**: restarts the pass after any crash or timeout until one
//!   completes.
//! - **`config`**: TOML + environment configuration.

pub mod config;
pub mod executor;
pub mod runner;
pub mod worker;

pub use config::RunnerConfig;
pub use executor::{IsolatedExecutor, IsolationError, WorkerCommand};
pub use runner::{BatchOutcome, Isolation, ProcessIsolation, ResumableBatchRunner, RunnerError};
pub use worker::{run_worker, traverse_corpus};
