//! Process-isolated execution with a wall-clock timeout.
//!
//! A unit of work is a child process. The job description goes in on stdin,
//! and the child answers with one `WorkerReport` JSON line on stdout, which is
//! the result channel. The child can hang, crash, or be killed without
//! affecting the caller: `run` always returns within `timeout + grace`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::WorkerReport;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// Bounded wait for the result channel once the child has exited
pub const DEFAULT_GRACE: Duration = Duration::from_secs(1);

const REPORT_PREFIX: &str = "{\"status\"";

#[derive(Debug, thiserror::Error)]
pub enum IsolationError {
    #[error("Process timed out.")]
    TimedOut,

    /// The child reported a failure; carries its diagnostic trace
    #[error("{0}")]
    Crashed(String),

    /// The child exited without reporting anything on its result channel
    #[error("error")]
    ResultChannelEmpty,

    #[error("Failed to start worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// How to start one isolated unit of work
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<String>,
    payload: Vec<u8>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// The running binary, re-entered as a child
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Serialize `payload` as one JSON line for the child's stdin
    pub fn payload_json<T: Serialize>(mut self, payload: &T) -> serde_json::Result<Self> {
        let mut bytes = serde_json::to_vec(payload)?;
        bytes.push(b'\n');
        self.payload = bytes;
        Ok(self)
    }

    fn describe(&self) -> String {
        format!("{} {}", self.program.display(), self.args.join(" "))
    }
}

#[derive(Debug, Clone)]
pub struct IsolatedExecutor {
    grace: Duration,
}

impl Default for IsolatedExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE)
    }
}

impl IsolatedExecutor {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// Run `work` in a child process and decode its report as `T`.
    ///
    /// A child still running after `timeout` is killed and reaped before
    /// `IsolationError::TimedOut` is returned.
    pub async fn run<T: DeserializeOwned>(
        &self,
        work: &WorkerCommand,
        timeout: Duration,
    ) -> Result<T, IsolationError> {
        let mut child = Command::new(&work.program)
            .args(&work.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(IsolationError::Spawn)?;

        tracing::debug!("Started worker {:?}: {}", child.id(), work.describe());

        if let Some(mut stdin) = child.stdin.take() {
            let payload = work.payload.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&payload).await {
                    tracing::debug!("Worker did not take its payload: {}", e);
                }
            });
        }

        let stdout = child.stdout.take();
        let mut channel = tokio::spawn(async move {
            let mut bytes = Vec::new();
            if let Some(mut stdout) = stdout {
                if let Err(e) = stdout.read_to_end(&mut bytes).await {
                    tracing::debug!("Result channel read failed: {}", e);
                }
            }
            bytes
        });

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                tracing::error!("Failed waiting for worker: {}", e);
                terminate(&mut child).await;
                channel.abort();
                return Err(IsolationError::Crashed(format!(
                    "failed waiting for worker: {}",
                    e
                )));
            }
            Err(_) => {
                tracing::error!("Process timed out. Terminating process.");
                terminate(&mut child).await;
                channel.abort();
                return Err(IsolationError::TimedOut);
            }
        };

        let output = match tokio::time::timeout(self.grace, &mut channel).await {
            Ok(Ok(bytes)) => bytes,
            _ => {
                channel.abort();
                tracing::warn!("Worker exited ({}) but its result channel stayed open", status);
                return Err(IsolationError::ResultChannelEmpty);
            }
        };

        match parse_report::<T>(&output) {
            Some(WorkerReport::Success { result }) => {
                tracing::info!("Function executed successfully.");
                Ok(result)
            }
            Some(WorkerReport::Failure { diagnostic }) => {
                tracing::error!("Function failed with error: {}", diagnostic);
                Err(IsolationError::Crashed(diagnostic))
            }
            None => {
                log_silent_exit(status);
                Err(IsolationError::ResultChannelEmpty)
            }
        }
    }
}

/// Kill the child and wait for it, so no zombie is left behind
async fn terminate(child: &mut tokio::process::Child) {
    if let Err(e) = child.kill().await {
        tracing::warn!("Failed to terminate worker: {}", e);
    }
}

fn log_silent_exit(status: ExitStatus) {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            tracing::error!("Worker killed by signal {} without reporting a result", signal);
            return;
        }
    }
    tracing::error!("Worker exited ({}) without reporting a result", status);
}

/// The last stdout line that parses as a report wins; anything else the
/// child printed is ignored. Native code may leave an unterminated line in
/// front of the report, so a line is also tried from its last `{"status"`.
fn parse_report<T: DeserializeOwned>(output: &[u8]) -> Option<WorkerReport<T>> {
    String::from_utf8_lossy(output).lines().rev().find_map(|line| {
        let line = line.trim();
        serde_json::from_str(line).ok().or_else(|| {
            let start = line.rfind(REPORT_PREFIX)?;
            serde_json::from_str(&line[start..]).ok()
        })
    })
}
