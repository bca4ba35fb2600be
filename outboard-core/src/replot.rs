//! Producer re-invocation for authoritative zoom
//!
//! A [`ReplotJob`] owns a private temporary directory and the rewritten
//! invocation. [`ReplotRunner::run`] blocks until the producer exits, then
//! waits a bounded time for the output file to appear.

use crate::invocation::ProducerInvocation;
use crate::protocol::ProtocolError;
use crate::types::Ordinal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;

/// File name of the producer output inside the job directory
const OUTPUT_FILE: &str = "replot.mpl";

#[derive(Debug, Error)]
pub enum ReplotError {
    #[error("Producer program '{program}' not found on PATH: {source}")]
    ProgramNotFound {
        program: String,
        #[source]
        source: which::Error,
    },

    #[error("Failed to start producer '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Producer exited with {status}")]
    ProducerFailed { status: String },

    #[error("Producer output {path} did not appear after {attempts} checks")]
    OutputMissing { path: PathBuf, attempts: u32 },

    #[error("Producer output {0} is empty")]
    EmptyOutput(PathBuf),

    #[error("Producer output {path} is not a valid plot stream: {source}")]
    CorruptOutput {
        path: PathBuf,
        #[source]
        source: ProtocolError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ReplotResult<T> = Result<T, ReplotError>;

/// Output-file polling schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplotSettings {
    pub poll_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReplotSettings {
    fn default() -> Self {
        Self {
            poll_attempts: 20,
            initial_delay_ms: 10,
            max_delay_ms: 500,
        }
    }
}

/// What the replot was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplotKind {
    Zoom,
    Reset,
}

/// A scheduled producer run
#[derive(Debug)]
pub struct ReplotJob {
    pub kind: ReplotKind,
    pub invocation: ProducerInvocation,
    /// Record the result replaces
    pub superseded: Ordinal,
    /// Navigation epoch at scheduling time
    pub epoch: u64,
    output: PathBuf,
    workdir: TempDir,
}

impl ReplotJob {
    /// Prepare a job with a fresh output location.
    ///
    /// `build` receives the output path and returns the invocation to run.
    pub fn prepare<F, E>(kind: ReplotKind, superseded: Ordinal, epoch: u64, build: F) -> Result<Self, E>
    where
        F: FnOnce(&Path) -> Result<ProducerInvocation, E>,
        E: From<std::io::Error>,
    {
        let workdir = tempfile::Builder::new().prefix("mpl_outboard-").tempdir()?;
        let output = workdir.path().join(OUTPUT_FILE);
        let invocation = build(&output)?;
        Ok(Self {
            kind,
            invocation,
            superseded,
            epoch,
            output,
            workdir,
        })
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReplotRunner {
    settings: ReplotSettings,
}

impl ReplotRunner {
    pub fn new(settings: ReplotSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ReplotSettings {
        &self.settings
    }

    /// Run the producer and wait for its output file.
    pub fn run(&self, job: &ReplotJob) -> ReplotResult<PathBuf> {
        let program = job.invocation.program();
        let resolved = which::which(program).map_err(|source| ReplotError::ProgramNotFound {
            program: program.to_string(),
            source,
        })?;

        log::info!("replot: {}", job.invocation);
        let status = Command::new(&resolved)
            .args(job.invocation.args())
            .current_dir(job.workdir())
            .stdin(Stdio::null())
            .status()
            .map_err(|source| ReplotError::Spawn {
                program: program.to_string(),
                source,
            })?;
        if !status.success() {
            return Err(ReplotError::ProducerFailed {
                status: status.to_string(),
            });
        }

        self.wait_for_output(job.output())?;
        Ok(job.output().to_path_buf())
    }

    /// Poll for `path` with doubling delays.
    pub fn wait_for_output(&self, path: &Path) -> ReplotResult<u64> {
        let mut delay = Duration::from_millis(self.settings.initial_delay_ms);
        let max_delay = Duration::from_millis(self.settings.max_delay_ms);
        let attempts = self.settings.poll_attempts.max(1);

        for attempt in 1..=attempts {
            match std::fs::metadata(path) {
                Ok(meta) if meta.len() > 0 => return Ok(meta.len()),
                Ok(_) => {
                    if attempt == attempts {
                        return Err(ReplotError::EmptyOutput(path.to_path_buf()));
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ReplotError::Io(e)),
            }
            if attempt < attempts {
                log::trace!("replot output not ready, retry {} in {:?}", attempt, delay);
                std::thread::sleep(delay);
                delay = (delay * 2).min(max_delay);
            }
        }
        Err(ReplotError::OutputMissing {
            path: path.to_path_buf(),
            attempts,
        })
    }
}
