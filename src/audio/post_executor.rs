//! Batch post-processing executor
//!
//! Runs independent filter jobs through an external audio tool on a bounded
//! worker pool. Every job spawns its own tool process; the pool only bounds
//! how many run at once. Results come back in submission order once every
//! job has finished, and a failing job never affects its siblings.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::filter_chain::FilterOptions;
use crate::config::AudioPostConfig;
use crate::core::error::{Result, ResultExt, TtsError};
use crate::core::outcome::JobOutcome;

/// One post-processing unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostJob {
    pub input: PathBuf,
    pub output: PathBuf,
    #[serde(default)]
    pub options: FilterOptions,
}

impl PostJob {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, options: FilterOptions) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            options,
        }
    }
}

/// Size the worker pool for `jobs` jobs.
///
/// An explicit request wins; otherwise one core is left for the caller.
/// Never more workers than jobs.
pub fn worker_count(jobs: usize, requested: usize, cores: usize) -> usize {
    let workers = if requested > 0 {
        requested
    } else {
        cores.saturating_sub(1).max(1)
    };
    workers.min(jobs)
}

/// Executor of post-processing batches
#[derive(Debug, Clone)]
pub struct PostExecutor {
    tool: PathBuf,
    workers: usize,
    base_rate: u32,
}

impl PostExecutor {
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            workers: 0,
            base_rate: crate::DEFAULT_SAMPLE_RATE,
        }
    }

    pub fn from_config(config: &AudioPostConfig) -> Self {
        Self {
            tool: config.ffmpeg_path.clone(),
            workers: config.workers,
            base_rate: config.base_rate,
        }
    }

    /// Request a fixed worker count (0 = automatic)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_base_rate(mut self, base_rate: u32) -> Self {
        self.base_rate = base_rate;
        self
    }

    pub fn tool(&self) -> &Path {
        &self.tool
    }

    /// Run every job and return one outcome per job, in submission order
    pub fn run(&self, jobs: &[PostJob]) -> Result<Vec<JobOutcome<PathBuf>>> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let workers = worker_count(jobs.len(), self.workers, num_cpus::get());
        tracing::info!("[audio post] {} jobs on {} workers", jobs.len(), workers);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("audio-post-{}", i))
            .build()
            .context("Failed to build worker pool")?;

        let outcomes: Vec<JobOutcome<PathBuf>> =
            pool.install(|| jobs.par_iter().map(|job| self.run_job(job)).collect());

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        if failed > 0 {
            tracing::warn!("[audio post] {} of {} jobs failed", failed, jobs.len());
        }
        Ok(outcomes)
    }

    /// Run a single job; failures become the outcome rather than an error
    pub fn run_job(&self, job: &PostJob) -> JobOutcome<PathBuf> {
        if job.output.exists() {
            // A stale file must not block re-rendering
            let _ = std::fs::remove_file(&job.output);
        }

        let args = match job.options.tool_args(&job.input, &job.output, self.base_rate) {
            Ok(args) => args,
            Err(e) => return JobOutcome::Failure(e.to_string()),
        };

        tracing::debug!(
            "[audio post] {} {}",
            self.tool.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let output = Command::new(&self.tool)
            .args(&args)
            .stdin(Stdio::null())
            .output();

        match output {
            Ok(out) if out.status.success() => JobOutcome::Success(job.output.clone()),
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
                let diagnostic = if stderr.is_empty() {
                    format!("{} exited with {}", self.tool.display(), out.status)
                } else {
                    stderr
                };
                tracing::debug!("[audio post] {:?} failed: {}", job.input, diagnostic);
                JobOutcome::Failure(diagnostic)
            }
            Err(e) => JobOutcome::Failure(
                TtsError::ExternalTool {
                    message: format!("failed to launch {}: {}", self.tool.display(), e),
                }
                .to_string(),
            ),
        }
    }
}
