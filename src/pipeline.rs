//! Pipeline orchestration: Discovery → Download → Deduplication → Indexing.
//!
//! The [`Orchestrator`] owns one run's lifecycle. Each stage's output is
//! fully materialized before the next stage starts, so a failure in a late
//! stage never requires re-running discovery. Per-item errors are absorbed
//! into [`RunStatistics`]; fatal errors flip the state machine to
//! [`PipelineState::Failed`] and abort the remaining stages, still emitting
//! whatever partial report is available.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::cancel::CancelToken;
use crate::config::CrawlerConfig;
use crate::dedup::DedupEngine;
use crate::discovery::{DiscoveryEngine, DiscoveryError};
use crate::download::{
    DownloadEngine, DownloadOutcome, EngineError, HttpClient, RateLimiter, RetryPolicy,
};
use crate::index::{IndexError, IndexManager};
use crate::storage::{StorageError, StorageManager};

/// States of the pipeline state machine.
///
/// `Failed` is reachable from every non-terminal state; `Completed` and
/// `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Discovering,
    Downloading,
    Deduplicating,
    Indexing,
    Completed,
    Failed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Downloading => "downloading",
            Self::Deduplicating => "deduplicating",
            Self::Indexing => "indexing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Fatal errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Download engine could not be built or its pool broke.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Discovery failed entirely (base URL unreachable).
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Storage is unusable (cannot create or write directories).
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The index could not be loaded or saved.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// A failed run: the fatal cause plus the partial report accumulated up to
/// the failure point.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PipelineFailure {
    /// The fatal error that aborted the run.
    #[source]
    pub error: PipelineError,
    /// Partial report (state is [`PipelineState::Failed`]).
    pub report: RunReport,
}

/// Counters and timestamps for one pipeline run.
///
/// Owned by the orchestrator for the duration of the run and handed out in
/// the final report; never persisted.
#[derive(Debug, Clone)]
pub struct RunStatistics {
    /// Candidate links yielded by discovery.
    pub discovered: usize,
    /// Documents fetched and stored.
    pub downloaded: usize,
    /// Records dropped as duplicates.
    pub duplicates: usize,
    /// Per-item errors (failed downloads, unhashable records).
    pub errors: usize,
    /// Retry attempts made by the download engine.
    pub retried: usize,
    /// Links never issued because the run was cancelled.
    pub skipped: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunStatistics {
    fn new() -> Self {
        Self {
            discovered: 0,
            downloaded: 0,
            duplicates: 0,
            errors: 0,
            retried: 0,
            skipped: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Wall-clock duration of the run, once finished.
    #[must_use]
    pub fn duration(&self) -> Option<std::time::Duration> {
        self.finished_at
            .map(|end| (end - self.started_at).to_std().unwrap_or_default())
    }
}

/// Final report of a pipeline run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Terminal state of the run.
    pub state: PipelineState,
    /// Run counters and timing.
    pub stats: RunStatistics,
    /// Description of the fatal cause for failed runs.
    pub fatal: Option<String>,
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "crawl {}", self.state)?;
        writeln!(f, "  discovered: {}", self.stats.discovered)?;
        writeln!(f, "  downloaded: {}", self.stats.downloaded)?;
        writeln!(f, "  duplicates: {}", self.stats.duplicates)?;
        writeln!(f, "  errors:     {}", self.stats.errors)?;
        writeln!(f, "  retried:    {}", self.stats.retried)?;
        if self.stats.skipped > 0 {
            writeln!(f, "  skipped:    {}", self.stats.skipped)?;
        }
        if let Some(duration) = self.stats.duration() {
            writeln!(f, "  duration:   {:.1}s", duration.as_secs_f64())?;
        }
        if let Some(fatal) = &self.fatal {
            writeln!(f, "  fatal:      {fatal}")?;
        }
        Ok(())
    }
}

/// Drives one crawl run through the pipeline stages.
#[derive(Debug)]
pub struct Orchestrator {
    config: Arc<CrawlerConfig>,
    client: HttpClient,
    engine: DownloadEngine,
    storage: StorageManager,
    cancel: CancelToken,
    state: PipelineState,
}

impl Orchestrator {
    /// Builds an orchestrator and its engines from the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Engine`] if the configured concurrency is
    /// rejected by the download engine.
    pub fn new(config: Arc<CrawlerConfig>) -> Result<Self, PipelineError> {
        let client = HttpClient::from_config(&config);
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_delay()));
        let retry_policy = RetryPolicy::new(config.retry_attempts(), config.retry_delay());
        let engine = DownloadEngine::new(
            config.max_concurrent_downloads(),
            retry_policy,
            rate_limiter,
        )?;
        let storage = StorageManager::new(&config);

        Ok(Self {
            config,
            client,
            engine,
            storage,
            cancel: CancelToken::new(),
            state: PipelineState::Idle,
        })
    }

    /// Clonable cancellation handle for this run (wire it to Ctrl-C).
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current state of the pipeline.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Runs the pipeline to completion.
    ///
    /// On success the report's state is [`PipelineState::Completed`]. A
    /// cancelled run still completes normally, persisting whatever was
    /// downloaded before cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineFailure`] on fatal errors (unreachable site,
    /// unusable storage, corrupt index, failed index save); the failure
    /// carries the partial report.
    #[instrument(skip(self), fields(base_url = %self.config.base_url()))]
    pub async fn run(&mut self) -> Result<RunReport, PipelineFailure> {
        let mut stats = RunStatistics::new();

        match self.run_stages(&mut stats).await {
            Ok(()) => {
                self.state = PipelineState::Completed;
                stats.finished_at = Some(Utc::now());
                let report = RunReport {
                    state: self.state,
                    stats,
                    fatal: None,
                };
                info!(%report, "run completed");
                Ok(report)
            }
            Err(error) => {
                self.state = PipelineState::Failed;
                stats.finished_at = Some(Utc::now());
                let report = RunReport {
                    state: self.state,
                    stats,
                    fatal: Some(error.to_string()),
                };
                warn!(error = %error, "run failed");
                Err(PipelineFailure { error, report })
            }
        }
    }

    async fn run_stages(&mut self, stats: &mut RunStatistics) -> Result<(), PipelineError> {
        // Storage and index problems are systemic: surface them before any
        // network work happens.
        self.storage.prepare()?;
        let swept = self.storage.cleanup_temp_files();
        if swept > 0 {
            info!(swept, "removed stale temp files from previous run");
        }

        let mut index = IndexManager::load(self.config.index_file())?;
        let mut dedup = DedupEngine::from_index(index.index());

        self.state = PipelineState::Discovering;
        let discovery = DiscoveryEngine::new(&self.config, &self.client);
        let candidates = discovery.discover(&self.cancel).await?;
        stats.discovered = candidates.len();

        self.state = PipelineState::Downloading;
        let (outcomes, download_stats) = self
            .engine
            .download_all(&candidates, &self.client, self.storage.pdfs_dir(), &self.cancel)
            .await?;
        stats.downloaded = download_stats.completed();
        stats.retried = download_stats.retried();
        stats.skipped = download_stats.skipped();
        stats.errors += download_stats.failed();

        let records: Vec<_> = outcomes
            .into_iter()
            .filter_map(DownloadOutcome::success)
            .collect();

        self.state = PipelineState::Deduplicating;
        let batch = dedup.filter_batch(records);
        stats.duplicates = batch.duplicates.len();
        stats.errors += batch.errors.len();

        // The duplicate's bytes are already reachable through the first
        // record with the same hash; drop the redundant file.
        for duplicate in &batch.duplicates {
            if let Some(path) = &duplicate.local_path
                && let Err(e) = self.storage.remove_file(path)
            {
                warn!(path = %path.display(), error = %e, "cannot remove duplicate file");
            }
        }

        self.state = PipelineState::Indexing;
        index.add_documents(batch.unique);
        index.save()?;

        Ok(())
    }
}
