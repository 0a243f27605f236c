//! Process-wide application state.
//!
//! `CoreState` is built once at startup and shared via `Arc` between the
//! HTTP router and the cron scheduler. Nothing in it touches the network
//! at construction: the cloud session is initialized on first use.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, SummaryMode};
use crate::distribution::{Archiver, Distributor, GcsObjectStore, SendGridTransport};
use crate::job::{ActiveRun, JobLock, JobOptions, JobStages, SummaryJob, SUMMARY_JOB};
use crate::pipeline::summarizer::{HuggingFaceClient, Summarizer, SummarizerOptions};
use crate::publish::BrowserPublisher;
use crate::store::{FirestoreReportRepository, LazyCloudSession};

/// Timeout for store, storage and token requests.
const CLOUD_TIMEOUT: Duration = Duration::from_secs(60);

pub struct CoreState {
    pub config: AppConfig,
    job: Arc<SummaryJob>,
    lock: Arc<JobLock>,
    /// `None` when wired with test doubles.
    session: Option<Arc<LazyCloudSession>>,
}

impl CoreState {
    /// Wire the production components described by `config`.
    pub fn from_config(config: AppConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(CLOUD_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to build HTTP client with timeout, using default client");
                reqwest::Client::new()
            });

        let session = Arc::new(LazyCloudSession::new(config.store.clone(), http));
        let source = Arc::new(FirestoreReportRepository::new(
            session.clone(),
            config.store.collection.clone(),
        ));

        let summarizer = Summarizer::new(
            Arc::new(HuggingFaceClient::from_config(&config.summary)),
            SummarizerOptions::from(&config.summary),
        );
        let distributor = Distributor::from_config(
            &config.mail,
            Arc::new(SendGridTransport::from_config(&config.mail)),
        );

        let lock = Arc::new(JobLock::new());
        let mut job = SummaryJob::new(
            source,
            summarizer,
            distributor,
            lock.clone(),
            JobOptions {
                lookback_days: config.summary.lookback_days,
                fetch_limit: config.summary.fetch_limit,
            },
        );

        if config.archive.enabled {
            let store = GcsObjectStore::new(session.clone(), config.archive.bucket.clone());
            job = job.with_archiver(Archiver::from_config(&config.archive, Arc::new(store)));
        }

        if config.publish.enabled {
            if config.summary.mode == SummaryMode::Ranked {
                job = job.with_publisher(Arc::new(BrowserPublisher::from_config(&config.publish)));
            } else {
                tracing::warn!("Social publishing needs SUMMARY_MODE=ranked to produce an abstract, publishing disabled");
            }
        }

        let stages = job.stages();
        tracing::info!(
            mode = ?stages.mode,
            lookback_days = config.summary.lookback_days,
            archive = stages.archive,
            publish = stages.publish,
            "Core state initialized"
        );

        Self {
            config,
            job: Arc::new(job),
            lock,
            session: Some(session),
        }
    }

    /// Wrap an already-built job. The job must share `lock`.
    pub fn with_job(config: AppConfig, job: SummaryJob, lock: Arc<JobLock>) -> Self {
        Self {
            config,
            job: Arc::new(job),
            lock,
            session: None,
        }
    }

    pub fn job(&self) -> Arc<SummaryJob> {
        self.job.clone()
    }

    pub fn stages(&self) -> JobStages {
        self.job.stages()
    }

    pub fn active_run(&self) -> Option<ActiveRun> {
        self.lock.current(SUMMARY_JOB)
    }

    pub fn is_running(&self) -> bool {
        self.lock.is_running(SUMMARY_JOB)
    }

    /// Whether the cloud session has been initialized yet.
    pub fn store_connected(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.is_initialized())
            .unwrap_or(false)
    }
}
