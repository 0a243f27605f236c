//! The summary job: one run of fetch, summarize, render, archive,
//! distribute and publish.
//!
//! Each stage returns its own `Result` and the runner applies a fixed
//! policy per stage:
//!
//! | Stage      | On failure                        |
//! |------------|-----------------------------------|
//! | fetch      | fatal                             |
//! | summarize  | recovered (placeholder text)      |
//! | render     | fatal                             |
//! | archive    | recovered, email still sent       |
//! | distribute | fatal                             |
//! | publish    | recovered, logged only            |
//!
//! Nothing is persisted between runs.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::lock::{JobLock, TriggerSource};
use crate::config::SummaryMode;
use crate::distribution::{Archiver, DistributionError, Distributor};
use crate::pipeline::render::{DocumentRenderer, RenderError};
use crate::pipeline::summarizer::Summarizer;
use crate::publish::SocialPublisher;
use crate::store::{ReportSource, ReportWindow, StoreError};

/// Lock key of the summary job.
pub const SUMMARY_JOB: &str = "summary";

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job '{job}' is already running")]
    AlreadyRunning { job: String },

    #[error("Fetch failed: {0}")]
    Fetch(#[from] StoreError),

    #[error("Render failed: {0}")]
    Render(#[from] RenderError),

    #[error("Distribution failed: {0}")]
    Distribution(#[from] DistributionError),
}

// ═══════════════════════════════════════════════════════════
// Run report
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Summarize,
    Render,
    Archive,
    Distribute,
    Publish,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StageOutcome {
    Success,
    /// Failed, but the run continued.
    Recovered(String),
    /// Not configured or nothing to do.
    Skipped,
    /// Failed and aborted the run.
    Fatal(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    #[serde(flatten)]
    pub outcome: StageOutcome,
    pub elapsed_ms: u64,
}

/// Where a run is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    Fetch,
    Summarize,
    Render,
    Archive,
    Distribute,
    Publish,
    Done,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub trigger: TriggerSource,
    pub window: ReportWindow,
    pub period_label: String,
    pub fetched: usize,
    pub subject: Option<String>,
    pub archived_path: Option<String>,
    pub published: bool,
    pub state: RunState,
    pub stages: Vec<StageRecord>,
}

impl RunReport {
    fn new(run_id: Uuid, trigger: TriggerSource, window: ReportWindow, period_label: String) -> Self {
        Self {
            run_id,
            trigger,
            window,
            period_label,
            fetched: 0,
            subject: None,
            archived_path: None,
            published: false,
            state: RunState::Init,
            stages: Vec::new(),
        }
    }

    fn record(&mut self, stage: Stage, outcome: StageOutcome, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            StageOutcome::Recovered(reason) => {
                tracing::warn!(run_id = %self.run_id, ?stage, %reason, "Stage failed, continuing")
            }
            StageOutcome::Fatal(reason) => {
                tracing::error!(run_id = %self.run_id, ?stage, %reason, "Stage failed, aborting run")
            }
            _ => tracing::debug!(run_id = %self.run_id, ?stage, ?outcome, elapsed_ms, "Stage finished"),
        }
        self.stages.push(StageRecord {
            stage,
            outcome,
            elapsed_ms,
        });
    }

    pub fn outcome_of(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| &r.outcome)
    }
}

/// `last day` for one day, `last N days` otherwise.
pub fn period_label(days: u32) -> String {
    if days == 1 {
        "last day".to_string()
    } else {
        format!("last {days} days")
    }
}

pub fn email_subject(period_label: &str, count: usize) -> String {
    format!("Reports Summary - {period_label} - {count} reports")
}

pub fn document_title(period_label: &str) -> String {
    format!("Reports Summary - {period_label}")
}

pub fn attachment_filename(now: DateTime<Utc>) -> String {
    format!("summary-{}.pdf", now.timestamp_millis())
}

// ═══════════════════════════════════════════════════════════
// SummaryJob
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
pub struct JobOptions {
    pub lookback_days: u32,
    pub fetch_limit: usize,
}

/// Wiring of a `SummaryJob`, reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobStages {
    pub mode: SummaryMode,
    pub archive: bool,
    pub publish: bool,
}

pub struct SummaryJob {
    source: Arc<dyn ReportSource>,
    summarizer: Summarizer,
    renderer: DocumentRenderer,
    distributor: Distributor,
    archiver: Option<Archiver>,
    publisher: Option<Arc<dyn SocialPublisher>>,
    lock: Arc<JobLock>,
    options: JobOptions,
}

impl SummaryJob {
    pub fn new(
        source: Arc<dyn ReportSource>,
        summarizer: Summarizer,
        distributor: Distributor,
        lock: Arc<JobLock>,
        options: JobOptions,
    ) -> Self {
        Self {
            source,
            summarizer,
            renderer: DocumentRenderer::new(),
            distributor,
            archiver: None,
            publisher: None,
            lock,
            options,
        }
    }

    pub fn with_archiver(mut self, archiver: Archiver) -> Self {
        self.archiver = Some(archiver);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn SocialPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Which stages this job runs besides the mandatory ones.
    pub fn stages(&self) -> JobStages {
        JobStages {
            mode: self.summarizer.mode(),
            archive: self.archiver.is_some(),
            publish: self.publisher.is_some(),
        }
    }

    /// Run once. Refused with `AlreadyRunning` while another run is in flight.
    pub async fn run(&self, trigger: TriggerSource) -> Result<RunReport, JobError> {
        let run_id = Uuid::new_v4();
        let _guard = self
            .lock
            .try_acquire(SUMMARY_JOB, run_id, trigger)
            .ok_or_else(|| JobError::AlreadyRunning {
                job: SUMMARY_JOB.to_string(),
            })?;

        let now = Utc::now();
        let window = ReportWindow::trailing_days(self.options.lookback_days, now);
        let period = period_label(self.options.lookback_days);
        let mut report = RunReport::new(run_id, trigger, window, period.clone());

        tracing::info!(%run_id, %trigger, period = %period, "Summary run started");
        let started = Instant::now();

        let result = self.execute(&mut report, now).await;
        report.state = if result.is_ok() {
            RunState::Done
        } else {
            RunState::Error
        };

        tracing::info!(
            %run_id,
            state = ?report.state,
            fetched = report.fetched,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Summary run finished"
        );
        result.map(|()| report)
    }

    async fn execute(&self, report: &mut RunReport, now: DateTime<Utc>) -> Result<(), JobError> {
        // FETCH
        report.state = RunState::Fetch;
        let t = Instant::now();
        let reports = match self
            .source
            .fetch_window(&report.window, self.options.fetch_limit)
            .await
        {
            Ok(reports) => {
                report.record(Stage::Fetch, StageOutcome::Success, t);
                reports
            }
            Err(e) => {
                report.record(Stage::Fetch, StageOutcome::Fatal(e.to_string()), t);
                return Err(e.into());
            }
        };
        report.fetched = reports.len();
        tracing::info!(run_id = %report.run_id, fetched = reports.len(), "Reports fetched");

        // SUMMARIZE
        report.state = RunState::Summarize;
        let t = Instant::now();
        let summary = self.summarizer.summarize(&reports, &report.period_label).await;
        let outcome = if summary.degraded {
            StageOutcome::Recovered("completion service failed, placeholder used".into())
        } else {
            StageOutcome::Success
        };
        report.record(Stage::Summarize, outcome, t);

        // RENDER
        report.state = RunState::Render;
        let t = Instant::now();
        let title = document_title(&report.period_label);
        let rendered = {
            let renderer = self.renderer.clone();
            let body = summary.summary.clone();
            let rows = summary.table_data.clone();
            tokio::task::spawn_blocking(move || renderer.render(&title, &body, &rows))
                .await
                .unwrap_or_else(|e| Err(RenderError::Worker(e.to_string())))
        };
        let document = match rendered {
            Ok(bytes) => {
                report.record(Stage::Render, StageOutcome::Success, t);
                bytes
            }
            Err(e) => {
                report.record(Stage::Render, StageOutcome::Fatal(e.to_string()), t);
                return Err(e.into());
            }
        };

        // ARCHIVE
        let t = Instant::now();
        match &self.archiver {
            Some(archiver) => {
                report.state = RunState::Archive;
                match archiver.archive(&document, now).await {
                    Ok(path) => {
                        report.archived_path = Some(path);
                        report.record(Stage::Archive, StageOutcome::Success, t);
                    }
                    Err(e) => report.record(Stage::Archive, StageOutcome::Recovered(e.to_string()), t),
                }
            }
            None => report.record(Stage::Archive, StageOutcome::Skipped, t),
        }

        // DISTRIBUTE
        report.state = RunState::Distribute;
        let t = Instant::now();
        let subject = email_subject(&report.period_label, reports.len());
        let filename = attachment_filename(now);
        if let Err(e) = self
            .distributor
            .send_email(&subject, &summary.summary, Some(document.as_slice()), &filename)
            .await
        {
            report.record(Stage::Distribute, StageOutcome::Fatal(e.to_string()), t);
            return Err(e.into());
        }
        report.subject = Some(subject);
        report.record(Stage::Distribute, StageOutcome::Success, t);

        // PUBLISH
        let t = Instant::now();
        match (&self.publisher, summary.public_abstract.as_deref()) {
            (Some(publisher), Some(text)) => {
                report.state = RunState::Publish;
                match publisher.publish(text).await {
                    Ok(()) => {
                        report.published = true;
                        report.record(Stage::Publish, StageOutcome::Success, t);
                    }
                    Err(e) => report.record(Stage::Publish, StageOutcome::Recovered(e.to_string()), t),
                }
            }
            _ => report.record(Stage::Publish, StageOutcome::Skipped, t),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::archive::MockObjectStore;
    use crate::distribution::mailer::MockMailTransport;
    use crate::models::Report;
    use crate::pipeline::summarizer::{MockCompletionClient, SummarizerOptions};
    use crate::publish::MockPublisher;
    use crate::store::memory::{GatedReportSource, MemoryReportSource};
    use chrono::Duration;

    struct Harness {
        completion: Arc<MockCompletionClient>,
        mail: Arc<MockMailTransport>,
        lock: Arc<JobLock>,
    }

    fn reports(n: usize) -> Vec<Report> {
        (0..n)
            .map(|i| {
                let mut r = Report::new(
                    format!("r{i}"),
                    format!("Issue {i}"),
                    Utc::now() - Duration::minutes(10 + i as i64),
                );
                r.flag_count = (n - i) as u32;
                r
            })
            .collect()
    }

    fn job_with(
        source: Arc<dyn ReportSource>,
        completion: MockCompletionClient,
        mail: MockMailTransport,
        mode: SummaryMode,
    ) -> (SummaryJob, Harness) {
        let completion = Arc::new(completion);
        let mail = Arc::new(mail);
        let lock = Arc::new(JobLock::new());
        let summarizer = Summarizer::new(
            completion.clone(),
            SummarizerOptions {
                mode,
                digest_max_chars: 10_000,
                abstract_max_chars: 240,
            },
        );
        let distributor = Distributor::new(mail.clone(), "ops@city.gov", "no-reply@example.com");
        let job = SummaryJob::new(
            source,
            summarizer,
            distributor,
            lock.clone(),
            JobOptions {
                lookback_days: 2,
                fetch_limit: 500,
            },
        );
        (
            job,
            Harness {
                completion,
                mail,
                lock,
            },
        )
    }

    #[test]
    fn labels_and_names() {
        assert_eq!(period_label(1), "last day");
        assert_eq!(period_label(7), "last 7 days");
        assert_eq!(
            email_subject("last 2 days", 12),
            "Reports Summary - last 2 days - 12 reports"
        );
        let now = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap();
        assert_eq!(attachment_filename(now), "summary-1700000000000.pdf");
    }

    #[tokio::test]
    async fn empty_window_still_sends_no_reports_email() {
        let source = Arc::new(MemoryReportSource::new(Vec::new()));
        let (job, h) = job_with(
            source,
            MockCompletionClient::new("unused"),
            MockMailTransport::new(),
            SummaryMode::Plain,
        );

        let report = job.run(TriggerSource::OnDemand).await.unwrap();
        assert_eq!(report.state, RunState::Done);
        assert_eq!(report.fetched, 0);
        assert_eq!(h.completion.calls(), 0);

        let sent = h.mail.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "No reports found in the last 2 days.");
        assert_eq!(sent[0].subject, "Reports Summary - last 2 days - 0 reports");
        let pdf = &sent[0].attachment.as_ref().unwrap().bytes;
        assert!(pdf.starts_with(b"%PDF"));
        assert_eq!(report.outcome_of(Stage::Archive), Some(&StageOutcome::Skipped));
        assert_eq!(report.outcome_of(Stage::Publish), Some(&StageOutcome::Skipped));
    }

    #[tokio::test]
    async fn twelve_reports_run_every_stage() {
        let source = Arc::new(MemoryReportSource::new(reports(12)));
        let store = Arc::new(MockObjectStore::new());
        let (job, h) = job_with(
            source,
            MockCompletionClient::new("Twelve issues across the city."),
            MockMailTransport::new(),
            SummaryMode::Plain,
        );
        let job = job.with_archiver(Archiver::new(store.clone(), None));

        let report = job.run(TriggerSource::Schedule).await.unwrap();
        assert_eq!(report.fetched, 12);
        assert_eq!(report.state, RunState::Done);
        for stage in [Stage::Fetch, Stage::Summarize, Stage::Render, Stage::Archive, Stage::Distribute] {
            assert_eq!(report.outcome_of(stage), Some(&StageOutcome::Success), "{stage:?}");
        }

        let objects = store.objects();
        assert_eq!(objects.len(), 1);
        assert!(objects[0].0.starts_with("summaries/"));
        assert_eq!(report.archived_path.as_deref(), Some(objects[0].0.as_str()));

        let sent = h.mail.sent();
        assert_eq!(sent[0].text, "Twelve issues across the city.");
        let attachment = sent[0].attachment.as_ref().unwrap();
        assert!(attachment.filename.starts_with("summary-"));
        assert!(attachment.filename.ends_with(".pdf"));
    }

    #[tokio::test]
    async fn ranked_run_publishes_capped_abstract() {
        let source = Arc::new(MemoryReportSource::new(reports(5)));
        let publisher = Arc::new(MockPublisher::new());
        let long = "b".repeat(300);
        let (job, _h) = job_with(
            source,
            MockCompletionClient::new("summary").with_generated(&long),
            MockMailTransport::new(),
            SummaryMode::Ranked,
        );
        let job = job.with_publisher(publisher.clone());

        let report = job.run(TriggerSource::OnDemand).await.unwrap();
        assert!(report.published);
        let posts = publisher.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].chars().count(), 240);
    }

    #[tokio::test]
    async fn completion_failure_is_recovered() {
        let source = Arc::new(MemoryReportSource::new(reports(3)));
        let (job, h) = job_with(
            source,
            MockCompletionClient::failing(500),
            MockMailTransport::new(),
            SummaryMode::Plain,
        );

        let report = job.run(TriggerSource::OnDemand).await.unwrap();
        assert!(matches!(
            report.outcome_of(Stage::Summarize),
            Some(StageOutcome::Recovered(_))
        ));
        assert_eq!(h.mail.sent()[0].text, "Summary generation failed.");
    }

    #[tokio::test]
    async fn fetch_failure_aborts_before_mail() {
        let source = Arc::new(MemoryReportSource::failing("connection refused"));
        let (job, h) = job_with(
            source,
            MockCompletionClient::new("unused"),
            MockMailTransport::new(),
            SummaryMode::Plain,
        );

        let err = job.run(TriggerSource::Schedule).await.unwrap_err();
        assert!(matches!(err, JobError::Fetch(_)));
        assert!(h.mail.sent().is_empty());
        assert_eq!(h.completion.calls(), 0);
        assert!(!h.lock.is_running(SUMMARY_JOB));
    }

    #[tokio::test]
    async fn mail_failure_is_fatal() {
        let source = Arc::new(MemoryReportSource::new(reports(2)));
        let (job, _h) = job_with(
            source,
            MockCompletionClient::new("ok"),
            MockMailTransport::failing(401),
            SummaryMode::Plain,
        );

        let err = job.run(TriggerSource::OnDemand).await.unwrap_err();
        assert!(matches!(err, JobError::Distribution(DistributionError::Status { status: 401, .. })));
    }

    #[tokio::test]
    async fn archive_failure_does_not_stop_email() {
        let source = Arc::new(MemoryReportSource::new(reports(2)));
        let (job, h) = job_with(
            source,
            MockCompletionClient::new("ok"),
            MockMailTransport::new(),
            SummaryMode::Plain,
        );
        let job = job.with_archiver(Archiver::new(Arc::new(MockObjectStore::failing()), None));

        let report = job.run(TriggerSource::OnDemand).await.unwrap();
        assert!(matches!(report.outcome_of(Stage::Archive), Some(StageOutcome::Recovered(_))));
        assert!(report.archived_path.is_none());
        assert_eq!(h.mail.sent().len(), 1);
    }

    #[tokio::test]
    async fn publish_failure_is_recovered() {
        let source = Arc::new(MemoryReportSource::new(reports(2)));
        let (job, h) = job_with(
            source,
            MockCompletionClient::new("ok"),
            MockMailTransport::new(),
            SummaryMode::Ranked,
        );
        let job = job.with_publisher(Arc::new(MockPublisher::failing()));

        let report = job.run(TriggerSource::OnDemand).await.unwrap();
        assert_eq!(report.state, RunState::Done);
        assert!(!report.published);
        assert!(matches!(report.outcome_of(Stage::Publish), Some(StageOutcome::Recovered(_))));
        assert_eq!(h.mail.sent().len(), 1);
    }

    #[tokio::test]
    async fn plain_mode_never_publishes() {
        let source = Arc::new(MemoryReportSource::new(reports(2)));
        let publisher = Arc::new(MockPublisher::new());
        let (job, _h) = job_with(
            source,
            MockCompletionClient::new("ok"),
            MockMailTransport::new(),
            SummaryMode::Plain,
        );
        let job = job.with_publisher(publisher.clone());

        let report = job.run(TriggerSource::OnDemand).await.unwrap();
        assert_eq!(report.outcome_of(Stage::Publish), Some(&StageOutcome::Skipped));
        assert!(publisher.posts().is_empty());
    }

    #[tokio::test]
    async fn concurrent_trigger_is_rejected() {
        let source = Arc::new(GatedReportSource::new());
        let (job, h) = job_with(
            source.clone(),
            MockCompletionClient::new("unused"),
            MockMailTransport::new(),
            SummaryMode::Plain,
        );
        let job = Arc::new(job);

        let first = tokio::spawn({
            let job = job.clone();
            async move { job.run(TriggerSource::Schedule).await }
        });
        source.entered.notified().await;
        assert!(h.lock.is_running(SUMMARY_JOB));

        let err = job.run(TriggerSource::OnDemand).await.unwrap_err();
        assert!(matches!(err, JobError::AlreadyRunning { .. }));

        source.release.notify_one();
        let report = first.await.unwrap().unwrap();
        assert_eq!(report.trigger, TriggerSource::Schedule);
        assert!(!h.lock.is_running(SUMMARY_JOB));
        assert_eq!(h.mail.sent().len(), 1);
    }
}
