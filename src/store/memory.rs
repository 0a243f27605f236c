//! In-memory report source for job and API tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{apply_window, ReportSource, ReportWindow, StoreError};
use crate::models::Report;

pub struct MemoryReportSource {
    reports: Vec<Report>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl MemoryReportSource {
    pub fn new(reports: Vec<Report>) -> Self {
        Self {
            reports,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A source whose every query fails as if the store were unreachable.
    pub fn failing(message: &str) -> Self {
        Self {
            reports: Vec::new(),
            failure: Some(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReportSource for MemoryReportSource {
    async fn fetch_window(
        &self,
        window: &ReportWindow,
        limit: usize,
    ) -> Result<Vec<Report>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(StoreError::Http(message.clone()));
        }
        Ok(apply_window(self.reports.clone(), window, limit))
    }
}

/// Blocks every fetch until released, then returns nothing.
#[derive(Default)]
pub struct GatedReportSource {
    pub entered: Notify,
    pub release: Notify,
}

impl GatedReportSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportSource for GatedReportSource {
    async fn fetch_window(
        &self,
        _window: &ReportWindow,
        _limit: usize,
    ) -> Result<Vec<Report>, StoreError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Vec::new())
    }
}
