//! Report retrieval from the document store.
//!
//! `ReportSource` is the seam the job depends on. The production
//! implementation queries Firestore over REST; the connection (project,
//! credentials, token cache) is initialized lazily on first use and reused
//! for the life of the process.

pub mod auth;
pub mod firestore;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::Report;

pub use auth::{CloudSession, LazyCloudSession, TokenProvider};
pub use firestore::FirestoreReportRepository;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cannot load store credentials: {0}")]
    Credentials(String),

    #[error("Token exchange failed: {0}")]
    Auth(String),

    #[error("Document store unreachable: {0}")]
    Http(String),

    #[error("Document store returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("Malformed store response: {0}")]
    Decode(String),
}

/// Trailing time range `[since, until]` of reports considered for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl ReportWindow {
    /// Clamps to the earliest representable instant instead of overflowing.
    pub fn trailing_days(days: u32, until: DateTime<Utc>) -> Self {
        let since = until
            .checked_sub_signed(Duration::days(i64::from(days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { since, until }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.since
    }
}

#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Reports with `created_at >= window.since`, newest first, at most `limit`.
    async fn fetch_window(
        &self,
        window: &ReportWindow,
        limit: usize,
    ) -> Result<Vec<Report>, StoreError>;

    /// Reports created within the last `days` days, newest first.
    async fn fetch_within_window(
        &self,
        days: u32,
        limit: usize,
    ) -> Result<Vec<Report>, StoreError> {
        let window = ReportWindow::trailing_days(days, Utc::now());
        self.fetch_window(&window, limit).await
    }
}

/// Enforce the window contract on whatever a backend returned.
pub fn apply_window(mut reports: Vec<Report>, window: &ReportWindow, limit: usize) -> Vec<Report> {
    reports.retain(|r| window.contains(r.created_at));
    reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    reports.truncate(limit);
    reports
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_at(id: &str, at: DateTime<Utc>) -> Report {
        Report::new(id, format!("report {id}"), at)
    }

    #[test]
    fn window_spans_requested_days() {
        let until = Utc::now();
        let window = ReportWindow::trailing_days(2, until);
        assert_eq!(window.until - window.since, Duration::days(2));
    }

    #[test]
    fn huge_window_clamps_instead_of_overflowing() {
        let until = Utc::now();
        let window = ReportWindow::trailing_days(200_000_000, until);
        assert_eq!(window.since, DateTime::<Utc>::MIN_UTC);
        assert!(window.contains(until - Duration::days(365 * 1000)));

        let window = ReportWindow::trailing_days(u32::MAX, until);
        assert_eq!(window.since, DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn window_is_inclusive_at_lower_bound() {
        let until = Utc::now();
        let window = ReportWindow::trailing_days(1, until);
        assert!(window.contains(window.since));
        assert!(!window.contains(window.since - Duration::milliseconds(1)));
    }

    #[test]
    fn apply_window_filters_sorts_and_caps() {
        let now = Utc::now();
        let window = ReportWindow::trailing_days(2, now);
        let reports = vec![
            report_at("old", now - Duration::days(3)),
            report_at("mid", now - Duration::hours(30)),
            report_at("new", now - Duration::hours(1)),
            report_at("newer", now - Duration::minutes(5)),
        ];

        let kept = apply_window(reports, &window, 2);
        let ids: Vec<&str> = kept.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["newer", "new"]);
    }

    #[test]
    fn zero_limit_yields_nothing() {
        let now = Utc::now();
        let window = ReportWindow::trailing_days(7, now);
        let kept = apply_window(vec![report_at("a", now)], &window, 0);
        assert!(kept.is_empty());
    }

    #[test]
    fn zero_days_keeps_only_reports_at_or_after_now() {
        let now = Utc::now();
        let window = ReportWindow::trailing_days(0, now);
        let reports = vec![
            report_at("past", now - Duration::seconds(1)),
            report_at("exact", now),
        ];
        let kept = apply_window(reports, &window, 10);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "exact");
    }

    #[test]
    fn window_invariants_hold_for_many_sizes() {
        let now = Utc::now();
        let reports: Vec<Report> = (0..40)
            .map(|i| report_at(&format!("r{i}"), now - Duration::hours(i * 7)))
            .collect();

        for days in [0u32, 1, 2, 5, 30] {
            for limit in [0usize, 1, 3, 10, 100] {
                let window = ReportWindow::trailing_days(days, now);
                let kept = apply_window(reports.clone(), &window, limit);
                assert!(kept.len() <= limit);
                assert!(kept.iter().all(|r| r.created_at >= window.since));
                assert!(kept.windows(2).all(|w| w[0].created_at >= w[1].created_at));
            }
        }
    }
}
