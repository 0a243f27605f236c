//! Cron-driven trigger for the summary job.
//!
//! Schedules use Unix cron semantics: five fields (`min hour dom month dow`)
//! or six with a leading seconds field, day of week numbered 0-7 with both 0
//! and 7 meaning Sunday. The `cron` crate numbers days 1-7 from Sunday, so
//! numeric day-of-week values are translated before parsing. Runs that
//! collide with an in-flight run are skipped and logged, never queued.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::lock::TriggerSource;
use super::runner::{JobError, SummaryJob};

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid cron expression {expr:?}: {reason}")]
    Invalid { expr: String, reason: String },
}

/// Parse a Unix-style cron expression.
pub fn parse_schedule(expr: &str) -> Result<Schedule, ScheduleError> {
    let invalid = |reason: String| ScheduleError::Invalid {
        expr: expr.to_string(),
        reason,
    };

    let mut fields: Vec<String> = expr.split_whitespace().map(str::to_string).collect();
    match fields.len() {
        5 => fields.insert(0, "0".to_string()),
        6 => {}
        n => return Err(invalid(format!("expected 5 or 6 fields, got {n}"))),
    }
    fields[5] = unix_day_of_week(&fields[5]).map_err(invalid)?;

    Schedule::from_str(&fields.join(" ")).map_err(|e| invalid(e.to_string()))
}

/// Rewrite a Unix day-of-week field (0-7, Sunday = 0 or 7) into the
/// `cron` crate's numbering (1-7, Sunday = 1). Items using day names are
/// left alone.
fn unix_day_of_week(field: &str) -> Result<String, String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }

    let mut items = Vec::new();
    for item in field.split(',') {
        if item.chars().any(|c| c.is_ascii_alphabetic()) {
            items.push(item.to_string());
            continue;
        }

        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("bad day-of-week step {step:?}"))?;
                if step == 0 {
                    return Err("day-of-week step must be positive".into());
                }
                (range, step)
            }
            None => (item, 1),
        };

        let (first, last) = match range {
            "*" => (0, 6),
            _ => match range.split_once('-') {
                Some((a, b)) => (unix_day(a)?, unix_day(b)?),
                None if step > 1 => (unix_day(range)?, 6),
                None => {
                    let day = unix_day(range)?;
                    (day, day)
                }
            },
        };
        if first > last {
            return Err(format!("day-of-week range {range:?} runs backwards"));
        }

        let days: BTreeSet<u32> = (first..=last)
            .step_by(step as usize)
            .map(|d| d % 7 + 1)
            .collect();
        items.extend(days.into_iter().map(|d| d.to_string()));
    }
    Ok(items.join(","))
}

fn unix_day(raw: &str) -> Result<u32, String> {
    match raw.parse::<u32>() {
        Ok(day) if day <= 7 => Ok(day),
        _ => Err(format!("day of week {raw:?} is not in 0-7")),
    }
}

/// Running scheduler task. Dropping the handle also stops it, at the next
/// wait between runs.
pub struct SchedulerHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Scheduler task ended abnormally");
        }
    }
}

pub fn spawn_scheduler(job: Arc<SummaryJob>, schedule: Schedule) -> SchedulerHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                tracing::info!("Schedule has no further occurrences, scheduler exiting");
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tracing::debug!(next = %next.to_rfc3339(), "Next scheduled summary run");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = &mut stop_rx => {
                    tracing::info!("Scheduler stopped");
                    break;
                }
            }

            match job.run(TriggerSource::Schedule).await {
                Ok(report) => tracing::info!(
                    run_id = %report.run_id,
                    fetched = report.fetched,
                    "Scheduled summary run completed"
                ),
                Err(JobError::AlreadyRunning { .. }) => {
                    tracing::warn!("Previous summary run still in flight, skipping this tick")
                }
                Err(e) => tracing::error!(error = %e, "Scheduled summary run failed"),
            }
        }
    });

    SchedulerHandle {
        stop: Some(stop_tx),
        task,
    }
}
