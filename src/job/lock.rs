//! Per-job mutual exclusion.
//!
//! At most one run per job name is in flight. A second trigger while a run
//! holds the lock is refused immediately, never queued. The lock also
//! records what is running for the health endpoint.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use uuid::Uuid;

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Schedule,
    OnDemand,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schedule => write!(f, "schedule"),
            Self::OnDemand => write!(f, "on-demand"),
        }
    }
}

/// Snapshot of a run currently holding the lock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveRun {
    pub job: String,
    pub run_id: Uuid,
    pub trigger: TriggerSource,
    /// When the run started (RFC 3339).
    pub started_at: String,
}

#[derive(Default)]
pub struct JobLock {
    active: Mutex<HashMap<String, ActiveRun>>,
}

impl JobLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `job` for a new run. Returns `None` if it is already running.
    pub fn try_acquire(
        &self,
        job: &str,
        run_id: Uuid,
        trigger: TriggerSource,
    ) -> Option<JobGuard<'_>> {
        let mut active = self.entries();
        if active.contains_key(job) {
            return None;
        }
        active.insert(
            job.to_string(),
            ActiveRun {
                job: job.to_string(),
                run_id,
                trigger,
                started_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        Some(JobGuard {
            lock: self,
            job: job.to_string(),
        })
    }

    pub fn current(&self, job: &str) -> Option<ActiveRun> {
        self.entries().get(job).cloned()
    }

    pub fn is_running(&self, job: &str) -> bool {
        self.current(job).is_some()
    }

    fn release(&self, job: &str) {
        self.entries().remove(job);
    }

    /// The map stays consistent even if a holder panicked, so poisoning is
    /// ignored rather than locking every job out for good.
    fn entries(&self) -> MutexGuard<'_, HashMap<String, ActiveRun>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// RAII claim on a job. Dropping it releases the job.
pub struct JobGuard<'a> {
    lock: &'a JobLock,
    job: String,
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        self.lock.release(&self.job);
    }
}
