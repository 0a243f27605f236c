//! The summary job and its triggers.

pub mod lock;
pub mod runner;
pub mod scheduler;

pub use lock::{ActiveRun, JobLock, TriggerSource};
pub use runner::{
    JobError, JobOptions, JobStages, RunReport, RunState, Stage, StageOutcome, StageRecord, SummaryJob,
    SUMMARY_JOB,
};
pub use scheduler::{parse_schedule, spawn_scheduler, ScheduleError, SchedulerHandle};
