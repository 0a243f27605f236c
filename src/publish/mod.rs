//! Social publishing of the public abstract.
//!
//! Publishing is best-effort: the job logs a failure and carries on. The
//! `SocialPublisher` seam lets an API client replace browser automation
//! without touching the job.

pub mod browser;

use async_trait::async_trait;
use thiserror::Error;

pub use browser::BrowserPublisher;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Nothing to publish")]
    EmptyText,

    #[error("Cannot load session cookies: {0}")]
    Session(String),

    #[error("Browser automation failed: {0}")]
    Browser(String),

    #[error("Timed out waiting for {0}")]
    ElementTimeout(String),
}

#[async_trait]
pub trait SocialPublisher: Send + Sync {
    async fn publish(&self, text: &str) -> Result<(), PublishError>;
}

#[cfg(test)]
pub use mock::MockPublisher;
