//! Result distribution: email delivery and document archival.
//!
//! Mail is the primary channel and its failure is fatal to a run.
//! Archival is optional and isolated: the job records a failed upload and
//! still sends the email.

pub mod archive;
pub mod mailer;

use thiserror::Error;

use crate::store::StoreError;

pub use archive::{Archiver, GcsObjectStore, ObjectStore};
pub use mailer::{Distributor, MailTransport, OutgoingMail, SendGridTransport};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Error, Debug)]
pub enum DistributionError {
    #[error("No recipients configured")]
    NoRecipients,

    #[error("Mail service unreachable: {0}")]
    Http(String),

    #[error("Mail service returned error (status {status}): {body}")]
    Status { status: u16, body: String },
}

#[derive(Error, Debug)]
pub enum ArchivalError {
    #[error("Archive session unavailable: {0}")]
    Session(#[from] StoreError),

    #[error("Object storage unreachable: {0}")]
    Http(String),

    #[error("Object storage returned error (status {status}): {body}")]
    Status { status: u16, body: String },
}

/// Comma-separated recipient list, blanks dropped.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipients_are_trimmed_and_blanks_dropped() {
        assert_eq!(
            parse_recipients(" ops@city.gov, ,mayor@city.gov,"),
            vec!["ops@city.gov".to_string(), "mayor@city.gov".to_string()]
        );
        assert!(parse_recipients("").is_empty());
        assert!(parse_recipients(" , ").is_empty());
    }
}
