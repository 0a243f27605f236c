//! Report summarization.
//!
//! Turns a window of reports into a narrative digest, a bounded table and,
//! in ranked mode, a character-capped public abstract. The completion
//! service is never allowed to abort a run: every failure there degrades
//! to fixed placeholder text.

pub mod types;
pub mod digest;
pub mod prompt;
pub mod huggingface;
pub mod orchestrator;

pub use types::*;
pub use digest::*;
pub use huggingface::HuggingFaceClient;
pub use orchestrator::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SummarizationError {
    #[error("Completion service unreachable: {0}")]
    HttpClient(String),

    #[error("Completion service returned error (status {status}): {body}")]
    ServiceError { status: u16, body: String },

    #[error("Completion service returned no text")]
    EmptyResponse,

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),
}
