use async_trait::async_trait;

use super::SummarizationError;

/// External completion service used by the summarizer.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Abstractive summary of `input` (summarization task).
    async fn summarize(&self, input: &str) -> Result<String, SummarizationError>;

    /// Instruction-following generation bounded by `max_tokens`.
    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, SummarizationError>;
}

#[cfg(test)]
pub use mock::MockCompletionClient;
