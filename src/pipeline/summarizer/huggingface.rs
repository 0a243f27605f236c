use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::CompletionClient;
use super::SummarizationError;
use crate::config::SummaryConfig;

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Hugging Face inference client.
///
/// Summaries go through the hosted summarization task
/// (`/hf-inference/models/<model>`); instruction prompts go through the
/// OpenAI-compatible router (`/v1/chat/completions`).
pub struct HuggingFaceClient {
    base_url: String,
    token: String,
    summary_model: String,
    chat_model: String,
    client: reqwest::Client,
}

impl HuggingFaceClient {
    pub fn new(
        base_url: &str,
        token: &str,
        summary_model: &str,
        chat_model: &str,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to build HTTP client with timeout, using default client");
                reqwest::Client::new()
            });

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            summary_model: summary_model.to_string(),
            chat_model: chat_model.to_string(),
            client,
        }
    }

    pub fn from_config(config: &SummaryConfig) -> Self {
        Self::new(
            &config.hf_base_url,
            &config.hf_token,
            &config.summary_model,
            &config.chat_model,
        )
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<reqwest::Response, SummarizationError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SummarizationError::HttpClient(format!(
                        "Request timed out after {REQUEST_TIMEOUT_SECS}s"
                    ))
                } else {
                    SummarizationError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizationError::ServiceError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

/// Request body for the summarization task.
#[derive(Serialize)]
struct SummarizeRequest<'a> {
    inputs: &'a str,
    parameters: SummarizeParameters,
}

#[derive(Serialize)]
struct SummarizeParameters {
    max_length: u32,
    min_length: u32,
    do_sample: bool,
}

#[derive(Deserialize)]
struct SummaryText {
    summary_text: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for HuggingFaceClient {
    async fn summarize(&self, input: &str) -> Result<String, SummarizationError> {
        let url = format!("{}/hf-inference/models/{}", self.base_url, self.summary_model);
        let body = SummarizeRequest {
            inputs: input,
            parameters: SummarizeParameters {
                max_length: 700,
                min_length: 150,
                do_sample: false,
            },
        };

        let parsed: Vec<SummaryText> = self
            .post_json(&url, &body)
            .await?
            .json()
            .await
            .map_err(|e| SummarizationError::ResponseParsing(e.to_string()))?;

        parsed
            .into_iter()
            .next()
            .and_then(|s| s.summary_text)
            .filter(|s| !s.trim().is_empty())
            .ok_or(SummarizationError::EmptyResponse)
    }

    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, SummarizationError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.chat_model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: prompt },
            ],
            max_tokens,
            temperature: 0.2,
        };

        let parsed: ChatResponse = self
            .post_json(&url, &body)
            .await?
            .json()
            .await
            .map_err(|e| SummarizationError::ResponseParsing(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|s| !s.trim().is_empty())
            .ok_or(SummarizationError::EmptyResponse)
    }
}
