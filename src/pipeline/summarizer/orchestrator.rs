use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::digest::{build_digest, build_table, rank_reports, truncate_chars};
use super::prompt::{
    build_abstract_prompt, build_breakdown_prompt, ABSTRACT_SYSTEM_PROMPT,
    BREAKDOWN_SYSTEM_PROMPT,
};
use super::types::CompletionClient;
use crate::config::{SummaryConfig, SummaryMode};
use crate::models::{Report, SummaryResult};

/// Summary text used when the completion service cannot be reached or
/// answers with an error status.
pub const FAILURE_PLACEHOLDER: &str = "Summary generation failed.";

/// Summary text used when the service answered but produced nothing.
pub const EMPTY_PLACEHOLDER: &str = "Summary generation failed. Please try again later.";

const BREAKDOWN_MAX_TOKENS: u32 = 700;
const ABSTRACT_MAX_TOKENS: u32 = 120;

#[derive(Debug, Clone, Copy)]
pub struct SummarizerOptions {
    pub mode: SummaryMode,
    pub digest_max_chars: usize,
    pub abstract_max_chars: usize,
}

impl From<&SummaryConfig> for SummarizerOptions {
    fn from(config: &SummaryConfig) -> Self {
        Self {
            mode: config.mode,
            digest_max_chars: config.digest_max_chars,
            abstract_max_chars: config.abstract_max_chars,
        }
    }
}

/// Turns a report window into a `SummaryResult`. Never fails: completion
/// errors are logged and replaced by placeholder text.
pub struct Summarizer {
    client: Arc<dyn CompletionClient>,
    options: SummarizerOptions,
}

impl Summarizer {
    pub fn new(client: Arc<dyn CompletionClient>, options: SummarizerOptions) -> Self {
        Self { client, options }
    }

    pub fn mode(&self) -> SummaryMode {
        self.options.mode
    }

    pub async fn summarize(&self, reports: &[Report], period_label: &str) -> SummaryResult {
        if reports.is_empty() {
            tracing::info!(period = period_label, "No reports in window, skipping completion");
            return SummaryResult::empty(period_label);
        }

        let ranked = rank_reports(reports, self.options.mode);
        let digest = build_digest(&ranked, self.options.digest_max_chars);
        let table_data = build_table(&ranked);

        let (summary, degraded) = match self.options.mode {
            SummaryMode::Plain => self.plain_summary(&digest).await,
            SummaryMode::Ranked => self.breakdown(&digest, period_label, reports.len()).await,
        };

        let public_abstract = match self.options.mode {
            SummaryMode::Ranked => self.public_abstract(&digest, period_label).await,
            SummaryMode::Plain => None,
        };

        tracing::info!(
            reports = reports.len(),
            rows = table_data.len(),
            digest_chars = digest.chars().count(),
            degraded,
            has_abstract = public_abstract.is_some(),
            "Summary generated"
        );

        SummaryResult {
            summary,
            table_data,
            public_abstract,
            degraded,
        }
    }

    async fn plain_summary(&self, digest: &str) -> (String, bool) {
        match self.client.summarize(digest).await {
            Ok(text) => (text.trim().to_string(), false),
            Err(e) => placeholder_for(&e),
        }
    }

    async fn breakdown(&self, digest: &str, period_label: &str, total: usize) -> (String, bool) {
        let prompt = build_breakdown_prompt(digest, period_label, total);
        match self
            .client
            .generate(BREAKDOWN_SYSTEM_PROMPT, &prompt, BREAKDOWN_MAX_TOKENS)
            .await
        {
            Ok(text) => (text.trim().to_string(), false),
            Err(e) => placeholder_for(&e),
        }
    }

    async fn public_abstract(&self, digest: &str, period_label: &str) -> Option<String> {
        let max_chars = self.options.abstract_max_chars;
        let prompt = build_abstract_prompt(digest, period_label, max_chars);
        match self
            .client
            .generate(ABSTRACT_SYSTEM_PROMPT, &prompt, ABSTRACT_MAX_TOKENS)
            .await
        {
            Ok(raw) => {
                let cleaned = clean_abstract(&raw);
                if cleaned.is_empty() {
                    return None;
                }
                let produced = cleaned.chars().count();
                if produced > max_chars {
                    tracing::warn!(produced, max_chars, "Abstract over ceiling, truncating");
                }
                Some(truncate_chars(&cleaned, max_chars))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Abstract generation failed, continuing without one");
                None
            }
        }
    }
}

fn placeholder_for(error: &super::SummarizationError) -> (String, bool) {
    use super::SummarizationError;

    tracing::warn!(error = %error, "Summary generation failed, using placeholder");
    let text = match error {
        SummarizationError::EmptyResponse => EMPTY_PLACEHOLDER,
        _ => FAILURE_PLACEHOLDER,
    };
    (text.to_string(), true)
}

/// Single line, no wrapping quotes.
fn clean_abstract(raw: &str) -> String {
    static WHITESPACE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    let collapsed = WHITESPACE_RE.replace_all(raw.trim(), " ");
    collapsed
        .trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”'))
        .trim()
        .to_string()
}
