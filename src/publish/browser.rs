//! Posting through a headless Chromium session.
//!
//! No interactive login: the session is restored from a cookie export
//! captured earlier. The composer is located by selector, the text typed
//! one character at a time, and the post control clicked.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, TimeSinceEpoch};
use chromiumoxide::element::Element;
use chromiumoxide::Page;
use futures_util::StreamExt;
use serde::Deserialize;

use super::{PublishError, SocialPublisher};
use crate::config::PublishConfig;

pub const COMPOSER_SELECTOR: &str = r#"div[data-testid="tweetTextarea_0"]"#;
pub const POST_BUTTON_SELECTOR: &str = r#"[data-testid="tweetButtonInline"]"#;

const KEYSTROKE_DELAY: Duration = Duration::from_millis(10);
const SETTLE_DELAY: Duration = Duration::from_millis(1500);
const ELEMENT_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// One entry of a browser cookie export.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportedCookie {
    name: String,
    value: String,
    domain: Option<String>,
    path: Option<String>,
    #[serde(default)]
    secure: bool,
    #[serde(default)]
    http_only: bool,
    /// Seconds since epoch; zero or negative for session cookies.
    expires: Option<f64>,
}

/// Load a cookie export into CDP cookie parameters.
pub fn load_cookies(path: &Path) -> Result<Vec<CookieParam>, PublishError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| PublishError::Session(format!("{}: {e}", path.display())))?;
    let exported: Vec<ExportedCookie> = serde_json::from_str(&raw)
        .map_err(|e| PublishError::Session(format!("{}: {e}", path.display())))?;

    if exported.is_empty() {
        return Err(PublishError::Session(format!(
            "{}: no cookies in export",
            path.display()
        )));
    }

    exported
        .into_iter()
        .map(|c| {
            let mut builder = CookieParam::builder()
                .name(c.name)
                .value(c.value)
                .secure(c.secure)
                .http_only(c.http_only);
            if let Some(domain) = c.domain {
                builder = builder.domain(domain);
            }
            if let Some(path) = c.path {
                builder = builder.path(path);
            }
            if let Some(expires) = c.expires.filter(|e| *e > 0.0) {
                builder = builder.expires(TimeSinceEpoch::new(expires));
            }
            builder.build().map_err(PublishError::Session)
        })
        .collect()
}

pub struct BrowserPublisher {
    cookies_path: PathBuf,
    composer_url: String,
    headless: bool,
}

impl BrowserPublisher {
    pub fn new(cookies_path: PathBuf, composer_url: &str, headless: bool) -> Self {
        Self {
            cookies_path,
            composer_url: composer_url.to_string(),
            headless,
        }
    }

    pub fn from_config(config: &PublishConfig) -> Self {
        Self::new(config.cookies_path.clone(), &config.composer_url, config.headless)
    }

    async fn compose(&self, page: &Page, cookies: Vec<CookieParam>, text: &str) -> Result<(), PublishError> {
        page.set_cookies(cookies).await.map_err(browser_err)?;
        page.goto(self.composer_url.as_str()).await.map_err(browser_err)?;

        let editor = wait_for(page, COMPOSER_SELECTOR).await?;
        editor.focus().await.map_err(browser_err)?;
        for ch in text.chars() {
            editor
                .type_str(ch.to_string())
                .await
                .map_err(browser_err)?;
            tokio::time::sleep(KEYSTROKE_DELAY).await;
        }

        let button = wait_for(page, POST_BUTTON_SELECTOR).await?;
        button.click().await.map_err(browser_err)?;
        tokio::time::sleep(SETTLE_DELAY).await;
        Ok(())
    }
}

fn browser_err(e: impl std::fmt::Display) -> PublishError {
    PublishError::Browser(e.to_string())
}

/// Poll for `selector` until it appears or `ELEMENT_TIMEOUT` elapses.
async fn wait_for(page: &Page, selector: &str) -> Result<Element, PublishError> {
    let deadline = tokio::time::Instant::now() + ELEMENT_TIMEOUT;
    loop {
        if let Ok(element) = page.find_element(selector).await {
            return Ok(element);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(PublishError::ElementTimeout(selector.to_string()));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[async_trait]
impl SocialPublisher for BrowserPublisher {
    async fn publish(&self, text: &str) -> Result<(), PublishError> {
        if text.trim().is_empty() {
            return Err(PublishError::EmptyText);
        }
        // Cookies first: no point launching a browser without a session.
        let cookies = load_cookies(&self.cookies_path)?;

        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox");
        if !self.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(PublishError::Browser)?;

        let (mut browser, mut handler) = Browser::launch(config).await.map_err(browser_err)?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let outcome = match browser.new_page("about:blank").await {
            Ok(page) => self.compose(&page, cookies, text).await,
            Err(e) => Err(browser_err(e)),
        };

        // Tear down whatever happened above.
        if let Err(e) = browser.close().await {
            tracing::warn!(error = %e, "Browser close failed");
        }
        let _ = browser.wait().await;
        events.abort();

        if outcome.is_ok() {
            tracing::info!(chars = text.chars().count(), "Abstract posted");
        }
        outcome
    }
}
