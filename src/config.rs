//! Process configuration, read once at startup from the environment.
//!
//! Every recognized variable has a typed default. Malformed numbers or
//! booleans are rejected at startup rather than silently defaulted, so a
//! typo in `SUMMARY_LOOKBACK_DAYS` never turns into a zero-day window.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "PublicEye";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Longest accepted lookback window, in days.
pub const MAX_LOOKBACK_DAYS: u32 = 36_500;

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "publiceye_lib=info,tower_http=info"
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

// ═══════════════════════════════════════════════════════════
// Sections
// ═══════════════════════════════════════════════════════════

/// Document-store access.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub service_account_path: PathBuf,
    pub project_id: Option<String>,
    pub collection: String,
    /// `host:port` of a local Firestore emulator. Disables auth when set.
    pub emulator_host: Option<String>,
}

/// How the digest is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    /// Plain digest for email only.
    Plain,
    /// Flag-ranked digest, six-section breakdown and a public abstract.
    Ranked,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryConfig {
    pub lookback_days: u32,
    pub fetch_limit: usize,
    pub mode: SummaryMode,
    pub digest_max_chars: usize,
    pub abstract_max_chars: usize,
    pub hf_token: String,
    pub hf_base_url: String,
    pub summary_model: String,
    pub chat_model: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MailConfig {
    /// Raw comma-separated list; parsed per send.
    pub recipients: String,
    pub sender: String,
    pub sendgrid_api_key: String,
    pub sendgrid_base_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveConfig {
    pub enabled: bool,
    pub bucket: Option<String>,
    pub fixed_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishConfig {
    pub enabled: bool,
    pub cookies_path: PathBuf,
    pub composer_url: String,
    pub headless: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub cron_schedule: Option<String>,
}

/// Full process configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub summary: SummaryConfig,
    pub mail: MailConfig,
    pub archive: ArchiveConfig,
    pub publish: PublishConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let text = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let mode = match var("SUMMARY_MODE").as_deref() {
            None | Some("plain") => SummaryMode::Plain,
            Some("ranked") => SummaryMode::Ranked,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "SUMMARY_MODE",
                    value: other.to_string(),
                    reason: "expected \"plain\" or \"ranked\"".into(),
                })
            }
        };

        let lookback_days: u32 = parse_number(&var, "SUMMARY_LOOKBACK_DAYS", 2)?;
        if lookback_days > MAX_LOOKBACK_DAYS {
            return Err(ConfigError::InvalidValue {
                key: "SUMMARY_LOOKBACK_DAYS",
                value: lookback_days.to_string(),
                reason: format!("at most {MAX_LOOKBACK_DAYS} days"),
            });
        }

        Ok(Self {
            store: StoreConfig {
                service_account_path: PathBuf::from(text(
                    "FIREBASE_SERVICE_ACCOUNT_PATH",
                    "./serviceAccount.json",
                )),
                project_id: var("FIRESTORE_PROJECT_ID"),
                collection: text("FIRESTORE_COLLECTION", "reports"),
                emulator_host: var("FIRESTORE_EMULATOR_HOST"),
            },
            summary: SummaryConfig {
                lookback_days,
                fetch_limit: parse_number(&var, "SUMMARY_FETCH_LIMIT", 500)?,
                mode,
                digest_max_chars: parse_number(&var, "SUMMARY_DIGEST_MAX_CHARS", 10_000)?,
                abstract_max_chars: parse_number(&var, "ABSTRACT_MAX_CHARS", 240)?,
                hf_token: text("HF_TOKEN", ""),
                hf_base_url: text("HF_BASE_URL", "https://router.huggingface.co"),
                summary_model: text("SUMMARY_MODEL", "facebook/bart-large-cnn"),
                chat_model: text("SUMMARY_CHAT_MODEL", "meta-llama/Llama-3.1-8B-Instruct"),
            },
            mail: MailConfig {
                recipients: text("SUMMARY_RECIPIENTS", ""),
                sender: text("SUMMARY_SENDER", "no-reply@example.com"),
                sendgrid_api_key: text("SENDGRID_API_KEY", ""),
                sendgrid_base_url: text("SENDGRID_BASE_URL", "https://api.sendgrid.com"),
            },
            archive: ArchiveConfig {
                enabled: parse_flag(&var, "UPLOAD_PDF_TO_STORAGE")?,
                bucket: var("FIREBASE_STORAGE_BUCKET"),
                fixed_path: var("PDF_STORAGE_PATH"),
            },
            publish: PublishConfig {
                enabled: parse_flag(&var, "SOCIAL_PUBLISH_ENABLED")?,
                cookies_path: PathBuf::from(text("SOCIAL_COOKIES_PATH", "./cookies.json")),
                composer_url: text("SOCIAL_COMPOSER_URL", "https://x.com/home"),
                headless: parse_flag(&var, "SOCIAL_HEADLESS")?,
            },
            server: ServerConfig {
                port: parse_number(&var, "PORT", 5000)?,
                cron_schedule: var("CRON_SCHEDULE"),
            },
        })
    }

    /// Build configuration from a fixed map. Convenient in tests.
    pub fn from_map(vars: &HashMap<&str, &str>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }
}

fn parse_number<T, F>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn parse_flag<F>(var: &F, key: &'static str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key).map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("false") | Some("0") | Some("no") => Ok(false),
        Some("true") | Some("1") | Some("yes") => Ok(true),
        Some(other) => Err(ConfigError::InvalidValue {
            key,
            value: other.to_string(),
            reason: "expected a boolean".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_server() {
        let config = AppConfig::from_map(&HashMap::new()).unwrap();
        assert_eq!(config.summary.lookback_days, 2);
        assert_eq!(config.summary.fetch_limit, 500);
        assert_eq!(config.summary.mode, SummaryMode::Plain);
        assert_eq!(config.summary.abstract_max_chars, 240);
        assert_eq!(config.mail.sender, "no-reply@example.com");
        assert_eq!(config.store.collection, "reports");
        assert_eq!(config.server.port, 5000);
        assert!(config.server.cron_schedule.is_none());
        assert!(!config.archive.enabled);
        assert!(!config.publish.enabled);
    }

    #[test]
    fn reads_overrides() {
        let vars = HashMap::from([
            ("SUMMARY_LOOKBACK_DAYS", "7"),
            ("SUMMARY_MODE", "ranked"),
            ("UPLOAD_PDF_TO_STORAGE", "true"),
            ("PDF_STORAGE_PATH", "digests/latest.pdf"),
            ("CRON_SCHEDULE", "0 8 * * *"),
            ("PORT", "8080"),
        ]);
        let config = AppConfig::from_map(&vars).unwrap();
        assert_eq!(config.summary.lookback_days, 7);
        assert_eq!(config.summary.mode, SummaryMode::Ranked);
        assert!(config.archive.enabled);
        assert_eq!(config.archive.fixed_path.as_deref(), Some("digests/latest.pdf"));
        assert_eq!(config.server.cron_schedule.as_deref(), Some("0 8 * * *"));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn lookback_beyond_bound_is_rejected() {
        let vars = HashMap::from([("SUMMARY_LOOKBACK_DAYS", "200000000")]);
        let err = AppConfig::from_map(&vars).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "SUMMARY_LOOKBACK_DAYS",
                ..
            }
        ));

        let max = MAX_LOOKBACK_DAYS.to_string();
        let vars = HashMap::from([("SUMMARY_LOOKBACK_DAYS", max.as_str())]);
        assert_eq!(
            AppConfig::from_map(&vars).unwrap().summary.lookback_days,
            MAX_LOOKBACK_DAYS
        );
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let vars = HashMap::from([("SUMMARY_SENDER", "   "), ("PDF_STORAGE_PATH", "")]);
        let config = AppConfig::from_map(&vars).unwrap();
        assert_eq!(config.mail.sender, "no-reply@example.com");
        assert!(config.archive.fixed_path.is_none());
    }

    #[test]
    fn rejects_malformed_number() {
        let vars = HashMap::from([("SUMMARY_LOOKBACK_DAYS", "two")]);
        let err = AppConfig::from_map(&vars).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "SUMMARY_LOOKBACK_DAYS", .. }
        ));
    }

    #[test]
    fn rejects_unknown_mode() {
        let vars = HashMap::from([("SUMMARY_MODE", "fancy")]);
        assert!(AppConfig::from_map(&vars).is_err());
    }

    #[test]
    fn rejects_malformed_flag() {
        let vars = HashMap::from([("UPLOAD_PDF_TO_STORAGE", "maybe")]);
        assert!(AppConfig::from_map(&vars).is_err());
    }

    #[test]
    fn app_name_is_publiceye() {
        assert_eq!(APP_NAME, "PublicEye");
    }
}
