//! Configuration, sourced from the environment as plain key/value pairs.
//!
//! Required keys (missing ⇒ startup failure): `ANTHROPIC_API_KEY`,
//! `GOOGLE_ACCESS_TOKEN`. Everything else has a parsed default.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Model identifiers tried in order when none are configured.
pub const DEFAULT_MODELS: &[&str] = &["claude-sonnet-4-20250514", "claude-3-5-haiku-latest"];

const DEFAULT_QUERY: &str = "in:inbox newer_than:1d";

/// LLM credentials and the ordered model list for failover.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: SecretString,
    pub models: Vec<String>,
}

impl LlmSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = require_env("ANTHROPIC_API_KEY")?;

        let mut models = split_csv(&std::env::var("INBOX_ASSIST_MODELS").unwrap_or_default());
        if models.is_empty() {
            models = DEFAULT_MODELS.iter().map(|m| m.to_string()).collect();
        }

        Ok(Self {
            api_key: SecretString::from(api_key),
            models,
        })
    }
}

/// Mailbox/calendar provider credentials.
///
/// Token refresh is out of scope — the token is consumed as-is and an
/// expired one surfaces as a fetch-stage failure.
#[derive(Debug, Clone)]
pub struct MailSettings {
    pub access_token: SecretString,
}

impl MailSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_token = require_env("GOOGLE_ACCESS_TOKEN")?;
        Ok(Self {
            access_token: SecretString::from(access_token),
        })
    }
}

/// Inbox pipeline settings: VIP allow-lists, work hours, fetch query.
#[derive(Debug, Clone)]
pub struct InboxConfig {
    /// Domains whose senders are always VIP (e.g. `board.example.com`).
    pub vip_domains: Vec<String>,
    /// Individual VIP sender addresses.
    pub vip_senders: Vec<String>,
    /// Work-hour window start, local hour 0–23.
    pub work_hours_start: u8,
    /// Work-hour window end, local hour 0–23.
    pub work_hours_end: u8,
    /// Mailbox list query for the fetch stage.
    pub query: String,
}

impl InboxConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let vip_domains = split_csv(&std::env::var("INBOX_VIP_DOMAINS").unwrap_or_default());
        let vip_senders = split_csv(&std::env::var("INBOX_VIP_SENDERS").unwrap_or_default());

        let work_hours_start = parse_hour(
            "INBOX_WORK_HOURS_START",
            std::env::var("INBOX_WORK_HOURS_START").ok().as_deref(),
            9,
        )?;
        let work_hours_end = parse_hour(
            "INBOX_WORK_HOURS_END",
            std::env::var("INBOX_WORK_HOURS_END").ok().as_deref(),
            18,
        )?;

        let query =
            std::env::var("INBOX_QUERY").unwrap_or_else(|_| DEFAULT_QUERY.to_string());

        Ok(Self {
            vip_domains,
            vip_senders,
            work_hours_start,
            work_hours_end,
            query,
        })
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnvVar(key.to_string())),
    }
}

/// Split a comma-separated env value into trimmed, non-empty entries.
fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse an hour-of-day value, falling back to `default` when unset.
fn parse_hour(key: &str, raw: Option<&str>, default: u8) -> Result<u8, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let hour: u8 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected an integer hour, got '{raw}'"),
        })?;
    if hour > 23 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("hour must be 0-23, got {hour}"),
        });
    }
    Ok(hour)
}
