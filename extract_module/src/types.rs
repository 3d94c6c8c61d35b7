use std::env;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 45;
/// Bodies are truncated to this many characters before prompting, bounding
/// cost and latency per message.
pub const BODY_CHAR_CAP: usize = 4000;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("llm api key is not configured (set OPENAI_API_KEY)")]
    MissingApiKey,
    #[error("llm request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("llm returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("llm response had no content")]
    EmptyResponse,
    #[error("llm output did not match the expected schema: {0}")]
    Schema(String),
}

/// Connection parameters for the completion backend.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl ExtractConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let api_key = env::var("OPENAI_API_KEY").unwrap_or_default();
        let model = env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let request_timeout = env::var("LLM_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));

        Self {
            base_url,
            api_key,
            model,
            request_timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[serde(alias = "Low", alias = "LOW")]
    Low,
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "High", alias = "HIGH")]
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// The structured result of analyzing one message.
///
/// `title` is present iff `is_action_item` is true; [`ActionItem::none`]
/// is the canonical "nothing to do" value also used when model output
/// cannot be decoded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionItem {
    pub is_action_item: bool,
    #[serde(default, alias = "action_item")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_priority")]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub raw_notes: Option<String>,
}

impl ActionItem {
    /// The non-action-item value.
    pub fn none() -> Self {
        Self::default()
    }

    /// An action item without a title is invalid; normalize it away.
    pub(crate) fn validated(mut self) -> Self {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() && self.is_action_item => {
                self.title = Some(title.to_string());
                self
            }
            _ => Self::none(),
        }
    }
}

/// Model due dates arrive as `YYYY-MM-DD` strings; anything else becomes
/// `None` rather than failing the whole decode.
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()))
}

fn lenient_priority<'de, D>(deserializer: D) -> Result<Option<Priority>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match value.trim().to_ascii_lowercase().as_str() {
        "low" => Some(Priority::Low),
        "medium" => Some(Priority::Medium),
        "high" => Some(Priority::High),
        _ => None,
    }))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
}

/// Per-message, per-operation batch result. Operations that were not
/// requested stay `None`; requested operations record their own success or
/// failure independently.
#[derive(Debug)]
pub struct MessageOutcome {
    pub message_id: String,
    pub action_item: Option<Result<ActionItem, ExtractError>>,
    pub summary: Option<Result<Summary, ExtractError>>,
    pub category: Option<Result<String, ExtractError>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_date_accepts_iso_and_drops_garbage() {
        let item: ActionItem =
            serde_json::from_str(r#"{"is_action_item":true,"title":"t","due_date":"2026-08-29"}"#)
                .expect("decode");
        assert_eq!(
            item.due_date,
            NaiveDate::from_ymd_opt(2026, 8, 29)
        );

        let item: ActionItem =
            serde_json::from_str(r#"{"is_action_item":true,"title":"t","due_date":"next Friday"}"#)
                .expect("decode");
        assert_eq!(item.due_date, None);
    }

    #[test]
    fn capitalized_priority_still_decodes() {
        let item: ActionItem =
            serde_json::from_str(r#"{"is_action_item":true,"title":"t","priority":"High"}"#)
                .expect("decode");
        assert_eq!(item.priority, Some(Priority::High));
    }

    #[test]
    fn action_item_without_title_normalizes_to_none() {
        let item = ActionItem {
            is_action_item: true,
            title: Some("   ".to_string()),
            ..ActionItem::default()
        };
        let item = item.validated();
        assert!(!item.is_action_item);
        assert!(item.title.is_none());
    }
}
