use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use mailbox_module::Message;

use crate::prompt::{
    format_message, ACTION_ITEM_SYSTEM_PROMPT, CATEGORY_SYSTEM_PROMPT, SUMMARY_SYSTEM_PROMPT,
};
use crate::types::{ActionItem, ExtractConfig, ExtractError, MessageOutcome, Summary};

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ExtractionClient {
    config: ExtractConfig,
    http: reqwest::blocking::Client,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl ExtractionClient {
    pub fn new(config: ExtractConfig) -> Result<Self, ExtractError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Extract the action item from one message.
    ///
    /// Transport and API failures surface as errors so the caller can
    /// contain them per message; malformed model output does not — it
    /// degrades to [`ActionItem::none`].
    pub fn extract_action_item(&self, message: &Message) -> Result<ActionItem, ExtractError> {
        let content = self.chat(
            ACTION_ITEM_SYSTEM_PROMPT,
            &format_message(message),
            Some(action_item_schema()),
        )?;

        match serde_json::from_str::<ActionItem>(&content) {
            Ok(item) => Ok(item.validated()),
            Err(err) => {
                warn!(
                    "discarding malformed extraction output for {}: {}",
                    message.id, err
                );
                Ok(ActionItem::none())
            }
        }
    }

    /// Summarize one message into a short text plus key points.
    pub fn summarize(&self, message: &Message) -> Result<Summary, ExtractError> {
        let content = self.chat(
            SUMMARY_SYSTEM_PROMPT,
            &format_message(message),
            Some(summary_schema()),
        )?;
        serde_json::from_str::<Summary>(&content)
            .map_err(|err| ExtractError::Schema(err.to_string()))
    }

    /// Assign a single category label to one message.
    pub fn categorize(&self, message: &Message) -> Result<String, ExtractError> {
        let content = self.chat(CATEGORY_SYSTEM_PROMPT, &format_message(message), None)?;
        Ok(content.trim().to_string())
    }

    /// Run the requested operations over a batch, continuing past individual
    /// failures. Each message records per-operation outcomes independently.
    pub fn process_batch(
        &self,
        messages: &[Message],
        do_extract: bool,
        do_summarize: bool,
        do_categorize: bool,
    ) -> Vec<MessageOutcome> {
        messages
            .iter()
            .map(|message| MessageOutcome {
                message_id: message.id.clone(),
                action_item: do_extract.then(|| self.extract_action_item(message)),
                summary: do_summarize.then(|| self.summarize(message)),
                category: do_categorize.then(|| self.categorize(message)),
            })
            .collect()
    }

    fn chat(
        &self,
        system: &str,
        user: &str,
        response_format: Option<Value>,
    ) -> Result<String, ExtractError> {
        if self.config.api_key.trim().is_empty() {
            return Err(ExtractError::MissingApiKey);
        }

        let mut payload = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });
        if let Some(format) = response_format {
            payload["response_format"] = format;
        }

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        debug!("chat completion request to {} ({})", url, self.config.model);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ExtractError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json()?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ExtractError::EmptyResponse)
    }
}

/// Structured-output contract for action-item extraction.
fn action_item_schema() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "action_item",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {
                    "is_action_item": { "type": "boolean" },
                    "title": { "type": ["string", "null"] },
                    "priority": {
                        "type": ["string", "null"],
                        "enum": ["low", "medium", "high", null]
                    },
                    "due_date": {
                        "type": ["string", "null"],
                        "description": "YYYY-MM-DD"
                    },
                    "raw_notes": { "type": ["string", "null"] }
                },
                "required": ["is_action_item", "title", "priority", "due_date", "raw_notes"],
                "additionalProperties": false
            }
        }
    })
}

fn summary_schema() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "message_summary",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {
                    "summary": { "type": "string" },
                    "key_points": {
                        "type": "array",
                        "items": { "type": "string" }
                    }
                },
                "required": ["summary", "key_points"],
                "additionalProperties": false
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn test_message() -> Message {
        message_with_body("Please review the Q4 report by Friday")
    }

    fn message_with_body(body: &str) -> Message {
        Message {
            id: "INBOX/9".to_string(),
            message_id: Some("<m9@example.com>".to_string()),
            subject: "Q4 report".to_string(),
            sender_address: "boss@example.com".to_string(),
            sender_display_name: "Boss".to_string(),
            recipient: "me@example.com".to_string(),
            received_at: Utc::now(),
            body_text: body.to_string(),
            snippet: body.chars().take(200).collect(),
            is_unread: true,
        }
    }

    fn client_for(server: &mockito::ServerGuard) -> ExtractionClient {
        ExtractionClient::new(ExtractConfig {
            base_url: server.url(),
            api_key: "test-key".to_string(),
            model: "gpt-test".to_string(),
            request_timeout: Duration::from_secs(5),
        })
        .expect("client")
    }

    fn chat_body(content: &str) -> String {
        serde_json::to_string(&json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        }))
        .expect("serialize")
    }

    #[test]
    fn extracts_structured_action_item() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(chat_body(
                r#"{"is_action_item":true,"title":"Review the Q4 report","priority":"high","due_date":"2026-08-28","raw_notes":null}"#,
            ))
            .create();

        let client = client_for(&server);
        let item = client.extract_action_item(&test_message()).expect("extract");

        assert!(item.is_action_item);
        assert_eq!(item.title.as_deref(), Some("Review the Q4 report"));
        assert_eq!(item.priority, Some(crate::Priority::High));
        mock.assert();
    }

    #[test]
    fn malformed_output_degrades_to_non_action_item() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(chat_body("I could not find any JSON to produce, sorry!"))
            .create();

        let client = client_for(&server);
        let item = client.extract_action_item(&test_message()).expect("extract");
        assert!(!item.is_action_item);
        assert!(item.title.is_none());
    }

    #[test]
    fn server_error_surfaces_as_api_error() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("boom")
            .create();

        let client = client_for(&server);
        match client.extract_action_item(&test_message()) {
            Err(ExtractError::Api { status: 500, .. }) => {}
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn missing_api_key_fails_without_network() {
        let client = ExtractionClient::new(ExtractConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            api_key: String::new(),
            model: "gpt-test".to_string(),
            request_timeout: Duration::from_secs(1),
        })
        .expect("client");

        match client.extract_action_item(&test_message()) {
            Err(ExtractError::MissingApiKey) => {}
            other => panic!("expected MissingApiKey, got {other:?}"),
        }
    }

    #[test]
    fn summarize_parses_summary_and_key_points() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(chat_body(
                r#"{"summary":"Boss wants the Q4 report reviewed.","key_points":["Q4 report","due Friday"]}"#,
            ))
            .create();

        let client = client_for(&server);
        let summary = client.summarize(&test_message()).expect("summarize");
        assert_eq!(summary.summary, "Boss wants the Q4 report reviewed.");
        assert_eq!(summary.key_points, ["Q4 report", "due Friday"]);
    }

    #[test]
    fn summarize_rejects_non_schema_output() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(chat_body("here is some prose instead of JSON"))
            .create();

        let client = client_for(&server);
        match client.summarize(&test_message()) {
            Err(ExtractError::Schema(_)) => {}
            other => panic!("expected Schema error, got {other:?}"),
        }
    }

    #[test]
    fn categorize_trims_whitespace() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(chat_body("  work \n"))
            .create();

        let client = client_for(&server);
        assert_eq!(client.categorize(&test_message()).expect("categorize"), "work");
    }

    #[test]
    fn batch_keeps_going_past_failures() {
        let mut server = mockito::Server::new();
        // The message carrying the "msg-broken" marker hits a failing
        // backend; the other two succeed.
        server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::Regex("msg-broken".to_string()))
            .with_status(502)
            .with_body("bad gateway")
            .expect(1)
            .create();
        server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::Regex("msg-ok".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(chat_body(
                r#"{"is_action_item":false,"title":null,"priority":null,"due_date":null,"raw_notes":null}"#,
            ))
            .expect(2)
            .create();

        let client = client_for(&server);
        let messages = vec![
            message_with_body("msg-ok first"),
            message_with_body("msg-broken second"),
            message_with_body("msg-ok third"),
        ];
        let outcomes = client.process_batch(&messages, true, false, false);

        assert_eq!(outcomes.len(), 3);
        let failed = outcomes
            .iter()
            .filter(|outcome| matches!(outcome.action_item, Some(Err(_))))
            .count();
        assert_eq!(failed, 1);
        assert!(outcomes.iter().all(|outcome| outcome.summary.is_none()));
    }
}
