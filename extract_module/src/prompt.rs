use mailbox_module::Message;

use crate::types::BODY_CHAR_CAP;

pub(crate) const ACTION_ITEM_SYSTEM_PROMPT: &str = "\
You are a helpful assistant that processes messages and identifies action items.

Analyze the provided message and determine if it contains any action items or tasks that need to be done.

Rules:
1. If the message contains an action item, return is_action_item: true
2. Extract a clear, concise action item title (task description)
3. Identify any due dates mentioned (format: YYYY-MM-DD)
4. Determine priority: \"low\", \"medium\", or \"high\" based on urgency
5. If no action item exists, return is_action_item: false with null for the other fields

Examples of action items:
- \"Review the Q4 budget report by Friday\"
- \"Deploy the new feature to staging\"
- \"Schedule a meeting with the marketing team\"

Examples of non-action items:
- \"Thanks for your help!\"
- \"The meeting went well yesterday\"
- \"Here's the document you requested\"";

pub(crate) const SUMMARY_SYSTEM_PROMPT: &str = "\
You are a helpful assistant that summarizes messages.

Produce a short summary (2-3 sentences) of the provided message and list its key points as short bullet strings.";

pub(crate) const CATEGORY_SYSTEM_PROMPT: &str = "\
You are a helpful assistant that categorizes messages.

Reply with a single short category label for the provided message, such as: work, personal, finance, newsletter, notification, spam, other. Reply with the label only.";

/// Render one message for the model. The body is capped so a long email
/// cannot blow up token cost or latency.
pub(crate) fn format_message(message: &Message) -> String {
    format!(
        "Subject: {}\nFrom: {} <{}>\nTo: {}\nDate: {}\n\nContent:\n{}",
        message.subject,
        message.sender_display_name,
        message.sender_address,
        message.recipient,
        message.received_at.to_rfc3339(),
        truncate_chars(&message.body_text, BODY_CHAR_CAP),
    )
}

fn truncate_chars(value: &str, cap: usize) -> String {
    if value.chars().count() <= cap {
        return value.to_string();
    }
    value.chars().take(cap).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(body: &str) -> Message {
        Message {
            id: "INBOX/1".to_string(),
            message_id: Some("<m1@example.com>".to_string()),
            subject: "Status".to_string(),
            sender_address: "a@example.com".to_string(),
            sender_display_name: "A".to_string(),
            recipient: "b@example.com".to_string(),
            received_at: Utc::now(),
            body_text: body.to_string(),
            snippet: body.chars().take(200).collect(),
            is_unread: true,
        }
    }

    #[test]
    fn prompt_includes_subject_and_sender() {
        let rendered = format_message(&message("hello"));
        assert!(rendered.contains("Subject: Status"));
        assert!(rendered.contains("A <a@example.com>"));
        assert!(rendered.contains("hello"));
    }

    #[test]
    fn prompt_body_is_capped() {
        let rendered = format_message(&message(&"x".repeat(BODY_CHAR_CAP * 2)));
        assert!(rendered.chars().count() < BODY_CHAR_CAP + 300);
    }
}
