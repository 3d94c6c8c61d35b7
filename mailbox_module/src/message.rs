use chrono::{DateTime, Utc};
use mailparse::{MailHeaderMap, ParsedMail};
use serde::Serialize;
use tracing::debug;

const SNIPPET_LEN: usize = 200;

/// One decoded mailbox message.
///
/// `id` is the mailbox-scoped identifier (`folder/uid`) used for flag
/// mutation; `message_id` carries the RFC 5322 Message-ID header when the
/// message has one and is the preferred deduplication key, since IMAP uids
/// are only stable within one mailbox session.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub message_id: Option<String>,
    pub subject: String,
    pub sender_address: String,
    pub sender_display_name: String,
    pub recipient: String,
    pub received_at: DateTime<Utc>,
    pub body_text: String,
    pub snippet: String,
    pub is_unread: bool,
}

impl Message {
    /// Decode a raw RFC 822 payload. Never fails: a message that cannot be
    /// parsed degrades to empty fields rather than dropping out of a listing.
    pub(crate) fn from_rfc822(folder: &str, uid: u32, raw: &[u8], is_unread: bool) -> Self {
        let id = format!("{folder}/{uid}");
        let parsed = match mailparse::parse_mail(raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!("failed to parse message {}: {}", id, err);
                return Self::unparsed(id, raw, is_unread);
            }
        };

        let subject = parsed.headers.get_first_value("Subject").unwrap_or_default();
        let from_header = parsed.headers.get_first_value("From").unwrap_or_default();
        let recipient = parsed.headers.get_first_value("To").unwrap_or_default();
        let message_id = parsed
            .headers
            .get_first_value("Message-ID")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let received_at = parsed
            .headers
            .get_first_value("Date")
            .and_then(|value| mailparse::dateparse(&value).ok())
            .and_then(|epoch| DateTime::from_timestamp(epoch, 0))
            // Missing or unparseable Date header falls back to fetch time.
            .unwrap_or_else(Utc::now);

        let (sender_display_name, sender_address) = split_address(&from_header);
        let body_text = extract_body(&parsed);
        let snippet = make_snippet(&body_text);

        Self {
            id,
            message_id,
            subject,
            sender_address,
            sender_display_name,
            recipient,
            received_at,
            body_text,
            snippet,
            is_unread,
        }
    }

    fn unparsed(id: String, raw: &[u8], is_unread: bool) -> Self {
        let body_text = String::from_utf8_lossy(raw).trim().to_string();
        let snippet = make_snippet(&body_text);
        Self {
            id,
            message_id: None,
            subject: String::new(),
            sender_address: String::new(),
            sender_display_name: String::new(),
            recipient: String::new(),
            received_at: Utc::now(),
            body_text,
            snippet,
            is_unread,
        }
    }
}

/// Split `Display Name <addr@example.com>` into (name, address). A bare
/// address yields itself for both parts, matching how the sender is shown
/// when no display name exists.
fn split_address(header: &str) -> (String, String) {
    if let (Some(open), Some(close)) = (header.find('<'), header.rfind('>')) {
        if open < close {
            let name = header[..open].trim().trim_matches('"').to_string();
            let address = header[open + 1..close].trim().to_string();
            let name = if name.is_empty() {
                address.clone()
            } else {
                name
            };
            return (name, address);
        }
    }
    let bare = header.trim().to_string();
    (bare.clone(), bare)
}

/// Pick the message body: the first non-attachment `text/plain` part wins;
/// failing that, the first `text/html` part is passed through as raw markup
/// (no HTML stripping happens here).
fn extract_body(mail: &ParsedMail<'_>) -> String {
    if mail.subparts.is_empty() {
        return mail.get_body().unwrap_or_default().trim().to_string();
    }

    let mut html_fallback = None;
    let mut plain = None;
    walk_parts(mail, &mut plain, &mut html_fallback);

    plain
        .or(html_fallback)
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn walk_parts(part: &ParsedMail<'_>, plain: &mut Option<String>, html: &mut Option<String>) {
    if plain.is_some() {
        return;
    }
    if part.subparts.is_empty() {
        if is_attachment(part) {
            return;
        }
        match part.ctype.mimetype.as_str() {
            "text/plain" => *plain = part.get_body().ok(),
            "text/html" if html.is_none() => *html = part.get_body().ok(),
            _ => {}
        }
        return;
    }
    for sub in &part.subparts {
        walk_parts(sub, plain, html);
    }
}

fn is_attachment(part: &ParsedMail<'_>) -> bool {
    part.headers
        .get_first_value("Content-Disposition")
        .map(|value| value.to_ascii_lowercase().contains("attachment"))
        .unwrap_or(false)
}

fn make_snippet(body: &str) -> String {
    if body.chars().count() <= SNIPPET_LEN {
        return body.to_string();
    }
    let prefix: String = body.chars().take(SNIPPET_LEN).collect();
    format!("{prefix}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(headers: &str, body: &str) -> Vec<u8> {
        format!("{headers}\r\n\r\n{body}").into_bytes()
    }

    #[test]
    fn parses_plain_message() {
        let bytes = raw(
            "Subject: Weekly sync\r\n\
             From: John Doe <john.doe@example.com>\r\n\
             To: jane@example.com\r\n\
             Message-ID: <abc123@example.com>\r\n\
             Date: Mon, 4 Aug 2025 10:30:00 +0000\r\n\
             Content-Type: text/plain; charset=utf-8",
            "Please review the Q4 report by Friday.",
        );
        let message = Message::from_rfc822("INBOX", 42, &bytes, true);

        assert_eq!(message.id, "INBOX/42");
        assert_eq!(message.message_id.as_deref(), Some("<abc123@example.com>"));
        assert_eq!(message.subject, "Weekly sync");
        assert_eq!(message.sender_address, "john.doe@example.com");
        assert_eq!(message.sender_display_name, "John Doe");
        assert_eq!(message.recipient, "jane@example.com");
        assert_eq!(message.body_text, "Please review the Q4 report by Friday.");
        assert!(message.is_unread);
    }

    #[test]
    fn decodes_encoded_word_headers() {
        let bytes = raw(
            "Subject: =?utf-8?B?UsOpdW5pb24gZGVtYWlu?=\r\n\
             From: =?utf-8?Q?Andr=C3=A9?= <andre@example.fr>\r\n\
             Content-Type: text/plain; charset=utf-8",
            "corps",
        );
        let message = Message::from_rfc822("INBOX", 1, &bytes, false);
        assert_eq!(message.subject, "Réunion demain");
        assert_eq!(message.sender_display_name, "André");
    }

    #[test]
    fn malformed_encoding_degrades_to_literal_text() {
        let bytes = raw(
            "Subject: =?nonsense-charset?B?????=\r\nFrom: a@b.c",
            "body",
        );
        let message = Message::from_rfc822("INBOX", 2, &bytes, false);
        // The raw encoded word survives instead of the fetch failing.
        assert!(!message.subject.is_empty());
    }

    #[test]
    fn multipart_prefers_plain_text_part() {
        let bytes = raw(
            "Subject: multi\r\n\
             From: a@b.c\r\n\
             Content-Type: multipart/alternative; boundary=\"XX\"",
            "--XX\r\n\
             Content-Type: text/html; charset=utf-8\r\n\r\n\
             <p>hello html</p>\r\n\
             --XX\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\r\n\
             hello plain\r\n\
             --XX--",
        );
        let message = Message::from_rfc822("INBOX", 3, &bytes, true);
        assert_eq!(message.body_text, "hello plain");
    }

    #[test]
    fn html_only_multipart_falls_back_to_raw_html() {
        let bytes = raw(
            "Subject: html\r\n\
             From: a@b.c\r\n\
             Content-Type: multipart/alternative; boundary=\"XX\"",
            "--XX\r\n\
             Content-Type: text/html; charset=utf-8\r\n\r\n\
             <p>only html</p>\r\n\
             --XX--",
        );
        let message = Message::from_rfc822("INBOX", 4, &bytes, true);
        assert_eq!(message.body_text, "<p>only html</p>");
    }

    #[test]
    fn snippet_is_bounded() {
        let body = "x".repeat(500);
        let bytes = raw(
            "Subject: long\r\nFrom: a@b.c\r\nContent-Type: text/plain",
            &body,
        );
        let message = Message::from_rfc822("INBOX", 5, &bytes, true);
        assert_eq!(message.snippet.chars().count(), SNIPPET_LEN + 3);
        assert!(message.snippet.ends_with("..."));
    }

    #[test]
    fn bare_address_used_for_both_name_and_address() {
        let (name, address) = split_address("plain@example.com");
        assert_eq!(name, "plain@example.com");
        assert_eq!(address, "plain@example.com");
    }
}
