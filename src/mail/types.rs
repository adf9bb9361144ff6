//! Mailbox and calendar data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable snapshot of one mailbox message, taken once per pipeline run.
///
/// Mutations (archive, label) are requested against the store and are
/// never reflected back into the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailMessage {
    /// Opaque message id, unique per message.
    pub id: String,
    /// Thread id, shared by related messages.
    pub thread_id: String,
    /// Sender, as the provider reports it (may be `Name <addr>`).
    pub sender: String,
    /// Primary recipient.
    pub recipient: String,
    pub subject: String,
    pub snippet: String,
    /// Plain-text body; may be empty.
    pub body_text: String,
    /// HTML body; may be empty.
    pub body_html: String,
    pub received_at: DateTime<Utc>,
    /// Label identifiers currently on the message.
    pub label_ids: Vec<String>,
}

impl MailMessage {
    /// Body text for LLM consumption: plain text, else HTML, else snippet.
    pub fn best_body(&self) -> &str {
        if !self.body_text.trim().is_empty() {
            &self.body_text
        } else if !self.body_html.trim().is_empty() {
            &self.body_html
        } else {
            &self.snippet
        }
    }

    /// Whether the snapshot carries the given label id (case-insensitive).
    pub fn has_label(&self, name: &str) -> bool {
        self.label_ids.iter().any(|l| l.eq_ignore_ascii_case(name))
    }

    /// Bare email address from the sender field (`Name <a@b>` → `a@b`).
    pub fn sender_address(&self) -> &str {
        address_of(&self.sender)
    }
}

/// Extract the bare address from a header-style value like
/// `"Jane Doe" <jane@example.com>`. Returns the trimmed input when no
/// angle-bracket form is present.
pub fn address_of(value: &str) -> &str {
    if let (Some(start), Some(end)) = (value.find('<'), value.rfind('>'))
        && end > start
    {
        return value[start + 1..end].trim();
    }
    value.trim()
}

/// Reply-relevant headers fetched for one message, normalized to bare
/// addresses where applicable.
#[derive(Debug, Clone, Default)]
pub struct MessageHeaders {
    /// Bare Reply-To address, if present.
    pub reply_to: Option<String>,
    /// Bare From address, if present.
    pub from: Option<String>,
    /// RFC 5322 Message-ID header value (with angle brackets).
    pub message_id: Option<String>,
    /// References header value, if present.
    pub references: Option<String>,
}

/// A reply draft to materialize in the mailbox, threaded to an original
/// message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyDraft {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub thread_id: String,
    /// Original message's Message-ID header, for In-Reply-To.
    pub in_reply_to: Option<String>,
    /// References chain to carry forward.
    pub references: Option<String>,
}

/// An upcoming calendar event with meeting-logistics flags.
#[derive(Debug, Clone, Serialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Event has a non-empty location field.
    pub has_location: bool,
    /// Event carries a video-conference link.
    pub has_video_link: bool,
    pub attendees: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(body_text: &str, body_html: &str, snippet: &str) -> MailMessage {
        MailMessage {
            id: "m1".into(),
            thread_id: "t1".into(),
            sender: "Jane Doe <jane@example.com>".into(),
            recipient: "me@example.com".into(),
            subject: "Hello".into(),
            snippet: snippet.into(),
            body_text: body_text.into(),
            body_html: body_html.into(),
            received_at: Utc::now(),
            label_ids: vec!["INBOX".into()],
        }
    }

    #[test]
    fn best_body_prefers_plain_text() {
        let m = message("plain", "<p>html</p>", "snippet");
        assert_eq!(m.best_body(), "plain");
    }

    #[test]
    fn best_body_falls_back_to_html_then_snippet() {
        let m = message("", "<p>html</p>", "snippet");
        assert_eq!(m.best_body(), "<p>html</p>");

        let m = message("  ", "", "snippet");
        assert_eq!(m.best_body(), "snippet");
    }

    #[test]
    fn has_label_is_case_insensitive() {
        let m = message("x", "", "");
        assert!(m.has_label("inbox"));
        assert!(!m.has_label("SENT"));
    }

    #[test]
    fn sender_address_strips_display_name() {
        let m = message("x", "", "");
        assert_eq!(m.sender_address(), "jane@example.com");
    }

    #[test]
    fn address_of_handles_bare_addresses() {
        assert_eq!(address_of("  bob@example.com "), "bob@example.com");
        assert_eq!(address_of("\"B\" <b@x.com>"), "b@x.com");
        assert_eq!(address_of("<only@x.com>"), "only@x.com");
    }
}
