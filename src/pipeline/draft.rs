//! Reply drafting over the non-suppressed partition.
//!
//! Order of guards per message, cheapest first:
//! 1. terminal-label skip (already drafted/sent — never double-draft)
//! 2. notification-sender regexes (ticket trackers, document comments)
//! 3. the model's own SKIP_DRAFT sentinel
//!
//! A single message failing never aborts the batch.

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::llm::{GenerateRequest, LlmProvider};
use crate::mail::{MailMessage, MailStore, MessageHeaders, ReplyDraft};
use crate::pipeline::types::DraftRecord;

/// Cost ceiling: at most this many messages get an LLM drafting call
/// per run. Excess messages are skipped, not queued.
const MAX_DRAFTS_PER_RUN: usize = 20;

const DRAFT_MAX_TOKENS: u32 = 1024;
const DRAFT_TEMPERATURE: f32 = 0.4;

/// The model's no-draft sentinel, honored case-insensitively.
const SKIP_SENTINEL: &str = "SKIP_DRAFT";

const DRAFT_SYSTEM_PROMPT: &str = "\
You draft email replies for the user to review before sending.\n\n\
If the message is an automated notification, a mass mail, or otherwise needs no reply, \
respond with exactly SKIP_DRAFT and nothing else.\n\n\
Otherwise respond with only the reply body:\n\
- no To/From/Subject headers, no quoted original\n\
- match the sender's tone, keep it brief\n\
- do not invent commitments the user has not made";

/// Senders and subjects that are machine notifications. Checked before
/// any LLM call; the SKIP_DRAFT sentinel is the model-side backstop for
/// whatever these miss.
struct NotificationFilter {
    sender_patterns: Vec<Regex>,
    subject_patterns: Vec<Regex>,
}

impl NotificationFilter {
    fn new() -> Self {
        let sender_patterns = vec![
            // Ticket trackers
            Regex::new(r"(?i)^jira@").unwrap(),
            Regex::new(r"(?i)@atlassian\.(net|com)$").unwrap(),
            // Document comment streams
            Regex::new(r"(?i)^comments?-noreply@docs\.google\.com$").unwrap(),
        ];
        let subject_patterns = vec![
            Regex::new(r"(?i)^\[jira\]").unwrap(),
            Regex::new(r"(?i)(added|left) a comment").unwrap(),
            Regex::new(r"(?i)^new comment on").unwrap(),
        ];
        Self {
            sender_patterns,
            subject_patterns,
        }
    }

    fn matches(&self, message: &MailMessage) -> bool {
        let sender = message.sender_address();
        self.sender_patterns.iter().any(|r| r.is_match(sender))
            || self
                .subject_patterns
                .iter()
                .any(|r| r.is_match(&message.subject))
    }
}

/// Drafts replies for messages judged important.
pub struct Drafter {
    llm: Arc<dyn LlmProvider>,
    store: Arc<dyn MailStore>,
    filter: NotificationFilter,
}

impl Drafter {
    pub fn new(llm: Arc<dyn LlmProvider>, store: Arc<dyn MailStore>) -> Self {
        Self {
            llm,
            store,
            filter: NotificationFilter::new(),
        }
    }

    /// Draft replies for at most the first `MAX_DRAFTS_PER_RUN` messages.
    pub async fn draft_replies(&self, messages: &[MailMessage]) -> Vec<DraftRecord> {
        if messages.len() > MAX_DRAFTS_PER_RUN {
            info!(
                skipped = messages.len() - MAX_DRAFTS_PER_RUN,
                "Drafting capped, excess messages skipped this run"
            );
        }

        let mut records = Vec::new();
        for message in messages.iter().take(MAX_DRAFTS_PER_RUN) {
            if message.has_label("DRAFT") || message.has_label("SENT") {
                debug!(id = %message.id, "Already drafted or sent, skipping");
                continue;
            }
            if self.filter.matches(message) {
                debug!(
                    id = %message.id,
                    sender = %message.sender,
                    "System notification, skipping"
                );
                continue;
            }

            match self.draft_one(message).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => {
                    warn!(id = %message.id, error = %e, "Drafter: message failed, continuing");
                }
            }
        }
        records
    }

    /// Draft one reply. `Ok(None)` means the model declined.
    async fn draft_one(&self, message: &MailMessage) -> Result<Option<DraftRecord>, Error> {
        let request = GenerateRequest::new(DRAFT_SYSTEM_PROMPT, build_draft_prompt(message))
            .with_max_tokens(DRAFT_MAX_TOKENS)
            .with_temperature(DRAFT_TEMPERATURE);
        let response = self.llm.generate(request).await?;

        let reply = response.content.trim();
        if reply.eq_ignore_ascii_case(SKIP_SENTINEL) {
            debug!(id = %message.id, "Model declined to draft");
            return Ok(None);
        }

        let body = strip_echoed_headers(reply);
        if body.trim().is_empty() {
            debug!(id = %message.id, "Reply body empty after header stripping, skipping");
            return Ok(None);
        }

        let subject = reply_subject(&message.subject);

        // Best-effort header fetch; the snapshot sender is the fallback.
        let headers = match self.store.fetch_headers(&message.id).await {
            Ok(headers) => headers,
            Err(e) => {
                debug!(id = %message.id, error = %e, "Header fetch failed, using snapshot sender");
                MessageHeaders::default()
            }
        };
        let to = headers
            .reply_to
            .clone()
            .or_else(|| headers.from.clone())
            .unwrap_or_else(|| message.sender_address().to_string());

        let draft = ReplyDraft {
            to,
            subject: subject.clone(),
            body,
            thread_id: message.thread_id.clone(),
            in_reply_to: headers.message_id.clone(),
            references: headers.references.clone(),
        };
        let draft_id = self.store.create_reply_draft(&draft).await?;
        info!(id = %message.id, draft_id = %draft_id, "Reply draft created");

        Ok(Some(DraftRecord {
            message_id: message.id.clone(),
            draft_id,
            subject,
        }))
    }
}

/// Build the drafting prompt from one message.
fn build_draft_prompt(message: &MailMessage) -> String {
    let mut prompt = String::with_capacity(1024);
    prompt.push_str(&format!("From: {}\n", message.sender));
    prompt.push_str(&format!("Subject: {}\n", message.subject));

    let body: String = message.best_body().chars().take(4000).collect();
    prompt.push_str(&format!("\nMessage:\n{body}\n"));
    prompt.push_str("\nDraft the reply body now.");
    prompt
}

/// Compute the reply subject: prefix `Re: ` unless already present.
pub(crate) fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    if trimmed.to_ascii_lowercase().starts_with("re:") {
        trimmed.to_string()
    } else {
        format!("Re: {trimmed}")
    }
}

/// Drop header-like lines the model may have echoed into the body.
fn strip_echoed_headers(body: &str) -> String {
    const HEADER_PREFIXES: &[&str] = &["to:", "from:", "subject:", "cc:"];

    let mut lines: Vec<&str> = body
        .lines()
        .filter(|line| {
            let start = line.trim_start();
            !HEADER_PREFIXES.iter().any(|prefix| {
                start
                    .get(..prefix.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
            })
        })
        .collect();

    while lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::error::{LlmError, MailError};
    use crate::llm::GenerateResponse;
    use crate::mail::CalendarEvent;

    fn message(id: &str, sender: &str, subject: &str, labels: &[&str]) -> MailMessage {
        MailMessage {
            id: id.into(),
            thread_id: format!("t-{id}"),
            sender: sender.into(),
            recipient: "me@example.com".into(),
            subject: subject.into(),
            snippet: "snippet".into(),
            body_text: "Could you confirm by Friday?".into(),
            body_html: String::new(),
            received_at: Utc::now(),
            label_ids: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    struct MockLlm {
        response: String,
        calls: AtomicUsize,
    }

    impl MockLlm {
        fn new(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: response.into(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlm {
        fn model_name(&self) -> &str {
            "mock"
        }
        async fn generate(
            &self,
            _request: GenerateRequest,
        ) -> Result<GenerateResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(GenerateResponse {
                content: self.response.clone(),
                input_tokens: 10,
                output_tokens: 10,
            })
        }
    }

    /// Store stub recording created drafts.
    #[derive(Default)]
    struct StubStore {
        drafts: Mutex<Vec<ReplyDraft>>,
        headers: Option<MessageHeaders>,
        fail_draft_for: Option<String>,
    }

    #[async_trait]
    impl MailStore for StubStore {
        async fn list_recent(
            &self,
            _query: &str,
            _max_results: u32,
        ) -> Result<Vec<MailMessage>, MailError> {
            Ok(Vec::new())
        }

        async fn fetch_headers(&self, _message_id: &str) -> Result<MessageHeaders, MailError> {
            match &self.headers {
                Some(headers) => Ok(headers.clone()),
                None => Err(MailError::Api {
                    status: 404,
                    message: "no headers".into(),
                }),
            }
        }

        async fn archive(&self, _message_id: &str) -> Result<(), MailError> {
            Ok(())
        }

        async fn ensure_label(&self, name: &str) -> Result<String, MailError> {
            Ok(format!("Label_{name}"))
        }

        async fn apply_label(&self, _message_id: &str, _label_id: &str) -> Result<(), MailError> {
            Ok(())
        }

        async fn create_reply_draft(&self, draft: &ReplyDraft) -> Result<String, MailError> {
            if self
                .fail_draft_for
                .as_deref()
                .is_some_and(|t| t == draft.thread_id)
            {
                return Err(MailError::Api {
                    status: 500,
                    message: "draft rejected".into(),
                });
            }
            let mut drafts = self.drafts.lock().unwrap();
            drafts.push(draft.clone());
            Ok(format!("draft-{}", drafts.len()))
        }

        async fn list_upcoming_events(
            &self,
            _until: DateTime<Utc>,
        ) -> Result<Vec<CalendarEvent>, MailError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn terminal_labels_never_reach_the_llm() {
        let llm = MockLlm::new("A reply");
        let store = Arc::new(StubStore::default());
        let drafter = Drafter::new(llm.clone(), store.clone());

        let messages = vec![
            message("m1", "a@x.com", "Hi", &["INBOX", "DRAFT"]),
            message("m2", "b@x.com", "Hello", &["SENT"]),
        ];
        let records = drafter.draft_replies(&messages).await;
        assert!(records.is_empty());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
        assert!(store.drafts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn notification_senders_are_skipped_before_llm() {
        let llm = MockLlm::new("A reply");
        let store = Arc::new(StubStore::default());
        let drafter = Drafter::new(llm.clone(), store);

        let messages = vec![
            message("m1", "jira@corp.atlassian.net", "[JIRA] ticket", &["INBOX"]),
            message("m2", "comments-noreply@docs.google.com", "New comment on Plan", &["INBOX"]),
        ];
        let records = drafter.draft_replies(&messages).await;
        assert!(records.is_empty());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn skip_sentinel_is_honored_any_case_and_whitespace() {
        let llm = MockLlm::new("  skip_draft \n");
        let store = Arc::new(StubStore::default());
        let drafter = Drafter::new(llm.clone(), store.clone());

        let records = drafter
            .draft_replies(&[message("m1", "jane@x.com", "Hi", &["INBOX"])])
            .await;
        assert!(records.is_empty());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
        assert!(store.drafts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn draft_created_with_threading_and_re_subject() {
        let llm = MockLlm::new("Sure, Friday works for me.");
        let store = Arc::new(StubStore {
            headers: Some(MessageHeaders {
                reply_to: None,
                from: Some("jane@x.com".into()),
                message_id: Some("<orig@x.com>".into()),
                references: None,
            }),
            ..Default::default()
        });
        let drafter = Drafter::new(llm, store.clone());

        let records = drafter
            .draft_replies(&[message("m1", "Jane <jane@x.com>", "Friday deadline", &["INBOX"])])
            .await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].subject, "Re: Friday deadline");
        assert_eq!(records[0].message_id, "m1");

        let drafts = store.drafts.lock().unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].to, "jane@x.com");
        assert_eq!(drafts[0].thread_id, "t-m1");
        assert_eq!(drafts[0].in_reply_to.as_deref(), Some("<orig@x.com>"));
        assert_eq!(drafts[0].body, "Sure, Friday works for me.");
    }

    #[tokio::test]
    async fn reply_to_header_wins_over_from_and_snapshot() {
        let llm = MockLlm::new("Done.");
        let store = Arc::new(StubStore {
            headers: Some(MessageHeaders {
                reply_to: Some("replies@x.com".into()),
                from: Some("jane@x.com".into()),
                message_id: None,
                references: None,
            }),
            ..Default::default()
        });
        let drafter = Drafter::new(llm, store.clone());

        drafter
            .draft_replies(&[message("m1", "other@x.com", "Hi", &["INBOX"])])
            .await;
        assert_eq!(store.drafts.lock().unwrap()[0].to, "replies@x.com");
    }

    #[tokio::test]
    async fn header_fetch_failure_falls_back_to_snapshot_sender() {
        let llm = MockLlm::new("Done.");
        // headers: None makes fetch_headers fail
        let store = Arc::new(StubStore::default());
        let drafter = Drafter::new(llm, store.clone());

        let records = drafter
            .draft_replies(&[message("m1", "Jane <jane@x.com>", "Hi", &["INBOX"])])
            .await;
        assert_eq!(records.len(), 1);
        assert_eq!(store.drafts.lock().unwrap()[0].to, "jane@x.com");
    }

    #[tokio::test]
    async fn one_failing_draft_does_not_abort_the_batch() {
        let llm = MockLlm::new("Reply body.");
        let store = Arc::new(StubStore {
            fail_draft_for: Some("t-m1".into()),
            ..Default::default()
        });
        let drafter = Drafter::new(llm, store.clone());

        let records = drafter
            .draft_replies(&[
                message("m1", "a@x.com", "First", &["INBOX"]),
                message("m2", "b@x.com", "Second", &["INBOX"]),
            ])
            .await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message_id, "m2");
    }

    #[tokio::test]
    async fn batch_is_capped_at_twenty() {
        let llm = MockLlm::new("Reply.");
        let store = Arc::new(StubStore::default());
        let drafter = Drafter::new(llm.clone(), store);

        let messages: Vec<MailMessage> = (0..25)
            .map(|i| message(&format!("m{i}"), "a@x.com", "Hi", &["INBOX"]))
            .collect();
        let records = drafter.draft_replies(&messages).await;
        assert_eq!(records.len(), 20);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn reply_subject_adds_prefix_once() {
        assert_eq!(reply_subject("Budget"), "Re: Budget");
        assert_eq!(reply_subject("Re: Budget"), "Re: Budget");
        assert_eq!(reply_subject("RE: Budget"), "RE: Budget");
        assert_eq!(reply_subject("  Budget  "), "Re: Budget");
    }

    #[test]
    fn echoed_headers_are_stripped() {
        let body = "To: jane@x.com\nSubject: Re: Hi\n\nHappy to help.\nFrom: me\nBest";
        assert_eq!(strip_echoed_headers(body), "Happy to help.\nBest");
    }

    #[test]
    fn stripping_preserves_clean_bodies() {
        let body = "Happy to help.\n\nLet me know.";
        assert_eq!(strip_echoed_headers(body), body);
    }

    #[test]
    fn stripping_trims_blank_edges() {
        let body = "Subject: x\n\nHello\n\n";
        assert_eq!(strip_echoed_headers(body), "Hello");
    }
}
