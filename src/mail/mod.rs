//! Mailbox/calendar provider abstraction.
//!
//! The store is the only durable state the pipeline touches. Adapters are
//! pure I/O — triage, drafting, and monitoring logic live in `pipeline`.

pub mod gmail;
pub mod types;

pub use gmail::GmailStore;
pub use types::{CalendarEvent, MailMessage, MessageHeaders, ReplyDraft};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MailError;

/// Mailbox + calendar operations consumed by the pipeline.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// List recent messages matching `query`, full content included.
    /// Individual message-fetch failures are skipped; a list failure is an
    /// error (the caller treats it as fetch-stage fatal).
    async fn list_recent(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<MailMessage>, MailError>;

    /// Fetch reply-relevant headers for one message.
    async fn fetch_headers(&self, message_id: &str) -> Result<MessageHeaders, MailError>;

    /// Archive a message (remove it from the inbox).
    async fn archive(&self, message_id: &str) -> Result<(), MailError>;

    /// Get or create a label by name, returning its id.
    async fn ensure_label(&self, name: &str) -> Result<String, MailError>;

    /// Apply an existing label to a message.
    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<(), MailError>;

    /// Create a threaded reply draft, returning the new draft id.
    async fn create_reply_draft(&self, draft: &ReplyDraft) -> Result<String, MailError>;

    /// List calendar events starting before `until`.
    async fn list_upcoming_events(
        &self,
        until: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, MailError>;
}
