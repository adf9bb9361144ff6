//! Gmail + Google Calendar store — REST with a bearer token.
//!
//! The client is constructed once per run with an access token from the
//! environment and passed in wherever it is needed; there is no
//! process-wide auth state and no token refresh (an expired token
//! surfaces as `MailError::AuthExpired`).

use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use chrono::{DateTime, SecondsFormat, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::MailError;
use crate::mail::types::{address_of, CalendarEvent, MailMessage, MessageHeaders, ReplyDraft};
use crate::mail::MailStore;

const GMAIL_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const CALENDAR_EVENTS_URL: &str =
    "https://www.googleapis.com/calendar/v3/calendars/primary/events";

/// Gmail v1 + Calendar v3 implementation of `MailStore`.
pub struct GmailStore {
    client: reqwest::Client,
    access_token: SecretString,
}

impl GmailStore {
    pub fn new(access_token: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token,
        }
    }

    fn token(&self) -> &str {
        self.access_token.expose_secret()
    }

    /// Fetch one message with `format=full` and flatten it into a snapshot.
    async fn fetch_full(&self, message_id: &str) -> Result<MailMessage, MailError> {
        let url = format!("{GMAIL_BASE}/messages/{message_id}");
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token())
            .query(&[("format", "full")])
            .send()
            .await?;
        let response = ok_or_api(response).await?;
        let detail: MessageDetail = response.json().await?;
        Ok(detail.into_message())
    }
}

#[async_trait::async_trait]
impl MailStore for GmailStore {
    async fn list_recent(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<MailMessage>, MailError> {
        let max_results = max_results.to_string();
        let response = self
            .client
            .get(format!("{GMAIL_BASE}/messages"))
            .bearer_auth(self.token())
            .query(&[("q", query), ("maxResults", max_results.as_str())])
            .send()
            .await?;
        let response = ok_or_api(response).await?;
        let list: MessageListResponse = response.json().await?;

        let mut messages = Vec::with_capacity(list.messages.len());
        for stub in &list.messages {
            match self.fetch_full(&stub.id).await {
                Ok(message) => messages.push(message),
                Err(e) => debug!(id = %stub.id, error = %e, "Skipping message fetch"),
            }
        }
        Ok(messages)
    }

    async fn fetch_headers(&self, message_id: &str) -> Result<MessageHeaders, MailError> {
        let url = format!("{GMAIL_BASE}/messages/{message_id}");
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token())
            .query(&[
                ("format", "metadata"),
                ("metadataHeaders", "Reply-To"),
                ("metadataHeaders", "From"),
                ("metadataHeaders", "Message-ID"),
                ("metadataHeaders", "References"),
            ])
            .send()
            .await?;
        let response = ok_or_api(response).await?;
        let detail: MessageDetail = response.json().await?;

        Ok(MessageHeaders {
            reply_to: detail
                .header("Reply-To")
                .map(|v| address_of(v).to_string()),
            from: detail.header("From").map(|v| address_of(v).to_string()),
            message_id: detail.header("Message-ID").map(str::to_string),
            references: detail.header("References").map(str::to_string),
        })
    }

    async fn archive(&self, message_id: &str) -> Result<(), MailError> {
        self.modify_labels(message_id, &[], &["INBOX"]).await
    }

    async fn ensure_label(&self, name: &str) -> Result<String, MailError> {
        let response = self
            .client
            .get(format!("{GMAIL_BASE}/labels"))
            .bearer_auth(self.token())
            .send()
            .await?;
        let response = ok_or_api(response).await?;
        let list: LabelListResponse = response.json().await?;

        if let Some(existing) = list
            .labels
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
        {
            return Ok(existing.id.clone());
        }

        let response = self
            .client
            .post(format!("{GMAIL_BASE}/labels"))
            .bearer_auth(self.token())
            .json(&serde_json::json!({
                "name": name,
                "labelListVisibility": "labelShow",
                "messageListVisibility": "show",
            }))
            .send()
            .await?;
        let response = ok_or_api(response).await?;
        let created: Label = response.json().await?;
        debug!(label = %name, id = %created.id, "Created label");
        Ok(created.id)
    }

    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<(), MailError> {
        self.modify_labels(message_id, &[label_id], &[]).await
    }

    async fn create_reply_draft(&self, draft: &ReplyDraft) -> Result<String, MailError> {
        let raw = URL_SAFE.encode(build_raw_reply(draft));
        let response = self
            .client
            .post(format!("{GMAIL_BASE}/drafts"))
            .bearer_auth(self.token())
            .json(&serde_json::json!({
                "message": {
                    "raw": raw,
                    "threadId": draft.thread_id,
                }
            }))
            .send()
            .await?;
        let response = ok_or_api(response).await?;
        let created: DraftResponse = response.json().await?;
        Ok(created.id)
    }

    async fn list_upcoming_events(
        &self,
        until: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, MailError> {
        let time_min = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let time_max = until.to_rfc3339_opts(SecondsFormat::Secs, true);

        let response = self
            .client
            .get(CALENDAR_EVENTS_URL)
            .bearer_auth(self.token())
            .query(&[
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
                ("maxResults", "50"),
            ])
            .send()
            .await?;
        let response = ok_or_api(response).await?;
        let list: EventListResponse = response.json().await?;

        let events = list
            .items
            .into_iter()
            .filter(|item| item.status.as_deref() != Some("cancelled"))
            .filter_map(EventItem::into_event)
            .collect();
        Ok(events)
    }
}

impl GmailStore {
    async fn modify_labels(
        &self,
        message_id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<(), MailError> {
        let url = format!("{GMAIL_BASE}/messages/{message_id}/modify");
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token())
            .json(&serde_json::json!({
                "addLabelIds": add,
                "removeLabelIds": remove,
            }))
            .send()
            .await?;
        ok_or_api(response).await?;
        Ok(())
    }
}

/// Map an HTTP response to a `MailError` unless it succeeded.
async fn ok_or_api(response: reqwest::Response) -> Result<reqwest::Response, MailError> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(MailError::AuthExpired);
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(MailError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

/// Assemble the RFC 2822 reply text for a draft.
fn build_raw_reply(draft: &ReplyDraft) -> String {
    let mut raw = String::with_capacity(draft.body.len() + 256);
    raw.push_str(&format!("To: {}\r\n", draft.to));
    raw.push_str(&format!("Subject: {}\r\n", draft.subject));
    if let Some(ref message_id) = draft.in_reply_to {
        raw.push_str(&format!("In-Reply-To: {message_id}\r\n"));
        let references = match draft.references {
            Some(ref refs) => format!("{refs} {message_id}"),
            None => message_id.clone(),
        };
        raw.push_str(&format!("References: {references}\r\n"));
    }
    raw.push_str("Content-Type: text/plain; charset=\"UTF-8\"\r\n");
    raw.push_str("\r\n");
    raw.push_str(&draft.body);
    raw
}

// ── Gmail API response types ────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDetail {
    #[serde(default)]
    id: String,
    #[serde(default)]
    thread_id: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    label_ids: Vec<String>,
    /// Epoch milliseconds as a string.
    #[serde(default)]
    internal_date: Option<String>,
    #[serde(default)]
    payload: Option<MessagePart>,
}

impl MessageDetail {
    fn header(&self, name: &str) -> Option<&str> {
        self.payload.as_ref().and_then(|p| {
            p.headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.as_str())
        })
    }

    fn into_message(self) -> MailMessage {
        let received_at = self
            .internal_date
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        let body_text = self
            .payload
            .as_ref()
            .and_then(|p| extract_body_text(p, "text/plain"))
            .unwrap_or_default();
        let body_html = self
            .payload
            .as_ref()
            .and_then(|p| extract_body_text(p, "text/html"))
            .unwrap_or_default();

        MailMessage {
            sender: self.header("From").unwrap_or_default().to_string(),
            recipient: self.header("To").unwrap_or_default().to_string(),
            subject: self.header("Subject").unwrap_or_default().to_string(),
            id: self.id,
            thread_id: self.thread_id,
            snippet: self.snippet,
            body_text,
            body_html,
            received_at,
            label_ids: self.label_ids,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct PartBody {
    #[serde(default)]
    data: Option<String>,
}

/// Recursively walk MIME parts for body data of the target type.
fn extract_body_text(part: &MessagePart, target_mime: &str) -> Option<String> {
    if part.mime_type == target_mime
        && let Some(ref body) = part.body
        && let Some(ref data) = body.data
    {
        return decode_url_safe_base64(data);
    }
    for child in &part.parts {
        if let Some(text) = extract_body_text(child, target_mime) {
            return Some(text);
        }
    }
    None
}

/// Decode URL-safe base64 (no padding) as used by the Gmail API.
fn decode_url_safe_base64(data: &str) -> Option<String> {
    URL_SAFE_NO_PAD
        .decode(data)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
}

#[derive(Debug, Deserialize)]
struct LabelListResponse {
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct Label {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct DraftResponse {
    id: String,
}

// ── Calendar API response types ─────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<EventItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventItem {
    #[serde(default)]
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    hangout_link: Option<String>,
    #[serde(default)]
    conference_data: Option<ConferenceData>,
    #[serde(default)]
    start: Option<EventTime>,
    #[serde(default)]
    end: Option<EventTime>,
    #[serde(default)]
    attendees: Vec<EventAttendee>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConferenceData {
    #[serde(default)]
    entry_points: Vec<EntryPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryPoint {
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    #[serde(default)]
    date_time: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventAttendee {
    #[serde(default)]
    email: String,
}

impl EventItem {
    fn into_event(self) -> Option<CalendarEvent> {
        let start = self.start.as_ref().and_then(parse_event_time)?;
        let end = self
            .end
            .as_ref()
            .and_then(parse_event_time)
            .unwrap_or(start);

        let has_location = self
            .location
            .as_deref()
            .is_some_and(|l| !l.trim().is_empty());
        let has_video_link = self.hangout_link.is_some()
            || self
                .conference_data
                .as_ref()
                .is_some_and(|c| {
                    c.entry_points
                        .iter()
                        .any(|e| e.uri.as_deref().is_some_and(|u| !u.is_empty()))
                });

        Some(CalendarEvent {
            id: self.id,
            summary: self.summary.unwrap_or_else(|| "(no title)".to_string()),
            start,
            end,
            has_location,
            has_video_link,
            attendees: self
                .attendees
                .into_iter()
                .map(|a| a.email)
                .filter(|e| !e.is_empty())
                .collect(),
        })
    }
}

/// Parse an event time: RFC 3339 `dateTime`, else all-day `date` at
/// UTC midnight.
fn parse_event_time(time: &EventTime) -> Option<DateTime<Utc>> {
    if let Some(ref dt) = time.date_time {
        return DateTime::parse_from_rfc3339(dt)
            .ok()
            .map(|t| t.with_timezone(&Utc));
    }
    let date = time.date.as_ref()?;
    let naive = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some(DateTime::from_naive_utc_and_offset(
        naive.and_hms_opt(0, 0, 0)?,
        Utc,
    ))
}
