//! Watchman — monitors important threads and upcoming meetings.
//!
//! One LLM call per run over the important+VIP set plus near-term
//! calendar events. Detections are latency, missing meeting logistics,
//! and unresolved-thread spirals. Only `draft_request` touches the
//! mailbox; `nudge` and `flag` are advisory and surface in the briefing.

use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::llm::{GenerateRequest, LlmProvider};
use crate::mail::{CalendarEvent, MailMessage, MailStore, ReplyDraft};
use crate::pipeline::draft::reply_subject;
use crate::pipeline::parse::first_json_array;
use crate::pipeline::types::{Intervention, InterventionAction, InterventionKind};

const WATCH_MAX_TOKENS: u32 = 2048;
const WATCH_TEMPERATURE: f32 = 0.2;

/// Body of the corrective reply draft asking for meeting logistics.
const MEETING_LINK_REQUEST: &str = "Quick logistics check before our upcoming meeting: \
I don't see a location or a video link on the invite. Could you share where we're \
meeting, or send a link?\n";

const WATCH_SYSTEM_PROMPT: &str = "\
You monitor a user's important email threads and upcoming meetings.\n\n\
Detect three conditions:\n\
- \"latency\": a message has been waiting on the user noticeably long given the work-hours context provided.\n\
- \"missing_link\": a meeting in the provided event list lacks both a location and a video link, and a listed thread relates to it.\n\
- \"spiral\": a thread shows repeated back-and-forth without reaching a resolution.\n\n\
Each detection carries an action:\n\
- \"nudge\": advisory reminder, no mailbox change.\n\
- \"draft_request\": draft a reply asking for the missing meeting logistics. Reference the message by \"message_id\" (or \"thread_id\").\n\
- \"flag\": advisory highlight, no mailbox change.\n\n\
Respond with ONLY a JSON array:\n\
[{\"kind\": \"latency|missing_link|spiral\", \"action\": \"nudge|draft_request|flag\", \"message_id\": \"...\", \"thread_id\": \"...\", \"description\": \"...\"}]\n\n\
Return [] when nothing needs attention. Descriptions are one sentence.";

/// Monitoring pass over the important+VIP working set.
pub struct Watchman {
    llm: Arc<dyn LlmProvider>,
    store: Arc<dyn MailStore>,
}

impl Watchman {
    pub fn new(llm: Arc<dyn LlmProvider>, store: Arc<dyn MailStore>) -> Self {
        Self { llm, store }
    }

    /// Detect interventions and perform the corrective mailbox actions.
    ///
    /// Soft-fails to an empty list on LLM or parse failure. Interventions
    /// are processed in model order, without deduplication: duplicate
    /// draft-requests for one thread create duplicate drafts.
    pub async fn watch(
        &self,
        messages: &[MailMessage],
        events: &[CalendarEvent],
        work_hours_start: u8,
        work_hours_end: u8,
    ) -> Vec<Intervention> {
        if messages.is_empty() {
            return Vec::new();
        }

        let now = Utc::now();
        // Work-hours membership is computed here, not by the model.
        // Configured hours are local-clock hours.
        let local_hour = chrono::Local::now().hour() as u8;
        let in_work_hours = hour_in_window(local_hour, work_hours_start, work_hours_end);

        let request = GenerateRequest::new(
            WATCH_SYSTEM_PROMPT,
            build_watch_prompt(
                messages,
                events,
                now,
                work_hours_start,
                work_hours_end,
                in_work_hours,
            ),
        )
        .with_max_tokens(WATCH_MAX_TOKENS)
        .with_temperature(WATCH_TEMPERATURE);

        let response = match self.llm.generate(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Watchman: LLM call failed, no interventions this run");
                return Vec::new();
            }
        };

        let interventions = parse_interventions(&response.content);
        for intervention in &interventions {
            match intervention.action {
                InterventionAction::Nudge | InterventionAction::Flag => {
                    info!(
                        kind = intervention.kind.label(),
                        action = intervention.action.label(),
                        description = %intervention.description,
                        "Advisory intervention"
                    );
                }
                InterventionAction::DraftRequest => {
                    if let Err(e) = self.request_logistics(intervention, messages).await {
                        warn!(
                            kind = intervention.kind.label(),
                            error = %e,
                            "Watchman: corrective draft failed, skipping this intervention"
                        );
                    }
                }
            }
        }
        interventions
    }

    /// Create the templated meeting-link request draft for one intervention.
    async fn request_logistics(
        &self,
        intervention: &Intervention,
        messages: &[MailMessage],
    ) -> Result<(), crate::error::MailError> {
        let target = resolve_reference(intervention, messages).ok_or_else(|| {
            crate::error::MailError::Unresolved(format!(
                "message_id={:?} thread_id={:?}",
                intervention.message_id, intervention.thread_id
            ))
        })?;

        // Threading alone is enough here; header fetch is best-effort.
        let in_reply_to = self
            .store
            .fetch_headers(&target.id)
            .await
            .ok()
            .and_then(|h| h.message_id);

        let draft = ReplyDraft {
            to: target.sender_address().to_string(),
            subject: reply_subject(&target.subject),
            body: MEETING_LINK_REQUEST.to_string(),
            thread_id: target.thread_id.clone(),
            in_reply_to,
            references: None,
        };
        let draft_id = self.store.create_reply_draft(&draft).await?;
        info!(
            id = %target.id,
            draft_id = %draft_id,
            "Meeting-link request drafted"
        );
        Ok(())
    }
}

/// Resolve an intervention reference: message id first, thread id fallback.
fn resolve_reference<'a>(
    intervention: &Intervention,
    messages: &'a [MailMessage],
) -> Option<&'a MailMessage> {
    if let Some(ref id) = intervention.message_id
        && let Some(found) = messages.iter().find(|m| &m.id == id)
    {
        return Some(found);
    }
    if let Some(ref thread_id) = intervention.thread_id {
        return messages.iter().find(|m| &m.thread_id == thread_id);
    }
    None
}

/// Whether `hour` falls inside the `[start, end)` window; windows that
/// wrap midnight are honored.
fn hour_in_window(hour: u8, start: u8, end: u8) -> bool {
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

/// Serialize messages, events, and the work-hours context into the prompt.
fn build_watch_prompt(
    messages: &[MailMessage],
    events: &[CalendarEvent],
    now: DateTime<Utc>,
    work_hours_start: u8,
    work_hours_end: u8,
    in_work_hours: bool,
) -> String {
    let mut prompt = String::with_capacity(messages.len() * 200 + events.len() * 120);

    prompt.push_str(&format!("Current time: {}\n", now.to_rfc3339()));
    prompt.push_str(&format!(
        "Work hours: {work_hours_start}:00-{work_hours_end}:00, currently {} work hours\n",
        if in_work_hours { "inside" } else { "outside" }
    ));

    prompt.push_str("\nThreads being watched:\n");
    for message in messages {
        prompt.push_str(&format!("- message_id: {}\n", message.id));
        prompt.push_str(&format!("  thread_id: {}\n", message.thread_id));
        prompt.push_str(&format!("  from: {}\n", message.sender));
        prompt.push_str(&format!("  subject: {}\n", message.subject));
        prompt.push_str(&format!("  date: {}\n", message.received_at.to_rfc3339()));
        let snippet: String = message.snippet.chars().take(200).collect();
        prompt.push_str(&format!("  snippet: {snippet}\n"));
    }

    prompt.push_str("\nMeetings in the next 48 hours:\n");
    if events.is_empty() {
        prompt.push_str("(none)\n");
    }
    for event in events {
        prompt.push_str(&format!(
            "- {} at {} (location: {}, video link: {})\n",
            event.summary,
            event.start.to_rfc3339(),
            if event.has_location { "yes" } else { "no" },
            if event.has_video_link { "yes" } else { "no" },
        ));
    }

    prompt
}

/// Raw intervention record as the model emits it.
#[derive(Debug, Deserialize)]
struct RawIntervention {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    action: String,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    thread_id: Option<String>,
    #[serde(default)]
    description: String,
}

impl RawIntervention {
    fn into_intervention(self) -> Option<Intervention> {
        let kind = match self.kind.as_str() {
            "latency" => InterventionKind::Latency,
            "missing_link" => InterventionKind::MissingLink,
            "spiral" => InterventionKind::Spiral,
            other => {
                debug!(kind = other, "Dropping intervention with unknown kind");
                return None;
            }
        };
        let action = match self.action.as_str() {
            "nudge" => InterventionAction::Nudge,
            "draft_request" => InterventionAction::DraftRequest,
            "flag" => InterventionAction::Flag,
            other => {
                debug!(action = other, "Dropping intervention with unknown action");
                return None;
            }
        };
        Some(Intervention {
            kind,
            action,
            message_id: self.message_id.filter(|s| !s.is_empty()),
            thread_id: self.thread_id.filter(|s| !s.is_empty()),
            description: self.description,
        })
    }
}

/// Parse the model reply into interventions; soft-fails to empty.
fn parse_interventions(raw: &str) -> Vec<Intervention> {
    let Some(array) = first_json_array(raw) else {
        warn!("Watchman: no JSON array in model output");
        return Vec::new();
    };
    let records: Vec<RawIntervention> = match serde_json::from_str(array) {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "Watchman: model output failed to decode");
            return Vec::new();
        }
    };
    records
        .into_iter()
        .filter_map(RawIntervention::into_intervention)
        .collect()
}
