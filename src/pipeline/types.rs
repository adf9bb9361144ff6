//! Shared types for the inbox pipeline.
//!
//! Everything here is ephemeral to one run: decisions, drafts, and
//! interventions are created and consumed between fetch and briefing,
//! never persisted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mail::MailMessage;

// ── Classification ──────────────────────────────────────────────────

/// One triage decision for one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub message_id: String,
    pub action: DecisionAction,
    /// Advisory only — surfaced in logs, never drives control flow.
    pub reason: String,
}

/// What to do with a classified message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DecisionAction {
    /// Noise — remove from the inbox.
    Archive,
    /// Routine — file under a label, out of the way.
    Label { name: String },
    /// Needs the user's attention; flows to the drafter.
    Important,
    /// Allow-listed sender; labeled VIP and always watched.
    Vip,
}

impl DecisionAction {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::Label { .. } => "label",
            Self::Important => "important",
            Self::Vip => "vip",
        }
    }

    /// Whether this action removes the message from the working set.
    pub fn suppresses(&self) -> bool {
        matches!(self, Self::Archive | Self::Label { .. })
    }
}

// ── Drafting ────────────────────────────────────────────────────────

/// A reply draft successfully materialized in the mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftRecord {
    pub message_id: String,
    pub draft_id: String,
    pub subject: String,
}

// ── Watching ────────────────────────────────────────────────────────

/// What the watchman detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    /// A message has waited too long for a reply.
    Latency,
    /// An imminent meeting lacks a location and a video link.
    MissingLink,
    /// A thread keeps going back and forth without resolution.
    Spiral,
}

/// What the watchman does about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionAction {
    /// Advisory — surfaced in the briefing only.
    Nudge,
    /// Creates a templated reply draft asking for meeting logistics.
    DraftRequest,
    /// Advisory — surfaced in the briefing only.
    Flag,
}

impl InterventionKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Latency => "latency",
            Self::MissingLink => "missing_link",
            Self::Spiral => "spiral",
        }
    }
}

impl InterventionAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Nudge => "nudge",
            Self::DraftRequest => "draft_request",
            Self::Flag => "flag",
        }
    }
}

/// A monitoring finding, possibly tied to a corrective mailbox action.
#[derive(Debug, Clone, Serialize)]
pub struct Intervention {
    pub kind: InterventionKind,
    pub action: InterventionAction,
    pub message_id: Option<String>,
    pub thread_id: Option<String>,
    pub description: String,
}

// ── Partitioning ────────────────────────────────────────────────────

/// The run's snapshot split by classifier outcome.
#[derive(Debug, Default)]
pub struct Partition {
    /// Archived or labeled away — out of the working set.
    pub suppressed: Vec<MailMessage>,
    /// Everything else: undecided, important, and VIP messages.
    pub candidates: Vec<MailMessage>,
    /// The VIP subset, tracked separately so it is always watched.
    pub vip: Vec<MailMessage>,
}

impl Partition {
    /// Messages the watchman sees: candidates ∪ vip, deduplicated by id.
    pub fn watch_set(&self) -> Vec<MailMessage> {
        let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();
        let mut set = Vec::with_capacity(self.candidates.len() + self.vip.len());
        for message in self.candidates.iter().chain(self.vip.iter()) {
            if seen.insert(message.id.as_str()) {
                set.push(message.clone());
            }
        }
        set
    }
}

/// Split the working set using classifier output.
///
/// At most one decision is consumed per message id — the first one
/// encountered wins, matching the tie-break used when applying actions.
/// Decisions for unknown ids are ignored here and logged by the caller.
pub fn partition(messages: &[MailMessage], decisions: &[Decision]) -> Partition {
    let mut by_id: HashMap<&str, &DecisionAction> = HashMap::new();
    for decision in decisions {
        by_id.entry(decision.message_id.as_str()).or_insert(&decision.action);
    }

    let mut result = Partition::default();
    for message in messages {
        match by_id.get(message.id.as_str()) {
            Some(action) if action.suppresses() => result.suppressed.push(message.clone()),
            Some(DecisionAction::Vip) => {
                result.vip.push(message.clone());
                result.candidates.push(message.clone());
            }
            _ => result.candidates.push(message.clone()),
        }
    }
    result
}

// ── Briefing ────────────────────────────────────────────────────────

/// Final run summary — a pure projection of the three result sets.
#[derive(Debug)]
pub struct Briefing {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub total_messages: usize,
    pub suppressed: usize,
    /// VIP messages, as `sender — subject` lines.
    pub pinned: Vec<String>,
    pub drafts: Vec<DraftRecord>,
    pub interventions: Vec<Intervention>,
}

impl Briefing {
    /// Render the briefing as terminal text. Mutates nothing.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(512);
        out.push_str(&format!(
            "Inbox briefing — {} messages triaged, {} cleared away\n",
            self.total_messages, self.suppressed
        ));

        out.push_str(&format!("\nPinned ({}):\n", self.pinned.len()));
        if self.pinned.is_empty() {
            out.push_str("  (none)\n");
        }
        for line in &self.pinned {
            out.push_str(&format!("  • {line}\n"));
        }

        out.push_str(&format!("\nDrafts awaiting review ({}):\n", self.drafts.len()));
        if self.drafts.is_empty() {
            out.push_str("  (none)\n");
        }
        for draft in &self.drafts {
            out.push_str(&format!("  • {} (draft {})\n", draft.subject, draft.draft_id));
        }

        out.push_str(&format!("\nInterventions ({}):\n", self.interventions.len()));
        if self.interventions.is_empty() {
            out.push_str("  (none)\n");
        }
        for intervention in &self.interventions {
            out.push_str(&format!(
                "  • [{}/{}] {}\n",
                intervention.kind.label(),
                intervention.action.label(),
                intervention.description
            ));
        }

        out
    }
}
