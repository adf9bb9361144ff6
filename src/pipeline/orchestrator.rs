//! Pipeline orchestrator — owns one run of the inbox pipeline.
//!
//! Linear stages, no back-edges:
//! `fetch → classify+apply → partition → draft → watch → render`.
//!
//! Only a fetch failure aborts the run. Classification, drafting, and
//! watching absorb their own failures per item, so partial success is
//! the normal outcome. All external calls are awaited sequentially to
//! keep a strict global ordering and bound load on both rate-limited
//! services.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::InboxConfig;
use crate::error::{MailError, PipelineError};
use crate::llm::LlmProvider;
use crate::mail::{MailMessage, MailStore};
use crate::pipeline::classify::{Classifier, VipList};
use crate::pipeline::draft::Drafter;
use crate::pipeline::types::{partition, Briefing, Decision, DecisionAction};
use crate::pipeline::watch::Watchman;

/// Bounded recent window pulled from the mailbox.
const FETCH_LIMIT: u32 = 50;

/// At most this many messages go to the classifier.
const CLASSIFY_LIMIT: usize = 50;

/// Calendar lookahead for the watchman.
const EVENT_HORIZON_HOURS: i64 = 48;

/// Fixed label applied to VIP messages.
pub const VIP_LABEL: &str = "VIP";

/// One-shot inbox pipeline over a store and an LLM provider.
pub struct InboxPipeline {
    store: Arc<dyn MailStore>,
    llm: Arc<dyn LlmProvider>,
    config: InboxConfig,
}

impl InboxPipeline {
    pub fn new(
        store: Arc<dyn MailStore>,
        llm: Arc<dyn LlmProvider>,
        config: InboxConfig,
    ) -> Self {
        Self { store, llm, config }
    }

    /// Run the pipeline once and return the briefing.
    pub async fn run(&self) -> Result<Briefing, PipelineError> {
        let run_id = Uuid::new_v4();
        info!(%run_id, query = %self.config.query, "Inbox pipeline starting");

        // Fetch: the only stage whose failure aborts the run.
        let mut messages = self
            .store
            .list_recent(&self.config.query, FETCH_LIMIT)
            .await
            .map_err(PipelineError::Fetch)?;
        messages.truncate(CLASSIFY_LIMIT);
        info!(count = messages.len(), "Fetched inbox window");

        // Classify, then apply the resulting mailbox actions.
        let classifier = Classifier::new(Arc::clone(&self.llm));
        let vip = VipList {
            domains: self.config.vip_domains.clone(),
            senders: self.config.vip_senders.clone(),
        };
        let decisions = classifier.classify(&messages, &vip).await;
        self.apply_decisions(&messages, &decisions).await;

        // Partition the snapshot; suppressed messages drop out here.
        let split = partition(&messages, &decisions);
        info!(
            suppressed = split.suppressed.len(),
            candidates = split.candidates.len(),
            vip = split.vip.len(),
            "Partitioned working set"
        );

        // Draft replies for the non-suppressed partition.
        let drafter = Drafter::new(Arc::clone(&self.llm), Arc::clone(&self.store));
        let drafts = drafter.draft_replies(&split.candidates).await;

        // Watch important+VIP threads against near-term calendar events.
        // A calendar failure degrades to an empty event list.
        let until = Utc::now() + Duration::hours(EVENT_HORIZON_HOURS);
        let events = match self.store.list_upcoming_events(until).await {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Calendar fetch failed, watching without events");
                Vec::new()
            }
        };
        let watchman = Watchman::new(Arc::clone(&self.llm), Arc::clone(&self.store));
        let watch_set = split.watch_set();
        let interventions = watchman
            .watch(
                &watch_set,
                &events,
                self.config.work_hours_start,
                self.config.work_hours_end,
            )
            .await;

        // Render: a pure projection of the three result sets.
        let briefing = Briefing {
            run_id,
            generated_at: Utc::now(),
            total_messages: messages.len(),
            suppressed: split.suppressed.len(),
            pinned: split
                .vip
                .iter()
                .map(|m| format!("{} — {}", m.sender, m.subject))
                .collect(),
            drafts,
            interventions,
        };
        info!(
            %run_id,
            pinned = briefing.pinned.len(),
            drafts = briefing.drafts.len(),
            interventions = briefing.interventions.len(),
            "Inbox pipeline finished"
        );
        Ok(briefing)
    }

    /// Apply classifier decisions to the mailbox.
    ///
    /// Unknown message ids are dropped; duplicate decisions keep the
    /// first (the same tie-break `partition` uses). Each action failure
    /// is logged and skipped so the rest of the batch proceeds.
    async fn apply_decisions(&self, messages: &[MailMessage], decisions: &[Decision]) {
        let known: HashSet<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        let mut consumed: HashSet<&str> = HashSet::new();
        let mut label_ids: HashMap<String, String> = HashMap::new();

        for decision in decisions {
            if !known.contains(decision.message_id.as_str()) {
                debug!(id = %decision.message_id, "Decision references unknown message, ignoring");
                continue;
            }
            if !consumed.insert(decision.message_id.as_str()) {
                debug!(id = %decision.message_id, "Duplicate decision, keeping the first");
                continue;
            }

            debug!(
                id = %decision.message_id,
                action = decision.action.label(),
                reason = %decision.reason,
                "Applying decision"
            );
            let result = match &decision.action {
                DecisionAction::Archive => self.store.archive(&decision.message_id).await,
                DecisionAction::Label { name } => {
                    self.label_message(&mut label_ids, &decision.message_id, name)
                        .await
                }
                DecisionAction::Vip => {
                    self.label_message(&mut label_ids, &decision.message_id, VIP_LABEL)
                        .await
                }
                DecisionAction::Important => Ok(()),
            };
            if let Err(e) = result {
                warn!(
                    id = %decision.message_id,
                    action = decision.action.label(),
                    error = %e,
                    "Decision action failed, continuing"
                );
            }
        }
    }

    /// Get-or-create the label (memoized for the run), then apply it.
    async fn label_message(
        &self,
        label_ids: &mut HashMap<String, String>,
        message_id: &str,
        name: &str,
    ) -> Result<(), MailError> {
        let label_id = match label_ids.get(name) {
            Some(id) => id.clone(),
            None => {
                let id = self.store.ensure_label(name).await?;
                label_ids.insert(name.to_string(), id.clone());
                id
            }
        };
        self.store.apply_label(message_id, &label_id).await
    }
}
