//! Batch triage — one LLM call classifies the whole fetched window.
//!
//! The classifier only decides; the orchestrator owns the side effects
//! (archive, label, VIP pin) so that failures stay per-message.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::llm::{GenerateRequest, LlmProvider};
use crate::mail::MailMessage;
use crate::pipeline::parse::first_json_array;
use crate::pipeline::types::{Decision, DecisionAction};

/// Max tokens for the triage call; scales with the 50-message window.
const CLASSIFY_MAX_TOKENS: u32 = 4096;

/// Near-deterministic triage.
const CLASSIFY_TEMPERATURE: f32 = 0.1;

const CLASSIFY_SYSTEM_PROMPT: &str = "\
You are an email triage engine. Classify every message in the batch into exactly one action.\n\n\
Actions:\n\
- \"archive\": newsletters, promotions, cold outreach, automated noise nobody needs to see.\n\
- \"label\": routine mail worth keeping but not worth inbox space. Include \"label_name\".\n\
- \"important\": mail the user should read or answer personally.\n\
- \"vip\": mail whose sender matches the VIP senders or VIP domains listed in the prompt.\n\n\
Respond with ONLY a JSON array, one object per message:\n\
[{\"id\": \"...\", \"action\": \"archive|label|important|vip\", \"label_name\": \"...\", \"reason\": \"...\"}]\n\n\
Rules:\n\
- Classify every message exactly once, using the id given in the prompt.\n\
- Reasons are one short sentence.\n\
- Omit \"label_name\" unless the action is \"label\".\n\
- When in doubt between archive and label, choose label.";

/// VIP allow-lists handed to the classifier prompt.
#[derive(Debug, Clone, Default)]
pub struct VipList {
    pub domains: Vec<String>,
    pub senders: Vec<String>,
}

/// Batch message classifier.
pub struct Classifier {
    llm: Arc<dyn LlmProvider>,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Classify a batch of messages into decisions.
    ///
    /// Soft-fails to an empty decision list: an LLM error or unparseable
    /// reply leaves every message undecided (not suppressed, not VIP)
    /// rather than aborting the run.
    pub async fn classify(&self, messages: &[MailMessage], vip: &VipList) -> Vec<Decision> {
        if messages.is_empty() {
            return Vec::new();
        }

        let request = GenerateRequest::new(
            CLASSIFY_SYSTEM_PROMPT,
            build_classify_prompt(messages, vip),
        )
        .with_max_tokens(CLASSIFY_MAX_TOKENS)
        .with_temperature(CLASSIFY_TEMPERATURE);

        let response = match self.llm.generate(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Classifier: LLM call failed, leaving batch undecided");
                return Vec::new();
            }
        };

        let decisions = parse_decisions(&response.content);
        debug!(
            decided = decisions.len(),
            total = messages.len(),
            "Classifier produced decisions"
        );
        decisions
    }
}

/// Build the composite prompt: every message plus the VIP allow-list.
fn build_classify_prompt(messages: &[MailMessage], vip: &VipList) -> String {
    let mut prompt = String::with_capacity(messages.len() * 200);

    prompt.push_str("Messages:\n");
    for message in messages {
        prompt.push_str(&format!("- id: {}\n", message.id));
        prompt.push_str(&format!("  from: {}\n", message.sender));
        prompt.push_str(&format!("  subject: {}\n", message.subject));
        prompt.push_str(&format!("  date: {}\n", message.received_at.to_rfc3339()));
        let snippet: String = message.snippet.chars().take(200).collect();
        prompt.push_str(&format!("  snippet: {snippet}\n"));
    }

    prompt.push_str(&format!(
        "\nVIP senders: {}\n",
        join_or_none(&vip.senders)
    ));
    prompt.push_str(&format!("VIP domains: {}\n", join_or_none(&vip.domains)));

    prompt
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

/// Raw decision record as the model emits it — validated into `Decision`.
#[derive(Debug, Deserialize)]
struct RawDecision {
    #[serde(default)]
    id: String,
    #[serde(default)]
    action: String,
    #[serde(default)]
    label_name: String,
    #[serde(default)]
    reason: String,
}

impl RawDecision {
    fn into_decision(self) -> Option<Decision> {
        if self.id.is_empty() {
            debug!("Dropping decision with no message id");
            return None;
        }
        let action = match self.action.as_str() {
            "archive" => DecisionAction::Archive,
            "label" => {
                if self.label_name.trim().is_empty() {
                    debug!(id = %self.id, "Dropping label decision with no label name");
                    return None;
                }
                DecisionAction::Label {
                    name: self.label_name,
                }
            }
            "important" => DecisionAction::Important,
            "vip" => DecisionAction::Vip,
            other => {
                debug!(id = %self.id, action = other, "Dropping decision with unknown action");
                return None;
            }
        };
        Some(Decision {
            message_id: self.id,
            action,
            reason: self.reason,
        })
    }
}

/// Parse the model reply into decisions; soft-fails to empty.
fn parse_decisions(raw: &str) -> Vec<Decision> {
    let Some(array) = first_json_array(raw) else {
        warn!("Classifier: no JSON array in model output");
        return Vec::new();
    };
    let records: Vec<RawDecision> = match serde_json::from_str(array) {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "Classifier: model output failed to decode");
            return Vec::new();
        }
    };
    records
        .into_iter()
        .filter_map(RawDecision::into_decision)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::GenerateResponse;

    fn message(id: &str, sender: &str, subject: &str) -> MailMessage {
        MailMessage {
            id: id.into(),
            thread_id: format!("t-{id}"),
            sender: sender.into(),
            recipient: "me@example.com".into(),
            subject: subject.into(),
            snippet: "snippet text".into(),
            body_text: "body".into(),
            body_html: String::new(),
            received_at: Utc::now(),
            label_ids: vec!["INBOX".into()],
        }
    }

    /// Mock LLM returning a fixed reply, counting calls.
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

    #[tokio::test]
    async fn empty_batch_makes_no_llm_call() {
        let llm = MockLlm::new("[]");
        let classifier = Classifier::new(llm.clone());
        let decisions = classifier.classify(&[], &VipList::default()).await;
        assert!(decisions.is_empty());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_reply_parses_into_decisions() {
        let llm = MockLlm::new(
            r#"[
                {"id": "m1", "action": "archive", "reason": "newsletter"},
                {"id": "m2", "action": "vip", "reason": "allow-listed"},
                {"id": "m3", "action": "label", "label_name": "Low Priority", "reason": "routine"}
            ]"#,
        );
        let classifier = Classifier::new(llm);
        let messages = vec![
            message("m1", "news@letter.com", "Weekly"),
            message("m2", "boss@corp.com", "Budget?"),
            message("m3", "jira@corp.com", "[JIRA] Update"),
        ];
        let decisions = classifier.classify(&messages, &VipList::default()).await;
        assert_eq!(decisions.len(), 3);
        assert_eq!(decisions[0].action, DecisionAction::Archive);
        assert_eq!(decisions[1].action, DecisionAction::Vip);
        assert_eq!(
            decisions[2].action,
            DecisionAction::Label { name: "Low Priority".into() }
        );
    }

    #[tokio::test]
    async fn prose_reply_soft_fails_to_empty() {
        let llm = MockLlm::new("I'm not able to classify these messages right now.");
        let classifier = Classifier::new(llm);
        let decisions = classifier
            .classify(&[message("m1", "a@b.com", "Hi")], &VipList::default())
            .await;
        assert!(decisions.is_empty());
    }

    #[tokio::test]
    async fn undecodable_records_soft_fail_to_empty() {
        let llm = MockLlm::new(r#"["just", "strings"]"#);
        let classifier = Classifier::new(llm);
        let decisions = classifier
            .classify(&[message("m1", "a@b.com", "Hi")], &VipList::default())
            .await;
        assert!(decisions.is_empty());
    }

    #[tokio::test]
    async fn llm_failure_soft_fails_to_empty() {
        struct FailingLlm;

        #[async_trait]
        impl LlmProvider for FailingLlm {
            fn model_name(&self) -> &str {
                "failing"
            }
            async fn generate(
                &self,
                _request: GenerateRequest,
            ) -> Result<GenerateResponse, LlmError> {
                Err(LlmError::RequestFailed {
                    model: "failing".into(),
                    reason: "boom".into(),
                })
            }
        }

        let classifier = Classifier::new(Arc::new(FailingLlm));
        let decisions = classifier
            .classify(&[message("m1", "a@b.com", "Hi")], &VipList::default())
            .await;
        assert!(decisions.is_empty());
    }

    #[test]
    fn unknown_action_records_are_dropped() {
        let decisions =
            parse_decisions(r#"[{"id": "m1", "action": "escalate"}, {"id": "m2", "action": "archive"}]"#);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].message_id, "m2");
    }

    #[test]
    fn label_without_name_is_dropped() {
        let decisions = parse_decisions(r#"[{"id": "m1", "action": "label"}]"#);
        assert!(decisions.is_empty());
    }

    #[test]
    fn reply_wrapped_in_markdown_still_parses() {
        let decisions = parse_decisions(
            "Here you go:\n```json\n[{\"id\": \"m1\", \"action\": \"important\", \"reason\": \"direct question\"}]\n```",
        );
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].action, DecisionAction::Important);
    }

    #[test]
    fn prompt_includes_messages_and_vip_lists() {
        let messages = vec![message("m1", "jane@corp.com", "Budget review")];
        let vip = VipList {
            domains: vec!["board.example.com".into()],
            senders: vec!["ceo@corp.com".into()],
        };
        let prompt = build_classify_prompt(&messages, &vip);
        assert!(prompt.contains("id: m1"));
        assert!(prompt.contains("jane@corp.com"));
        assert!(prompt.contains("Budget review"));
        assert!(prompt.contains("VIP senders: ceo@corp.com"));
        assert!(prompt.contains("VIP domains: board.example.com"));
    }

    #[test]
    fn prompt_says_none_for_empty_vip_lists() {
        let prompt = build_classify_prompt(
            &[message("m1", "a@b.com", "Hi")],
            &VipList::default(),
        );
        assert!(prompt.contains("VIP senders: (none)"));
    }
}
