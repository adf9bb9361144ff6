//! Inbox agent — wires the mail store, LLM provider, and pipeline.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::Agent;
use crate::config::{InboxConfig, LlmSettings, MailSettings};
use crate::error::Error;
use crate::llm;
use crate::mail::{GmailStore, MailStore};
use crate::pipeline::InboxPipeline;

/// The triage → draft → watch pipeline as a CLI agent.
pub struct InboxAgent {
    pipeline: InboxPipeline,
}

impl InboxAgent {
    /// Build the agent from environment configuration.
    ///
    /// The provider client lives for exactly one agent run; nothing is
    /// shared process-wide.
    pub fn from_env() -> Result<Self, Error> {
        let llm_settings = LlmSettings::from_env()?;
        let mail_settings = MailSettings::from_env()?;
        let config = InboxConfig::from_env()?;

        let provider = llm::create_provider(&llm_settings)?;
        let store: Arc<dyn MailStore> = Arc::new(GmailStore::new(mail_settings.access_token));

        Ok(Self {
            pipeline: InboxPipeline::new(store, provider, config),
        })
    }
}

#[async_trait]
impl Agent for InboxAgent {
    fn name(&self) -> &'static str {
        "inbox"
    }

    fn description(&self) -> &'static str {
        "Triage the inbox, draft replies, and watch important threads"
    }

    async fn run(&self) -> Result<(), Error> {
        let briefing = self.pipeline.run().await?;
        println!("{}", briefing.render());
        Ok(())
    }
}
