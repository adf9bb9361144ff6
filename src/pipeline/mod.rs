//! The inbox-management pipeline: triage → draft → watch.
//!
//! Flow per run:
//! 1. Fetch a bounded recent window from the mail store
//! 2. Classify the batch in one LLM call; apply archive/label actions
//! 3. Partition: suppressed drop out, the rest flow onward
//! 4. Draft replies for the non-suppressed partition
//! 5. Watch important+VIP threads against upcoming calendar events
//! 6. Render the briefing

pub mod classify;
pub mod draft;
pub mod orchestrator;
pub mod parse;
pub mod types;
pub mod watch;

pub use classify::{Classifier, VipList};
pub use draft::Drafter;
pub use orchestrator::{InboxPipeline, VIP_LABEL};
pub use types::{
    partition, Briefing, Decision, DecisionAction, DraftRecord, Intervention,
    InterventionAction, InterventionKind, Partition,
};
pub use watch::Watchman;
