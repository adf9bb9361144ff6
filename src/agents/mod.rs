//! Agent registry — CLI-invocable units of work.
//!
//! Each agent is an independent implementation of the `Agent` trait; the
//! registry is a flat name → constructor table. No shared base state:
//! an agent builds everything it needs (config, clients) at construction.

pub mod inbox;

pub use inbox::InboxAgent;

use async_trait::async_trait;

use crate::error::Error;

/// A runnable agent.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// Execute one run to completion.
    async fn run(&self) -> Result<(), Error>;
}

type Constructor = fn() -> Result<Box<dyn Agent>, Error>;

struct RegistryEntry {
    name: &'static str,
    description: &'static str,
    construct: Constructor,
}

/// Static name → constructor table of the agents this binary ships.
pub struct AgentRegistry {
    entries: Vec<RegistryEntry>,
}

impl AgentRegistry {
    /// Registry with all built-in agents.
    pub fn builtin() -> Self {
        Self {
            entries: vec![RegistryEntry {
                name: "inbox",
                description: "Triage the inbox, draft replies, and watch important threads",
                construct: make_inbox,
            }],
        }
    }

    /// Iterate (name, description) pairs for the `list` command.
    pub fn list(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.entries.iter().map(|e| (e.name, e.description))
    }

    /// Construct the named agent, reading its configuration from the
    /// environment. Missing config surfaces here, before any I/O.
    pub fn build(&self, name: &str) -> Result<Box<dyn Agent>, Error> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::UnknownAgent(name.to_string()))?;
        (entry.construct)()
    }
}

fn make_inbox() -> Result<Box<dyn Agent>, Error> {
    Ok(Box::new(InboxAgent::from_env()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lists_inbox_agent() {
        let registry = AgentRegistry::builtin();
        let names: Vec<&str> = registry.list().map(|(name, _)| name).collect();
        assert!(names.contains(&"inbox"));
    }

    #[test]
    fn unknown_agent_name_is_an_error() {
        let registry = AgentRegistry::builtin();
        let result = registry.build("does-not-exist");
        assert!(matches!(result, Err(Error::UnknownAgent(_))));
    }
}
