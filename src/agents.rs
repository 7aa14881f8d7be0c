//! Agent allow/deny lists with atomic wholesale refresh.

use crate::store::{AgentListKind, SettingsStore};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Immutable snapshot of both agent lists, patterns lowercased.
///
/// Deny-list membership is substring containment so variants of known bad
/// tools are caught; allow-list membership is exact match so impersonators
/// cannot ride a partial pattern. The asymmetry is deliberate.
#[derive(Debug, Default)]
pub struct AgentSets {
    allow: Vec<String>,
    deny: Vec<String>,
}

impl AgentSets {
    pub fn new(allow: Vec<String>, deny: Vec<String>) -> Self {
        Self {
            allow: allow.into_iter().map(|p| p.to_lowercase()).collect(),
            deny: deny.into_iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// True if the user-agent exactly equals an active allow-list pattern,
    /// case-insensitively.
    pub fn is_known_good(&self, user_agent: &str) -> bool {
        let ua = user_agent.to_lowercase();
        self.allow.iter().any(|pattern| ua == *pattern)
    }

    /// True if the lowercased user-agent contains any active deny-list
    /// pattern.
    pub fn is_known_bad(&self, user_agent: &str) -> bool {
        let ua = user_agent.to_lowercase();
        self.deny.iter().any(|pattern| ua.contains(pattern.as_str()))
    }
}

/// Shared handle to the current agent sets.
///
/// Refresh replaces the whole snapshot in one atomic swap; readers see
/// either the old set or the new one, never a partially mutated set. A
/// failed refresh keeps the last-known-good snapshot.
pub struct AgentLists {
    current: RwLock<Arc<AgentSets>>,
}

impl Default for AgentLists {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(AgentSets::default())),
        }
    }
}

impl AgentLists {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot for the duration of one request.
    pub fn current(&self) -> Arc<AgentSets> {
        self.current.read().expect("agent lock poisoned").clone()
    }

    /// Reload both lists from the store and swap them in wholesale.
    pub async fn refresh(&self, store: &dyn SettingsStore) -> anyhow::Result<()> {
        let deny = store.list_active_agents(AgentListKind::Bad).await?;
        let allow = store.list_active_agents(AgentListKind::Good).await?;
        let next = AgentSets::new(allow, deny);
        debug!(
            allow = next.allow.len(),
            deny = next.deny.len(),
            "agent lists refreshed"
        );
        *self.current.write().expect("agent lock poisoned") = Arc::new(next);
        Ok(())
    }
}
