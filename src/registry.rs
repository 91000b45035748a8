//! Agent registry: capability-indexed directory of live workers.
//!
//! Workers register with a stable id and a capability list; discovery is by
//! capability string rather than by concrete type. Heartbeats refresh
//! liveness; a periodic sweep marks agents stale after a configurable
//! timeout. Registration and deregistration are idempotent and none of the
//! operations block.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Stable identifier a worker registers under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Stale,
}

/// Registered worker entry.
#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub id: AgentId,
    pub name: String,
    pub capabilities: Vec<String>,
    pub last_heartbeat: Instant,
    pub status: AgentStatus,
}

struct RegistryInner {
    agents: HashMap<AgentId, AgentRecord>,
    by_capability: HashMap<String, HashSet<AgentId>>,
}

/// Capability-indexed agent directory.
pub struct AgentRegistry {
    inner: RwLock<RegistryInner>,
    stale_after: Duration,
}

impl AgentRegistry {
    /// Default staleness timeout for missed heartbeats.
    pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(120);

    pub fn new() -> Self {
        Self::with_stale_after(Self::DEFAULT_STALE_AFTER)
    }

    pub fn with_stale_after(stale_after: Duration) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                agents: HashMap::new(),
                by_capability: HashMap::new(),
            }),
            stale_after,
        }
    }

    /// Register (or re-register) a worker. Idempotent: re-registering
    /// replaces the record and refreshes the heartbeat.
    pub fn register(&self, id: AgentId, name: impl Into<String>, capabilities: Vec<String>) {
        let mut inner = self.inner.write().expect("registry lock poisoned");

        if let Some(previous) = inner.agents.remove(&id) {
            for cap in &previous.capabilities {
                if let Some(set) = inner.by_capability.get_mut(cap) {
                    set.remove(&id);
                }
            }
        }

        for cap in &capabilities {
            inner
                .by_capability
                .entry(cap.clone())
                .or_default()
                .insert(id.clone());
        }
        inner.agents.insert(
            id.clone(),
            AgentRecord {
                id,
                name: name.into(),
                capabilities,
                last_heartbeat: Instant::now(),
                status: AgentStatus::Active,
            },
        );
    }

    /// Remove a worker. Idempotent: unknown ids are a no-op.
    pub fn deregister(&self, id: &AgentId) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if let Some(record) = inner.agents.remove(id) {
            for cap in &record.capabilities {
                if let Some(set) = inner.by_capability.get_mut(cap) {
                    set.remove(id);
                }
            }
        }
    }

    /// Refresh a worker's liveness. Unknown ids are ignored.
    pub fn heartbeat(&self, id: &AgentId) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if let Some(record) = inner.agents.get_mut(id) {
            record.last_heartbeat = Instant::now();
            record.status = AgentStatus::Active;
        }
    }

    /// O(1) capability lookup. Only active agents are returned.
    pub fn find_by_capability(&self, capability: &str) -> Vec<AgentRecord> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .by_capability
            .get(capability)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.agents.get(id))
                    .filter(|r| r.status == AgentStatus::Active)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get(&self, id: &AgentId) -> Option<AgentRecord> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.agents.get(id).cloned()
    }

    /// Mark agents whose last heartbeat exceeds the timeout as stale.
    /// Returns the number of agents newly marked.
    pub fn sweep_stale(&self) -> usize {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let stale_after = self.stale_after;
        let mut marked = 0;
        for record in inner.agents.values_mut() {
            if record.status == AgentStatus::Active && record.last_heartbeat.elapsed() > stale_after
            {
                record.status = AgentStatus::Stale;
                marked += 1;
            }
        }
        marked
    }

    pub fn active_count(&self) -> usize {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .agents
            .values()
            .filter(|r| r.status == AgentStatus::Active)
            .count()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crawler_id(n: u32) -> AgentId {
        AgentId::new(format!("news-crawler-{n}"))
    }

    #[test]
    fn capability_discovery() {
        let registry = AgentRegistry::new();
        registry.register(
            crawler_id(1),
            "news crawler",
            vec!["fetch".into(), "fetch.news".into()],
        );
        registry.register(
            AgentId::new("extraction-sifter"),
            "extraction sifter",
            vec!["sift".into()],
        );

        let fetchers = registry.find_by_capability("fetch");
        assert_eq!(fetchers.len(), 1);
        assert_eq!(fetchers[0].id, crawler_id(1));
        assert!(registry.find_by_capability("classify").is_empty());
    }

    #[test]
    fn registration_is_idempotent() {
        let registry = AgentRegistry::new();
        registry.register(crawler_id(1), "a", vec!["fetch".into()]);
        registry.register(crawler_id(1), "a", vec!["fetch.news".into()]);

        // Old capability index entry must be gone.
        assert!(registry.find_by_capability("fetch").is_empty());
        assert_eq!(registry.find_by_capability("fetch.news").len(), 1);

        registry.deregister(&crawler_id(1));
        registry.deregister(&crawler_id(1));
        assert!(registry.find_by_capability("fetch.news").is_empty());
    }

    #[test]
    fn stale_sweep_marks_silent_agents() {
        let registry = AgentRegistry::with_stale_after(Duration::from_millis(0));
        registry.register(crawler_id(1), "a", vec!["fetch".into()]);

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(registry.sweep_stale(), 1);
        assert!(registry.find_by_capability("fetch").is_empty());
        assert_eq!(registry.active_count(), 0);

        // Heartbeat revives the agent.
        registry.heartbeat(&crawler_id(1));
        assert_eq!(registry.active_count(), 1);
    }
}
