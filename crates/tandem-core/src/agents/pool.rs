//! Agent pool
//!
//! Bounded pool of reusable delegate agents keyed by caller-chosen strings.
//! An agent is either free or checked out to exactly one delegation; a key
//! whose agent is checked out is a conflict, not a queue. When the pool is
//! full, the oldest free agent is evicted to make room.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::delegate::{DelegateAgent, DelegateFactory};
use super::types::{AgentId, DelegateConfig};

/// One pooled delegate and its bookkeeping
struct PoolEntry {
    id: AgentId,
    agent: Arc<DelegateAgent>,
    pool_key: String,
    in_use: bool,
    created_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
    use_count: u64,
}

/// Checkout handle returned by [`AgentPool::acquire`]
pub struct PooledAgent {
    pub id: AgentId,
    pub pool_key: String,
    pub agent: Arc<DelegateAgent>,
    /// False when the agent was built for this acquisition
    pub reused: bool,
}

impl std::fmt::Debug for PooledAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledAgent")
            .field("id", &self.id)
            .field("pool_key", &self.pool_key)
            .field("reused", &self.reused)
            .finish_non_exhaustive()
    }
}

/// Aggregate pool counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolStats {
    pub total: usize,
    pub in_use: usize,
    pub free: usize,
    pub max_size: usize,
    /// Age in seconds of the oldest free entry, if any is free
    pub oldest_free_age_secs: Option<i64>,
    /// Age in seconds of the newest free entry, if any is free
    pub newest_free_age_secs: Option<i64>,
}

/// Serializable snapshot of one pool entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub id: AgentId,
    pub pool_key: String,
    pub agent_type: String,
    pub model: String,
    pub depth: u32,
    pub in_use: bool,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub use_count: u64,
}

/// Bounded pool of reusable delegate agents
pub struct AgentPool {
    entries: Mutex<HashMap<String, PoolEntry>>,
    max_size: usize,
}

impl AgentPool {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_size: max_size.max(1),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Check out the agent for `key`, building one if absent.
    ///
    /// A key whose agent is already checked out yields [`Error::Conflict`].
    /// When the pool is at capacity and every entry is checked out,
    /// [`Error::Capacity`] is returned; otherwise the oldest free entry is
    /// evicted to make room.
    pub fn acquire(
        &self,
        key: &str,
        config: DelegateConfig,
        factory: &dyn DelegateFactory,
    ) -> Result<PooledAgent> {
        let mut entries = self.entries.lock().expect("pool lock poisoned");

        if let Some(entry) = entries.get_mut(key) {
            if entry.in_use {
                return Err(Error::Conflict(format!(
                    "Agent for key '{}' is already handling a delegation",
                    key
                )));
            }
            entry.in_use = true;
            entry.last_accessed_at = Utc::now();
            entry.use_count += 1;
            debug!(key, agent = %entry.id, uses = entry.use_count, "Reusing pooled agent");
            return Ok(PooledAgent {
                id: entry.id.clone(),
                pool_key: entry.pool_key.clone(),
                agent: entry.agent.clone(),
                reused: true,
            });
        }

        if entries.len() >= self.max_size {
            let evict_key = entries
                .values()
                .filter(|e| !e.in_use)
                .min_by_key(|e| e.created_at)
                .map(|e| e.pool_key.clone());

            match evict_key {
                Some(evict_key) => {
                    if let Some(evicted) = entries.remove(&evict_key) {
                        info!(
                            evicted = %evicted.id,
                            key = %evict_key,
                            "Pool full, evicting oldest free agent"
                        );
                        evicted.agent.close();
                    }
                }
                None => {
                    return Err(Error::Capacity {
                        size: entries.len(),
                        max_size: self.max_size,
                    });
                }
            }
        }

        let agent = factory.build(&config)?;
        let id = agent.id().clone();
        let now = Utc::now();
        debug!(key, agent = %id, agent_type = %config.agent_type, "Built new pooled agent");

        entries.insert(
            key.to_string(),
            PoolEntry {
                id: id.clone(),
                agent: agent.clone(),
                pool_key: key.to_string(),
                in_use: true,
                created_at: now,
                last_accessed_at: now,
                use_count: 1,
            },
        );

        Ok(PooledAgent {
            id,
            pool_key: key.to_string(),
            agent,
            reused: false,
        })
    }

    /// Return a checked-out agent to the pool. Unknown ids are logged and
    /// ignored, so cleanup paths can call this unconditionally.
    pub fn release(&self, id: &AgentId) {
        let mut entries = self.entries.lock().expect("pool lock poisoned");
        match entries.values_mut().find(|e| &e.id == id) {
            Some(entry) => {
                entry.in_use = false;
                entry.last_accessed_at = Utc::now();
                debug!(agent = %id, key = %entry.pool_key, "Agent released");
            }
            None => warn!(agent = %id, "Release of unknown agent ignored"),
        }
    }

    /// Remove a free agent from the pool. Returns false when the agent is
    /// unknown or currently checked out.
    pub fn remove_agent(&self, id: &AgentId) -> bool {
        let mut entries = self.entries.lock().expect("pool lock poisoned");
        let key = entries
            .values()
            .find(|e| &e.id == id && !e.in_use)
            .map(|e| e.pool_key.clone());

        match key {
            Some(key) => {
                if let Some(entry) = entries.remove(&key) {
                    entry.agent.close();
                }
                true
            }
            None => false,
        }
    }

    /// Drop every agent in the pool. Fails without removing anything when
    /// any agent is still checked out, reporting how many block the clear.
    pub fn clear_pool(&self) -> Result<usize> {
        let mut entries = self.entries.lock().expect("pool lock poisoned");
        let blockers = entries.values().filter(|e| e.in_use).count();
        if blockers > 0 {
            return Err(Error::Conflict(format!(
                "{} pooled agents are still handling delegations",
                blockers
            )));
        }

        let removed = entries.len();
        for entry in entries.values() {
            entry.agent.close();
        }
        entries.clear();
        info!(removed, "Pool cleared");
        Ok(removed)
    }

    pub fn stats(&self) -> PoolStats {
        let entries = self.entries.lock().expect("pool lock poisoned");
        let in_use = entries.values().filter(|e| e.in_use).count();

        let now = Utc::now();
        let free_ages: Vec<i64> = entries
            .values()
            .filter(|e| !e.in_use)
            .map(|e| (now - e.created_at).num_seconds())
            .collect();

        PoolStats {
            total: entries.len(),
            in_use,
            free: entries.len() - in_use,
            max_size: self.max_size,
            oldest_free_age_secs: free_ages.iter().max().copied(),
            newest_free_age_secs: free_ages.iter().min().copied(),
        }
    }

    pub fn agent_metadata(&self, id: &AgentId) -> Option<AgentMetadata> {
        let entries = self.entries.lock().expect("pool lock poisoned");
        entries.values().find(|e| &e.id == id).map(|e| AgentMetadata {
            id: e.id.clone(),
            pool_key: e.pool_key.clone(),
            agent_type: e.agent.agent_type().to_string(),
            model: e.agent.config().model.clone(),
            depth: e.agent.depth(),
            in_use: e.in_use,
            created_at: e.created_at,
            last_accessed_at: e.last_accessed_at,
            use_count: e.use_count,
        })
    }

    pub fn agent_ids(&self) -> Vec<AgentId> {
        let entries = self.entries.lock().expect("pool lock poisoned");
        entries.values().map(|e| e.id.clone()).collect()
    }

    pub fn has_agent(&self, id: &AgentId) -> bool {
        let entries = self.entries.lock().expect("pool lock poisoned");
        entries.values().any(|e| &e.id == id)
    }

    /// The agent checked in under `key`, regardless of checkout state.
    pub fn get_agent(&self, key: &str) -> Option<Arc<DelegateAgent>> {
        let entries = self.entries.lock().expect("pool lock poisoned");
        entries.get(key).map(|e| e.agent.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::delegate::test_support::{test_delegate_config, ScriptedFactory};

    fn factory() -> ScriptedFactory {
        ScriptedFactory::new(vec![])
    }

    #[test]
    fn test_acquire_builds_then_reuses() {
        let pool = AgentPool::new(4);
        let factory = factory();

        let first = pool
            .acquire("explore:1", test_delegate_config("explore"), &factory)
            .unwrap();
        assert!(!first.reused);

        pool.release(&first.id);

        let second = pool
            .acquire("explore:1", test_delegate_config("explore"), &factory)
            .unwrap();
        assert!(second.reused);
        assert_eq!(first.id, second.id);

        let meta = pool.agent_metadata(&second.id).unwrap();
        assert_eq!(meta.use_count, 2);
    }

    #[test]
    fn test_acquire_in_use_key_is_conflict() {
        let pool = AgentPool::new(4);
        let factory = factory();

        let handle = pool
            .acquire("explore:1", test_delegate_config("explore"), &factory)
            .unwrap();

        let err = pool
            .acquire("explore:1", test_delegate_config("explore"), &factory)
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // Conflict does not corrupt the checkout
        assert!(pool.has_agent(&handle.id));
        assert_eq!(pool.stats().in_use, 1);
    }

    #[test]
    fn test_eviction_of_oldest_free_agent() {
        // max_size 1: "a" is built then released; "b" evicts it; acquiring
        // "b" again while it is checked out is a conflict.
        let pool = AgentPool::new(1);
        let factory = factory();

        let a = pool
            .acquire("a", test_delegate_config("explore"), &factory)
            .unwrap();
        pool.release(&a.id);

        let b = pool
            .acquire("b", test_delegate_config("explore"), &factory)
            .unwrap();
        assert!(!pool.has_agent(&a.id));
        assert!(pool.has_agent(&b.id));

        let err = pool
            .acquire("b", test_delegate_config("explore"), &factory)
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_capacity_error_when_all_in_use() {
        let pool = AgentPool::new(1);
        let factory = factory();

        let _a = pool
            .acquire("a", test_delegate_config("explore"), &factory)
            .unwrap();

        let err = pool
            .acquire("b", test_delegate_config("explore"), &factory)
            .unwrap_err();
        assert!(matches!(err, Error::Capacity { .. }));
    }

    #[test]
    fn test_release_unknown_agent_is_ignored() {
        let pool = AgentPool::new(2);
        pool.release(&AgentId::new("ghost"));
        assert_eq!(pool.stats().total, 0);
    }

    #[test]
    fn test_remove_agent_only_when_free() {
        let pool = AgentPool::new(2);
        let factory = factory();

        let handle = pool
            .acquire("a", test_delegate_config("explore"), &factory)
            .unwrap();
        assert!(!pool.remove_agent(&handle.id));

        pool.release(&handle.id);
        assert!(pool.remove_agent(&handle.id));
        assert!(!pool.has_agent(&handle.id));
    }

    #[test]
    fn test_clear_pool_blocked_by_checked_out_agents() {
        let pool = AgentPool::new(4);
        let factory = factory();

        let a = pool
            .acquire("a", test_delegate_config("explore"), &factory)
            .unwrap();
        let b = pool
            .acquire("b", test_delegate_config("plan"), &factory)
            .unwrap();
        pool.release(&b.id);

        let err = pool.clear_pool().unwrap_err();
        assert!(err.to_string().contains("1 pooled agents"));
        assert_eq!(pool.stats().total, 2);

        pool.release(&a.id);
        assert_eq!(pool.clear_pool().unwrap(), 2);
        assert_eq!(pool.stats().total, 0);
    }

    #[test]
    fn test_stats_and_ids() {
        let pool = AgentPool::new(4);
        let factory = factory();

        let a = pool
            .acquire("a", test_delegate_config("explore"), &factory)
            .unwrap();
        let _b = pool
            .acquire("b", test_delegate_config("plan"), &factory)
            .unwrap();
        pool.release(&a.id);

        let stats = pool.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.in_use, 1);
        assert_eq!(stats.free, 1);
        assert_eq!(pool.agent_ids().len(), 2);
    }
}
