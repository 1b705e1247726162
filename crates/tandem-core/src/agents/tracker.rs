//! Delegation context tracker
//!
//! Tracks which delegations are in flight at one nesting level, so that a
//! live user message can be routed to the deepest active delegate. Each
//! delegate agent carries its own tracker for the delegations *it* starts;
//! [`DelegationTracker::get_active_delegation`] walks that chain depth-first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, warn};

use super::delegate::DelegateAgent;

/// Lifecycle state of a tracked delegation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegationState {
    /// The delegate is running its task
    Executing,
    /// The task has finished; the result payload is being assembled
    Completing,
}

/// One in-flight delegation at this tracker's level
#[derive(Clone)]
pub struct DelegationContext {
    pub call_id: String,
    pub tool_name: String,
    pub state: DelegationState,
    pub agent: Arc<DelegateAgent>,
    pub registered_at: Instant,
    /// Monotonic registration counter, breaks ties between delegations
    /// registered within the same clock tick.
    seq: u64,
}

/// Aggregate view of a tracker's contents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub total: usize,
    pub executing: usize,
    pub completing: usize,
    pub by_tool: HashMap<String, usize>,
}

/// Registry of in-flight delegations at one nesting level
pub struct DelegationTracker {
    inner: Mutex<HashMap<String, DelegationContext>>,
    seq: AtomicU64,
}

impl DelegationTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Register a delegation as executing.
    ///
    /// Re-registering an existing call id replaces the previous context and
    /// is logged, since it indicates a protocol bug upstream.
    pub fn register(&self, call_id: &str, tool_name: &str, agent: Arc<DelegateAgent>) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let context = DelegationContext {
            call_id: call_id.to_string(),
            tool_name: tool_name.to_string(),
            state: DelegationState::Executing,
            agent,
            registered_at: Instant::now(),
            seq,
        };

        let mut inner = self.inner.lock().expect("tracker lock poisoned");
        if inner.insert(call_id.to_string(), context).is_some() {
            warn!(call_id, "Delegation re-registered over an existing context");
        }
        debug!(call_id, tool_name, "Delegation registered");
    }

    /// Move a delegation to the completing state.
    ///
    /// Idempotent; unknown call ids are ignored so cleanup paths can call
    /// this unconditionally.
    pub fn transition_to_completing(&self, call_id: &str) {
        let mut inner = self.inner.lock().expect("tracker lock poisoned");
        match inner.get_mut(call_id) {
            Some(context) => {
                context.state = DelegationState::Completing;
                debug!(call_id, "Delegation completing");
            }
            None => warn!(call_id, "Transition for unknown delegation ignored"),
        }
    }

    /// Remove a delegation entirely. Idempotent.
    pub fn clear(&self, call_id: &str) {
        let mut inner = self.inner.lock().expect("tracker lock poisoned");
        match inner.remove(call_id) {
            Some(_) => debug!(call_id, "Delegation cleared"),
            None => warn!(call_id, "Clear of unknown delegation ignored"),
        }
    }

    /// The context registered under `call_id`, if any.
    pub fn get(&self, call_id: &str) -> Option<DelegationContext> {
        self.inner
            .lock()
            .expect("tracker lock poisoned")
            .get(call_id)
            .cloned()
    }

    /// The most recently registered delegation at *this* level, regardless
    /// of state. Completing delegations still count: their delegate may be
    /// the right target for an interjection arriving in the window between
    /// task end and result delivery.
    fn most_recent_local(&self) -> Option<DelegationContext> {
        let inner = self.inner.lock().expect("tracker lock poisoned");
        inner
            .values()
            .max_by_key(|c| (c.registered_at, c.seq))
            .cloned()
    }

    /// Resolve the deepest active delegation reachable from this tracker.
    ///
    /// Picks the most recently registered delegation at this level, then
    /// follows each delegate's own tracker downward until a level with no
    /// in-flight delegations is reached. Returns `None` when nothing is in
    /// flight here.
    pub fn get_active_delegation(&self) -> Option<DelegationContext> {
        let mut current = self.most_recent_local()?;
        // Each iteration holds at most one tracker lock.
        while let Some(nested) = current.agent.tracker().most_recent_local() {
            current = nested;
        }
        Some(current)
    }

    /// All in-flight delegations at this level, most recent first. Does not
    /// recurse; used for bulk cancellation and inspection.
    pub fn get_all_active(&self) -> Vec<DelegationContext> {
        let inner = self.inner.lock().expect("tracker lock poisoned");
        let mut contexts: Vec<_> = inner.values().cloned().collect();
        contexts.sort_by(|a, b| (b.registered_at, b.seq).cmp(&(a.registered_at, a.seq)));
        contexts
    }

    /// Drop every entry. Used on teardown.
    pub fn clear_all(&self) {
        let mut inner = self.inner.lock().expect("tracker lock poisoned");
        if !inner.is_empty() {
            debug!(count = inner.len(), "Clearing all tracked delegations");
            inner.clear();
        }
    }

    /// Snapshot counts by state and by tool name.
    pub fn get_stats(&self) -> TrackerStats {
        let inner = self.inner.lock().expect("tracker lock poisoned");
        let mut stats = TrackerStats {
            total: inner.len(),
            ..Default::default()
        };

        for context in inner.values() {
            match context.state {
                DelegationState::Executing => stats.executing += 1,
                DelegationState::Completing => stats.completing += 1,
            }
            *stats.by_tool.entry(context.tool_name.clone()).or_insert(0) += 1;
        }

        stats
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().expect("tracker lock poisoned").is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("tracker lock poisoned").len()
    }
}

impl Default for DelegationTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::delegate::test_support::{test_delegate_config, ScriptedClient};
    use crate::tool::ToolManager;

    fn test_agent(agent_type: &str) -> Arc<DelegateAgent> {
        let client = Arc::new(ScriptedClient::new(vec![]));
        // Scoped manager so the agent carries its own tracker
        let tools = ToolManager::new().scoped(&[]);
        Arc::new(DelegateAgent::new(
            test_delegate_config(agent_type),
            client,
            tools,
        ))
    }

    #[test]
    fn test_register_get_clear_roundtrip() {
        let tracker = DelegationTracker::new();
        let agent = test_agent("explore");

        tracker.register("call-1", "explore", agent);
        let context = tracker.get("call-1").unwrap();
        assert_eq!(context.tool_name, "explore");
        assert_eq!(context.state, DelegationState::Executing);

        tracker.transition_to_completing("call-1");
        assert_eq!(
            tracker.get("call-1").unwrap().state,
            DelegationState::Completing
        );

        tracker.clear("call-1");
        assert!(tracker.get("call-1").is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_transition_and_clear_are_idempotent() {
        let tracker = DelegationTracker::new();
        tracker.transition_to_completing("unknown");
        tracker.clear("unknown");

        let agent = test_agent("explore");
        tracker.register("call-1", "explore", agent);
        tracker.transition_to_completing("call-1");
        tracker.transition_to_completing("call-1");
        tracker.clear("call-1");
        tracker.clear("call-1");
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_active_delegation_picks_most_recent() {
        let tracker = DelegationTracker::new();
        tracker.register("call-1", "explore", test_agent("explore"));
        tracker.register("call-2", "plan", test_agent("plan"));

        let active = tracker.get_active_delegation().unwrap();
        assert_eq!(active.call_id, "call-2");
    }

    #[test]
    fn test_active_delegation_depth_first() {
        // A delegates to B, B delegates to C; resolution lands on C.
        let root = DelegationTracker::new();
        let agent_a = test_agent("agent");
        let agent_b = test_agent("agent");
        let agent_c = test_agent("explore");

        root.register("call-a", "agent", agent_a.clone());
        agent_a.tracker().register("call-b", "agent", agent_b.clone());
        agent_b.tracker().register("call-c", "explore", agent_c);

        let active = root.get_active_delegation().unwrap();
        assert_eq!(active.call_id, "call-c");
        assert_eq!(active.tool_name, "explore");
    }

    #[test]
    fn test_completing_delegation_still_resolvable() {
        let tracker = DelegationTracker::new();
        tracker.register("call-1", "explore", test_agent("explore"));
        tracker.transition_to_completing("call-1");

        let active = tracker.get_active_delegation().unwrap();
        assert_eq!(active.call_id, "call-1");
    }

    #[test]
    fn test_stats() {
        let tracker = DelegationTracker::new();
        tracker.register("call-1", "explore", test_agent("explore"));
        tracker.register("call-2", "explore", test_agent("explore"));
        tracker.register("call-3", "plan", test_agent("plan"));
        tracker.transition_to_completing("call-2");

        let stats = tracker.get_stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.executing, 2);
        assert_eq!(stats.completing, 1);
        assert_eq!(stats.by_tool["explore"], 2);
        assert_eq!(stats.by_tool["plan"], 1);
    }

    #[test]
    fn test_get_all_active_sorted_most_recent_first() {
        let tracker = DelegationTracker::new();
        tracker.register("call-1", "explore", test_agent("explore"));
        tracker.register("call-2", "plan", test_agent("plan"));
        tracker.register("call-3", "agent", test_agent("agent"));

        let active = tracker.get_all_active();
        let ids: Vec<&str> = active.iter().map(|c| c.call_id.as_str()).collect();
        assert_eq!(ids, vec!["call-3", "call-2", "call-1"]);

        tracker.clear_all();
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_empty_tracker_has_no_active_delegation() {
        let tracker = DelegationTracker::new();
        assert!(tracker.get_active_delegation().is_none());
        assert_eq!(tracker.get_stats(), TrackerStats::default());
    }
}
