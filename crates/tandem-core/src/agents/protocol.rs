//! Delegation execution protocol
//!
//! [`DelegationRunner`] orchestrates one delegated task end to end: resolve
//! collaborators, map thoroughness to a budget, acquire a pooled delegate,
//! register it with the tracker, enter a scoped service overlay, run the
//! task under a duration ceiling, apply the response-quality fallback, and
//! clean up on every exit path. The runner is the error boundary: faults
//! below it come back as a structured [`DelegationFailure`], never a raised
//! fault.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{DelegationEvent, EventBus};
use crate::llm::ModelClient;
use crate::permission::PermissionGate;
use crate::services::{keys, ScopedServices, ServiceLookup};
use crate::tool::ToolManager;

use super::delegate::{DelegateAgent, DelegateFactory, LlmDelegateFactory};
use super::pool::AgentPool;
use super::tracker::DelegationTracker;
use super::types::{
    AgentId, DelegateConfig, DelegationFailure, DelegationOutcome, DelegationSuccess,
    DelegationToolConfig, TaskBudget, Thoroughness,
};

/// Annotation prepended to every successful response. The content is for
/// the delegating agent, not the end user; the caller must restate it.
pub const RESPONSE_NOTE: &str =
    "[Delegate response. Not shown to the user; restate the relevant parts in your reply.]\n\n";

/// Hook for reshaping the delegate's response text before it is returned.
pub trait ResponsePostProcessor: Send + Sync {
    fn post_process(&self, response: String) -> String;
}

/// One delegation request
pub struct DelegationRequest<'a> {
    pub task_prompt: &'a str,
    pub thoroughness: Thoroughness,
    pub call_id: &'a str,
    /// Depth of the delegating agent; the delegate runs at depth + 1
    pub parent_depth: u32,
    /// Stable key for cross-turn delegate reuse; `None` derives a
    /// call-scoped key
    pub pool_key: Option<&'a str>,
    /// Budget replacing the thoroughness table's entry for this run
    pub budget_override: Option<TaskBudget>,
}

/// Collaborators resolved at the start of one run
struct Resolved {
    config: Arc<Config>,
    shared_client: Arc<dyn ModelClient>,
    tool_manager: Arc<ToolManager>,
    tracker: Arc<DelegationTracker>,
    bus: Option<Arc<EventBus>>,
}

/// How the delegate for one run was obtained
struct Acquired {
    agent: Arc<DelegateAgent>,
    /// Present when the delegate is pooled (persists after release)
    pooled: Option<(AgentId, String)>,
}

/// Orchestrates delegated task execution for one delegation-tool type.
pub struct DelegationRunner {
    pool: Arc<AgentPool>,
    tool_config: DelegationToolConfig,
    /// Delegates currently running under this runner, by call id. Lets
    /// `interrupt_all` fan out without consulting the tracker.
    active: DashMap<String, Arc<DelegateAgent>>,
    /// Most recently acquired delegate; target of `inject_user_message`
    current: Mutex<Option<Arc<DelegateAgent>>>,
    /// Event bus captured from the most recent run, for interjection events
    bus: Mutex<Option<Arc<EventBus>>>,
    post_processor: Option<Arc<dyn ResponsePostProcessor>>,
}

impl DelegationRunner {
    pub fn new(pool: Arc<AgentPool>, tool_config: DelegationToolConfig) -> Self {
        Self {
            pool,
            tool_config,
            active: DashMap::new(),
            current: Mutex::new(None),
            bus: Mutex::new(None),
            post_processor: None,
        }
    }

    pub fn with_post_processor(mut self, post_processor: Arc<dyn ResponsePostProcessor>) -> Self {
        self.post_processor = Some(post_processor);
        self
    }

    pub fn tool_config(&self) -> &DelegationToolConfig {
        &self.tool_config
    }

    /// Run one delegated task to completion.
    ///
    /// Never raises: every fault is converted into a [`DelegationFailure`]
    /// carrying the agent type that was running. Cleanup (pool release or
    /// one-off disposal, tracker transition, local-set removal) happens on
    /// every exit path once a delegate has been acquired.
    pub async fn execute(
        &self,
        services: Arc<dyn ServiceLookup>,
        request: DelegationRequest<'_>,
    ) -> DelegationOutcome {
        let started = Instant::now();

        let resolved = match self.resolve(&services) {
            Ok(resolved) => resolved,
            Err(e) => return Err(self.failure(&e)),
        };
        *self.bus.lock().expect("bus lock poisoned") = resolved.bus.clone();

        let budget = request
            .budget_override
            .unwrap_or_else(|| request.thoroughness.budget());
        let depth = request.parent_depth + 1;
        if depth > resolved.config.delegation.max_depth {
            return Err(self.failure(&Error::Other(format!(
                "Delegation depth {} exceeds the maximum of {}",
                depth, resolved.config.delegation.max_depth
            ))));
        }

        let model = resolved
            .config
            .model_for(self.tool_config.model_config_key.as_deref());

        if let Some(bus) = &resolved.bus {
            bus.emit(DelegationEvent::Started {
                call_id: request.call_id.to_string(),
                agent_type: self.tool_config.agent_type.clone(),
                task_prompt: request.task_prompt.to_string(),
                model: model.clone(),
            });
        }

        let delegate_config = DelegateConfig {
            agent_type: self.tool_config.agent_type.clone(),
            allowed_tools: self.tool_config.effective_allowed_tools(),
            model,
            max_tokens: budget.max_tokens,
            depth,
            system_prompt: self.tool_config.effective_system_prompt(),
            reasoning_effort: self.tool_config.reasoning_effort,
            specialized: self.tool_config.agent_type != "agent",
            max_iterations: resolved.config.delegation.max_iterations,
        };

        let factory = LlmDelegateFactory::new(
            resolved.config.clone(),
            resolved.shared_client.clone(),
            resolved.tool_manager.clone(),
        );

        let pool_key = match request.pool_key {
            Some(key) => key.to_string(),
            None => format!("{}:{}", self.tool_config.agent_type, request.call_id),
        };

        let acquired = match self.acquire(&pool_key, delegate_config, &factory) {
            Ok(acquired) => acquired,
            Err(e) => {
                let failure = self.failure(&e);
                self.emit_failed(&resolved, request.call_id, &failure, started);
                return Err(failure);
            }
        };

        resolved
            .tracker
            .register(request.call_id, &self.tool_config.agent_type, acquired.agent.clone());
        self.active
            .insert(request.call_id.to_string(), acquired.agent.clone());
        *self.current.lock().expect("current lock poisoned") = Some(acquired.agent.clone());

        let scoped: Arc<dyn ServiceLookup> =
            ScopedServices::rebind(services, keys::CURRENT_AGENT, acquired.agent.clone());

        let run_result = self
            .run_with_budget(
                &acquired.agent,
                scoped,
                request.task_prompt,
                budget,
                request.call_id,
                resolved.config.delegation.min_response_len,
            )
            .await;

        // Cleanup, unconditionally, before the payload is assembled.
        self.active.remove(request.call_id);
        match &acquired.pooled {
            Some((id, _)) => self.pool.release(id),
            None => acquired.agent.close(),
        }
        resolved.tracker.transition_to_completing(request.call_id);
        {
            let mut current = self.current.lock().expect("current lock poisoned");
            let is_this = current
                .as_ref()
                .map(|a| Arc::ptr_eq(a, &acquired.agent))
                .unwrap_or(false);
            if is_this {
                *current = None;
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        let outcome = match run_result {
            Ok(response) => {
                if let Some(bus) = &resolved.bus {
                    bus.emit(DelegationEvent::Completed {
                        call_id: request.call_id.to_string(),
                        agent_type: self.tool_config.agent_type.clone(),
                        duration_secs: elapsed,
                    });
                }
                info!(
                    call_id = request.call_id,
                    agent_type = %self.tool_config.agent_type,
                    elapsed_secs = elapsed,
                    "Delegation completed"
                );

                let (agent_id, resume_hint) = match &acquired.pooled {
                    Some((id, key)) => (
                        Some(id.to_string()),
                        Some(format!(
                            "This agent remains available; pass pool_key \"{}\" to continue with it.",
                            key
                        )),
                    ),
                    None => (None, None),
                };

                Ok(DelegationSuccess {
                    content: format!("{}{}", RESPONSE_NOTE, response),
                    elapsed_secs: elapsed,
                    agent_type: self.tool_config.agent_type.clone(),
                    agent_id,
                    resume_hint,
                })
            }
            Err(e) => {
                let failure = self.failure(&e);
                self.emit_failed(&resolved, request.call_id, &failure, started);
                Err(failure)
            }
        };

        // Second teardown phase: the context stays resolvable while the
        // payload is assembled, then disappears.
        resolved.tracker.clear(request.call_id);

        outcome
    }

    /// Interrupt every delegate currently running under this runner.
    /// Returns how many were signalled. Safe to call at any time.
    pub fn interrupt_all(&self) -> usize {
        let mut count = 0;
        for entry in self.active.iter() {
            debug!(call_id = entry.key().as_str(), "Interrupting delegation");
            entry.value().interrupt();
            count += 1;
        }
        count
    }

    /// Queue a live user message on the most recently acquired delegate
    /// (last-acquired-wins; intentionally shallower than the tracker's
    /// depth-first resolution). Returns whether a delegate was targeted.
    pub fn inject_user_message(&self, text: impl Into<String>) -> bool {
        let text = text.into();
        let current = self.current.lock().expect("current lock poisoned");
        match current.as_ref() {
            Some(agent) => {
                agent.inject_message(text.clone());
                if let Some(bus) = self.bus.lock().expect("bus lock poisoned").as_ref() {
                    bus.emit(DelegationEvent::Interjection {
                        agent_type: agent.agent_type().to_string(),
                        text,
                    });
                }
                true
            }
            None => false,
        }
    }

    /// The number of delegations currently running under this runner.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    fn resolve(&self, services: &Arc<dyn ServiceLookup>) -> Result<Resolved> {
        let config: Arc<Config> = services.require(keys::CONFIG)?;
        let shared_client: Arc<dyn ModelClient> = services.require(keys::MODEL_CLIENT)?;
        let tool_manager: Arc<ToolManager> = services.require(keys::TOOL_MANAGER)?;
        // The gate is consulted at tool dispatch; its absence is detected
        // here so misconfiguration fails the delegation up front.
        let _gate: Arc<dyn PermissionGate> = services.require(keys::PERMISSION_GATE)?;
        let bus: Option<Arc<EventBus>> = services.get(keys::EVENT_BUS);

        // Nested delegations register with the current delegate's tracker,
        // making them reachable by depth-first resolution from the root.
        let tracker = services
            .get::<Arc<DelegateAgent>>(keys::CURRENT_AGENT)
            .map(|agent| agent.tracker())
            .or_else(|| tool_manager.tracker())
            .unwrap_or_else(|| {
                warn!("No delegation tracker attached; using a detached one");
                Arc::new(DelegationTracker::new())
            });

        Ok(Resolved {
            config,
            shared_client,
            tool_manager,
            tracker,
            bus,
        })
    }

    /// Acquire a pooled delegate, degrading to an unpooled one-off agent
    /// when the pool is at capacity with nothing evictable. Conflicts are
    /// not degraded: an in-use key is a caller error.
    fn acquire(
        &self,
        pool_key: &str,
        config: DelegateConfig,
        factory: &dyn DelegateFactory,
    ) -> Result<Acquired> {
        match self.pool.acquire(pool_key, config.clone(), factory) {
            Ok(handle) => Ok(Acquired {
                agent: handle.agent,
                pooled: Some((handle.id, handle.pool_key)),
            }),
            Err(Error::Capacity { size, max_size }) => {
                warn!(
                    size,
                    max_size, "Pool exhausted; running delegation on an unpooled agent"
                );
                let agent = factory.build(&config)?;
                Ok(Acquired {
                    agent,
                    pooled: None,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Run the task under the wall-clock ceiling, then apply the
    /// response-quality fallback: an empty, interrupted, or too-short
    /// response is replaced by the delegate's last substantive output when
    /// that is longer, and by the configured fallback text when the history
    /// holds nothing usable either.
    async fn run_with_budget(
        &self,
        agent: &Arc<DelegateAgent>,
        scoped: Arc<dyn ServiceLookup>,
        prompt: &str,
        budget: TaskBudget,
        call_id: &str,
        min_response_len: usize,
    ) -> Result<String> {
        let outcome =
            tokio::time::timeout(budget.max_duration, agent.run_task(prompt, scoped, call_id))
                .await;

        let raw = match outcome {
            Ok(Ok(text)) => text,
            Ok(Err(Error::Interrupted)) => {
                debug!(call_id, "Delegation interrupted; reconstructing from history");
                String::new()
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                warn!(
                    call_id,
                    ceiling_secs = budget.max_duration.as_secs(),
                    "Delegation hit its duration ceiling"
                );
                agent.interrupt();
                // A timed-out task either salvages the last substantive
                // output or fails with the ceiling it hit.
                return match agent.last_substantive_output(min_response_len) {
                    Some(historic) => Ok(self.post_process(historic)),
                    None => Err(Error::Timeout(budget.max_duration.as_secs())),
                };
            }
        };

        let trimmed = raw.trim();
        let response = if trimmed.len() >= min_response_len {
            trimmed.to_string()
        } else {
            match agent.last_substantive_output(min_response_len) {
                Some(historic) if historic.len() > trimmed.len() => historic,
                _ if trimmed.is_empty() => self.tool_config.fallback_text.clone(),
                _ => trimmed.to_string(),
            }
        };

        Ok(self.post_process(response))
    }

    fn post_process(&self, response: String) -> String {
        match &self.post_processor {
            Some(processor) => processor.post_process(response),
            None => response,
        }
    }

    fn failure(&self, error: &Error) -> DelegationFailure {
        DelegationFailure {
            error: error.to_string(),
            agent_used: self.tool_config.agent_type.clone(),
            fatal: error.is_fatal(),
        }
    }

    fn emit_failed(
        &self,
        resolved: &Resolved,
        call_id: &str,
        failure: &DelegationFailure,
        started: Instant,
    ) {
        if let Some(bus) = &resolved.bus {
            bus.emit(DelegationEvent::Failed {
                call_id: call_id.to_string(),
                agent_type: failure.agent_used.clone(),
                error: failure.error.clone(),
                duration_secs: started.elapsed().as_secs_f64(),
            });
        }
    }
}
