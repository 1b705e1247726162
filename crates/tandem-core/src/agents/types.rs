//! Delegation types
//!
//! Core types for the agent-delegation system: identifiers, thoroughness
//! budgets, delegate configuration, per-tool delegation configuration, and
//! the structured success/failure payloads the execution protocol returns.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unique identifier for a pooled delegate agent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token and wall-clock budget for one delegated task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskBudget {
    /// Maximum tokens per model response
    pub max_tokens: u64,
    /// Wall-clock ceiling for the whole delegated task
    pub max_duration: Duration,
}

/// How much budget a delegation is granted.
///
/// Maps to a fixed token/duration table so that both cost and latency of a
/// delegated task are bounded up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Thoroughness {
    Quick,
    #[default]
    Normal,
    Thorough,
}

impl Thoroughness {
    /// The fixed budget table.
    pub fn budget(&self) -> TaskBudget {
        match self {
            Self::Quick => TaskBudget {
                max_tokens: 2048,
                max_duration: Duration::from_secs(120),
            },
            Self::Normal => TaskBudget {
                max_tokens: 8192,
                max_duration: Duration::from_secs(300),
            },
            Self::Thorough => TaskBudget {
                max_tokens: 16384,
                max_duration: Duration::from_secs(900),
            },
        }
    }

    /// Parse from a tool-input string, defaulting to `Normal`.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("quick") => Self::Quick,
            Some("thorough") => Self::Thorough,
            _ => Self::Normal,
        }
    }
}

pub use crate::llm::ReasoningEffort;

/// Tool names granted to a delegate when todo management is allowed
pub const TODO_TOOLS: &[&str] = &["todo_read", "todo_write"];

/// Immutable snapshot of the configuration a delegate agent was built with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateConfig {
    /// Agent type label (e.g. "explore", "plan", "agent")
    pub agent_type: String,
    /// Tool allow-list for this delegate
    pub allowed_tools: Vec<String>,
    /// Model the delegate's client is bound to
    pub model: String,
    /// Token budget per model response
    pub max_tokens: u64,
    /// Nesting depth (parent depth + 1)
    pub depth: u32,
    /// System prompt for the delegate
    pub system_prompt: Option<String>,
    /// Reasoning effort hint forwarded with every model request
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Whether this delegate runs a specialized (non-general) agent type
    pub specialized: bool,
    /// Maximum agent-loop iterations per task
    pub max_iterations: usize,
}

/// Static configuration of one delegation-tool *type* (not one call)
#[derive(Debug, Clone)]
pub struct DelegationToolConfig {
    /// Agent type this tool delegates to
    pub agent_type: String,
    /// Tools the delegate may use
    pub allowed_tools: Vec<String>,
    /// Key into `Config::delegation.model_overrides`
    pub model_config_key: Option<String>,
    /// Tool calls the delegate is instructed it must make
    pub required_tool_calls: Vec<String>,
    /// Reasoning effort override for the delegate's model
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Whether the delegate may manage the shared todo list
    pub allow_todo_management: bool,
    /// Text returned when no usable response can be reconstructed
    pub fallback_text: String,
    /// Short label used in notifications and summaries
    pub summary_label: String,
    /// System prompt for delegates of this type
    pub system_prompt: Option<String>,
}

impl DelegationToolConfig {
    /// The effective allow-list, widened with todo tools when permitted.
    pub fn effective_allowed_tools(&self) -> Vec<String> {
        let mut tools = self.allowed_tools.clone();
        if self.allow_todo_management {
            for todo in TODO_TOOLS {
                if !tools.iter().any(|t| t == todo) {
                    tools.push((*todo).to_string());
                }
            }
        }
        tools
    }

    /// The system prompt with the required-tool-call instruction appended.
    pub fn effective_system_prompt(&self) -> Option<String> {
        if self.required_tool_calls.is_empty() {
            return self.system_prompt.clone();
        }
        let instruction = format!(
            "Before finishing, you MUST call each of these tools at least once: {}.",
            self.required_tool_calls.join(", ")
        );
        Some(match &self.system_prompt {
            Some(prompt) => format!("{prompt}\n\n{instruction}"),
            None => instruction,
        })
    }
}

/// Successful delegation payload.
///
/// `content` is not shown to the end user directly; the delegating agent is
/// expected to restate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationSuccess {
    /// Response content, prefixed with the not-user-visible annotation
    pub content: String,
    /// Wall-clock seconds the delegation took
    pub elapsed_secs: f64,
    /// Agent type that produced the response
    pub agent_type: String,
    /// Pool entry id, present when the delegate persists for reuse
    pub agent_id: Option<String>,
    /// Reminder enabling the caller to address the same delegate again
    pub resume_hint: Option<String>,
}

/// Failed delegation payload. Never raised; returned as a value so the
/// delegating agent can retry, change arguments, or report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationFailure {
    /// Error description
    pub error: String,
    /// Agent type that was running (or being constructed) when it failed
    pub agent_used: String,
    /// Whether this is a configuration error that must not be retried
    pub fatal: bool,
}

/// Outcome of one delegation
pub type DelegationOutcome = std::result::Result<DelegationSuccess, DelegationFailure>;
