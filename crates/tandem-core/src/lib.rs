//! tandem-core: Agent Delegation Core Library
//!
//! Provides the delegation engine of the assistant: the LLM client, the
//! tool system, the bounded agent pool, delegation tracking for interrupt
//! routing, the scoped service directory, and the execution protocol that
//! ties them together.

pub mod agents;
pub mod config;
pub mod error;
pub mod events;
pub mod llm;
pub mod permission;
pub mod services;
pub mod tool;

pub use agents::{
    AgentId, AgentPool, DelegateAgent, DelegationOutcome, DelegationRunner, DelegationTracker,
    Thoroughness,
};
pub use config::{Config, DelegationConfig, LlmConfig, LlmProvider};
pub use error::{Error, Result};
pub use events::{DelegationEvent, EventBus};
pub use llm::{LlmClient, Message, MessageContent, ModelClient, ToolDefinition};
pub use permission::{AllowAllGate, DenyListGate, PermissionContext, PermissionGate};
pub use services::{keys, ScopedServices, ServiceLookup, ServiceRegistry};
pub use tool::{Tool, ToolContext, ToolManager, ToolResult};
