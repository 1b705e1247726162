//! Agent delegation core
//!
//! Bounded pooling of reusable delegate agents, depth-first tracking of
//! in-flight delegations for interrupt routing, and the execution protocol
//! that runs one delegated task with guaranteed cleanup.

pub mod delegate;
pub mod pool;
pub mod protocol;
pub mod tracker;
pub mod types;

pub use delegate::{DelegateAgent, DelegateFactory, LlmDelegateFactory};
pub use pool::{AgentMetadata, AgentPool, PoolStats, PooledAgent};
pub use protocol::{DelegationRequest, DelegationRunner, ResponsePostProcessor, RESPONSE_NOTE};
pub use tracker::{DelegationContext, DelegationState, DelegationTracker, TrackerStats};
pub use types::{
    AgentId, DelegateConfig, DelegationFailure, DelegationOutcome, DelegationSuccess,
    DelegationToolConfig, ReasoningEffort, TaskBudget, Thoroughness, TODO_TOOLS,
};
