//! Tool trait definition
//!
//! Tools are invoked by delegate agents when the model requests a
//! `tool_use`. Every execution carries a [`ToolContext`] so that tools can
//! resolve collaborators (including the rebound current agent) through the
//! scoped service overlay of the delegation they run inside.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::permission::PermissionContext;
use crate::services::ServiceLookup;
use crate::Result;

/// Tool execution result
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// Output string from tool execution
    pub output: String,
    /// Whether the execution resulted in an error
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    /// Create an error tool result
    pub fn error(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: true,
        }
    }
}

/// Execution context threaded through every tool call.
#[derive(Clone)]
pub struct ToolContext {
    /// Service lookup for the executing delegation (scoped overlay, so
    /// `keys::CURRENT_AGENT` resolves to the delegate running this tool)
    pub services: Arc<dyn ServiceLookup>,
    /// Call id of the delegation issuing the tool call
    pub call_id: String,
    /// Agent type of the executing delegate
    pub agent_type: String,
    /// Nesting depth of the executing delegate
    pub depth: u32,
}

impl ToolContext {
    /// The permission-gate view of this context.
    pub fn permission_context(&self) -> PermissionContext {
        PermissionContext {
            call_id: self.call_id.clone(),
            agent_type: self.agent_type.clone(),
            depth: self.depth,
        }
    }
}

/// Tool trait for model-requested tool_use
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name (used in tool definitions sent to the model)
    fn name(&self) -> &str;

    /// Get the tool description (shown to the model when selecting tools)
    fn description(&self) -> &str;

    /// Get the JSON schema for the tool's input parameters
    fn input_schema(&self) -> JsonValue;

    /// Execute the tool with the given input
    async fn execute(&self, input: JsonValue, ctx: &ToolContext) -> Result<ToolResult>;
}
