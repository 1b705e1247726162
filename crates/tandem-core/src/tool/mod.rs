//! Tool system for model tool_use
//!
//! Tools are registered with a [`ToolManager`]; delegate agents receive an
//! allow-list-scoped view of it, and every execution passes the permission
//! gate first.

pub mod manager;
pub mod traits;

pub use crate::llm::ToolDefinition;
pub use manager::ToolManager;
pub use traits::{Tool, ToolContext, ToolResult};
