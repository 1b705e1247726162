//! Tool manager for registering and executing tools
//!
//! Handles registration, allow-list scoping for delegate agents, the
//! permission-gate check before every dispatch, and exposure of the
//! delegation tracker to delegating tools.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::agents::DelegationTracker;
use crate::llm::ToolDefinition;
use crate::permission::PermissionGate;
use crate::services::keys;
use crate::tool::{Tool, ToolContext, ToolResult};
use crate::Result;

/// Manager for registered tools
pub struct ToolManager {
    /// Registered tools indexed by name
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Tracker for delegations started by tools registered here
    tracker: Option<Arc<DelegationTracker>>,
}

impl ToolManager {
    /// Create a new empty tool manager
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            tracker: None,
        }
    }

    /// Register a tool
    ///
    /// If a tool with the same name already exists, it will be replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Attach the delegation tracker that delegating tools register with.
    pub fn set_tracker(&mut self, tracker: Arc<DelegationTracker>) {
        self.tracker = Some(tracker);
    }

    /// The delegation tracker, when one is attached.
    pub fn tracker(&self) -> Option<Arc<DelegationTracker>> {
        self.tracker.clone()
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Get all registered tool definitions
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.input_schema()))
            .collect()
    }

    /// Build a manager restricted to an allow-list.
    ///
    /// Tools absent from `allowed` do not exist in the returned manager, so
    /// a delegate built from it can neither list nor execute them. Unknown
    /// names in the allow-list are ignored. The returned manager carries a
    /// fresh tracker for the delegate's own nested delegations.
    pub fn scoped(&self, allowed: &[String]) -> ToolManager {
        let tools = self
            .tools
            .iter()
            .filter(|(name, _)| allowed.iter().any(|a| a == *name))
            .map(|(name, tool)| (name.clone(), tool.clone()))
            .collect();

        ToolManager {
            tools,
            tracker: Some(Arc::new(DelegationTracker::new())),
        }
    }

    /// Execute a tool by name.
    ///
    /// The permission gate resolved from `ctx` is consulted first; a denial
    /// is returned as an error `ToolResult` rather than a fault, so the
    /// model can react to it.
    pub async fn execute(
        &self,
        name: &str,
        input: JsonValue,
        ctx: &ToolContext,
    ) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| crate::Error::ToolExecution(format!("Unknown tool: {}", name)))?;

        if let Some(gate) = ctx
            .services
            .get::<Arc<dyn PermissionGate>>(keys::PERMISSION_GATE)
        {
            if let Err(e) = gate.check(name, &input, &ctx.permission_context()).await {
                debug!(tool = name, error = %e, "Tool execution denied");
                return Ok(ToolResult::error(e.to_string()));
            }
        }

        tool.execute(input, ctx).await
    }

    /// Check if a tool is registered
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if no tools are registered
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Get all registered tool names
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::DenyListGate;
    use crate::services::{ServiceLookup, ServiceRegistry};
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the input back"
        }

        fn input_schema(&self) -> JsonValue {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn execute(&self, input: JsonValue, _ctx: &ToolContext) -> Result<ToolResult> {
            Ok(ToolResult::success(
                input["text"].as_str().unwrap_or_default().to_string(),
            ))
        }
    }

    struct NoopTool(&'static str);

    #[async_trait]
    impl Tool for NoopTool {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "No-op"
        }

        fn input_schema(&self) -> JsonValue {
            json!({"type": "object"})
        }

        async fn execute(&self, _input: JsonValue, _ctx: &ToolContext) -> Result<ToolResult> {
            Ok(ToolResult::success(""))
        }
    }

    fn test_context(services: Arc<ServiceRegistry>) -> ToolContext {
        ToolContext {
            services,
            call_id: "call-1".to_string(),
            agent_type: "explore".to_string(),
            depth: 1,
        }
    }

    #[tokio::test]
    async fn test_register_and_execute() {
        let mut manager = ToolManager::new();
        manager.register(Arc::new(EchoTool));

        let ctx = test_context(Arc::new(ServiceRegistry::new()));
        let result = manager
            .execute("echo", json!({"text": "hello"}), &ctx)
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(result.output, "hello");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error() {
        let manager = ToolManager::new();
        let ctx = test_context(Arc::new(ServiceRegistry::new()));

        let result = manager.execute("missing", json!({}), &ctx).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_scoped_filters_tools() {
        let mut manager = ToolManager::new();
        manager.register(Arc::new(NoopTool("read")));
        manager.register(Arc::new(NoopTool("write")));
        manager.register(Arc::new(NoopTool("bash")));

        let scoped = manager.scoped(&["read".to_string(), "nonexistent".to_string()]);
        assert_eq!(scoped.len(), 1);
        assert!(scoped.contains("read"));
        assert!(!scoped.contains("bash"));
        assert!(scoped.tracker().is_some());
    }

    #[tokio::test]
    async fn test_permission_gate_denial_is_tool_error() {
        let mut manager = ToolManager::new();
        manager.register(Arc::new(EchoTool));

        let registry = Arc::new(ServiceRegistry::new());
        let gate: Arc<dyn PermissionGate> = Arc::new(DenyListGate::new(vec!["echo".to_string()]));
        registry.insert(keys::PERMISSION_GATE, gate);

        let ctx = test_context(registry);
        let result = manager
            .execute("echo", json!({"text": "hi"}), &ctx)
            .await
            .unwrap();

        assert!(result.is_error);
        assert!(result.output.contains("Permission denied"));
    }
}
