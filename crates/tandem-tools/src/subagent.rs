//! Agent tool: delegate a general task to a full sub-agent
//!
//! Unlike the specialized explore/plan delegates, the general sub-agent may
//! edit files and run commands. Callers can pass a stable `pool_key` to
//! keep addressing the same delegate across turns.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use tandem_core::agents::{AgentPool, DelegationRunner, DelegationToolConfig};
use tandem_core::{Result, Tool, ToolContext, ToolResult};

use crate::delegation::{run_delegation, THOROUGHNESS_DESC};

const AGENT_SYSTEM_PROMPT: &str = "You are a sub-agent working on a delegated task. Complete it \
autonomously with the tools available, then report what you did and anything the caller must \
know, citing file paths.";

const AGENT_FALLBACK: &str =
    "The sub-agent finished without a report. Its work may still have been applied; verify before retrying.";

/// Delegates a general task to a full sub-agent
pub struct AgentTool {
    runner: DelegationRunner,
}

impl AgentTool {
    pub fn new(pool: Arc<AgentPool>) -> Self {
        let config = DelegationToolConfig {
            agent_type: "agent".to_string(),
            allowed_tools: vec![
                "read".to_string(),
                "write".to_string(),
                "edit".to_string(),
                "bash".to_string(),
                "glob".to_string(),
                "grep".to_string(),
            ],
            model_config_key: None,
            required_tool_calls: vec![],
            reasoning_effort: None,
            allow_todo_management: true,
            fallback_text: AGENT_FALLBACK.to_string(),
            summary_label: "Sub-agent".to_string(),
            system_prompt: Some(AGENT_SYSTEM_PROMPT.to_string()),
        };
        Self {
            runner: DelegationRunner::new(pool, config),
        }
    }

    pub fn runner(&self) -> &DelegationRunner {
        &self.runner
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        "agent"
    }

    fn description(&self) -> &str {
        "Delegate a self-contained task to a sub-agent that can read, edit, and run \
         commands. Pass the pool_key from a previous response to continue with the \
         same sub-agent. The report is for you, not the user; restate it."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "The task to carry out, with enough context to work unattended"
                },
                "thoroughness": {
                    "type": "string",
                    "enum": ["quick", "normal", "thorough"],
                    "description": THOROUGHNESS_DESC
                },
                "pool_key": {
                    "type": "string",
                    "description": "Key of a previously used sub-agent to continue with it"
                }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let pool_key = input["pool_key"].as_str();
        run_delegation(&self.runner, &input, ctx, pool_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{scripted_services, text_response, tool_context};

    #[tokio::test]
    async fn test_stable_pool_key_reuses_delegate() {
        let report_one =
            "renamed the module and fixed every import site that referenced the old path "
                .repeat(2);
        let report_two =
            "follow-up applied on top of the earlier rename, touching only the test files "
                .repeat(2);

        let pool = Arc::new(AgentPool::new(4));
        let tool = AgentTool::new(pool.clone());

        // One shared scripted client serves both calls: the pooled delegate
        // keeps the client it was built with.
        let services =
            scripted_services(vec![text_response(&report_one), text_response(&report_two)]);

        let first = tool
            .execute(
                json!({"task": "rename the module", "pool_key": "rename-job"}),
                &tool_context(services.clone()),
            )
            .await
            .unwrap();
        assert!(first.output.contains("rename-job"));

        // Second call with the same key checks the same entry out again
        let second = tool
            .execute(
                json!({"task": "now fix the tests", "pool_key": "rename-job"}),
                &tool_context(services),
            )
            .await
            .unwrap();
        assert!(!second.is_error);
        assert_eq!(pool.stats().total, 1);
    }

    #[tokio::test]
    async fn test_interrupt_all_idle_runner() {
        let tool = AgentTool::new(Arc::new(AgentPool::new(4)));
        assert_eq!(tool.runner().interrupt_all(), 0);
        assert!(!tool.runner().inject_user_message("stop"));
    }
}
