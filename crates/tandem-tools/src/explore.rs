//! Explore tool: delegate read-only codebase investigation

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use tandem_core::agents::{AgentPool, DelegationRunner, DelegationToolConfig};
use tandem_core::{Result, Tool, ToolContext, ToolResult};

use crate::delegation::{run_delegation, THOROUGHNESS_DESC};

const EXPLORE_SYSTEM_PROMPT: &str = "You are a read-only exploration agent. Investigate the \
codebase to answer the task, using your tools to read files and search. Do not propose edits. \
Finish with a concise summary of what you found, citing file paths.";

const EXPLORE_FALLBACK: &str =
    "Exploration ended without producing a summary. Consider retrying with a narrower task.";

/// Delegates a read-only investigation to an exploration agent
pub struct ExploreTool {
    runner: DelegationRunner,
}

impl ExploreTool {
    pub fn new(pool: Arc<AgentPool>) -> Self {
        let config = DelegationToolConfig {
            agent_type: "explore".to_string(),
            allowed_tools: vec!["read".to_string(), "glob".to_string(), "grep".to_string()],
            model_config_key: Some("explore".to_string()),
            required_tool_calls: vec![],
            reasoning_effort: None,
            allow_todo_management: false,
            fallback_text: EXPLORE_FALLBACK.to_string(),
            summary_label: "Exploration".to_string(),
            system_prompt: Some(EXPLORE_SYSTEM_PROMPT.to_string()),
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
impl Tool for ExploreTool {
    fn name(&self) -> &str {
        "explore"
    }

    fn description(&self) -> &str {
        "Delegate a read-only codebase investigation to a focused exploration agent. \
         Use for questions that require reading several files or searching broadly. \
         The response is for you, not the user; restate the relevant parts."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "What to investigate, phrased as a self-contained question"
                },
                "thoroughness": {
                    "type": "string",
                    "enum": ["quick", "normal", "thorough"],
                    "description": THOROUGHNESS_DESC
                }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        run_delegation(&self.runner, &input, ctx, None).await
    }
}
