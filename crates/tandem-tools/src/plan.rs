//! Plan tool: delegate implementation planning

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use tandem_core::agents::{AgentPool, DelegationRunner, DelegationToolConfig, ResponsePostProcessor};
use tandem_core::{Result, Tool, ToolContext, ToolResult};

use crate::delegation::{run_delegation, THOROUGHNESS_DESC};

const PLAN_SYSTEM_PROMPT: &str = "You are a planning agent. Read the relevant code, then produce \
a concrete, step-by-step implementation plan: which files change, in what order, and what to \
verify. Record the steps on the todo list as you settle them. Do not make any edits yourself.";

const PLAN_FALLBACK: &str =
    "Planning ended without producing a plan. Consider retrying with more context in the task.";

/// Prefixes the plan with a heading so it reads well when restated.
struct PlanHeading;

impl ResponsePostProcessor for PlanHeading {
    fn post_process(&self, response: String) -> String {
        format!("## Proposed plan\n\n{}", response)
    }
}

/// Delegates implementation planning to a planning agent
pub struct PlanTool {
    runner: DelegationRunner,
}

impl PlanTool {
    pub fn new(pool: Arc<AgentPool>) -> Self {
        let config = DelegationToolConfig {
            agent_type: "plan".to_string(),
            allowed_tools: vec!["read".to_string(), "glob".to_string(), "grep".to_string()],
            model_config_key: Some("plan".to_string()),
            required_tool_calls: vec![],
            reasoning_effort: Some(tandem_core::agents::ReasoningEffort::High),
            allow_todo_management: true,
            fallback_text: PLAN_FALLBACK.to_string(),
            summary_label: "Plan".to_string(),
            system_prompt: Some(PLAN_SYSTEM_PROMPT.to_string()),
        };
        Self {
            runner: DelegationRunner::new(pool, config)
                .with_post_processor(Arc::new(PlanHeading)),
        }
    }

    pub fn runner(&self) -> &DelegationRunner {
        &self.runner
    }
}

#[async_trait]
impl Tool for PlanTool {
    fn name(&self) -> &str {
        "plan"
    }

    fn description(&self) -> &str {
        "Delegate implementation planning to a focused planning agent. Use before \
         non-trivial changes. The plan is for you, not the user; restate it."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "What to plan, including goals and known constraints"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{scripted_services, text_response, tool_context};

    #[test]
    fn test_todo_tools_added_to_allow_list() {
        let tool = PlanTool::new(Arc::new(AgentPool::new(4)));
        let allowed = tool.runner().tool_config().effective_allowed_tools();
        assert!(allowed.contains(&"todo_read".to_string()));
        assert!(allowed.contains(&"todo_write".to_string()));
        assert!(allowed.contains(&"read".to_string()));
    }

    #[test]
    fn test_planning_requests_high_effort() {
        let tool = PlanTool::new(Arc::new(AgentPool::new(4)));
        assert_eq!(
            tool.runner().tool_config().reasoning_effort,
            Some(tandem_core::agents::ReasoningEffort::High)
        );
    }

    #[tokio::test]
    async fn test_plan_response_carries_heading() {
        let plan_text =
            "first extend the config, then wire the new flag through the runner and tools "
                .repeat(2);
        let services = scripted_services(vec![text_response(&plan_text)]);

        let tool = PlanTool::new(Arc::new(AgentPool::new(4)));
        let result = tool
            .execute(
                json!({"task": "add a dry-run flag"}),
                &tool_context(services),
            )
            .await
            .unwrap();

        assert!(!result.is_error);
        assert!(result.output.contains("## Proposed plan"));
    }
}
