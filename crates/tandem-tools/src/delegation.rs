//! Shared driver for delegation tools
//!
//! Each delegation tool parses its input the same way, runs the execution
//! protocol, and renders the outcome for the delegating agent. Fatal
//! configuration failures propagate as errors; everything else comes back
//! as an error `ToolResult` the model can react to.

use serde_json::Value;
use tracing::debug;

use tandem_core::agents::{DelegationRequest, DelegationRunner, Thoroughness};
use tandem_core::{Error, Result, ToolContext, ToolResult};

/// Run one delegation on behalf of a tool invocation.
///
/// `pool_key` is the caller-supplied key for cross-turn reuse; `None`
/// lets the protocol derive a call-scoped one.
pub(crate) async fn run_delegation(
    runner: &DelegationRunner,
    input: &Value,
    ctx: &ToolContext,
    pool_key: Option<&str>,
) -> Result<ToolResult> {
    let task = input["task"]
        .as_str()
        .ok_or_else(|| Error::ToolExecution("Missing 'task' parameter".to_string()))?;
    let thoroughness = Thoroughness::parse(input["thoroughness"].as_str());

    let agent_type = &runner.tool_config().agent_type;
    let call_id = format!("{}-{}", agent_type, uuid::Uuid::new_v4());

    debug!(
        call_id = %call_id,
        agent_type = %agent_type,
        ?thoroughness,
        "Starting delegation from tool call"
    );

    let outcome = runner
        .execute(
            ctx.services.clone(),
            DelegationRequest {
                task_prompt: task,
                thoroughness,
                call_id: &call_id,
                parent_depth: ctx.depth,
                pool_key,
                budget_override: None,
            },
        )
        .await;

    match outcome {
        Ok(success) => {
            let mut output = success.content;
            if let Some(hint) = &success.resume_hint {
                output.push_str("\n\n");
                output.push_str(hint);
            }
            Ok(ToolResult::success(output))
        }
        Err(failure) if failure.fatal => Err(Error::Config(failure.error)),
        Err(failure) => Ok(ToolResult::error(format!(
            "Delegation to '{}' failed: {}",
            failure.agent_used, failure.error
        ))),
    }
}

/// Shared schema fragment: the `thoroughness` property description.
pub(crate) const THOROUGHNESS_DESC: &str =
    "Budget for the delegated task: 'quick', 'normal' (default), or 'thorough'";
