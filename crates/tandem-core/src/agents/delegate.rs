//! Delegate agent
//!
//! A `DelegateAgent` is one reusable delegate instance: a model client bound
//! to the delegate's model and token budget, an allow-list-scoped tool
//! manager, an in-memory conversation history, and a cancellation token for
//! cooperative interruption. Each delegate also owns a nested
//! [`DelegationTracker`] so that delegations it starts are visible to the
//! depth-first active-delegation resolution of its parent.

use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{LlmClient, Message, MessagesRequest, ModelClient, Usage};
use crate::services::ServiceLookup;
use crate::tool::{ToolContext, ToolManager};

use super::tracker::DelegationTracker;
use super::types::{AgentId, DelegateConfig};

/// One reusable delegate-agent instance.
pub struct DelegateAgent {
    id: AgentId,
    config: DelegateConfig,
    client: Arc<dyn ModelClient>,
    tools: Arc<ToolManager>,
    tracker: Arc<DelegationTracker>,
    history: Mutex<Vec<Message>>,
    pending_injections: Mutex<Vec<String>>,
    /// Replaced with a fresh token at each task start; `interrupt` cancels
    /// the current one.
    cancel: Mutex<CancellationToken>,
    usage: Mutex<Usage>,
}

impl DelegateAgent {
    /// Create a delegate from its configuration snapshot.
    ///
    /// `tools` should already be scoped to the delegate's allow-list; its
    /// tracker becomes the delegate's nested tracker.
    pub fn new(config: DelegateConfig, client: Arc<dyn ModelClient>, tools: ToolManager) -> Self {
        let tracker = tools
            .tracker()
            .unwrap_or_else(|| Arc::new(DelegationTracker::new()));

        Self {
            id: AgentId::default(),
            config,
            client,
            tools: Arc::new(tools),
            tracker,
            history: Mutex::new(Vec::new()),
            pending_injections: Mutex::new(Vec::new()),
            cancel: Mutex::new(CancellationToken::new()),
            usage: Mutex::new(Usage::default()),
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn config(&self) -> &DelegateConfig {
        &self.config
    }

    pub fn agent_type(&self) -> &str {
        &self.config.agent_type
    }

    pub fn depth(&self) -> u32 {
        self.config.depth
    }

    /// The tracker for delegations this agent starts.
    pub fn tracker(&self) -> Arc<DelegationTracker> {
        self.tracker.clone()
    }

    /// Accumulated token usage across all tasks run on this delegate.
    pub fn total_usage(&self) -> Usage {
        *self.usage.lock().expect("usage lock poisoned")
    }

    /// Number of messages in the delegate's conversation history.
    pub fn history_len(&self) -> usize {
        self.history.lock().expect("history lock poisoned").len()
    }

    /// Queue a live user message; delivered before the next model call.
    pub fn inject_message(&self, text: impl Into<String>) {
        self.pending_injections
            .lock()
            .expect("injection lock poisoned")
            .push(text.into());
    }

    /// Signal interruption of the currently running task.
    ///
    /// Safe to call at any time, including after the task has finished
    /// (idempotent no-op).
    pub fn interrupt(&self) {
        self.cancel.lock().expect("cancel lock poisoned").cancel();
    }

    /// Dispose of the agent: interrupt any running task and drop queued
    /// injections. Used for unpooled one-off agents.
    pub fn close(&self) {
        self.interrupt();
        self.pending_injections
            .lock()
            .expect("injection lock poisoned")
            .clear();
    }

    /// Scan the conversation history, newest first, for the delegate's last
    /// substantive output. Used to reconstruct a usable summary when the
    /// terminal response is empty, interrupted, or too short.
    pub fn last_substantive_output(&self, min_len: usize) -> Option<String> {
        let history = self.history.lock().expect("history lock poisoned");
        history.iter().rev().find_map(|msg| {
            if msg.role != "assistant" {
                return None;
            }
            let text = msg.text_content();
            let trimmed = text.trim();
            if trimmed.len() >= min_len {
                Some(trimmed.to_string())
            } else {
                None
            }
        })
    }

    /// Install a fresh cancellation token for a new task and return it.
    fn refresh_cancel(&self) -> CancellationToken {
        let mut guard = self.cancel.lock().expect("cancel lock poisoned");
        *guard = CancellationToken::new();
        guard.clone()
    }

    fn drain_injections(&self) {
        let pending: Vec<String> = {
            let mut guard = self
                .pending_injections
                .lock()
                .expect("injection lock poisoned");
            guard.drain(..).collect()
        };

        if pending.is_empty() {
            return;
        }

        let mut history = self.history.lock().expect("history lock poisoned");
        for text in pending {
            info!(agent = %self.id, "Delivering injected user message");
            history.push(Message::user(text));
        }
    }

    /// Run one delegated task to its terminal response.
    ///
    /// `services` is the scoped overlay for this delegation, so tools the
    /// model invokes resolve the current agent to *this* delegate. The loop
    /// checks the cancellation token at every suspension point and delivers
    /// queued injections before each model call.
    pub async fn run_task(
        &self,
        prompt: &str,
        services: Arc<dyn ServiceLookup>,
        call_id: &str,
    ) -> Result<String> {
        let cancel = self.refresh_cancel();

        {
            let mut history = self.history.lock().expect("history lock poisoned");
            history.push(Message::user(prompt));
        }

        let tool_defs = self.tools.definitions();
        let ctx = ToolContext {
            services,
            call_id: call_id.to_string(),
            agent_type: self.config.agent_type.clone(),
            depth: self.config.depth,
        };

        let mut iterations = 0;
        loop {
            iterations += 1;
            if iterations > self.config.max_iterations {
                return Err(Error::Other(format!(
                    "Delegate '{}' exceeded {} iterations",
                    self.config.agent_type, self.config.max_iterations
                )));
            }

            if cancel.is_cancelled() {
                return Err(Error::Interrupted);
            }

            self.drain_injections();

            let messages = self.history.lock().expect("history lock poisoned").clone();
            let request = MessagesRequest {
                model: self.client.model().to_string(),
                max_tokens: self.config.max_tokens,
                system: self.config.system_prompt.clone(),
                messages,
                tools: if tool_defs.is_empty() {
                    None
                } else {
                    Some(tool_defs.clone())
                },
                reasoning_effort: self.config.reasoning_effort,
            };

            let response = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Interrupted),
                response = self.client.complete(request) => response?,
            };

            if let Some(usage) = &response.usage {
                let mut total = self.usage.lock().expect("usage lock poisoned");
                total.input_tokens += usage.input_tokens;
                total.output_tokens += usage.output_tokens;
            }

            match response.stop_reason.as_str() {
                "end_turn" | "stop_sequence" | "stop" => {
                    let text = response.text();
                    let mut history = self.history.lock().expect("history lock poisoned");
                    history.push(Message {
                        role: "assistant".to_string(),
                        content: response.content,
                    });
                    return Ok(text);
                }
                "tool_use" | "tool_calls" => {
                    let uses = response.tool_uses();
                    if uses.is_empty() {
                        warn!("tool_use stop_reason but no tool_uses found");
                        continue;
                    }

                    let mut tool_results = Vec::new();
                    for (id, name, input) in &uses {
                        if cancel.is_cancelled() {
                            return Err(Error::Interrupted);
                        }

                        debug!(agent = %self.id, tool = %name, "Delegate executing tool");

                        let result = self
                            .tools
                            .execute(name, input.clone(), &ctx)
                            .await
                            .unwrap_or_else(|e| crate::tool::ToolResult::error(e.to_string()));

                        tool_results.push(crate::llm::MessageContent::ToolResult {
                            tool_use_id: id.clone(),
                            content: result.output,
                            is_error: result.is_error,
                        });
                    }

                    let mut history = self.history.lock().expect("history lock poisoned");
                    history.push(Message {
                        role: "assistant".to_string(),
                        content: response.content,
                    });
                    history.push(Message {
                        role: "user".to_string(),
                        content: tool_results,
                    });
                }
                other => {
                    return Err(Error::LlmApi(format!("Unknown stop_reason: {}", other)));
                }
            }
        }
    }
}

/// Builds delegate agents for the pool.
///
/// The pool never knows how agents are constructed; the factory is the seam
/// where the model client is chosen and the tool allow-list is applied.
pub trait DelegateFactory: Send + Sync {
    fn build(&self, config: &DelegateConfig) -> Result<Arc<DelegateAgent>>;
}

/// Factory backed by the HTTP model client.
///
/// Reuses the shared client when the delegate's target model matches the
/// default; the per-response token budget travels with each request, so
/// only a different target model warrants a dedicated client.
pub struct LlmDelegateFactory {
    config: Arc<Config>,
    shared_client: Arc<dyn ModelClient>,
    tools: Arc<ToolManager>,
}

impl LlmDelegateFactory {
    pub fn new(
        config: Arc<Config>,
        shared_client: Arc<dyn ModelClient>,
        tools: Arc<ToolManager>,
    ) -> Self {
        Self {
            config,
            shared_client,
            tools,
        }
    }
}

impl DelegateFactory for LlmDelegateFactory {
    fn build(&self, config: &DelegateConfig) -> Result<Arc<DelegateAgent>> {
        let client: Arc<dyn ModelClient> = if config.model == self.shared_client.model() {
            self.shared_client.clone()
        } else {
            debug!(model = %config.model, "Building dedicated model client for delegate");
            Arc::new(LlmClient::with_model(
                &self.config,
                config.model.clone(),
                config.max_tokens,
            )?)
        };

        let scoped_tools = self.tools.scoped(&config.allowed_tools);
        Ok(Arc::new(DelegateAgent::new(
            config.clone(),
            client,
            scoped_tools,
        )))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Scripted model client shared by agent and protocol tests.

    use super::*;
    use crate::llm::{MessageContent, MessagesResponse};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Model client that replays a fixed sequence of responses.
    pub struct ScriptedClient {
        model: String,
        responses: StdMutex<Vec<MessagesResponse>>,
        last_request: StdMutex<Option<MessagesRequest>>,
    }

    impl ScriptedClient {
        pub fn new(responses: Vec<MessagesResponse>) -> Self {
            Self {
                model: "scripted-model".to_string(),
                responses: StdMutex::new(responses),
                last_request: StdMutex::new(None),
            }
        }

        /// The most recent request passed to `complete`.
        pub fn last_request(&self) -> Option<MessagesRequest> {
            self.last_request
                .lock()
                .expect("request lock poisoned")
                .clone()
        }

        pub fn text_response(text: &str) -> MessagesResponse {
            MessagesResponse {
                id: "resp".to_string(),
                response_type: "message".to_string(),
                role: "assistant".to_string(),
                content: vec![MessageContent::Text {
                    text: text.to_string(),
                }],
                model: "scripted-model".to_string(),
                stop_sequence: None,
                stop_reason: "end_turn".to_string(),
                usage: Some(Usage {
                    input_tokens: 10,
                    output_tokens: 5,
                }),
            }
        }

        pub fn tool_use_response(text: &str, tool: &str) -> MessagesResponse {
            MessagesResponse {
                id: "resp".to_string(),
                response_type: "message".to_string(),
                role: "assistant".to_string(),
                content: vec![
                    MessageContent::Text {
                        text: text.to_string(),
                    },
                    MessageContent::ToolUse {
                        id: "tu-1".to_string(),
                        name: tool.to_string(),
                        input: serde_json::json!({}),
                    },
                ],
                model: "scripted-model".to_string(),
                stop_sequence: None,
                stop_reason: "tool_use".to_string(),
                usage: None,
            }
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        async fn complete(&self, request: MessagesRequest) -> Result<MessagesResponse> {
            *self.last_request.lock().expect("request lock poisoned") = Some(request);
            let mut responses = self.responses.lock().expect("script lock poisoned");
            if responses.is_empty() {
                return Err(Error::LlmApi("script exhausted".to_string()));
            }
            Ok(responses.remove(0))
        }

        fn model(&self) -> &str {
            &self.model
        }

        fn max_tokens(&self) -> u64 {
            4096
        }
    }

    /// Factory producing delegates backed by a fixed script.
    pub struct ScriptedFactory {
        pub script: StdMutex<Vec<Vec<MessagesResponse>>>,
    }

    impl ScriptedFactory {
        pub fn new(scripts: Vec<Vec<MessagesResponse>>) -> Self {
            Self {
                script: StdMutex::new(scripts),
            }
        }
    }

    impl DelegateFactory for ScriptedFactory {
        fn build(&self, config: &DelegateConfig) -> Result<Arc<DelegateAgent>> {
            let mut scripts = self.script.lock().expect("script lock poisoned");
            let responses = if scripts.is_empty() {
                vec![ScriptedClient::text_response("default scripted response")]
            } else {
                scripts.remove(0)
            };
            let client = Arc::new(ScriptedClient::new(responses));
            Ok(Arc::new(DelegateAgent::new(
                config.clone(),
                client,
                ToolManager::new(),
            )))
        }
    }

    pub fn test_delegate_config(agent_type: &str) -> DelegateConfig {
        DelegateConfig {
            agent_type: agent_type.to_string(),
            allowed_tools: vec![],
            model: "scripted-model".to_string(),
            max_tokens: 4096,
            depth: 1,
            system_prompt: None,
            reasoning_effort: None,
            specialized: false,
            max_iterations: 10,
        }
    }

    /// Model client whose `complete` never resolves. Drives tests of the
    /// wall-clock ceiling and mid-flight interruption.
    pub struct StallingClient;

    #[async_trait]
    impl ModelClient for StallingClient {
        async fn complete(&self, _request: MessagesRequest) -> Result<MessagesResponse> {
            std::future::pending().await
        }

        fn model(&self) -> &str {
            "scripted-model"
        }

        fn max_tokens(&self) -> u64 {
            4096
        }
    }
}
