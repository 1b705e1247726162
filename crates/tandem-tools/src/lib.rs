//! tandem-tools: Delegation tools for tandem
//!
//! This crate provides the built-in delegation tools: explore (read-only
//! investigation), plan (implementation planning), and agent (general
//! sub-agent). All three share one agent pool.

use tandem_core::agents::AgentPool;
use tandem_core::ToolManager;

pub mod delegation;
pub mod explore;
pub mod plan;
pub mod subagent;

pub use explore::ExploreTool;
pub use plan::PlanTool;
pub use subagent::AgentTool;

use std::sync::Arc;

/// Register the delegation tools with the tool manager, sharing one pool.
pub fn register_delegation_tools(manager: &mut ToolManager, pool: Arc<AgentPool>) {
    manager.register(Arc::new(ExploreTool::new(pool.clone())));
    manager.register(Arc::new(PlanTool::new(pool.clone())));
    manager.register(Arc::new(AgentTool::new(pool)));
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Scripted service wiring shared by the tool tests.

    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    use tandem_core::agents::DelegationTracker;
    use tandem_core::llm::{
        MessageContent, MessagesRequest, MessagesResponse, ModelClient, Usage,
    };
    use tandem_core::{
        keys, AllowAllGate, Config, Error, EventBus, PermissionGate, Result, ServiceLookup,
        ServiceRegistry, ToolContext, ToolManager,
    };

    pub struct ScriptedClient {
        responses: Mutex<Vec<MessagesResponse>>,
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        async fn complete(&self, _request: MessagesRequest) -> Result<MessagesResponse> {
            let mut responses = self.responses.lock().expect("script lock poisoned");
            if responses.is_empty() {
                return Err(Error::LlmApi("script exhausted".to_string()));
            }
            Ok(responses.remove(0))
        }

        fn model(&self) -> &str {
            "scripted-model"
        }

        fn max_tokens(&self) -> u64 {
            4096
        }
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

    pub fn scripted_services(responses: Vec<MessagesResponse>) -> Arc<dyn ServiceLookup> {
        let mut config = Config::default();
        config.llm.api_key = "test-key".to_string();
        config.llm.model = "scripted-model".to_string();

        let mut manager = ToolManager::new();
        manager.set_tracker(Arc::new(DelegationTracker::new()));

        let client: Arc<dyn ModelClient> = Arc::new(ScriptedClient {
            responses: Mutex::new(responses),
        });
        let gate: Arc<dyn PermissionGate> = Arc::new(AllowAllGate);

        let registry = Arc::new(ServiceRegistry::new());
        registry.insert(keys::CONFIG, Arc::new(config));
        registry.insert(keys::MODEL_CLIENT, client);
        registry.insert(keys::TOOL_MANAGER, Arc::new(manager));
        registry.insert(keys::PERMISSION_GATE, gate);
        registry.insert(keys::EVENT_BUS, Arc::new(EventBus::default()));

        registry
    }

    pub fn tool_context(services: Arc<dyn ServiceLookup>) -> ToolContext {
        ToolContext {
            services,
            call_id: "root-call".to_string(),
            agent_type: "root".to_string(),
            depth: 0,
        }
    }
}
