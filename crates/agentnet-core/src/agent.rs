//! LLM-backed capability with a bounded tool loop

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capability::Capability;
use crate::prompt::PromptWrapper;
use crate::providers::LlmProvider;
use crate::tools::{ToolDefinition, ToolExecutor, ToolHandler, ToolRegistry};
use crate::types::{Message, Role, ToolCallRecord};

pub const DEFAULT_NAME: &str = "Base_agent";
pub const DEFAULT_DESCRIPTION: &str = "The basic for the extended intelligent agent";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a versatile individual in a general field, \
     and you need to assist clients in completing diverse tasks";
pub const DEFAULT_REACT_SYSTEM_PROMPT: &str = "You are a ReAct-style agent. Think step-by-step, \
     decide when to call tools, and respond with final answers after tool use.";
pub const DEFAULT_MAX_CIRCLE: usize = 5;
pub const DEFAULT_TEMPERATURE: f32 = 0.5;

const MAX_TOOL_OUTPUT: usize = 100_000;

/// Tuning knobs for [`ChatAgent`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentSettings {
    pub temperature: f32,
    /// Maximum completion rounds per invocation
    pub max_circle: usize,
    pub allow_tools: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_circle: DEFAULT_MAX_CIRCLE,
            allow_tools: true,
        }
    }
}

/// Capability that answers through a chat-completion provider
pub struct ChatAgent {
    name: String,
    description: String,
    system_prompt: String,
    settings: AgentSettings,
    provider: Arc<dyn LlmProvider>,
    prompt: RwLock<PromptWrapper>,
    tools: RwLock<ToolRegistry>,
    /// ReAct mode keeps tools enabled regardless of settings
    react: bool,
}

impl std::fmt::Debug for ChatAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatAgent")
            .field("name", &self.name)
            .field("model", &self.provider.model())
            .field("settings", &self.settings)
            .field("react", &self.react)
            .field("tools", &self.read_tools().len())
            .finish()
    }
}

fn truncate_output(mut output: String) -> String {
    if output.len() <= MAX_TOOL_OUTPUT {
        return output;
    }
    let mut end = MAX_TOOL_OUTPUT;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    output.truncate(end);
    output.push_str("\n[Output truncated]");
    output
}

impl ChatAgent {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            settings: AgentSettings::default(),
            provider,
            prompt: RwLock::new(PromptWrapper::new()),
            tools: RwLock::new(ToolRegistry::new()),
            react: false,
        }
    }

    /// Agent prompted to reason in ReAct style. Tool calls are always allowed.
    pub fn react(provider: Arc<dyn LlmProvider>) -> Self {
        let mut agent = Self::new(provider).with_system_prompt(DEFAULT_REACT_SYSTEM_PROMPT);
        agent.prompt = RwLock::new(PromptWrapper::react());
        agent.react = true;
        agent
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        if self.react && !settings.allow_tools {
            debug!("Agent {} is in ReAct mode, keeping tools enabled", self.name);
            self.settings.allow_tools = true;
        }
        self
    }

    pub fn with_tool(self, tool: Arc<dyn ToolHandler>) -> Self {
        self.write_tools().register(tool);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> AgentSettings {
        self.settings
    }

    pub fn is_react(&self) -> bool {
        self.react
    }

    fn read_tools(&self) -> RwLockReadGuard<'_, ToolRegistry> {
        self.tools.read().unwrap_or_else(|poisoned| {
            warn!("Tool registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_tools(&self) -> RwLockWriteGuard<'_, ToolRegistry> {
        self.tools.write().unwrap_or_else(|poisoned| {
            warn!("Tool registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_prompt(&self) -> RwLockWriteGuard<'_, PromptWrapper> {
        self.prompt.write().unwrap_or_else(|poisoned| {
            warn!("Prompt lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn prompt_snapshot(&self) -> PromptWrapper {
        match self.prompt.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Append a memory entry to the system prompt of later invocations
    pub fn add_memory(&self, memory: &str) {
        self.write_prompt().add_memory(memory);
    }

    pub fn add_tool_usage(&self, usage: &str) {
        self.write_prompt().add_tool_usage(usage);
    }

    pub fn add_system_prompt(&self, prompt: &str) {
        self.write_prompt().add_system_prompt(prompt);
    }

    pub fn memory(&self) -> Vec<String> {
        self.prompt_snapshot().memory().to_vec()
    }

    /// Definitions of every registered tool
    pub fn tools(&self) -> Vec<ToolDefinition> {
        self.read_tools().list_tools()
    }

    fn opening_messages(&self, text: &str) -> Vec<Message> {
        let mut wrapper = self.prompt_snapshot();
        wrapper.add_system_prompt(&self.system_prompt);
        wrapper.add_user_prompt(text);
        wrapper.wrap(&self.name, &self.description)
    }

    async fn run_tool(&self, registry: &ToolRegistry, call: &ToolCallRecord) -> String {
        let input: Value = if call.arguments.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            match serde_json::from_str(&call.arguments) {
                Ok(input) => input,
                Err(e) => return format!("Error executing tool: invalid arguments: {}", e),
            }
        };

        info!("Agent {} calling tool: {}", self.name, call.name);
        match registry.execute(&call.name, input).await {
            Ok(output) => truncate_output(output),
            Err(e) => format!("Error executing tool: {:#}", e),
        }
    }
}

#[async_trait]
impl Capability for ChatAgent {
    async fn invoke(&self, cancel: &CancellationToken, text: &str) -> Result<String> {
        let registry = self.read_tools().clone();
        let tools = if self.settings.allow_tools {
            registry.list_tools()
        } else {
            Vec::new()
        };
        let mut conversation = self.opening_messages(text);

        for round in 1..=self.settings.max_circle {
            debug!("Agent {} round {}", self.name, round);

            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(anyhow!("Invocation cancelled")),
                reply = self.provider.chat(&conversation, &tools, self.settings.temperature) => reply?,
            };

            if reply.tool_calls.is_empty() {
                return Ok(reply.content);
            }
            if !self.settings.allow_tools {
                bail!(
                    "tool calls disabled but received {} tool call(s)",
                    reply.tool_calls.len()
                );
            }

            let calls = reply.tool_calls.clone();
            conversation.push(reply);
            for call in &calls {
                let output = self.run_tool(&registry, call).await;
                conversation.push(Message {
                    role: Role::Tool,
                    content: output,
                    name: Some(call.name.clone()),
                    tool_call_id: Some(call.id.clone()),
                    ..Default::default()
                });
            }
        }

        warn!(
            "Agent {} exceeded {} rounds",
            self.name, self.settings.max_circle
        );
        Err(anyhow!("agent loop limit exceeded"))
    }

    fn register_action(&self, action: Arc<dyn ToolHandler>) {
        self.write_tools().register(action);
    }
}
