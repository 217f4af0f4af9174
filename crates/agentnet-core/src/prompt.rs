//! Prompt assembly for chat agents

use crate::types::{Message, Role};

/// System segment that switches an agent into ReAct-style reasoning
pub const REACT_SYSTEM_SEGMENT: &str = "You are a ReAct-style agent.";

/// Tool guidance given to ReAct-style agents
pub const REACT_TOOL_USAGE: &str = "Use tools when needed. Think about whether a tool is \
     required, call it with structured arguments, then produce the final answer.";

/// Prompt segments collected for an agent.
///
/// Blank segments are ignored on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptWrapper {
    memory: Vec<String>,
    tool_usage: Vec<String>,
    system_prompts: Vec<String>,
    user_prompts: Vec<String>,
}

fn push_segment(segments: &mut Vec<String>, segment: &str) {
    if !segment.trim().is_empty() {
        segments.push(segment.to_string());
    }
}

impl PromptWrapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrapper preloaded with the ReAct system segment and tool guidance
    pub fn react() -> Self {
        let mut wrapper = Self::default();
        wrapper.add_system_prompt(REACT_SYSTEM_SEGMENT);
        wrapper.add_tool_usage(REACT_TOOL_USAGE);
        wrapper
    }

    pub fn add_memory(&mut self, memory: &str) {
        push_segment(&mut self.memory, memory);
    }

    pub fn add_tool_usage(&mut self, usage: &str) {
        push_segment(&mut self.tool_usage, usage);
    }

    pub fn add_system_prompt(&mut self, prompt: &str) {
        push_segment(&mut self.system_prompts, prompt);
    }

    pub fn add_user_prompt(&mut self, prompt: &str) {
        push_segment(&mut self.user_prompts, prompt);
    }

    pub fn memory(&self) -> &[String] {
        &self.memory
    }

    /// Build the opening messages: at most one system and one user message
    pub fn wrap(&self, name: &str, description: &str) -> Vec<Message> {
        let mut system_parts = Vec::with_capacity(8);
        if !name.is_empty() || !description.is_empty() {
            system_parts.push(format!(
                "Agent Name: {}\nAgent Description: {}",
                name, description
            ));
        }
        if !self.memory.is_empty() {
            system_parts.push(format!("Memory:\n{}", self.memory.join("\n")));
        }
        if !self.tool_usage.is_empty() {
            system_parts.push(format!("Tool Usage:\n{}", self.tool_usage.join("\n")));
        }
        system_parts.extend(self.system_prompts.iter().cloned());

        let system = system_parts.join("\n\n");
        let user = self.user_prompts.join("\n\n");

        let mut messages = Vec::with_capacity(2);
        if !system.trim().is_empty() {
            messages.push(Message {
                role: Role::System,
                content: system.trim().to_string(),
                ..Default::default()
            });
        }
        if !user.trim().is_empty() {
            messages.push(Message::user(user.trim()));
        }
        messages
    }
}
