//! agentnet-core - A directed graph of cooperating agents
//!
//! This crate provides:
//! - A thread-safe node/edge directory with bounded per-node mailboxes
//! - Dispatch with edge-checked targets, provenance stamping and fail-fast delivery
//! - Pluggable routing policies with a broadcast fallback
//! - One cancellable processing loop per node under a shared lifecycle
//! - An OpenAI-compatible chat agent that can act as a node's capability

pub mod agent;
pub mod capability;
mod directory;
mod dispatch;
pub mod error;
pub mod mailbox;
pub mod network;
pub mod node;
pub mod prompt;
pub mod providers;
pub mod router;
mod supervisor;
pub mod tools;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export main types for convenience
pub use agent::{AgentSettings, ChatAgent};
pub use capability::Capability;
pub use error::{NetError, Result};
pub use mailbox::DEFAULT_MAILBOX_CAPACITY;
pub use network::{AgentNet, WeakNet};
pub use node::{AgentNode, latest_content};
pub use prompt::PromptWrapper;
pub use providers::{LlmProvider, OpenAiProvider};
pub use router::{
    DELIVERY_MARKER, DefaultRouter, RouteDecision, RouteInput, RoutePolicy, RouterKind,
    SmartRouter,
};
pub use tools::{CurrentTimeTool, SendTool, ToolDefinition, ToolExecutor, ToolHandler, ToolRegistry};
pub use types::{Batch, Message, Role, ToolCallRecord};
