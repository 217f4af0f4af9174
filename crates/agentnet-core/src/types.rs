//! Shared types for agentnet-core

use serde::{Deserialize, Serialize};

/// Role of the chat turn a message represents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    /// Messages crossing an edge arrive as user input for the receiving node
    #[default]
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A tool call requested by an assistant turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    /// Raw JSON arguments as produced by the model
    #[serde(default)]
    pub arguments: String,
}

/// Message envelope exchanged between nodes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
    /// Id of the node that sent this message. Overwritten on every `send`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub from_node_id: String,
}

impl Message {
    /// A plain user-role message with no provenance yet
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            ..Default::default()
        }
    }

    /// A user-role message stamped with the sending node
    pub fn from_node(from: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            from_node_id: from.into(),
            ..Self::user(content)
        }
    }

    /// True if the content is empty or whitespace only
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// A batch of messages delivered to a mailbox as one unit
pub type Batch = Vec<Message>;
