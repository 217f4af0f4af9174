//! Explicit delivery from within a capability invocation

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{ToolHandler, json_schema};
use crate::error::NetError;
use crate::network::WeakNet;
use crate::router::DELIVERY_MARKER;
use crate::types::{Message, Role};

#[derive(Debug, Default, Deserialize)]
struct SendArgs {
    #[serde(default)]
    to_id: String,
    #[serde(default)]
    to_ids: Vec<String>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    messages: Vec<OutgoingMessage>,
}

#[derive(Debug, Deserialize)]
struct OutgoingMessage {
    #[serde(default)]
    role: Role,
    #[serde(default)]
    content: String,
}

impl SendArgs {
    fn targets(&self) -> Vec<String> {
        let mut targets = self.to_ids.clone();
        if !self.to_id.is_empty() {
            targets.push(self.to_id.clone());
        }
        targets
    }

    fn into_messages(self) -> Vec<Message> {
        if !self.messages.is_empty() {
            return self
                .messages
                .into_iter()
                .map(|msg| Message {
                    role: msg.role,
                    content: msg.content,
                    ..Default::default()
                })
                .collect();
        }
        if self.content.is_empty() {
            return Vec::new();
        }
        vec![Message::user(self.content)]
    }
}

/// Lets a node's capability address its neighbors directly.
///
/// Holds only a weak network handle; the network owns the capability.
pub struct SendTool {
    net: WeakNet,
    node_id: String,
}

impl SendTool {
    pub fn new(net: WeakNet, node_id: impl Into<String>) -> Self {
        Self {
            net,
            node_id: node_id.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for SendTool {
    fn name(&self) -> &str {
        "send"
    }

    fn description(&self) -> &str {
        "Send messages to other agent nodes you are connected to. Leave out to_id and \
         to_ids to send to every connected node."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "to_id": {
                    "type": "string",
                    "description": "Single target node id"
                },
                "to_ids": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Target node ids"
                },
                "content": {
                    "type": "string",
                    "description": "Text to send as a single user message"
                },
                "messages": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "role": { "type": "string" },
                            "content": { "type": "string" }
                        },
                        "required": ["content"]
                    },
                    "description": "Messages to send; takes precedence over content"
                }
            }),
            vec![],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let args: SendArgs =
            serde_json::from_value(input).context("Invalid arguments for send")?;
        let targets = args.targets();
        let messages = args.into_messages();
        if messages.is_empty() {
            return Err(NetError::EmptyMessages.into());
        }

        let net = self
            .net
            .upgrade()
            .ok_or_else(|| anyhow!("Agent network is no longer available"))?;

        debug!("Node {} sending to {:?}", self.node_id, targets);
        let delivered = net.send(&self.node_id, &targets, messages).await?;
        Ok(format!("{} {} node(s)", DELIVERY_MARKER, delivered))
    }
}
