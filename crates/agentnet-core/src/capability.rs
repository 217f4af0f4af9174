//! The contract a node's external collaborator must fulfil

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::tools::ToolHandler;

/// Turns an input text into a reply.
///
/// The node loop calls `invoke` once per processed batch and imposes no
/// timeout of its own; implementations should return promptly once `cancel`
/// fires. A capability instance is expected to back exactly one node, since
/// the network registers that node's `send` action on it.
#[async_trait]
pub trait Capability: Send + Sync {
    async fn invoke(&self, cancel: &CancellationToken, text: &str) -> Result<String>;

    /// Make an action callable from within `invoke`
    fn register_action(&self, action: Arc<dyn ToolHandler>);
}
