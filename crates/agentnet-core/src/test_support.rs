//! Scripted capabilities for exercising the network without a model

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::capability::Capability;
use crate::tools::{ToolExecutor, ToolHandler, ToolRegistry};

enum Script {
    Reply(String),
    Fail(String),
    /// Call the `send` action with these arguments and return its output
    Send(serde_json::Value),
    /// Park until cancelled
    Block,
    /// Sleep without looking at the cancellation token, then reply
    Slow(Duration),
}

pub(crate) struct ScriptedCapability {
    script: Script,
    inputs: Mutex<Vec<String>>,
    actions: Mutex<ToolRegistry>,
}

impl ScriptedCapability {
    fn with(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            inputs: Mutex::new(Vec::new()),
            actions: Mutex::new(ToolRegistry::new()),
        })
    }

    pub fn replying(reply: &str) -> Arc<Self> {
        Self::with(Script::Reply(reply.to_string()))
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Self::with(Script::Fail(message.to_string()))
    }

    pub fn sending(args: serde_json::Value) -> Arc<Self> {
        Self::with(Script::Send(args))
    }

    pub fn blocking() -> Arc<Self> {
        Self::with(Script::Block)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Self::with(Script::Slow(delay))
    }

    /// Every text `invoke` was called with, in order
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }

    pub fn action(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.actions.lock().unwrap().get(name)
    }
}

#[async_trait]
impl Capability for ScriptedCapability {
    async fn invoke(&self, cancel: &CancellationToken, text: &str) -> Result<String> {
        self.inputs.lock().unwrap().push(text.to_string());
        match &self.script {
            Script::Reply(reply) => Ok(reply.clone()),
            Script::Fail(message) => Err(anyhow!("{}", message)),
            Script::Send(args) => {
                let registry = self.actions.lock().unwrap().clone();
                registry.execute("send", args.clone()).await
            }
            Script::Block => {
                cancel.cancelled().await;
                Err(anyhow!("cancelled"))
            }
            Script::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(String::new())
            }
        }
    }

    fn register_action(&self, action: Arc<dyn ToolHandler>) {
        self.actions.lock().unwrap().register(action);
    }
}

/// Poll `condition` until it holds or `limit` elapses
pub(crate) async fn wait_until(limit: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
