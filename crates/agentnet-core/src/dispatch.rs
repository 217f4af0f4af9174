//! Message delivery between nodes
//!
//! Target resolution runs under the read lock and yields a snapshot; the
//! actual enqueues happen after the lock is released. Each target receives
//! its own copy of the batch.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{NetError, Result};
use crate::network::AgentNet;
use crate::node::AgentNode;
use crate::router::{RouteDecision, RouteInput};
use crate::types::Message;

impl AgentNet {
    /// Deliver `messages` from node `from`.
    ///
    /// With `to_ids` empty the batch goes to every outgoing neighbor of
    /// `from`, otherwise to exactly the listed ids, each of which must be an
    /// outgoing neighbor. Provenance of every message is set to `from`.
    /// Returns the number of nodes delivered to.
    pub async fn send(
        &self,
        from: &str,
        to_ids: &[String],
        messages: Vec<Message>,
    ) -> Result<usize> {
        if messages.is_empty() {
            return Err(NetError::EmptyMessages);
        }
        let targets = self.resolve_targets(from, to_ids).await?;

        let batch: Vec<Message> = messages
            .into_iter()
            .map(|mut msg| {
                msg.from_node_id = from.to_string();
                msg
            })
            .collect();

        let mut delivered = 0;
        for target in &targets {
            if target.mailbox().try_push(batch.clone()).is_err() {
                warn!(
                    "Mailbox full for node {} (delivered to {} of {})",
                    target.id(),
                    delivered,
                    targets.len()
                );
                return Err(NetError::MailboxFull {
                    node: target.id().to_string(),
                    delivered,
                });
            }
            for msg in &batch {
                debug!("[SEND] {} -> {}: {}", from, target.id(), msg.content);
            }
            delivered += 1;
        }

        Ok(delivered)
    }

    /// Enqueue a batch on `node` from outside the graph.
    ///
    /// No edge is required and `from` need not name a node; it is stamped on
    /// every message as is.
    pub async fn inject(&self, node: &str, from: &str, messages: Vec<Message>) -> Result<()> {
        if messages.is_empty() {
            return Err(NetError::EmptyMessages);
        }
        let target = self
            .get_node(node)
            .await
            .ok_or_else(|| NetError::NodeNotFound(node.to_string()))?;

        let batch: Vec<Message> = messages
            .into_iter()
            .map(|mut msg| {
                msg.from_node_id = from.to_string();
                msg
            })
            .collect();

        if target.mailbox().try_push(batch).is_err() {
            warn!("Mailbox full for node {}, injected batch dropped", node);
            return Err(NetError::MailboxFull {
                node: node.to_string(),
                delivered: 0,
            });
        }
        let label = if from.is_empty() { "external" } else { from };
        debug!("[INJECT] {} -> {}", label, node);
        Ok(())
    }

    /// Pull messages from `node`'s mailbox directly.
    ///
    /// Waits up to `timeout` for the first batch; `None` or a zero duration
    /// only takes what is already queued. Further queued batches are drained
    /// without waiting until at least `max` messages are collected (batches
    /// are never split, so the result may exceed `max`).
    pub async fn recv(
        &self,
        node: &str,
        max: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<Message>> {
        let target = self
            .get_node(node)
            .await
            .ok_or_else(|| NetError::NodeNotFound(node.to_string()))?;
        let mailbox = target.mailbox();

        let first = match timeout.filter(|t| !t.is_zero()) {
            Some(wait) => tokio::time::timeout(wait, mailbox.pop()).await.ok().flatten(),
            None => mailbox.try_pop(),
        };
        let Some(mut messages) = first else {
            return Ok(Vec::new());
        };

        let max = max.max(1);
        while messages.len() < max {
            match mailbox.try_pop() {
                Some(batch) => messages.extend(batch),
                None => break,
            }
        }

        for msg in &messages {
            debug!("[RECV] {} <- {}: {}", node, msg.from_node_id, msg.content);
        }
        Ok(messages)
    }

    /// Consult the current policy for a finished turn and apply the
    /// broadcast fallback when it names neither targets nor a stop.
    pub async fn route(
        &self,
        self_id: &str,
        reply_to_id: &str,
        input: &[Message],
        reply: &str,
    ) -> RouteDecision {
        let policy = self.inner.state.read().await.router.clone();
        let mut decision = policy.route(&RouteInput {
            self_id,
            reply_to_id,
            input,
            reply,
        });
        if decision.stop || !decision.next_ids.is_empty() {
            return decision;
        }

        decision.next_ids = self.inner.state.read().await.directory.out_ids(self_id);
        if decision.next_ids.is_empty() {
            debug!("No outgoing neighbors for {}, stopping", self_id);
            decision.stop = true;
        }
        decision
    }

    async fn resolve_targets(
        &self,
        from: &str,
        to_ids: &[String],
    ) -> Result<Vec<Arc<AgentNode>>> {
        let state = self.inner.state.read().await;
        let directory = &state.directory;
        if !directory.contains(from) {
            return Err(NetError::NodeNotFound(from.to_string()));
        }

        let ids = if to_ids.is_empty() {
            directory.out_ids(from)
        } else {
            let mut ids: Vec<String> = Vec::with_capacity(to_ids.len());
            for id in to_ids.iter().filter(|id| !id.is_empty()) {
                if !directory.has_edge(from, id) {
                    return Err(NetError::MissingEdge {
                        from: from.to_string(),
                        to: id.clone(),
                    });
                }
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
            ids
        };

        if ids.is_empty() {
            return Err(NetError::NoTargets);
        }
        Ok(ids.iter().filter_map(|id| directory.node(id)).collect())
    }
}
