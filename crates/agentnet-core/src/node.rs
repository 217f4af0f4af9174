//! Graph nodes and the per-node processing loop
//!
//! Each running node owns one task that cycles through
//! idle (waiting on the mailbox) → processing (capability invocation) →
//! routing (policy + fallback) → delivering (dispatch) and back to idle.
//! Only cancellation ends the loop; every per-turn failure is logged and the
//! loop returns to idle.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::capability::Capability;
use crate::mailbox::Mailbox;
use crate::network::AgentNet;
use crate::types::{Batch, Message};

/// A participant in the graph
pub struct AgentNode {
    id: String,
    mailbox: Mailbox,
    capability: Arc<dyn Capability>,
}

impl std::fmt::Debug for AgentNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentNode")
            .field("id", &self.id)
            .field("mailbox", &self.mailbox)
            .field("capability", &"<dyn Capability>")
            .finish()
    }
}

impl AgentNode {
    pub(crate) fn new(id: String, capability: Arc<dyn Capability>, capacity: usize) -> Self {
        Self {
            id,
            mailbox: Mailbox::new(capacity),
            capability,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn capability(&self) -> &Arc<dyn Capability> {
        &self.capability
    }

    /// Number of batches waiting in the mailbox
    pub fn pending(&self) -> usize {
        self.mailbox.len()
    }

    pub fn mailbox_capacity(&self) -> usize {
        self.mailbox.capacity()
    }

    pub(crate) fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }
}

/// Content of the last non-blank message in a batch
pub fn latest_content(batch: &[Message]) -> Option<&str> {
    batch
        .iter()
        .rev()
        .find(|msg| !msg.is_blank())
        .map(|msg| msg.content.as_str())
}

/// What a single turn amounted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TurnOutcome {
    /// Empty batch or nothing but blank content
    Ignored,
    InvokeFailed,
    /// The policy or the fallback ended propagation
    Stopped,
    Delivered(usize),
    DeliveryFailed,
}

/// Messages to deliver for a turn: the policy's overrides stamped with the
/// node id where missing, or the raw reply wrapped as one user message.
fn outbound_messages(self_id: &str, reply: &str, overrides: Vec<Message>) -> Vec<Message> {
    if overrides.is_empty() {
        return vec![Message::from_node(self_id, reply)];
    }
    overrides
        .into_iter()
        .map(|mut msg| {
            if msg.from_node_id.is_empty() {
                msg.from_node_id = self_id.to_string();
            }
            msg
        })
        .collect()
}

/// Process one batch taken from `node`'s mailbox
pub(crate) async fn process_batch(
    net: &AgentNet,
    node: &AgentNode,
    batch: Batch,
    cancel: &CancellationToken,
) -> TurnOutcome {
    let Some(last) = batch.last() else {
        return TurnOutcome::Ignored;
    };
    let sender = last.from_node_id.clone();
    let Some(content) = latest_content(&batch) else {
        return TurnOutcome::Ignored;
    };

    let sender_label = if sender.is_empty() { "unknown" } else { sender.as_str() };
    // The capability decides whom to address based on who is talking to it
    let contextual = format!("[Message from {}]: {}", sender_label, content);
    debug!(
        "[PROCESS] {} processing message from {}: {}",
        node.id(),
        sender_label,
        content
    );

    let reply = match node.capability().invoke(cancel, &contextual).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("Invoke failed on node {}: {:#}", node.id(), e);
            return TurnOutcome::InvokeFailed;
        }
    };

    let decision = net.route(node.id(), &sender, &batch, &reply).await;
    if decision.stop {
        debug!("Routing stopped after turn on {}", node.id());
        return TurnOutcome::Stopped;
    }

    let messages = outbound_messages(node.id(), &reply, decision.messages);
    match net.send(node.id(), &decision.next_ids, messages).await {
        Ok(delivered) => TurnOutcome::Delivered(delivered),
        Err(e) => {
            error!("Send failed from node {}: {}", node.id(), e);
            TurnOutcome::DeliveryFailed
        }
    }
}

/// Drive `node` until `cancel` fires
pub(crate) async fn run_node_loop(net: AgentNet, node: Arc<AgentNode>, cancel: CancellationToken) {
    info!("Node loop started: {}", node.id());

    loop {
        let batch = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            batch = node.mailbox().pop() => match batch {
                Some(batch) => batch,
                None => break,
            },
        };
        process_batch(&net, &node, batch, &cancel).await;
    }

    info!("Node loop stopped: {}", node.id());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{RouteDecision, RouteInput};
    use crate::test_support::ScriptedCapability;
    use crate::types::Role;

    fn msg(content: &str) -> Message {
        Message::user(content)
    }

    #[test]
    fn test_latest_content_skips_trailing_blanks() {
        let batch = vec![msg(""), msg("hi"), msg("")];
        assert_eq!(latest_content(&batch), Some("hi"));
    }

    #[test]
    fn test_latest_content_prefers_last() {
        let batch = vec![msg("first"), msg("second"), msg("  ")];
        assert_eq!(latest_content(&batch), Some("second"));
        assert_eq!(latest_content(&[msg(""), msg(" ")]), None);
        assert_eq!(latest_content(&[]), None);
    }

    #[test]
    fn test_outbound_wraps_reply() {
        let out = outbound_messages("A", "reply", vec![]);
        assert_eq!(out, vec![Message::from_node("A", "reply")]);
        assert_eq!(out[0].role, Role::User);
    }

    #[test]
    fn test_outbound_stamps_missing_provenance() {
        let overrides = vec![Message::user("one"), Message::from_node("X", "two")];
        let out = outbound_messages("A", "ignored", overrides);
        assert_eq!(out[0].from_node_id, "A");
        assert_eq!(out[1].from_node_id, "X");
    }

    async fn two_node_net() -> (AgentNet, Arc<ScriptedCapability>, Arc<ScriptedCapability>) {
        let net = AgentNet::new();
        let a = ScriptedCapability::replying("from A");
        let b = ScriptedCapability::replying("from B");
        net.add_node("A", a.clone()).await.unwrap();
        net.add_node("B", b.clone()).await.unwrap();
        net.add_edge("A", "B").await.unwrap();
        (net, a, b)
    }

    #[tokio::test]
    async fn test_process_ignores_empty_and_blank_batches() {
        let (net, a, _b) = two_node_net().await;
        let node = net.get_node("A").await.unwrap();
        let cancel = CancellationToken::new();

        assert_eq!(
            process_batch(&net, &node, vec![], &cancel).await,
            TurnOutcome::Ignored
        );
        assert_eq!(
            process_batch(&net, &node, vec![msg(" "), msg("")], &cancel).await,
            TurnOutcome::Ignored
        );
        assert!(a.inputs().is_empty());
    }

    #[tokio::test]
    async fn test_process_annotates_sender_and_broadcasts() {
        let (net, a, _b) = two_node_net().await;
        let node = net.get_node("A").await.unwrap();
        let cancel = CancellationToken::new();

        let batch = vec![Message::from_node("seed", "hello"), Message::from_node("seed", "")];
        let outcome = process_batch(&net, &node, batch, &cancel).await;
        assert_eq!(outcome, TurnOutcome::Delivered(1));
        assert_eq!(a.inputs(), vec!["[Message from seed]: hello".to_string()]);

        let b = net.get_node("B").await.unwrap();
        let delivered = b.mailbox().try_pop().unwrap();
        assert_eq!(delivered, vec![Message::from_node("A", "from A")]);
    }

    #[tokio::test]
    async fn test_process_unknown_sender_label() {
        let (net, a, _b) = two_node_net().await;
        let node = net.get_node("A").await.unwrap();
        process_batch(&net, &node, vec![msg("hey")], &CancellationToken::new()).await;
        assert_eq!(a.inputs(), vec!["[Message from unknown]: hey".to_string()]);
    }

    #[tokio::test]
    async fn test_process_invoke_error_abandons_turn() {
        let net = AgentNet::new();
        net.add_node("A", ScriptedCapability::failing("boom")).await.unwrap();
        net.add_node("B", ScriptedCapability::replying("x")).await.unwrap();
        net.add_edge("A", "B").await.unwrap();
        let node = net.get_node("A").await.unwrap();

        let outcome =
            process_batch(&net, &node, vec![msg("hi")], &CancellationToken::new()).await;
        assert_eq!(outcome, TurnOutcome::InvokeFailed);
        assert_eq!(net.get_node("B").await.unwrap().pending(), 0);
    }

    #[tokio::test]
    async fn test_process_stops_without_outgoing_edges() {
        let (net, _a, _b) = two_node_net().await;
        let node = net.get_node("B").await.unwrap();

        let outcome =
            process_batch(&net, &node, vec![msg("hi")], &CancellationToken::new()).await;
        assert_eq!(outcome, TurnOutcome::Stopped);
    }

    #[tokio::test]
    async fn test_process_smart_replies_to_sender() {
        let (net, _a, _b) = two_node_net().await;
        net.set_router(crate::router::SmartRouter).await;
        net.add_edge("B", "A").await.unwrap();
        let node = net.get_node("B").await.unwrap();

        let batch = vec![Message::from_node("A", "question")];
        let outcome = process_batch(&net, &node, batch, &CancellationToken::new()).await;
        assert_eq!(outcome, TurnOutcome::Delivered(1));

        let a = net.get_node("A").await.unwrap();
        let got = a.mailbox().try_pop().unwrap();
        assert_eq!(got[0].content, "from B");
        assert_eq!(got[0].from_node_id, "B");
    }

    #[tokio::test]
    async fn test_process_reports_delivery_failure() {
        let (net, _a, _b) = two_node_net().await;
        // Policy names a neighbor that has no edge from A
        net.set_router(|input: &RouteInput<'_>| {
            RouteDecision::to(vec!["C".to_string()], vec![Message::user(input.reply)])
        })
        .await;
        let node = net.get_node("A").await.unwrap();

        let outcome =
            process_batch(&net, &node, vec![msg("hi")], &CancellationToken::new()).await;
        assert_eq!(outcome, TurnOutcome::DeliveryFailed);
    }

    #[tokio::test]
    async fn test_loop_exits_on_cancel() {
        let (net, _a, _b) = two_node_net().await;
        let node = net.get_node("A").await.unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_node_loop(net.clone(), node, cancel.clone()));

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("loop should exit after cancel")
            .unwrap();
    }
}
