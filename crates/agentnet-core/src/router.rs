//! Routing policies that decide where a node's reply goes next
//!
//! A policy is consulted once per processed turn. It is a pure function of
//! its input: built-in policies carry no state, and any
//! `Fn(&RouteInput) -> RouteDecision` closure can be installed as a policy.
//! The broadcast fallback is applied by the dispatcher, not by the policy.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::Message;

/// Text the `send` action returns on success. A reply containing it means the
/// capability already delivered explicitly during this turn.
pub const DELIVERY_MARKER: &str = "delivered to";

/// Everything a policy may look at
#[derive(Debug, Clone, Copy)]
pub struct RouteInput<'a> {
    /// Node that processed the turn
    pub self_id: &'a str,
    /// Provenance of the message that triggered the turn (may be empty)
    pub reply_to_id: &'a str,
    /// The batch that was processed
    pub input: &'a [Message],
    /// Raw reply produced by the capability
    pub reply: &'a str,
}

/// Outcome of a routing decision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteDecision {
    /// Explicit recipients. Empty means "let the dispatcher decide".
    pub next_ids: Vec<String>,
    /// Messages to deliver instead of the wrapped reply
    pub messages: Vec<Message>,
    pub stop: bool,
}

impl RouteDecision {
    /// End propagation for this turn
    pub fn stop() -> Self {
        Self {
            stop: true,
            ..Default::default()
        }
    }

    /// No explicit recipients; the dispatcher falls back to broadcasting
    pub fn broadcast(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// Deliver to exactly these recipients
    pub fn to(next_ids: Vec<String>, messages: Vec<Message>) -> Self {
        Self {
            next_ids,
            messages,
            stop: false,
        }
    }
}

/// Strategy deciding the recipients of a processed reply
pub trait RoutePolicy: Send + Sync {
    fn route(&self, input: &RouteInput<'_>) -> RouteDecision;

    /// Name used in logs
    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> RoutePolicy for F
where
    F: Fn(&RouteInput<'_>) -> RouteDecision + Send + Sync,
{
    fn route(&self, input: &RouteInput<'_>) -> RouteDecision {
        self(input)
    }
}

/// Wraps every non-blank reply and lets the fallback broadcast pick recipients
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRouter;

impl RoutePolicy for DefaultRouter {
    fn route(&self, input: &RouteInput<'_>) -> RouteDecision {
        if input.reply.trim().is_empty() {
            return RouteDecision::stop();
        }
        RouteDecision::broadcast(vec![Message::from_node(input.self_id, input.reply)])
    }

    fn name(&self) -> &str {
        "default"
    }
}

/// Replies go back to whoever addressed the node.
///
/// - blank replies and delivery confirmations stop propagation
/// - a known sender other than the node itself gets the reply exclusively
/// - otherwise (seeded or self-initiated turns) the fallback broadcast applies
#[derive(Debug, Clone, Copy, Default)]
pub struct SmartRouter;

impl RoutePolicy for SmartRouter {
    fn route(&self, input: &RouteInput<'_>) -> RouteDecision {
        if input.reply.contains(DELIVERY_MARKER) || input.reply.trim().is_empty() {
            return RouteDecision::stop();
        }

        if !input.reply_to_id.is_empty() && input.reply_to_id != input.self_id {
            return RouteDecision::to(
                vec![input.reply_to_id.to_string()],
                vec![Message::from_node(input.self_id, input.reply)],
            );
        }

        RouteDecision::default()
    }

    fn name(&self) -> &str {
        "smart"
    }
}

/// Built-in policy selectable from configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RouterKind {
    Default,
    #[default]
    Smart,
}

impl RouterKind {
    pub fn policy(self) -> Arc<dyn RoutePolicy> {
        match self {
            Self::Default => Arc::new(DefaultRouter),
            Self::Smart => Arc::new(SmartRouter),
        }
    }
}

impl std::fmt::Display for RouterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Smart => write!(f, "smart"),
        }
    }
}
