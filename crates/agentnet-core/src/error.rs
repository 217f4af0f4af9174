//! Error types for directory and dispatch operations

/// Errors returned synchronously by the graph directory and the dispatcher.
///
/// None of these stop a node loop: inside a loop they are logged and the
/// turn simply produces no forward progress.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetError {
    #[error("node id is required")]
    EmptyNodeId,

    #[error("from and to node ids are required")]
    EmptyEdgeEndpoint,

    #[error("node {0:?} already exists")]
    DuplicateNode(String),

    #[error("node {0:?} not found")]
    NodeNotFound(String),

    #[error("no edge from {from:?} to {to:?}")]
    MissingEdge { from: String, to: String },

    #[error("no target nodes available")]
    NoTargets,

    #[error("messages or content is required")]
    EmptyMessages,

    /// A target mailbox was at capacity. `delivered` counts the targets that
    /// had already accepted the batch; those deliveries are not rolled back.
    #[error("mailbox full for node {node:?} after delivering to {delivered} node(s)")]
    MailboxFull { node: String, delivered: usize },
}

impl NetError {
    /// Number of targets that received the batch before this error occurred
    pub fn delivered(&self) -> usize {
        match self {
            Self::MailboxFull { delivered, .. } => *delivered,
            _ => 0,
        }
    }
}

pub type Result<T> = std::result::Result<T, NetError>;
