//! The agent network: directory, routing policy and lifecycle behind one lock
//!
//! `AgentNet` is a cheap handle (`Clone`) to shared state. Every mutation and
//! lookup goes through a single `tokio::sync::RwLock`, held only for the
//! bookkeeping itself and never across a capability invocation.

use std::sync::{Arc, Weak};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capability::Capability;
use crate::directory::Directory;
use crate::error::{NetError, Result};
use crate::mailbox::DEFAULT_MAILBOX_CAPACITY;
use crate::node::AgentNode;
use crate::router::{DefaultRouter, RoutePolicy};
use crate::supervisor::Supervisor;
use crate::tools::SendTool;

pub(crate) struct NetState {
    pub(crate) directory: Directory,
    pub(crate) router: Arc<dyn RoutePolicy>,
    pub(crate) supervisor: Supervisor,
}

pub(crate) struct NetInner {
    pub(crate) state: RwLock<NetState>,
    mailbox_capacity: usize,
}

/// Handle to a graph of agent nodes
#[derive(Clone)]
pub struct AgentNet {
    pub(crate) inner: Arc<NetInner>,
}

/// Non-owning handle, held by actions registered on capabilities so a node's
/// capability does not keep the network alive.
#[derive(Clone, Debug)]
pub struct WeakNet(Weak<NetInner>);

impl WeakNet {
    pub fn upgrade(&self) -> Option<AgentNet> {
        self.0.upgrade().map(|inner| AgentNet { inner })
    }
}

impl std::fmt::Debug for AgentNet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentNet")
            .field("mailbox_capacity", &self.inner.mailbox_capacity)
            .finish_non_exhaustive()
    }
}

impl Default for AgentNet {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentNet {
    /// Create an empty network using the default (broadcast) router
    pub fn new() -> Self {
        Self::with_mailbox_capacity(DEFAULT_MAILBOX_CAPACITY)
    }

    /// Create an empty network whose nodes get mailboxes of `capacity` batches
    pub fn with_mailbox_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(NetInner {
                state: RwLock::new(NetState {
                    directory: Directory::default(),
                    router: Arc::new(DefaultRouter),
                    supervisor: Supervisor::default(),
                }),
                mailbox_capacity: capacity.max(1),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakNet {
        WeakNet(Arc::downgrade(&self.inner))
    }

    /// Register a node. If the network is running its loop starts right away.
    ///
    /// The node's `send` action is registered on `capability`.
    pub async fn add_node(
        &self,
        id: &str,
        capability: Arc<dyn Capability>,
    ) -> Result<Arc<AgentNode>> {
        if id.is_empty() {
            return Err(NetError::EmptyNodeId);
        }

        let mut state = self.inner.state.write().await;
        if state.directory.contains(id) {
            warn!("Rejected duplicate node {}", id);
            return Err(NetError::DuplicateNode(id.to_string()));
        }

        let node = Arc::new(AgentNode::new(
            id.to_string(),
            capability,
            self.inner.mailbox_capacity,
        ));
        state.directory.insert_node(node.clone())?;
        node.capability()
            .register_action(Arc::new(SendTool::new(self.downgrade(), id)));
        state.supervisor.spawn(self, node.clone());

        info!("Added node {}", id);
        Ok(node)
    }

    /// Remove a node and all edges touching it, and stop its loop.
    /// Returns false if there was no such node.
    pub async fn delete_node(&self, id: &str) -> bool {
        let mut state = self.inner.state.write().await;
        if state.directory.remove_node(id).is_none() {
            return false;
        }
        state.supervisor.cancel_node(id);
        info!("Deleted node {}", id);
        true
    }

    /// Add a directed edge. Re-adding an existing edge is a no-op.
    pub async fn add_edge(&self, from: &str, to: &str) -> Result<()> {
        let mut state = self.inner.state.write().await;
        if state.directory.insert_edge(from, to)? {
            debug!("Added edge {} -> {}", from, to);
        }
        Ok(())
    }

    /// Remove a directed edge. Returns false if there was no such edge.
    pub async fn delete_edge(&self, from: &str, to: &str) -> bool {
        let mut state = self.inner.state.write().await;
        let removed = state.directory.remove_edge(from, to);
        if removed {
            debug!("Deleted edge {} -> {}", from, to);
        }
        removed
    }

    pub async fn get_node(&self, id: &str) -> Option<Arc<AgentNode>> {
        self.inner.state.read().await.directory.node(id)
    }

    /// Snapshot of the nodes with an edge into `id`, or None if `id` is unknown
    pub async fn get_in_nodes(&self, id: &str) -> Option<Vec<Arc<AgentNode>>> {
        self.inner.state.read().await.directory.in_nodes(id)
    }

    /// Snapshot of the nodes `id` has an edge to, or None if `id` is unknown
    pub async fn get_out_nodes(&self, id: &str) -> Option<Vec<Arc<AgentNode>>> {
        self.inner.state.read().await.directory.out_nodes(id)
    }

    /// All node ids in order
    pub async fn node_ids(&self) -> Vec<String> {
        let state = self.inner.state.read().await;
        state
            .directory
            .nodes()
            .iter()
            .map(|node| node.id().to_string())
            .collect()
    }

    /// All edges as (from, to) pairs in order
    pub async fn edges(&self) -> Vec<(String, String)> {
        self.inner.state.read().await.directory.edges()
    }

    pub async fn node_count(&self) -> usize {
        self.inner.state.read().await.directory.len()
    }

    /// Replace the routing policy. Takes effect from the next processed turn.
    pub async fn set_router(&self, policy: impl RoutePolicy + 'static) {
        self.set_shared_router(Arc::new(policy)).await;
    }

    pub async fn set_shared_router(&self, policy: Arc<dyn RoutePolicy>) {
        info!("Router set to {}", policy.name());
        self.inner.state.write().await.router = policy;
    }

    pub async fn router_name(&self) -> String {
        self.inner.state.read().await.router.name().to_string()
    }

    /// Spawn one loop per registered node. Calling it while running is a no-op.
    ///
    /// Loops stop when `parent` is cancelled or on [`AgentNet::stop`].
    pub async fn start(&self, parent: &CancellationToken) {
        let mut state = self.inner.state.write().await;
        if !state.supervisor.begin(parent) {
            debug!("Network already running");
            return;
        }
        let nodes = state.directory.nodes();
        for node in &nodes {
            state.supervisor.spawn(self, node.clone());
        }
        info!("Network started with {} node(s)", nodes.len());
    }

    /// Cancel every loop and wait for all of them to exit.
    ///
    /// A run started while this call is waiting is not waited for.
    ///
    /// Batches still queued in mailboxes are left unprocessed.
    pub async fn stop(&self) {
        let trackers = self.inner.state.write().await.supervisor.shutdown();
        for tracker in trackers {
            tracker.wait().await;
        }
        info!("Network stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.read().await.supervisor.is_running()
    }

    /// Number of node loops currently owned by the running network
    pub async fn running_loops(&self) -> usize {
        self.inner.state.read().await.supervisor.loop_count()
    }
}
