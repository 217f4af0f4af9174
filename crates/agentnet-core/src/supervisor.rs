//! Lifecycle of the node loops
//!
//! All loops of one run share a cancellation token derived from the token
//! passed to `start`. Each loop additionally gets a child token of its own so
//! deleting a node ends its loop without touching the others. Every run owns
//! its `TaskTracker`, so waiting on a stopped run never observes loops of a
//! later one.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::network::AgentNet;
use crate::node::{AgentNode, run_node_loop};

/// Tokens and tasks of a started run
#[derive(Debug)]
struct Run {
    shutdown: CancellationToken,
    loops: HashMap<String, CancellationToken>,
    tracker: TaskTracker,
}

#[derive(Debug, Default)]
pub(crate) struct Supervisor {
    run: Option<Run>,
    /// Trackers of stopped runs whose loops may still be winding down
    draining: Vec<TaskTracker>,
}

impl Supervisor {
    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Begin a run. Returns false if one is already active.
    pub fn begin(&mut self, parent: &CancellationToken) -> bool {
        if self.run.is_some() {
            return false;
        }
        self.run = Some(Run {
            shutdown: parent.child_token(),
            loops: HashMap::new(),
            tracker: TaskTracker::new(),
        });
        true
    }

    /// Spawn the loop for `node` if a run is active
    pub fn spawn(&mut self, net: &AgentNet, node: Arc<AgentNode>) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        let token = run.shutdown.child_token();
        if let Some(previous) = run.loops.insert(node.id().to_string(), token.clone()) {
            previous.cancel();
        }
        debug!("Spawning loop for node {}", node.id());
        run.tracker.spawn(run_node_loop(net.clone(), node, token));
    }

    /// Cancel the loop of a single node. Returns false if it had none.
    ///
    /// The loop stays on its run's tracker until it exits.
    pub fn cancel_node(&mut self, id: &str) -> bool {
        let Some(token) = self.run.as_mut().and_then(|run| run.loops.remove(id)) else {
            return false;
        };
        debug!("Cancelling loop for node {}", id);
        token.cancel();
        true
    }

    /// Signal every loop to stop. The returned trackers complete once the
    /// loops of this run and of any earlier stopped run have exited.
    pub fn shutdown(&mut self) -> Vec<TaskTracker> {
        self.draining.retain(|tracker| !tracker.is_empty());
        if let Some(run) = self.run.take() {
            info!("Stopping {} node loop(s)", run.loops.len());
            run.shutdown.cancel();
            run.tracker.close();
            self.draining.push(run.tracker);
        }
        self.draining.clone()
    }

    /// Number of loops spawned in the current run and not individually cancelled
    pub fn loop_count(&self) -> usize {
        self.run.as_ref().map_or(0, |run| run.loops.len())
    }
}
