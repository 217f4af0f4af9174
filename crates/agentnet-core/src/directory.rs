//! Node and edge bookkeeping
//!
//! `Directory` is plain data; `AgentNet` keeps it behind its single
//! reader/writer lock. Both adjacency views are always updated together, so
//! `to ∈ out_edges[from]` holds exactly when `from ∈ in_edges[to]`, and every
//! id mentioned in either view names a registered node.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::{NetError, Result};
use crate::node::AgentNode;

#[derive(Debug, Default)]
pub(crate) struct Directory {
    nodes: HashMap<String, Arc<AgentNode>>,
    in_edges: HashMap<String, BTreeSet<String>>,
    out_edges: HashMap<String, BTreeSet<String>>,
}

impl Directory {
    pub fn insert_node(&mut self, node: Arc<AgentNode>) -> Result<()> {
        let id = node.id().to_string();
        if id.is_empty() {
            return Err(NetError::EmptyNodeId);
        }
        if self.nodes.contains_key(&id) {
            return Err(NetError::DuplicateNode(id));
        }
        self.in_edges.insert(id.clone(), BTreeSet::new());
        self.out_edges.insert(id.clone(), BTreeSet::new());
        self.nodes.insert(id, node);
        Ok(())
    }

    /// Remove a node and every edge touching it
    pub fn remove_node(&mut self, id: &str) -> Option<Arc<AgentNode>> {
        let node = self.nodes.remove(id)?;
        for from in self.in_edges.remove(id).unwrap_or_default() {
            if let Some(out) = self.out_edges.get_mut(&from) {
                out.remove(id);
            }
        }
        for to in self.out_edges.remove(id).unwrap_or_default() {
            if let Some(ins) = self.in_edges.get_mut(&to) {
                ins.remove(id);
            }
        }
        Some(node)
    }

    /// Returns false if the edge was already present
    pub fn insert_edge(&mut self, from: &str, to: &str) -> Result<bool> {
        if from.is_empty() || to.is_empty() {
            return Err(NetError::EmptyEdgeEndpoint);
        }
        if !self.nodes.contains_key(from) {
            return Err(NetError::NodeNotFound(from.to_string()));
        }
        if !self.nodes.contains_key(to) {
            return Err(NetError::NodeNotFound(to.to_string()));
        }
        let added = self
            .out_edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
        self.in_edges
            .entry(to.to_string())
            .or_default()
            .insert(from.to_string());
        Ok(added)
    }

    /// Returns false if there was no such edge
    pub fn remove_edge(&mut self, from: &str, to: &str) -> bool {
        let removed = self
            .out_edges
            .get_mut(from)
            .is_some_and(|out| out.remove(to));
        if let Some(ins) = self.in_edges.get_mut(to) {
            ins.remove(from);
        }
        removed
    }

    pub fn node(&self, id: &str) -> Option<Arc<AgentNode>> {
        self.nodes.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.out_edges.get(from).is_some_and(|out| out.contains(to))
    }

    /// Outgoing neighbor ids of `id` in id order
    pub fn out_ids(&self, id: &str) -> Vec<String> {
        self.out_edges
            .get(id)
            .map(|out| out.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn resolve<'a>(&self, ids: impl Iterator<Item = &'a String>) -> Vec<Arc<AgentNode>> {
        ids.filter_map(|id| self.nodes.get(id).cloned()).collect()
    }

    pub fn in_nodes(&self, id: &str) -> Option<Vec<Arc<AgentNode>>> {
        if !self.nodes.contains_key(id) {
            return None;
        }
        Some(self.resolve(self.in_edges.get(id).into_iter().flatten()))
    }

    pub fn out_nodes(&self, id: &str) -> Option<Vec<Arc<AgentNode>>> {
        if !self.nodes.contains_key(id) {
            return None;
        }
        Some(self.resolve(self.out_edges.get(id).into_iter().flatten()))
    }

    /// All nodes in id order
    pub fn nodes(&self) -> Vec<Arc<AgentNode>> {
        let mut nodes: Vec<Arc<AgentNode>> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id().cmp(b.id()));
        nodes
    }

    /// All edges as (from, to) pairs in id order
    pub fn edges(&self) -> Vec<(String, String)> {
        let mut edges: Vec<(String, String)> = self
            .out_edges
            .iter()
            .flat_map(|(from, out)| out.iter().map(move |to| (from.clone(), to.clone())))
            .collect();
        edges.sort();
        edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedCapability;

    fn node(id: &str) -> Arc<AgentNode> {
        Arc::new(AgentNode::new(
            id.to_string(),
            ScriptedCapability::replying("ok"),
            4,
        ))
    }

    fn directory(ids: &[&str]) -> Directory {
        let mut dir = Directory::default();
        for id in ids {
            dir.insert_node(node(id)).unwrap();
        }
        dir
    }

    /// Both adjacency views agree and only mention registered nodes
    fn assert_consistent(dir: &Directory) {
        for (from, outs) in &dir.out_edges {
            assert!(dir.nodes.contains_key(from), "dangling out key {from}");
            for to in outs {
                assert!(dir.nodes.contains_key(to), "dangling edge {from}->{to}");
                assert!(dir.in_edges[to].contains(from), "missing in-edge {from}->{to}");
            }
        }
        for (to, ins) in &dir.in_edges {
            assert!(dir.nodes.contains_key(to), "dangling in key {to}");
            for from in ins {
                assert!(dir.out_edges[from].contains(to), "missing out-edge {from}->{to}");
            }
        }
    }

    #[test]
    fn test_insert_node_validation() {
        let mut dir = directory(&["A"]);
        assert_eq!(dir.insert_node(node("")), Err(NetError::EmptyNodeId));
        assert_eq!(
            dir.insert_node(node("A")),
            Err(NetError::DuplicateNode("A".into()))
        );
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_insert_edge_validation() {
        let mut dir = directory(&["A"]);
        assert_eq!(dir.insert_edge("", "A"), Err(NetError::EmptyEdgeEndpoint));
        assert_eq!(dir.insert_edge("A", ""), Err(NetError::EmptyEdgeEndpoint));
        assert_eq!(
            dir.insert_edge("A", "B"),
            Err(NetError::NodeNotFound("B".into()))
        );
        assert_eq!(
            dir.insert_edge("X", "A"),
            Err(NetError::NodeNotFound("X".into()))
        );
    }

    #[test]
    fn test_readding_edge_is_idempotent() {
        let mut dir = directory(&["A", "B"]);
        assert_eq!(dir.insert_edge("A", "B"), Ok(true));
        assert_eq!(dir.insert_edge("A", "B"), Ok(false));
        assert_eq!(dir.out_ids("A"), vec!["B".to_string()]);
        assert_eq!(dir.in_nodes("B").unwrap().len(), 1);
        assert_consistent(&dir);
    }

    #[test]
    fn test_self_loop_allowed() {
        let mut dir = directory(&["A"]);
        assert_eq!(dir.insert_edge("A", "A"), Ok(true));
        assert!(dir.has_edge("A", "A"));
        dir.remove_node("A");
        assert!(dir.edges().is_empty());
        assert_consistent(&dir);
    }

    #[test]
    fn test_remove_node_drops_touching_edges() {
        let mut dir = directory(&["A", "B", "C"]);
        dir.insert_edge("A", "B").unwrap();
        dir.insert_edge("B", "C").unwrap();
        dir.insert_edge("C", "B").unwrap();
        dir.insert_edge("A", "C").unwrap();

        assert!(dir.remove_node("B").is_some());
        assert!(!dir.contains("B"));
        assert_eq!(dir.edges(), vec![("A".to_string(), "C".to_string())]);
        assert_eq!(dir.out_ids("C"), Vec::<String>::new());
        assert_consistent(&dir);

        assert!(dir.remove_node("B").is_none());
    }

    #[test]
    fn test_remove_edge() {
        let mut dir = directory(&["A", "B"]);
        dir.insert_edge("A", "B").unwrap();
        dir.insert_edge("B", "A").unwrap();
        assert!(dir.remove_edge("A", "B"));
        assert!(!dir.remove_edge("A", "B"));
        assert!(!dir.remove_edge("X", "Y"));
        assert_eq!(dir.edges(), vec![("B".to_string(), "A".to_string())]);
        assert_consistent(&dir);
    }

    #[test]
    fn test_in_and_out_snapshots() {
        let mut dir = directory(&["A", "B", "C"]);
        dir.insert_edge("A", "C").unwrap();
        dir.insert_edge("A", "B").unwrap();
        dir.insert_edge("B", "C").unwrap();

        let outs: Vec<String> = dir
            .out_nodes("A")
            .unwrap()
            .iter()
            .map(|n| n.id().to_string())
            .collect();
        assert_eq!(outs, vec!["B", "C"]);

        let ins: Vec<String> = dir
            .in_nodes("C")
            .unwrap()
            .iter()
            .map(|n| n.id().to_string())
            .collect();
        assert_eq!(ins, vec!["A", "B"]);

        assert!(dir.out_nodes("missing").is_none());
        assert_eq!(dir.in_nodes("A").unwrap().len(), 0);
    }

    #[test]
    fn test_mutation_sequence_keeps_views_in_lock_step() {
        let ids = ["A", "B", "C", "D"];
        let mut dir = directory(&ids);
        let mut step = 0usize;
        for from in ids {
            for to in ids {
                step += 1;
                match step % 4 {
                    0 => {
                        dir.remove_edge(from, to);
                    }
                    3 => {
                        dir.remove_node(to);
                        dir.insert_node(node(to)).unwrap();
                    }
                    _ => {
                        dir.insert_edge(from, to).unwrap();
                    }
                }
                assert_consistent(&dir);
            }
        }
        assert_eq!(dir.len(), 4);
    }
}
