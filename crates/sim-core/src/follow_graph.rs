//! Follow Graph
//!
//! Directed follow edges between agents of one run, stored as adjacency sets
//! keyed by handle. Edges are only ever added.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-run record of which agents follow which handles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowGraph {
    /// Maps follower handle -> followed handles
    following: BTreeMap<String, BTreeSet<String>>,
}

impl FollowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `from` already follows `to`.
    pub fn follows(&self, from: &str, to: &str) -> bool {
        self.following
            .get(from)
            .map(|set| set.contains(to))
            .unwrap_or(false)
    }

    /// Adds the edge `from -> to`.
    ///
    /// Returns false, leaving the graph unchanged, for self-follows and
    /// edges that already exist.
    pub fn follow(&mut self, from: &str, to: &str) -> bool {
        if from == to {
            return false;
        }
        self.following
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string())
    }

    /// Handles followed by `agent`, empty if it follows nobody.
    pub fn following(&self, agent: &str) -> BTreeSet<String> {
        self.following.get(agent).cloned().unwrap_or_default()
    }

    /// Handles following `agent`.
    pub fn followers_of(&self, agent: &str) -> Vec<&str> {
        self.following
            .iter()
            .filter(|(_, set)| set.contains(agent))
            .map(|(from, _)| from.as_str())
            .collect()
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.following.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edge_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follow_adds_edge_once() {
        let mut graph = FollowGraph::new();
        assert!(graph.follow("a", "h"));
        assert!(!graph.follow("a", "h"));
        assert!(graph.follows("a", "h"));
        assert!(!graph.follows("h", "a"));
        assert_eq!(graph.following("a").len(), 1);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_self_follow_rejected() {
        let mut graph = FollowGraph::new();
        assert!(!graph.follow("a", "a"));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_mutual_follows() {
        let mut graph = FollowGraph::new();
        graph.follow("a", "b");
        graph.follow("b", "a");
        graph.follow("c", "a");
        assert_eq!(graph.followers_of("a"), vec!["b", "c"]);
        assert!(graph.following("nobody").is_empty());
    }

    #[test]
    fn test_serialized_shape() {
        let mut graph = FollowGraph::new();
        graph.follow("a", "c");
        graph.follow("a", "b");
        let json = serde_json::to_string(&graph).unwrap();
        assert_eq!(json, r#"{"following":{"a":["b","c"]}}"#);
        assert_eq!(serde_json::from_str::<FollowGraph>(&json).unwrap(), graph);
    }
}
