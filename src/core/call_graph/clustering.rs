// src/core/call_graph/clustering.rs
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use serde::{Deserialize, Serialize};

use super::{ContractGraph, Grouping};

/// Cluster key shared by every node that takes part in no call
pub const ISOLATED_CLUSTER: &str = "isolated";

/// Cluster key for scope grouping when a node carries no scope
pub const GLOBAL_CLUSTER: &str = "global";

/// Assignment of every node to exactly one cluster
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterMap {
    assignments: HashMap<String, String>,
    /// Cluster keys in the order they were assigned
    order: Vec<String>,
}

impl ClusterMap {
    fn assign(&mut self, node: &str, key: &str) {
        if !self.order.iter().any(|k| k == key) {
            self.order.push(key.to_string());
        }
        self.assignments.insert(node.to_string(), key.to_string());
    }

    pub fn cluster_of(&self, node: &str) -> Option<&str> {
        self.assignments.get(node).map(String::as_str)
    }

    /// Cluster keys in assignment order
    pub fn keys(&self) -> &[String] {
        &self.order
    }

    /// Position of a cluster key, used to pick its palette colour
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.order.iter().position(|k| k == key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Compute the cluster of every node in `graph`.
///
/// Connectivity grouping puts all nodes untouched by edges into one shared
/// cluster (assigned first), then numbers the connected components of the
/// undirected call graph. Touched nodes are visited in id order so the result
/// does not depend on the order of `graph.nodes`.
pub fn cluster(graph: &ContractGraph) -> ClusterMap {
    match graph.grouping {
        Grouping::ByScope => cluster_by_scope(graph),
        Grouping::Connectivity => cluster_by_connectivity(graph),
    }
}

fn cluster_by_scope(graph: &ContractGraph) -> ClusterMap {
    let mut map = ClusterMap::default();
    for node in &graph.nodes {
        let key = if node.origin_scope.is_empty() {
            GLOBAL_CLUSTER
        } else {
            node.origin_scope.as_str()
        };
        map.assign(&node.id, key);
    }
    map
}

fn cluster_by_connectivity(graph: &ContractGraph) -> ClusterMap {
    let node_ids: HashSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();

    let mut adjacency: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for edge in &graph.edges {
        // Only edges between known nodes connect anything
        if !node_ids.contains(edge.from.as_str()) || !node_ids.contains(edge.to.as_str()) {
            continue;
        }
        adjacency.entry(edge.from.as_str()).or_default().insert(edge.to.as_str());
        adjacency.entry(edge.to.as_str()).or_default().insert(edge.from.as_str());
    }

    let mut map = ClusterMap::default();

    for node in &graph.nodes {
        if !adjacency.contains_key(node.id.as_str()) {
            map.assign(&node.id, ISOLATED_CLUSTER);
        }
    }

    let touched: BTreeSet<&str> = adjacency.keys().copied().collect();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut component = 0;

    for &start in &touched {
        if visited.contains(start) {
            continue;
        }
        component += 1;
        let key = format!("component_{}", component);

        let mut queue = VecDeque::from([start]);
        visited.insert(start);
        while let Some(current) = queue.pop_front() {
            map.assign(current, &key);
            if let Some(neighbours) = adjacency.get(current) {
                for &next in neighbours {
                    if visited.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }
    }

    map
}
