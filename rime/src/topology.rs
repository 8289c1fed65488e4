// Rime: Runtime Verification of OpenFlow Forwarding Policies
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # Topology
//!
//! The node/edge/port graph of the managed network, parsed from a topology file of the form:
//!
//! ```text
//! s1 <-> h1-eth1 s2-eth2
//! s2 <-> h2-eth1 s1-eth2
//! ```
//!
//! The node in the first column is always a switch. Every other column names a neighbor; the
//! local port on which the switch reaches the neighbor in column `k` is `k - 1`, counted from
//! the `<->` column. Nodes prefixed `s` are switches, nodes prefixed `h` are hosts.

use crate::NodeId;

use petgraph::prelude::*;
use std::collections::HashMap;
use std::fs::read_to_string;
use thiserror::Error;

/// Data stored for every node in the topology graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Node identifier (the number after the `s`/`h` prefix)
    pub id: NodeId,
    /// True if the node is a switch, false if it is a host
    pub switch: bool,
}

/// The undirected node/edge/port graph of the managed network.
///
/// Every edge between a switch and one of its neighbors carries a port entry in at least the
/// switch's direction; `is_connected` is symmetric.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    graph: Graph<Node, (), Undirected, u32>,
    lookup: HashMap<NodeId, NodeIndex<u32>>,
    ports: HashMap<(NodeId, NodeId), u16>,
}

impl Topology {
    /// Create an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and parse a topology file.
    pub fn from_file(filename: impl AsRef<str>) -> Result<Self, TopologyError> {
        Self::from_str(&read_to_string(filename.as_ref())?)
    }

    /// Parse a topology from its textual representation.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(data: &str) -> Result<Self, TopologyError> {
        let mut topo = Self::new();

        for (i, line) in data.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();

            let switch = fields.next().ok_or(TopologyError::MissingSwitch(i))?;
            let (sid, is_switch) = parse_node(switch)
                .ok_or_else(|| TopologyError::InvalidNode { line: i, token: switch.to_string() })?;
            if !is_switch {
                return Err(TopologyError::NotASwitch { line: i, token: switch.to_string() });
            }
            topo.add_node(sid, true);

            match fields.next() {
                Some("<->") => {}
                _ => return Err(TopologyError::MissingSeparator(i)),
            }

            for (k, neighbor) in fields.enumerate() {
                // the neighbor column has the form `h3-eth1`; only the node part matters
                let name = neighbor.split('-').next().unwrap_or(neighbor);
                let (nid, n_switch) = parse_node(name).ok_or_else(|| TopologyError::InvalidNode {
                    line: i,
                    token: neighbor.to_string(),
                })?;
                topo.add_node(nid, n_switch);
                topo.add_edge(sid, nid);
                topo.set_port(sid, nid, (k + 1) as u16);
            }
        }

        Ok(topo)
    }

    /// Add a node to the topology. If the node already exists, its switch flag is left
    /// unchanged.
    pub fn add_node(&mut self, id: NodeId, switch: bool) {
        if !self.lookup.contains_key(&id) {
            let idx = self.graph.add_node(Node { id, switch });
            self.lookup.insert(id, idx);
        }
    }

    /// Add an undirected edge between two existing nodes. Self-loops and duplicate edges are
    /// ignored.
    pub fn add_edge(&mut self, a: NodeId, b: NodeId) {
        if a == b {
            return;
        }
        if let (Some(ia), Some(ib)) = (self.lookup.get(&a), self.lookup.get(&b)) {
            if self.graph.find_edge(*ia, *ib).is_none() {
                self.graph.add_edge(*ia, *ib, ());
            }
        }
    }

    /// Record the local port on which `node` reaches `neighbor`.
    pub fn set_port(&mut self, node: NodeId, neighbor: NodeId, port: u16) {
        self.ports.insert((node, neighbor), port);
    }

    /// The local port on which `node` reaches `neighbor`, if one was recorded.
    pub fn port(&self, node: NodeId, neighbor: NodeId) -> Option<u16> {
        self.ports.get(&(node, neighbor)).copied()
    }

    /// Returns true if the node is known and flagged as a switch.
    pub fn is_switch(&self, node: NodeId) -> bool {
        self.lookup
            .get(&node)
            .and_then(|idx| self.graph.node_weight(*idx))
            .map(|n| n.switch)
            .unwrap_or(false)
    }

    /// Returns true if there is an edge between the two nodes. Symmetric by construction.
    pub fn is_connected(&self, a: NodeId, b: NodeId) -> bool {
        match (self.lookup.get(&a), self.lookup.get(&b)) {
            (Some(ia), Some(ib)) => self.graph.find_edge(*ia, *ib).is_some(),
            _ => false,
        }
    }

    /// All switches adjacent to the given node.
    pub fn switch_neighbors(&self, node: NodeId) -> Vec<NodeId> {
        self.neighbors(node, true)
    }

    /// All hosts adjacent to the given node.
    pub fn host_neighbors(&self, node: NodeId) -> Vec<NodeId> {
        self.neighbors(node, false)
    }

    fn neighbors(&self, node: NodeId, switch: bool) -> Vec<NodeId> {
        let mut result = match self.lookup.get(&node) {
            Some(idx) => self
                .graph
                .neighbors(*idx)
                .filter_map(|n| self.graph.node_weight(n))
                .filter(|n| n.switch == switch)
                .map(|n| n.id)
                .collect::<Vec<_>>(),
            None => Vec::new(),
        };
        result.sort_unstable();
        result
    }

    /// All node ids in the topology, in ascending order.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut result: Vec<NodeId> = self.lookup.keys().copied().collect();
        result.sort_unstable();
        result
    }

    /// All switch ids in the topology, in ascending order.
    pub fn switches(&self) -> Vec<NodeId> {
        let mut result: Vec<NodeId> = self
            .graph
            .node_indices()
            .filter_map(|i| self.graph.node_weight(i))
            .filter(|n| n.switch)
            .map(|n| n.id)
            .collect();
        result.sort_unstable();
        result
    }

    /// Number of nodes in the topology.
    pub fn num_nodes(&self) -> usize {
        self.graph.node_count()
    }
}

/// Split a node token like `s12` or `h3` into its id and switch flag.
fn parse_node(token: &str) -> Option<(NodeId, bool)> {
    let mut chars = token.chars();
    let switch = match chars.next()? {
        's' => true,
        'h' => false,
        _ => return None,
    };
    chars.as_str().parse::<NodeId>().ok().map(|id| (id, switch))
}

/// Errors raised while parsing a topology file. All of them are fatal configuration errors.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// Io Error
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
    /// The line does not start with a node token
    #[error("Line {0} is missing the switch column!")]
    MissingSwitch(usize),
    /// The first column is not a switch
    #[error("First column of line {line} must be a switch: {token}")]
    NotASwitch {
        /// Line number of the offending line
        line: usize,
        /// The offending token
        token: String,
    },
    /// The line does not contain the `<->` separator
    #[error("Line {0} is missing the `<->` separator!")]
    MissingSeparator(usize),
    /// A node token is neither `s<N>` nor `h<N>`
    #[error("Invalid node token on line {line}: {token}")]
    InvalidNode {
        /// Line number of the offending line
        line: usize,
        /// The offending token
        token: String,
    },
}

#[cfg(test)]
mod test {
    use super::*;

    const TOPO: &str = "\
s1 <-> h4-eth1 s2-eth2
s2 <-> h5-eth1 s1-eth2 s3-eth3
s3 <-> s2-eth1
";

    #[test]
    fn parse_simple() {
        let topo = Topology::from_str(TOPO).unwrap();
        assert_eq!(topo.num_nodes(), 5);
        assert!(topo.is_switch(1));
        assert!(topo.is_switch(2));
        assert!(topo.is_switch(3));
        assert!(!topo.is_switch(4));
        assert!(!topo.is_switch(5));
        assert_eq!(topo.port(1, 4), Some(1));
        assert_eq!(topo.port(1, 2), Some(2));
        assert_eq!(topo.port(2, 3), Some(3));
        assert_eq!(topo.port(3, 2), Some(1));
        assert_eq!(topo.port(1, 3), None);
    }

    #[test]
    fn connectivity_is_symmetric() {
        let topo = Topology::from_str(TOPO).unwrap();
        for a in topo.nodes() {
            for b in topo.nodes() {
                assert_eq!(topo.is_connected(a, b), topo.is_connected(b, a));
            }
        }
        assert!(topo.is_connected(1, 2));
        assert!(!topo.is_connected(1, 3));
    }

    #[test]
    fn neighbors() {
        let topo = Topology::from_str(TOPO).unwrap();
        assert_eq!(topo.switch_neighbors(4), vec![1]);
        assert_eq!(topo.switch_neighbors(2), vec![1, 3]);
        assert_eq!(topo.host_neighbors(2), vec![5]);
        assert_eq!(topo.switches(), vec![1, 2, 3]);
    }

    #[test]
    fn duplicate_edges_ignored() {
        let mut topo = Topology::from_str(TOPO).unwrap();
        topo.add_edge(1, 2);
        topo.add_edge(2, 1);
        assert_eq!(topo.switch_neighbors(1), vec![2]);
    }

    #[test]
    fn reject_garbage() {
        assert!(Topology::from_str("s1 h1-eth1").is_err());
        assert!(Topology::from_str("h1 <-> s1-eth1").is_err());
        assert!(Topology::from_str("s1 <-> x1-eth1").is_err());
        assert!(Topology::from_str("sx <-> h1-eth1").is_err());
    }
}
