//! The diagram graph: the single source of truth for nodes, connections,
//! and the step counter. The engine reads and mutates it through this
//! surface and never holds graph state of its own.

use crate::connection::{Connection, ConnectionProps};
use crate::id::{ConnectionId, NodeId};
use crate::node::{Node, NodeProps};
use crate::registry::ConnectionKind;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Owns every node and connection, keyed by monotonically assigned ids.
/// BTreeMaps give deterministic iteration in id (insertion) order.
#[derive(Debug, Clone)]
pub struct Graph {
    /// Display name carried into serialized documents.
    pub name: String,
    nodes: BTreeMap<NodeId, Node>,
    connections: BTreeMap<ConnectionId, Connection>,
    /// Discrete step counter, incremented once per completed step.
    pub step_count: u64,
    next_node: u64,
    next_connection: u64,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Create a new, empty graph.
    pub fn new() -> Self {
        Self {
            name: "diagram".to_string(),
            nodes: BTreeMap::new(),
            connections: BTreeMap::new(),
            step_count: 0,
            next_node: 1,
            next_connection: 1,
        }
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Add a node with the given payload and position. Returns its id.
    pub fn add_node(&mut self, props: NodeProps, x: f64, y: f64) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.insert(id, Node::new(id, props, x, y));
        id
    }

    /// Insert a pre-built node, preserving its id. Used by document
    /// loading. Bumps the id counter past the inserted id.
    pub(crate) fn insert_node(&mut self, node: Node) {
        self.next_node = self.next_node.max(node.id.0 + 1);
        self.nodes.insert(node.id, node);
    }

    /// Remove a node, cascading removal of every connection touching it.
    /// Returns the ids of the cascaded connections. Removing a missing
    /// node removes nothing.
    pub fn remove_node(&mut self, id: NodeId) -> Vec<ConnectionId> {
        let cascaded: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| c.source == id || c.target == id)
            .map(|c| c.id)
            .collect();
        for cid in &cascaded {
            self.connections.remove(cid);
        }
        self.nodes.remove(&id);
        cascaded
    }

    /// Add a connection between two node identifiers. Endpoints are not
    /// validated; a dangling connection is inert during simulation.
    pub fn add_connection(
        &mut self,
        source: NodeId,
        target: NodeId,
        props: ConnectionProps,
    ) -> ConnectionId {
        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        self.connections
            .insert(id, Connection::new(id, source, target, props));
        id
    }

    /// Insert a pre-built connection, preserving its id.
    pub(crate) fn insert_connection(&mut self, connection: Connection) {
        self.next_connection = self.next_connection.max(connection.id.0 + 1);
        self.connections.insert(connection.id, connection);
    }

    /// Remove a connection. Removing a missing connection is a no-op.
    pub fn remove_connection(&mut self, id: ConnectionId) {
        self.connections.remove(&id);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    /// Connections whose target is `id`, optionally filtered by kind.
    pub fn incoming(&self, id: NodeId, kind: Option<ConnectionKind>) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|c| c.target == id && kind.is_none_or(|k| c.kind() == k))
            .map(|c| c.id)
            .collect()
    }

    /// Connections whose source is `id`, optionally filtered by kind.
    pub fn outgoing(&self, id: NodeId, kind: Option<ConnectionKind>) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|c| c.source == id && kind.is_none_or(|k| c.kind() == k))
            .map(|c| c.id)
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Iterate over all nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Iterate over all node ids in id order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    /// Iterate over all connections in id order.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Iterate over all connection ids in id order.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    /// First node (by iteration order) whose display name matches
    /// exactly.
    pub fn find_node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.values().find(|n| n.name() == name)
    }

    /// Sum of all finite resource quantities. Non-finite values are
    /// excluded, never poisoning the total.
    pub fn total_resources(&self) -> f64 {
        self.nodes
            .values()
            .map(|n| n.resources)
            .filter(|r| r.is_finite())
            .sum()
    }

    // -----------------------------------------------------------------------
    // Reset
    // -----------------------------------------------------------------------

    /// Restore every node's resources to its start value, clear
    /// activation/fired flags, restore every connection's live rate and
    /// active flag, and zero the step counter. Chart series are left
    /// alone.
    pub fn reset(&mut self) {
        for node in self.nodes.values_mut() {
            node.reset_runtime();
        }
        for conn in self.connections.values_mut() {
            conn.reset_runtime();
        }
        self.step_count = 0;
    }
}
