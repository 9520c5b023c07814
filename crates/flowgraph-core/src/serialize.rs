//! Document serialization: the open JSON interchange format for
//! diagrams.
//!
//! A document carries authored structure only (ids, types, positions,
//! properties). Runtime state, kind of a run in progress, is not part
//! of the format; loading a document yields a graph at its authored
//! baseline. Property records are open maps, so custom keys written by
//! other tools survive a round trip untouched.

use crate::connection::{Connection, ConnectionProps};
use crate::graph::Graph;
use crate::id::{ConnectionId, NodeId};
use crate::node::{Node, NodeProps};
use crate::registry::{ConnectionKind, NodeKind, StateKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while reading a document. Unknown type tags are hard
/// errors; everything inside a property record is tolerated and
/// defaulted instead.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),
    #[error("unknown connection type '{0}'")]
    UnknownConnectionType(String),
    #[error("unknown state connection subtype '{0}'")]
    UnknownStateType(String),
    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u64,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default = "empty_object")]
    pub properties: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: u64,
    #[serde(rename = "type")]
    pub connection_type: String,
    pub source: u64,
    pub target: u64,
    #[serde(default = "empty_object")]
    pub properties: Value,
}

/// A complete serialized diagram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

// ---------------------------------------------------------------------------
// Graph <-> Document
// ---------------------------------------------------------------------------

impl Graph {
    /// Serialize the authored structure to a document.
    pub fn to_document(&self) -> Document {
        Document {
            name: self.name.clone(),
            nodes: self
                .nodes()
                .map(|node| NodeRecord {
                    id: node.id.0,
                    node_type: node.kind().tag().to_string(),
                    x: node.x,
                    y: node.y,
                    properties: node.props.to_properties(),
                })
                .collect(),
            connections: self
                .connections()
                .map(|conn| ConnectionRecord {
                    id: conn.id.0,
                    connection_type: conn.kind().tag().to_string(),
                    source: conn.source.0,
                    target: conn.target.0,
                    properties: conn.props.to_properties(),
                })
                .collect(),
        }
    }

    /// Rebuild a graph from a document. Ids round-trip verbatim; the
    /// graph comes back at its authored baseline, ready to run.
    pub fn from_document(doc: Document) -> Result<Graph, DocumentError> {
        let mut graph = Graph::new();
        graph.name = doc.name;

        for record in doc.nodes {
            let kind = NodeKind::from_tag(&record.node_type)
                .ok_or_else(|| DocumentError::UnknownNodeType(record.node_type.clone()))?;
            let props = NodeProps::from_properties(kind, record.properties)?;
            graph.insert_node(Node::new(NodeId(record.id), props, record.x, record.y));
        }

        for record in doc.connections {
            let kind = ConnectionKind::from_tag(&record.connection_type).ok_or_else(|| {
                DocumentError::UnknownConnectionType(record.connection_type.clone())
            })?;
            if kind == ConnectionKind::StateConnection
                && let Some(tag) = record.properties.get("stateType").and_then(Value::as_str)
                && StateKind::from_tag(tag).is_none()
            {
                return Err(DocumentError::UnknownStateType(tag.to_string()));
            }
            let props = ConnectionProps::from_properties(kind, record.properties)?;
            graph.insert_connection(Connection::new(
                ConnectionId(record.id),
                NodeId(record.source),
                NodeId(record.target),
                props,
            ));
        }

        Ok(graph)
    }

    /// Serialize to a pretty JSON document string.
    pub fn to_json_string(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    /// Parse a JSON document string.
    pub fn from_json_str(json: &str) -> Result<Graph, DocumentError> {
        let doc: Document = serde_json::from_str(json)?;
        Graph::from_document(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::PoolProps;
    use serde_json::json;

    fn sample_json() -> String {
        json!({
            "name": "economy",
            "nodes": [
                { "id": 1, "type": "source", "x": 10.0, "y": 20.0,
                  "properties": { "name": "Mine", "production": 3 } },
                { "id": 2, "type": "pool", "x": 110.0, "y": 20.0,
                  "properties": { "name": "Store", "capacity": 50,
                                  "startValue": 5, "customColor": "gold" } },
                { "id": 7, "type": "drain", "x": 210.0, "y": 20.0,
                  "properties": {} }
            ],
            "connections": [
                { "id": 1, "type": "resourceConnection", "source": 1, "target": 2,
                  "properties": { "rate": 3 } },
                { "id": 4, "type": "stateConnection", "source": 2, "target": 3,
                  "properties": { "stateType": "activator", "formula": "> 10" } }
            ]
        })
        .to_string()
    }

    #[test]
    fn load_restores_structure_and_baseline() {
        let graph = Graph::from_json_str(&sample_json()).unwrap();
        assert_eq!(graph.name, "economy");
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.connection_count(), 2);

        let store = graph.node(NodeId(2)).unwrap();
        assert_eq!(store.name(), "Store");
        assert_eq!(store.resources, 5.0);
        assert_eq!((store.x, store.y), (110.0, 20.0));

        // Missing keys take catalog defaults.
        let drain = graph.node(NodeId(7)).unwrap();
        assert_eq!(drain.kind(), NodeKind::Drain);
        assert_eq!(drain.name(), "Drain");

        let flow = graph.connection(ConnectionId(1)).unwrap();
        assert_eq!(flow.source, NodeId(1));
        assert_eq!(flow.current_rate, crate::connection::Rate::Number(3.0));
    }

    #[test]
    fn ids_round_trip_verbatim() {
        let graph = Graph::from_json_str(&sample_json()).unwrap();
        let doc = graph.to_document();
        let node_ids: Vec<u64> = doc.nodes.iter().map(|n| n.id).collect();
        assert_eq!(node_ids, vec![1, 2, 7]);
        let conn_ids: Vec<u64> = doc.connections.iter().map(|c| c.id).collect();
        assert_eq!(conn_ids, vec![1, 4]);

        // New ids continue past the loaded ones.
        let mut graph = graph;
        let next = graph.add_node(NodeProps::defaults(NodeKind::Pool), 0.0, 0.0);
        assert_eq!(next, NodeId(8));
    }

    #[test]
    fn custom_property_keys_survive() {
        let graph = Graph::from_json_str(&sample_json()).unwrap();
        let json = graph.to_json_string().unwrap();
        let reloaded = Graph::from_json_str(&json).unwrap();
        let doc = reloaded.to_document();
        let store = doc.nodes.iter().find(|n| n.id == 2).unwrap();
        assert_eq!(store.properties["customColor"], "gold");
        assert_eq!(store.properties["capacity"], 50.0);
    }

    #[test]
    fn round_trip_preserves_behavior_not_runtime_state() {
        let mut graph = Graph::from_json_str(&sample_json()).unwrap();
        graph.node_mut(NodeId(2)).unwrap().resources = 42.0;
        graph.step_count = 9;

        let json = graph.to_json_string().unwrap();
        let reloaded = Graph::from_json_str(&json).unwrap();
        assert_eq!(reloaded.node(NodeId(2)).unwrap().resources, 5.0);
        assert_eq!(reloaded.step_count, 0);
    }

    #[test]
    fn unknown_node_type_is_a_hard_error() {
        let json = json!({
            "name": "bad",
            "nodes": [{ "id": 1, "type": "warpDrive", "x": 0.0, "y": 0.0,
                        "properties": {} }],
            "connections": []
        })
        .to_string();
        let err = Graph::from_json_str(&json).unwrap_err();
        assert!(matches!(err, DocumentError::UnknownNodeType(t) if t == "warpDrive"));
    }

    #[test]
    fn unknown_connection_and_state_types_are_hard_errors() {
        let json = json!({
            "nodes": [],
            "connections": [{ "id": 1, "type": "wormhole", "source": 1, "target": 2,
                              "properties": {} }]
        })
        .to_string();
        assert!(matches!(
            Graph::from_json_str(&json).unwrap_err(),
            DocumentError::UnknownConnectionType(t) if t == "wormhole"
        ));

        let json = json!({
            "nodes": [],
            "connections": [{ "id": 1, "type": "stateConnection", "source": 1, "target": 2,
                              "properties": { "stateType": "mindControl" } }]
        })
        .to_string();
        assert!(matches!(
            Graph::from_json_str(&json).unwrap_err(),
            DocumentError::UnknownStateType(t) if t == "mindControl"
        ));
    }

    #[test]
    fn malformed_json_reports_parse_error() {
        assert!(matches!(
            Graph::from_json_str("{ not json").unwrap_err(),
            DocumentError::Json(_)
        ));
    }

    #[test]
    fn dangling_endpoints_load_fine() {
        // The activator above points at node 3, which does not exist.
        // Documents are structural; the engine treats the connection as
        // inert.
        let graph = Graph::from_json_str(&sample_json()).unwrap();
        let conn = graph.connection(ConnectionId(4)).unwrap();
        assert_eq!(conn.target, NodeId(3));
        assert!(graph.node(NodeId(3)).is_none());
    }

    #[test]
    fn every_node_kind_round_trips() {
        let mut graph = Graph::new();
        for kind in NodeKind::ALL {
            graph.add_node(NodeProps::defaults(kind), 1.0, 2.0);
        }
        let json = graph.to_json_string().unwrap();
        let reloaded = Graph::from_json_str(&json).unwrap();
        assert_eq!(reloaded.node_count(), NodeKind::ALL.len());
        for (a, b) in graph.nodes().zip(reloaded.nodes()) {
            assert_eq!(a.kind(), b.kind());
            assert_eq!(a.props, b.props);
        }
    }

    #[test]
    fn empty_document_is_an_empty_graph() {
        let graph = Graph::from_json_str("{}").unwrap();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.connection_count(), 0);
        assert_eq!(graph.name, "");

        // But unnamed pools still pick up display names when added.
        let mut p = PoolProps::default();
        p.start_value = 1.0;
        let mut graph = graph;
        let id = graph.add_node(NodeProps::Pool(p), 0.0, 0.0);
        assert_eq!(graph.node(id).unwrap().name(), "Pool");
    }
}
