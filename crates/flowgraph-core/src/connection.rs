//! Connections: typed, directed edges between node identifiers.
//!
//! A *resource connection* carries quantity transfer with a declared rate
//! and a live `current_rate` that label modifiers may overwrite each step.
//! A *state connection* carries no quantity; it evaluates a formula or
//! condition and applies a side effect to its target.

use crate::id::{ConnectionId, NodeId};
use crate::registry::{ConnectionKind, StateKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Rate
// ---------------------------------------------------------------------------

/// A declared rate: either a plain number or a mini-language expression
/// (`"D6"`, `"&3"`, `"/2"`, `"{Pool} / 2"`). Untagged so documents may
/// store either a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rate {
    Number(f64),
    Text(String),
}

impl Rate {
    /// The numeric value, if this rate is a plain number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Rate::Number(n) => Some(*n),
            Rate::Text(_) => None,
        }
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::Number(1.0)
    }
}

impl From<f64> for Rate {
    fn from(n: f64) -> Self {
        Rate::Number(n)
    }
}

impl From<&str> for Rate {
    fn from(s: &str) -> Self {
        Rate::Text(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Property payloads
// ---------------------------------------------------------------------------

/// Properties of a resource connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceProps {
    pub rate: Rate,
    pub label: String,
    /// Caller-supplied custom keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for ResourceProps {
    fn default() -> Self {
        Self {
            rate: Rate::Number(1.0),
            label: String::new(),
            extra: BTreeMap::new(),
        }
    }
}

/// Properties of a state connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateProps {
    pub state_type: StateKind,
    pub formula: String,
    pub condition: String,
    pub label: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for StateProps {
    fn default() -> Self {
        Self {
            state_type: StateKind::LabelModifier,
            formula: String::new(),
            condition: String::new(),
            label: String::new(),
            extra: BTreeMap::new(),
        }
    }
}

/// Kind-tagged connection property payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionProps {
    Resource(ResourceProps),
    State(StateProps),
}

impl ConnectionProps {
    /// Default payload for a connection kind, per the type catalog.
    pub fn defaults(kind: ConnectionKind) -> Self {
        match kind {
            ConnectionKind::ResourceConnection => {
                ConnectionProps::Resource(ResourceProps::default())
            }
            ConnectionKind::StateConnection => ConnectionProps::State(StateProps::default()),
        }
    }

    pub fn kind(&self) -> ConnectionKind {
        match self {
            ConnectionProps::Resource(_) => ConnectionKind::ResourceConnection,
            ConnectionProps::State(_) => ConnectionKind::StateConnection,
        }
    }

    /// Serialize the payload to an open JSON property record.
    pub fn to_properties(&self) -> Value {
        match self {
            ConnectionProps::Resource(p) => {
                serde_json::to_value(p).unwrap_or(Value::Null)
            }
            ConnectionProps::State(p) => serde_json::to_value(p).unwrap_or(Value::Null),
        }
    }

    /// Deserialize a payload of the given kind from a property record.
    /// Missing keys fall back to catalog defaults; unknown keys land in
    /// the `extra` map.
    pub fn from_properties(
        kind: ConnectionKind,
        value: Value,
    ) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            ConnectionKind::ResourceConnection => {
                ConnectionProps::Resource(serde_json::from_value(value)?)
            }
            ConnectionKind::StateConnection => {
                ConnectionProps::State(serde_json::from_value(value)?)
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// A directed edge between two node identifiers. Endpoints are not
/// validated at creation; a connection whose endpoint is missing is
/// silently inert during simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub id: ConnectionId,
    pub source: NodeId,
    pub target: NodeId,
    pub props: ConnectionProps,

    // -- Runtime state, reset by `Graph::reset` --
    /// Live rate. Starts equal to the declared rate; label modifiers may
    /// overwrite it each step.
    pub current_rate: Rate,
    /// Boolean gate on the whole connection.
    pub active: bool,
}

impl Connection {
    pub fn new(id: ConnectionId, source: NodeId, target: NodeId, props: ConnectionProps) -> Self {
        let current_rate = Self::declared_rate_of(&props);
        Self {
            id,
            source,
            target,
            props,
            current_rate,
            active: true,
        }
    }

    pub fn kind(&self) -> ConnectionKind {
        self.props.kind()
    }

    /// The declared rate. State connections carry no quantity, so their
    /// declared rate is zero.
    pub fn declared_rate(&self) -> Rate {
        Self::declared_rate_of(&self.props)
    }

    fn declared_rate_of(props: &ConnectionProps) -> Rate {
        match props {
            ConnectionProps::Resource(p) => p.rate.clone(),
            ConnectionProps::State(_) => Rate::Number(0.0),
        }
    }

    /// The state subtype, if this is a state connection.
    pub fn state_kind(&self) -> Option<StateKind> {
        match &self.props {
            ConnectionProps::State(p) => Some(p.state_type),
            ConnectionProps::Resource(_) => None,
        }
    }

    /// Restore runtime state: live rate back to declared, active true.
    pub fn reset_runtime(&mut self) {
        self.current_rate = self.declared_rate();
        self.active = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_deserializes_from_number_or_string() {
        let n: Rate = serde_json::from_str("3").unwrap();
        assert_eq!(n, Rate::Number(3.0));
        let s: Rate = serde_json::from_str("\"2D6\"").unwrap();
        assert_eq!(s, Rate::Text("2D6".into()));
    }

    #[test]
    fn resource_defaults_from_empty_record() {
        let p: ResourceProps = serde_json::from_str("{}").unwrap();
        assert_eq!(p.rate, Rate::Number(1.0));
        assert!(p.label.is_empty());
        assert!(p.extra.is_empty());
    }

    #[test]
    fn custom_keys_survive_round_trip() {
        let json = r#"{"rate": 2, "colorFilter": "red"}"#;
        let p: ResourceProps = serde_json::from_str(json).unwrap();
        assert_eq!(p.extra["colorFilter"], Value::String("red".into()));

        let back = serde_json::to_value(&p).unwrap();
        assert_eq!(back["colorFilter"], Value::String("red".into()));
        assert_eq!(back["rate"], serde_json::json!(2.0));
    }

    #[test]
    fn current_rate_starts_at_declared() {
        let mut props = ResourceProps::default();
        props.rate = Rate::Text("D6".into());
        let conn = Connection::new(
            ConnectionId(1),
            NodeId(1),
            NodeId(2),
            ConnectionProps::Resource(props),
        );
        assert_eq!(conn.current_rate, Rate::Text("D6".into()));
        assert!(conn.active);
    }

    #[test]
    fn state_connection_declared_rate_is_zero() {
        let conn = Connection::new(
            ConnectionId(1),
            NodeId(1),
            NodeId(2),
            ConnectionProps::defaults(ConnectionKind::StateConnection),
        );
        assert_eq!(conn.declared_rate(), Rate::Number(0.0));
        assert_eq!(conn.state_kind(), Some(StateKind::LabelModifier));
    }

    #[test]
    fn reset_runtime_restores_rate_and_active() {
        let mut conn = Connection::new(
            ConnectionId(1),
            NodeId(1),
            NodeId(2),
            ConnectionProps::defaults(ConnectionKind::ResourceConnection),
        );
        conn.current_rate = Rate::Number(9.0);
        conn.active = false;
        conn.reset_runtime();
        assert_eq!(conn.current_rate, Rate::Number(1.0));
        assert!(conn.active);
    }
}
