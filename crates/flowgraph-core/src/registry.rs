//! Static catalogs of node and connection types.
//!
//! The catalogs are closed: every kind the simulator knows is an enum
//! variant here, with its serialized tag, display identity, visual shape,
//! and default property payload. Loading a document that names a tag
//! outside these catalogs is a hard error, the one place invalid input
//! is rejected rather than tolerated.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Node kinds
// ---------------------------------------------------------------------------

/// Every node type the simulator recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Pool,
    Source,
    Drain,
    Converter,
    Gate,
    Trader,
    Register,
    EndCondition,
    Chart,
    Delay,
    Queue,
    TextLabel,
    Group,
}

/// Visual shape of a node. Irrelevant to simulation, but part of the
/// catalog so renderers agree on identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Shape {
    Circle,
    TriangleUp,
    TriangleDown,
    TriangleRight,
    Diamond,
    Hexagon,
    Rect,
    DoubleCircle,
    ChartFrame,
    Clock,
    Stack,
    Text,
    Frame,
}

impl NodeKind {
    /// All registered node kinds, in catalog order.
    pub const ALL: [NodeKind; 13] = [
        NodeKind::Pool,
        NodeKind::Source,
        NodeKind::Drain,
        NodeKind::Converter,
        NodeKind::Gate,
        NodeKind::Trader,
        NodeKind::Register,
        NodeKind::EndCondition,
        NodeKind::Chart,
        NodeKind::Delay,
        NodeKind::Queue,
        NodeKind::TextLabel,
        NodeKind::Group,
    ];

    /// The serialized type tag used in diagram documents.
    pub fn tag(self) -> &'static str {
        match self {
            NodeKind::Pool => "pool",
            NodeKind::Source => "source",
            NodeKind::Drain => "drain",
            NodeKind::Converter => "converter",
            NodeKind::Gate => "gate",
            NodeKind::Trader => "trader",
            NodeKind::Register => "register",
            NodeKind::EndCondition => "endCondition",
            NodeKind::Chart => "chart",
            NodeKind::Delay => "delay",
            NodeKind::Queue => "queue",
            NodeKind::TextLabel => "textLabel",
            NodeKind::Group => "group",
        }
    }

    /// Look up a kind by its document tag. `None` means unregistered.
    pub fn from_tag(tag: &str) -> Option<NodeKind> {
        NodeKind::ALL.iter().copied().find(|k| k.tag() == tag)
    }

    /// Human-readable display name, also the default node name.
    pub fn display_name(self) -> &'static str {
        match self {
            NodeKind::Pool => "Pool",
            NodeKind::Source => "Source",
            NodeKind::Drain => "Drain",
            NodeKind::Converter => "Converter",
            NodeKind::Gate => "Gate",
            NodeKind::Trader => "Trader",
            NodeKind::Register => "Register",
            NodeKind::EndCondition => "End Condition",
            NodeKind::Chart => "Chart",
            NodeKind::Delay => "Delay",
            NodeKind::Queue => "Queue",
            NodeKind::TextLabel => "Label",
            NodeKind::Group => "Group",
        }
    }

    /// Catalog shape for this kind.
    pub fn shape(self) -> Shape {
        match self {
            NodeKind::Pool => Shape::Circle,
            NodeKind::Source => Shape::TriangleUp,
            NodeKind::Drain => Shape::TriangleDown,
            NodeKind::Converter => Shape::TriangleRight,
            NodeKind::Gate => Shape::Diamond,
            NodeKind::Trader => Shape::Hexagon,
            NodeKind::Register => Shape::Rect,
            NodeKind::EndCondition => Shape::DoubleCircle,
            NodeKind::Chart => Shape::ChartFrame,
            NodeKind::Delay => Shape::Clock,
            NodeKind::Queue => Shape::Stack,
            NodeKind::TextLabel => Shape::Text,
            NodeKind::Group => Shape::Frame,
        }
    }
}

// ---------------------------------------------------------------------------
// Connection kinds
// ---------------------------------------------------------------------------

/// The two connection families: quantity-carrying and side-effecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionKind {
    ResourceConnection,
    StateConnection,
}

impl ConnectionKind {
    /// The serialized type tag used in diagram documents.
    pub fn tag(self) -> &'static str {
        match self {
            ConnectionKind::ResourceConnection => "resourceConnection",
            ConnectionKind::StateConnection => "stateConnection",
        }
    }

    /// Look up a kind by its document tag. `None` means unregistered.
    pub fn from_tag(tag: &str) -> Option<ConnectionKind> {
        match tag {
            "resourceConnection" => Some(ConnectionKind::ResourceConnection),
            "stateConnection" => Some(ConnectionKind::StateConnection),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ConnectionKind::ResourceConnection => "Resource Connection",
            ConnectionKind::StateConnection => "State Connection",
        }
    }
}

/// Subtype of a state connection, selecting which side effect it applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StateKind {
    /// Rescales outgoing resource-connection rates of the target.
    LabelModifier,
    /// Rewrites a numeric property (production/consumption) of the target.
    NodeModifier,
    /// Forces target activation true/false from a condition.
    Activator,
    /// Forces target activation true when a condition holds; deferred to
    /// the end of the step.
    Trigger,
}

impl StateKind {
    /// Look up a subtype by its document tag. `None` means unregistered.
    pub fn from_tag(tag: &str) -> Option<StateKind> {
        match tag {
            "labelModifier" => Some(StateKind::LabelModifier),
            "nodeModifier" => Some(StateKind::NodeModifier),
            "activator" => Some(StateKind::Activator),
            "trigger" => Some(StateKind::Trigger),
            _ => None,
        }
    }
}

impl Default for StateKind {
    fn default() -> Self {
        StateKind::LabelModifier
    }
}

// ---------------------------------------------------------------------------
// Activation / pull modes
// ---------------------------------------------------------------------------

/// Per-step activation policy of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivationMode {
    /// Activated every step by the engine.
    Automatic,
    /// Activated by the driver (`activate_interactive_node`).
    Interactive,
    /// Activated only by activator/trigger state connections.
    Passive,
    /// Activated once, at the very first step of the graph's lifetime.
    OnStart,
}

impl Default for ActivationMode {
    fn default() -> Self {
        ActivationMode::Passive
    }
}

/// Which endpoint's activation makes a resource connection fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PullMode {
    /// Fires when the target is activated.
    Pull,
    /// Fires when the source is activated.
    Push,
    /// Fires when either endpoint is activated.
    Any,
}

impl Default for PullMode {
    fn default() -> Self {
        PullMode::Pull
    }
}

/// Distribution policy of a gate node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GateKind {
    /// One uniform draw picks a single winning output per step.
    Probabilistic,
    /// Floor-divided even split, remainder to the first output.
    Deterministic,
}

impl Default for GateKind {
    fn default() -> Self {
        GateKind::Probabilistic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_kinds_round_trip_through_tags() {
        for kind in NodeKind::ALL {
            assert_eq!(NodeKind::from_tag(kind.tag()), Some(kind));
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!(NodeKind::from_tag("widget"), None);
        assert_eq!(ConnectionKind::from_tag("teleporter"), None);
    }

    #[test]
    fn tags_match_serde_names() {
        for kind in NodeKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.tag()));
        }
    }

    #[test]
    fn connection_tags_match_serde_names() {
        for kind in [
            ConnectionKind::ResourceConnection,
            ConnectionKind::StateConnection,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.tag()));
        }
    }

    #[test]
    fn every_kind_has_a_display_name_and_shape() {
        for kind in NodeKind::ALL {
            assert!(!kind.display_name().is_empty());
            let _ = kind.shape();
        }
    }

    #[test]
    fn defaults_match_catalog() {
        assert_eq!(ActivationMode::default(), ActivationMode::Passive);
        assert_eq!(PullMode::default(), PullMode::Pull);
        assert_eq!(GateKind::default(), GateKind::Probabilistic);
        assert_eq!(StateKind::default(), StateKind::LabelModifier);
    }

    #[test]
    fn state_kind_serde_tags() {
        assert_eq!(
            serde_json::to_string(&StateKind::LabelModifier).unwrap(),
            "\"labelModifier\""
        );
        assert_eq!(
            serde_json::from_str::<StateKind>("\"trigger\"").unwrap(),
            StateKind::Trigger
        );
    }
}
