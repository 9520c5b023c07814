//! Nodes: typed vertices with a per-kind property payload and runtime
//! resource state.
//!
//! Property payloads are a tagged union: one strongly-typed struct per
//! [`NodeKind`], each carrying the catalog defaults plus a flattened
//! `extra` map so caller-supplied custom keys survive document
//! round-trips. Dispatch is by enum match, no trait objects.

use crate::connection::Rate;
use crate::id::NodeId;
use crate::registry::{ActivationMode, GateKind, NodeKind, PullMode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Per-kind property payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolProps {
    pub name: String,
    /// Maximum resources; a negative value means unbounded.
    pub capacity: f64,
    pub start_value: f64,
    pub activation_mode: ActivationMode,
    pub pull_mode: PullMode,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for PoolProps {
    fn default() -> Self {
        Self {
            name: String::new(),
            capacity: -1.0,
            start_value: 0.0,
            activation_mode: ActivationMode::Passive,
            pull_mode: PullMode::Pull,
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceProps {
    pub name: String,
    pub activation_mode: ActivationMode,
    /// Amount produced per activation; accepts mini-language text.
    pub production: Rate,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for SourceProps {
    fn default() -> Self {
        Self {
            name: String::new(),
            activation_mode: ActivationMode::Automatic,
            production: Rate::Number(1.0),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DrainProps {
    pub name: String,
    pub activation_mode: ActivationMode,
    /// Amount consumed per activation; accepts mini-language text.
    pub consumption: Rate,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for DrainProps {
    fn default() -> Self {
        Self {
            name: String::new(),
            activation_mode: ActivationMode::Automatic,
            consumption: Rate::Number(1.0),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConverterProps {
    pub name: String,
    pub input_rate: f64,
    pub output_rate: f64,
    pub activation_mode: ActivationMode,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for ConverterProps {
    fn default() -> Self {
        Self {
            name: String::new(),
            input_rate: 1.0,
            output_rate: 1.0,
            activation_mode: ActivationMode::Passive,
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GateProps {
    pub name: String,
    pub gate_type: GateKind,
    pub distribution: String,
    pub activation_mode: ActivationMode,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for GateProps {
    fn default() -> Self {
        Self {
            name: String::new(),
            gate_type: GateKind::Probabilistic,
            distribution: String::new(),
            activation_mode: ActivationMode::Passive,
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TraderProps {
    pub name: String,
    pub exchange_rate: f64,
    pub activation_mode: ActivationMode,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for TraderProps {
    fn default() -> Self {
        Self {
            name: String::new(),
            exchange_rate: 1.0,
            activation_mode: ActivationMode::Passive,
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterProps {
    pub name: String,
    /// Recomputed from `formula` every step, mirrored into resources.
    pub value: f64,
    pub formula: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for RegisterProps {
    fn default() -> Self {
        Self {
            name: String::new(),
            value: 0.0,
            formula: String::new(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndConditionProps {
    pub name: String,
    pub condition: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for EndConditionProps {
    fn default() -> Self {
        Self {
            name: String::new(),
            condition: String::new(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChartProps {
    pub name: String,
    pub max_data_points: usize,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for ChartProps {
    fn default() -> Self {
        Self {
            name: String::new(),
            max_data_points: 100,
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DelayProps {
    pub name: String,
    pub delay: u32,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for DelayProps {
    fn default() -> Self {
        Self {
            name: String::new(),
            delay: 3,
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueProps {
    pub name: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextLabelProps {
    pub name: String,
    pub text: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupProps {
    pub name: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

// ---------------------------------------------------------------------------
// NodeProps
// ---------------------------------------------------------------------------

/// Kind-tagged node property payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeProps {
    Pool(PoolProps),
    Source(SourceProps),
    Drain(DrainProps),
    Converter(ConverterProps),
    Gate(GateProps),
    Trader(TraderProps),
    Register(RegisterProps),
    EndCondition(EndConditionProps),
    Chart(ChartProps),
    Delay(DelayProps),
    Queue(QueueProps),
    TextLabel(TextLabelProps),
    Group(GroupProps),
}

impl NodeProps {
    /// Default payload for a node kind, per the type catalog.
    pub fn defaults(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Pool => NodeProps::Pool(PoolProps::default()),
            NodeKind::Source => NodeProps::Source(SourceProps::default()),
            NodeKind::Drain => NodeProps::Drain(DrainProps::default()),
            NodeKind::Converter => NodeProps::Converter(ConverterProps::default()),
            NodeKind::Gate => NodeProps::Gate(GateProps::default()),
            NodeKind::Trader => NodeProps::Trader(TraderProps::default()),
            NodeKind::Register => NodeProps::Register(RegisterProps::default()),
            NodeKind::EndCondition => NodeProps::EndCondition(EndConditionProps::default()),
            NodeKind::Chart => NodeProps::Chart(ChartProps::default()),
            NodeKind::Delay => NodeProps::Delay(DelayProps::default()),
            NodeKind::Queue => NodeProps::Queue(QueueProps::default()),
            NodeKind::TextLabel => NodeProps::TextLabel(TextLabelProps::default()),
            NodeKind::Group => NodeProps::Group(GroupProps::default()),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeProps::Pool(_) => NodeKind::Pool,
            NodeProps::Source(_) => NodeKind::Source,
            NodeProps::Drain(_) => NodeKind::Drain,
            NodeProps::Converter(_) => NodeKind::Converter,
            NodeProps::Gate(_) => NodeKind::Gate,
            NodeProps::Trader(_) => NodeKind::Trader,
            NodeProps::Register(_) => NodeKind::Register,
            NodeProps::EndCondition(_) => NodeKind::EndCondition,
            NodeProps::Chart(_) => NodeKind::Chart,
            NodeProps::Delay(_) => NodeKind::Delay,
            NodeProps::Queue(_) => NodeKind::Queue,
            NodeProps::TextLabel(_) => NodeKind::TextLabel,
            NodeProps::Group(_) => NodeKind::Group,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NodeProps::Pool(p) => &p.name,
            NodeProps::Source(p) => &p.name,
            NodeProps::Drain(p) => &p.name,
            NodeProps::Converter(p) => &p.name,
            NodeProps::Gate(p) => &p.name,
            NodeProps::Trader(p) => &p.name,
            NodeProps::Register(p) => &p.name,
            NodeProps::EndCondition(p) => &p.name,
            NodeProps::Chart(p) => &p.name,
            NodeProps::Delay(p) => &p.name,
            NodeProps::Queue(p) => &p.name,
            NodeProps::TextLabel(p) => &p.name,
            NodeProps::Group(p) => &p.name,
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        match self {
            NodeProps::Pool(p) => p.name = name,
            NodeProps::Source(p) => p.name = name,
            NodeProps::Drain(p) => p.name = name,
            NodeProps::Converter(p) => p.name = name,
            NodeProps::Gate(p) => p.name = name,
            NodeProps::Trader(p) => p.name = name,
            NodeProps::Register(p) => p.name = name,
            NodeProps::EndCondition(p) => p.name = name,
            NodeProps::Chart(p) => p.name = name,
            NodeProps::Delay(p) => p.name = name,
            NodeProps::Queue(p) => p.name = name,
            NodeProps::TextLabel(p) => p.name = name,
            NodeProps::Group(p) => p.name = name,
        }
    }

    /// Activation policy. Kinds without one in the catalog are passive.
    pub fn activation_mode(&self) -> ActivationMode {
        match self {
            NodeProps::Pool(p) => p.activation_mode,
            NodeProps::Source(p) => p.activation_mode,
            NodeProps::Drain(p) => p.activation_mode,
            NodeProps::Converter(p) => p.activation_mode,
            NodeProps::Gate(p) => p.activation_mode,
            NodeProps::Trader(p) => p.activation_mode,
            _ => ActivationMode::Passive,
        }
    }

    /// Pull policy, declared only on pools.
    pub fn pull_mode(&self) -> Option<PullMode> {
        match self {
            NodeProps::Pool(p) => Some(p.pull_mode),
            _ => None,
        }
    }

    /// Capacity, declared only on pools. Negative means unbounded.
    pub fn capacity(&self) -> Option<f64> {
        match self {
            NodeProps::Pool(p) => Some(p.capacity),
            _ => None,
        }
    }

    /// Initial resource quantity. Only pools declare one.
    pub fn start_value(&self) -> f64 {
        match self {
            NodeProps::Pool(p) => p.start_value,
            _ => 0.0,
        }
    }

    /// Serialize the payload to an open JSON property record.
    pub fn to_properties(&self) -> Value {
        let result = match self {
            NodeProps::Pool(p) => serde_json::to_value(p),
            NodeProps::Source(p) => serde_json::to_value(p),
            NodeProps::Drain(p) => serde_json::to_value(p),
            NodeProps::Converter(p) => serde_json::to_value(p),
            NodeProps::Gate(p) => serde_json::to_value(p),
            NodeProps::Trader(p) => serde_json::to_value(p),
            NodeProps::Register(p) => serde_json::to_value(p),
            NodeProps::EndCondition(p) => serde_json::to_value(p),
            NodeProps::Chart(p) => serde_json::to_value(p),
            NodeProps::Delay(p) => serde_json::to_value(p),
            NodeProps::Queue(p) => serde_json::to_value(p),
            NodeProps::TextLabel(p) => serde_json::to_value(p),
            NodeProps::Group(p) => serde_json::to_value(p),
        };
        result.unwrap_or(Value::Null)
    }

    /// Deserialize a payload of the given kind from a property record.
    /// Missing keys take catalog defaults; unknown keys land in `extra`.
    pub fn from_properties(kind: NodeKind, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            NodeKind::Pool => NodeProps::Pool(serde_json::from_value(value)?),
            NodeKind::Source => NodeProps::Source(serde_json::from_value(value)?),
            NodeKind::Drain => NodeProps::Drain(serde_json::from_value(value)?),
            NodeKind::Converter => NodeProps::Converter(serde_json::from_value(value)?),
            NodeKind::Gate => NodeProps::Gate(serde_json::from_value(value)?),
            NodeKind::Trader => NodeProps::Trader(serde_json::from_value(value)?),
            NodeKind::Register => NodeProps::Register(serde_json::from_value(value)?),
            NodeKind::EndCondition => NodeProps::EndCondition(serde_json::from_value(value)?),
            NodeKind::Chart => NodeProps::Chart(serde_json::from_value(value)?),
            NodeKind::Delay => NodeProps::Delay(serde_json::from_value(value)?),
            NodeKind::Queue => NodeProps::Queue(serde_json::from_value(value)?),
            NodeKind::TextLabel => NodeProps::TextLabel(serde_json::from_value(value)?),
            NodeKind::Group => NodeProps::Group(serde_json::from_value(value)?),
        })
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A typed vertex in the diagram graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    /// Layout position; never behavior-relevant.
    pub x: f64,
    pub y: f64,
    pub props: NodeProps,

    // -- Runtime state --
    /// Current resource quantity.
    pub resources: f64,
    /// Per-step activation flag.
    pub activated: bool,
    /// Per-step fired flag, cleared at end of every step.
    pub fired: bool,
    /// Chart-node time series keyed by source display name. Transient,
    /// never serialized.
    pub chart_data: BTreeMap<String, Vec<f64>>,
}

impl Node {
    /// Create a node. An empty name is replaced by the kind's display
    /// name; resources start at the declared `start_value`.
    pub fn new(id: NodeId, mut props: NodeProps, x: f64, y: f64) -> Self {
        if props.name().is_empty() {
            props.set_name(props.kind().display_name());
        }
        let resources = props.start_value();
        Self {
            id,
            x,
            y,
            props,
            resources,
            activated: false,
            fired: false,
            chart_data: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.props.kind()
    }

    pub fn name(&self) -> &str {
        self.props.name()
    }

    /// The node's value as seen by state connections and charts:
    /// a register reports its computed value, everything else its
    /// resource quantity.
    pub fn value(&self) -> f64 {
        match &self.props {
            NodeProps::Register(p) => p.value,
            _ => self.resources,
        }
    }

    /// Whether a deposit of `amount` fits. Drains accept anything,
    /// sources accept nothing, pools honor capacity, every other kind
    /// refuses deposits.
    pub fn can_accept(&self, amount: f64) -> bool {
        match self.kind() {
            NodeKind::Drain => true,
            NodeKind::Source => false,
            _ => match self.props.capacity() {
                Some(cap) if cap < 0.0 => true,
                Some(cap) => self.resources + amount <= cap,
                None => false,
            },
        }
    }

    /// Remaining room before capacity. Unbounded pools report infinity;
    /// kinds that refuse deposits report zero.
    pub fn headroom(&self) -> f64 {
        match self.kind() {
            NodeKind::Drain => f64::INFINITY,
            NodeKind::Source => 0.0,
            _ => match self.props.capacity() {
                Some(cap) if cap < 0.0 => f64::INFINITY,
                Some(cap) => (cap - self.resources).max(0.0),
                None => 0.0,
            },
        }
    }

    /// Deposit resources, clamping to capacity when one is declared.
    pub fn add_resources(&mut self, amount: f64) {
        self.resources += amount;
        if let Some(cap) = self.props.capacity()
            && cap >= 0.0
        {
            self.resources = self.resources.min(cap);
        }
    }

    /// Withdraw up to `amount`, returning what was actually removed.
    /// Sources supply infinitely.
    pub fn remove_resources(&mut self, amount: f64) -> f64 {
        if self.kind() == NodeKind::Source {
            return amount;
        }
        let removed = self.resources.min(amount);
        self.resources -= removed;
        removed
    }

    /// Restore runtime state to the post-construction baseline.
    pub fn reset_runtime(&mut self) {
        self.resources = self.props.start_value();
        self.activated = false;
        self.fired = false;
    }
}
