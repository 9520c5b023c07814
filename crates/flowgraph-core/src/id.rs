use serde::{Deserialize, Serialize};

/// Identifies a node in the diagram graph. Assigned by the graph from a
/// monotonic counter, preserved verbatim across document round-trips.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeId(pub u64);

/// Identifies a connection (directed edge) in the diagram graph.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ConnectionId(pub u64);
