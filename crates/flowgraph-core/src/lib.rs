//! Flowgraph Core -- a resource-economy diagram simulator.
//!
//! Diagrams are directed graphs of typed nodes (pools, sources, drains,
//! converters, gates, registers, and friends) joined by resource and
//! state connections. The engine advances a diagram in discrete steps,
//! moving quantities along resource connections and applying state
//! connections as modifiers, activators, and triggers.
//!
//! # Eleven-Phase Step Pipeline
//!
//! Each call to [`engine::Engine::step`] advances the diagram by one
//! step through the following phases:
//!
//! 1. **Activation** -- Automatic nodes arm themselves.
//! 2. **State connections** -- Registers recompute, then label/node
//!    modifiers and activators apply.
//! 3. **Resource flows** -- Transfers between plain nodes, gated by
//!    pull/push mode and activation.
//! 4. **Converters** -- Consume a fixed input helping, broadcast output.
//! 5. **Gates** -- Collect inputs, route the total to outputs.
//! 6. **Sources** -- Produce into outgoing connections.
//! 7. **Drains** -- Consume from incoming connections.
//! 8. **Charts** -- Sample observed values into time series.
//! 9. **End conditions** -- Decide whether the run stops.
//! 10. **Triggers** -- Arm targets for the next step.
//! 11. **Housekeeping** -- Step counter and flag clearing.
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- Simulation engine and pipeline orchestrator.
//! - [`graph::Graph`] -- The diagram: nodes, connections, step counter.
//! - [`node::NodeProps`] / [`connection::ConnectionProps`] -- Kind-tagged
//!   property payloads with open `extra` maps for custom keys.
//! - [`eval`] -- The rate/formula mini-language (`&`, `/N`, `2D6`,
//!   `{name}`, `self`) over the restricted [`expr`] evaluator.
//! - [`history::History`] -- Bounded undo/redo of document snapshots.
//! - [`serialize`] -- The open JSON document format.
//! - [`rng::SimRng`] -- Seedable generator; a seed and a document
//!   reproduce a run exactly.

pub mod connection;
pub mod engine;
pub mod eval;
pub mod event;
pub mod expr;
pub mod graph;
pub mod history;
pub mod id;
pub mod node;
pub mod registry;
pub mod rng;
pub mod serialize;
