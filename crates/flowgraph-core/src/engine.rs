//! The discrete-step simulation engine.
//!
//! The engine owns a [`Graph`] and advances it one step at a time
//! through a fixed pipeline of phases. A driver (UI loop, test, CLI)
//! calls [`Engine::step`] directly or on the cadence reported by
//! [`Engine::tick_interval_ms`]; the engine keeps no timer of its own.
//!
//! All randomness flows through the owned [`SimRng`], so a run is fully
//! reproducible from a seed and a document.

use crate::connection::{ConnectionProps, Rate};
use crate::eval::{self, EvalScope, ParsedRate};
use crate::event::{EndListener, FlowEvent, Listeners, StepListener, StepReport};
use crate::graph::Graph;
use crate::id::{ConnectionId, NodeId};
use crate::node::NodeProps;
use crate::registry::{ActivationMode, ConnectionKind, GateKind, NodeKind, PullMode, StateKind};
use crate::rng::SimRng;
use std::collections::BTreeMap;

/// Floor on the driver tick interval, whatever the speed says.
pub const MIN_TICK_MS: u64 = 50;

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Whether the engine considers itself running. Stepping is always
/// allowed; the state tells drivers whether to keep scheduling ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Engine {
    pub graph: Graph,
    run_state: RunState,
    /// Steps per second requested by the driver. Minimum 1.
    speed: u32,
    rng: SimRng,
    /// `/N` interval counters, keyed by the gated node. Cleared on
    /// reset.
    interval_counters: BTreeMap<NodeId, u32>,
    listeners: Listeners,
}

impl Engine {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            run_state: RunState::Idle,
            speed: 5,
            rng: SimRng::default(),
            interval_counters: BTreeMap::new(),
            listeners: Listeners::default(),
        }
    }

    /// An engine whose random stream is reproducible from `seed`.
    pub fn with_seed(graph: Graph, seed: u64) -> Self {
        let mut engine = Self::new(graph);
        engine.rng = SimRng::new(seed);
        engine
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn is_running(&self) -> bool {
        self.run_state == RunState::Running
    }

    pub fn speed(&self) -> u32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: u32) {
        self.speed = speed.max(1);
    }

    /// How often the driver should call [`step`](Self::step) while
    /// running, in milliseconds.
    pub fn tick_interval_ms(&self) -> u64 {
        (1000 / u64::from(self.speed)).max(MIN_TICK_MS)
    }

    /// Begin a run. On the very first step of a run, onStart nodes get
    /// their one-shot activation.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        if self.graph.step_count == 0 {
            for id in self.graph.node_ids() {
                if let Some(node) = self.graph.node_mut(id)
                    && node.props.activation_mode() == ActivationMode::OnStart
                {
                    node.activated = true;
                }
            }
        }
        self.run_state = RunState::Running;
    }

    pub fn stop(&mut self) {
        self.run_state = RunState::Idle;
    }

    /// Stop, restore the graph to its authored state, and forget every
    /// interval counter.
    pub fn reset(&mut self) {
        self.stop();
        self.graph.reset();
        self.interval_counters.clear();
    }

    /// Arm an interactive node for the next step. Ignored for every
    /// other activation mode.
    pub fn activate_interactive_node(&mut self, id: NodeId) {
        if let Some(node) = self.graph.node_mut(id)
            && node.props.activation_mode() == ActivationMode::Interactive
        {
            node.activated = true;
        }
    }

    pub fn on_step(&mut self, listener: StepListener) {
        self.listeners.add_step_listener(listener);
    }

    pub fn on_end(&mut self, listener: EndListener) {
        self.listeners.add_end_listener(listener);
    }

    // -----------------------------------------------------------------------
    // Step
    // -----------------------------------------------------------------------

    /// Run one simulation step through the full phase pipeline.
    pub fn step(&mut self) -> StepReport {
        let mut flows = Vec::new();

        // Phase 1: Activation -- automatic nodes arm themselves.
        self.phase_activate();

        // Phase 2: State connections -- registers, then label/node
        // modifiers and activators.
        self.phase_state_connections();

        // Phase 3: Resource flows between plain nodes.
        self.phase_resource_flows(&mut flows);

        // Phase 4: Converters.
        self.phase_converters(&mut flows);

        // Phase 5: Gates.
        self.phase_gates(&mut flows);

        // Phase 6: Sources.
        self.phase_sources(&mut flows);

        // Phase 7: Drains.
        self.phase_drains(&mut flows);

        // Phase 8: Charts.
        self.phase_charts();

        // Phase 9: End conditions.
        let ended = self.phase_end_conditions();

        // Phase 10: Triggers.
        self.phase_triggers();

        // Phase 11: Housekeeping -- counter, flag clearing.
        self.phase_housekeeping();

        let step = self.graph.step_count;
        self.listeners.emit_step(step, &flows);
        if ended {
            self.stop();
            self.listeners.emit_end(step);
        }
        StepReport { step, flows, ended }
    }

    // -----------------------------------------------------------------------
    // Phase 1: activation
    // -----------------------------------------------------------------------

    fn phase_activate(&mut self) {
        for id in self.graph.node_ids() {
            if let Some(node) = self.graph.node_mut(id)
                && node.props.activation_mode() == ActivationMode::Automatic
            {
                node.activated = true;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Phase 2: state connections
    // -----------------------------------------------------------------------

    fn phase_state_connections(&mut self) {
        // Registers first, so modifiers downstream see fresh values.
        for id in self.graph.node_ids() {
            let formula = match self.graph.node(id).map(|n| &n.props) {
                Some(NodeProps::Register(p)) if !p.formula.trim().is_empty() => p.formula.clone(),
                _ => continue,
            };
            let value = {
                let scope = EvalScope::new(&self.graph, Some(id));
                eval::evaluate_formula(&formula, &scope, &mut self.rng)
            };
            if let Some(node) = self.graph.node_mut(id) {
                if let NodeProps::Register(p) = &mut node.props {
                    p.value = value;
                }
                node.resources = value;
            }
        }

        for cid in self.graph.connection_ids() {
            let (state_type, formula, source, target) = match self.graph.connection(cid) {
                Some(conn) if conn.active => match &conn.props {
                    ConnectionProps::State(p) if p.state_type != StateKind::Trigger => {
                        (p.state_type, p.formula.clone(), conn.source, conn.target)
                    }
                    _ => continue,
                },
                _ => continue,
            };
            if self.graph.node(source).is_none() || self.graph.node(target).is_none() {
                continue;
            }
            match state_type {
                StateKind::LabelModifier => self.apply_label_modifier(source, target, &formula),
                StateKind::NodeModifier => self.apply_node_modifier(source, target, &formula),
                StateKind::Activator => self.apply_activator(source, target, &formula),
                // Triggers run in their own phase.
                StateKind::Trigger => {}
            }
        }
    }

    /// Source value, or the formula when one is given, evaluated with
    /// the source as context.
    fn modifier_value(&mut self, source: NodeId, formula: &str) -> f64 {
        if formula.trim().is_empty() {
            self.graph.node(source).map(|n| n.value()).unwrap_or(0.0)
        } else {
            let scope = EvalScope::new(&self.graph, Some(source));
            eval::evaluate_formula(formula, &scope, &mut self.rng)
        }
    }

    fn apply_label_modifier(&mut self, source: NodeId, target: NodeId, formula: &str) {
        let value = self.modifier_value(source, formula);
        let rate = ((value * 100.0).round() / 100.0).max(0.0);
        for cid in self
            .graph
            .outgoing(target, Some(ConnectionKind::ResourceConnection))
        {
            if let Some(conn) = self.graph.connection_mut(cid) {
                conn.current_rate = Rate::Number(rate);
            }
        }
    }

    fn apply_node_modifier(&mut self, source: NodeId, target: NodeId, formula: &str) {
        let value = self.modifier_value(source, formula);
        let rate = Rate::Number(value.round().max(0.0));
        match self.graph.node_mut(target).map(|n| &mut n.props) {
            Some(NodeProps::Source(p)) => p.production = rate,
            Some(NodeProps::Drain(p)) => p.consumption = rate,
            _ => {}
        }
    }

    fn apply_activator(&mut self, source: NodeId, target: NodeId, formula: &str) {
        let value = self.graph.node(source).map(|n| n.value()).unwrap_or(0.0);
        let active = eval::evaluate_condition(formula, value);
        if let Some(node) = self.graph.node_mut(target) {
            node.activated = active;
        }
    }

    // -----------------------------------------------------------------------
    // Phase 3: resource flows
    // -----------------------------------------------------------------------

    fn phase_resource_flows(&mut self, flows: &mut Vec<FlowEvent>) {
        for cid in self.graph.connection_ids() {
            let (source, target, rate) = match self.graph.connection(cid) {
                Some(conn)
                    if conn.active && conn.kind() == ConnectionKind::ResourceConnection =>
                {
                    (conn.source, conn.target, conn.current_rate.clone())
                }
                _ => continue,
            };
            let Some(src) = self.graph.node(source) else {
                continue;
            };
            let Some(tgt) = self.graph.node(target) else {
                continue;
            };

            // Sources, drains, converters and gates move resources in
            // their own phases.
            if matches!(
                src.kind(),
                NodeKind::Source | NodeKind::Converter | NodeKind::Gate
            ) || matches!(
                tgt.kind(),
                NodeKind::Drain | NodeKind::Converter | NodeKind::Gate
            ) {
                continue;
            }

            let mode = tgt
                .props
                .pull_mode()
                .or(src.props.pull_mode())
                .unwrap_or(PullMode::Pull);
            let fires = match mode {
                PullMode::Pull => tgt.activated,
                PullMode::Push => src.activated,
                PullMode::Any => src.activated || tgt.activated,
            };
            if !fires {
                continue;
            }

            let parsed = self.parse_rate(&rate, Some(source));
            self.transfer(source, target, cid, parsed, flows);
        }
    }

    fn parse_rate(&mut self, rate: &Rate, ctx: Option<NodeId>) -> ParsedRate {
        let scope = EvalScope::new(&self.graph, ctx);
        eval::parse_rate(rate, &scope, &mut self.rng)
    }

    fn transfer(
        &mut self,
        source: NodeId,
        target: NodeId,
        conn: ConnectionId,
        parsed: ParsedRate,
        flows: &mut Vec<FlowEvent>,
    ) {
        let mut amount = parsed.value;
        if amount <= 0.0 {
            return;
        }
        let (src_kind, available) = match self.graph.node(source) {
            Some(n) => (n.kind(), n.resources),
            None => return,
        };
        if parsed.all_or_nothing && src_kind != NodeKind::Source && available < amount {
            return;
        }
        let Some(tgt) = self.graph.node(target) else {
            return;
        };
        if !tgt.can_accept(amount) {
            if parsed.all_or_nothing {
                return;
            }
            amount = amount.min(tgt.headroom());
            if amount <= 0.0 {
                return;
            }
        }

        let removed = self
            .graph
            .node_mut(source)
            .map(|n| n.remove_resources(amount))
            .unwrap_or(0.0);
        if removed > 0.0 {
            if let Some(tgt) = self.graph.node_mut(target) {
                tgt.add_resources(removed);
            }
            flows.push(FlowEvent {
                connection: conn,
                amount: removed,
                source,
                target,
            });
        }
    }

    // -----------------------------------------------------------------------
    // Phase 4: converters
    // -----------------------------------------------------------------------

    fn phase_converters(&mut self, flows: &mut Vec<FlowEvent>) {
        for id in self.graph.node_ids() {
            let (input_rate, output_rate) = match self.graph.node(id).map(|n| &n.props) {
                Some(NodeProps::Converter(p)) => (p.input_rate, p.output_rate),
                _ => continue,
            };
            let inputs = self
                .graph
                .incoming(id, Some(ConnectionKind::ResourceConnection));
            let outputs = self
                .graph
                .outgoing(id, Some(ConnectionKind::ResourceConnection));
            if inputs.is_empty() || outputs.is_empty() {
                continue;
            }

            // A source endpoint counts as a full helping of input.
            let mut available = 0.0;
            for cid in &inputs {
                let Some(src) = self
                    .graph
                    .connection(*cid)
                    .and_then(|c| self.graph.node(c.source))
                else {
                    continue;
                };
                available += if src.kind() == NodeKind::Source {
                    input_rate
                } else {
                    src.resources.min(input_rate)
                };
            }
            if available < input_rate {
                continue;
            }

            // Withdraw exactly `input_rate`, greedily across inputs.
            let mut remaining = input_rate;
            for cid in inputs {
                if remaining <= 0.0 {
                    break;
                }
                let source = match self.graph.connection(cid) {
                    Some(c) => c.source,
                    None => continue,
                };
                let removed = self
                    .graph
                    .node_mut(source)
                    .map(|n| n.remove_resources(remaining))
                    .unwrap_or(0.0);
                remaining -= removed;
                if removed > 0.0 {
                    flows.push(FlowEvent {
                        connection: cid,
                        amount: removed,
                        source,
                        target: id,
                    });
                }
            }

            // Every accepting output receives the full output rate; the
            // broadcast is deliberately not split.
            for cid in outputs {
                let target = match self.graph.connection(cid) {
                    Some(c) => c.target,
                    None => continue,
                };
                let accepts = self
                    .graph
                    .node(target)
                    .map(|n| n.can_accept(output_rate))
                    .unwrap_or(false);
                if accepts && output_rate > 0.0 {
                    if let Some(tgt) = self.graph.node_mut(target) {
                        tgt.add_resources(output_rate);
                    }
                    flows.push(FlowEvent {
                        connection: cid,
                        amount: output_rate,
                        source: id,
                        target,
                    });
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Phase 5: gates
    // -----------------------------------------------------------------------

    fn phase_gates(&mut self, flows: &mut Vec<FlowEvent>) {
        for id in self.graph.node_ids() {
            let gate_type = match self.graph.node(id).map(|n| &n.props) {
                Some(NodeProps::Gate(p)) => p.gate_type,
                _ => continue,
            };
            let inputs = self
                .graph
                .incoming(id, Some(ConnectionKind::ResourceConnection));
            let outputs = self
                .graph
                .outgoing(id, Some(ConnectionKind::ResourceConnection));
            if inputs.is_empty() || outputs.is_empty() {
                continue;
            }

            // Withdraw every input's rate unconditionally.
            let mut total = 0.0;
            for cid in inputs {
                let (source, rate) = match self.graph.connection(cid) {
                    Some(c) => (c.source, c.current_rate.clone()),
                    None => continue,
                };
                if self.graph.node(source).is_none() {
                    continue;
                }
                let amount = self.parse_rate(&rate, Some(source)).value.max(0.0);
                let removed = self
                    .graph
                    .node_mut(source)
                    .map(|n| n.remove_resources(amount))
                    .unwrap_or(0.0);
                total += removed;
                if removed > 0.0 {
                    flows.push(FlowEvent {
                        connection: cid,
                        amount: removed,
                        source,
                        target: id,
                    });
                }
            }
            if total <= 0.0 {
                continue;
            }

            match gate_type {
                GateKind::Probabilistic => {
                    // One draw; equal buckets; a refused winner loses
                    // the whole total.
                    let idx = ((self.rng.next_f64() * outputs.len() as f64) as usize)
                        .min(outputs.len() - 1);
                    let cid = outputs[idx];
                    self.gate_deposit(id, cid, total, flows);
                }
                GateKind::Deterministic => {
                    let share = (total / outputs.len() as f64).floor();
                    let remainder = total - share * outputs.len() as f64;
                    for (k, cid) in outputs.into_iter().enumerate() {
                        let amount = share + if k == 0 { remainder } else { 0.0 };
                        if amount <= 0.0 {
                            continue;
                        }
                        self.gate_deposit(id, cid, amount, flows);
                    }
                }
            }
        }
    }

    /// Deposit a gate share along one output connection. A target that
    /// cannot accept the amount receives nothing; the share is
    /// destroyed.
    fn gate_deposit(
        &mut self,
        gate: NodeId,
        cid: ConnectionId,
        amount: f64,
        flows: &mut Vec<FlowEvent>,
    ) {
        let target = match self.graph.connection(cid) {
            Some(c) => c.target,
            None => return,
        };
        let accepts = self
            .graph
            .node(target)
            .map(|n| n.can_accept(amount))
            .unwrap_or(false);
        if accepts {
            if let Some(tgt) = self.graph.node_mut(target) {
                tgt.add_resources(amount);
            }
            flows.push(FlowEvent {
                connection: cid,
                amount,
                source: gate,
                target,
            });
        }
    }

    // -----------------------------------------------------------------------
    // Phase 6: sources
    // -----------------------------------------------------------------------

    fn phase_sources(&mut self, flows: &mut Vec<FlowEvent>) {
        for id in self.graph.node_ids() {
            let production = match self.graph.node(id) {
                Some(n) if n.activated => match &n.props {
                    NodeProps::Source(p) => p.production.clone(),
                    _ => continue,
                },
                _ => continue,
            };
            let parsed = self.parse_rate(&production, Some(id));
            if !self.interval_due(id, parsed.interval) {
                continue;
            }
            let production = parsed.value;

            for cid in self
                .graph
                .outgoing(id, Some(ConnectionKind::ResourceConnection))
            {
                let (target, rate, active) = match self.graph.connection(cid) {
                    Some(c) => (c.target, c.current_rate.clone(), c.active),
                    None => continue,
                };
                if !active || self.graph.node(target).is_none() {
                    continue;
                }
                let headroom = match self.graph.node(target) {
                    Some(n) => n.headroom(),
                    None => continue,
                };
                // Oversized deposits clamp to the target's remaining room.
                let amount = production
                    .min(self.parse_rate(&rate, Some(id)).value)
                    .min(headroom);
                if amount <= 0.0 {
                    continue;
                }
                if let Some(tgt) = self.graph.node_mut(target) {
                    tgt.add_resources(amount);
                }
                flows.push(FlowEvent {
                    connection: cid,
                    amount,
                    source: id,
                    target,
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Phase 7: drains
    // -----------------------------------------------------------------------

    fn phase_drains(&mut self, flows: &mut Vec<FlowEvent>) {
        for id in self.graph.node_ids() {
            let consumption = match self.graph.node(id) {
                Some(n) if n.activated => match &n.props {
                    NodeProps::Drain(p) => p.consumption.clone(),
                    _ => continue,
                },
                _ => continue,
            };
            let parsed = self.parse_rate(&consumption, Some(id));
            if !self.interval_due(id, parsed.interval) {
                continue;
            }
            let consumption = parsed.value;

            for cid in self
                .graph
                .incoming(id, Some(ConnectionKind::ResourceConnection))
            {
                let (source, rate, active) = match self.graph.connection(cid) {
                    Some(c) => (c.source, c.current_rate.clone(), c.active),
                    None => continue,
                };
                if !active || self.graph.node(source).is_none() {
                    continue;
                }
                let rate_parsed = self.parse_rate(&rate, Some(id));
                let amount = consumption.min(rate_parsed.value);
                if amount <= 0.0 {
                    continue;
                }
                // All-or-nothing refuses a partial withdrawal.
                let available = self.graph.node(source).map(|n| n.resources).unwrap_or(0.0);
                if rate_parsed.all_or_nothing && available < amount {
                    continue;
                }
                let removed = self
                    .graph
                    .node_mut(source)
                    .map(|n| n.remove_resources(amount))
                    .unwrap_or(0.0);
                if removed > 0.0 {
                    flows.push(FlowEvent {
                        connection: cid,
                        amount: removed,
                        source,
                        target: id,
                    });
                }
            }
        }
    }

    /// Advance the `/N` counter for a node; true when this step is on
    /// the beat.
    fn interval_due(&mut self, id: NodeId, interval: u32) -> bool {
        if interval <= 1 {
            return true;
        }
        let counter = self.interval_counters.entry(id).or_insert(0);
        *counter += 1;
        if *counter >= interval {
            *counter = 0;
            true
        } else {
            false
        }
    }

    // -----------------------------------------------------------------------
    // Phase 8: charts
    // -----------------------------------------------------------------------

    fn phase_charts(&mut self) {
        for id in self.graph.node_ids() {
            let max_points = match self.graph.node(id).map(|n| &n.props) {
                Some(NodeProps::Chart(p)) => p.max_data_points.max(1),
                _ => continue,
            };
            let mut samples = Vec::new();
            for cid in self
                .graph
                .incoming(id, Some(ConnectionKind::StateConnection))
            {
                let source = match self.graph.connection(cid) {
                    Some(c) => c.source,
                    None => continue,
                };
                if let Some(src) = self.graph.node(source) {
                    samples.push((src.name().to_string(), src.value()));
                }
            }
            if let Some(chart) = self.graph.node_mut(id) {
                for (name, value) in samples {
                    let series = chart.chart_data.entry(name).or_default();
                    series.push(value);
                    while series.len() > max_points {
                        series.remove(0);
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Phase 9: end conditions
    // -----------------------------------------------------------------------

    fn phase_end_conditions(&mut self) -> bool {
        for id in self.graph.node_ids() {
            let condition = match self.graph.node(id).map(|n| &n.props) {
                Some(NodeProps::EndCondition(p)) if !p.condition.trim().is_empty() => {
                    p.condition.clone()
                }
                _ => continue,
            };
            let value = {
                let scope = EvalScope::new(&self.graph, Some(id));
                eval::evaluate_formula(&condition, &scope, &mut self.rng)
            };
            if value != 0.0 {
                return true;
            }
        }
        false
    }

    // -----------------------------------------------------------------------
    // Phase 10: triggers
    // -----------------------------------------------------------------------

    /// Trigger state connections arm their target when the condition
    /// holds against the source value. The `active` flag is not
    /// consulted here.
    fn phase_triggers(&mut self) {
        for cid in self.graph.connection_ids() {
            let (condition, source, target) = match self.graph.connection(cid) {
                Some(conn) => match &conn.props {
                    ConnectionProps::State(p) if p.state_type == StateKind::Trigger => {
                        (p.condition.clone(), conn.source, conn.target)
                    }
                    _ => continue,
                },
                None => continue,
            };
            let Some(src) = self.graph.node(source) else {
                continue;
            };
            if self.graph.node(target).is_none() {
                continue;
            }
            if eval::evaluate_condition(&condition, src.value()) {
                if let Some(tgt) = self.graph.node_mut(target) {
                    tgt.activated = true;
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Phase 11: housekeeping
    // -----------------------------------------------------------------------

    fn phase_housekeeping(&mut self) {
        self.graph.step_count += 1;
        for id in self.graph.node_ids() {
            if let Some(node) = self.graph.node_mut(id) {
                node.fired = false;
                if node.props.activation_mode() == ActivationMode::OnStart {
                    node.activated = false;
                }
            }
        }
    }
}
