//! End-to-end scenarios for the flowgraph simulation engine.
//!
//! Each scenario builds a small diagram, runs it for a number of steps,
//! and checks observable outcomes: resource totals, stop behavior,
//! history round-trips, and determinism.

use flowgraph_core::connection::{ConnectionProps, Rate, ResourceProps, StateProps};
use flowgraph_core::engine::Engine;
use flowgraph_core::graph::Graph;
use flowgraph_core::history::History;
use flowgraph_core::id::NodeId;
use flowgraph_core::node::{
    DrainProps, EndConditionProps, GateProps, NodeProps, PoolProps, RegisterProps, SourceProps,
};
use flowgraph_core::registry::{ActivationMode, GateKind, NodeKind, StateKind};

// ===========================================================================
// Builders
// ===========================================================================

fn pool(graph: &mut Graph, name: &str, start: f64) -> NodeId {
    let mut p = PoolProps::default();
    p.name = name.to_string();
    p.start_value = start;
    graph.add_node(NodeProps::Pool(p), 0.0, 0.0)
}

fn source(graph: &mut Graph, name: &str, production: Rate) -> NodeId {
    let mut p = SourceProps::default();
    p.name = name.to_string();
    p.production = production;
    graph.add_node(NodeProps::Source(p), 0.0, 0.0)
}

fn drain(graph: &mut Graph, name: &str, consumption: Rate) -> NodeId {
    let mut p = DrainProps::default();
    p.name = name.to_string();
    p.consumption = consumption;
    graph.add_node(NodeProps::Drain(p), 0.0, 0.0)
}

fn connect(graph: &mut Graph, a: NodeId, b: NodeId, rate: Rate) {
    let mut p = ResourceProps::default();
    p.rate = rate;
    graph.add_connection(a, b, ConnectionProps::Resource(p));
}

// ===========================================================================
// Scenario 1: producer/consumer equilibrium
// ===========================================================================
//
// Source(3) --> Pool --> Drain(1). Net +2 per step.

#[test]
fn producer_consumer_net_flow() {
    let mut graph = Graph::new();
    let s = source(&mut graph, "Mine", Rate::Number(3.0));
    let p = pool(&mut graph, "Store", 0.0);
    let d = drain(&mut graph, "Use", Rate::Number(1.0));
    connect(&mut graph, s, p, Rate::Number(3.0));
    connect(&mut graph, p, d, Rate::Number(1.0));

    let mut engine = Engine::new(graph);
    engine.start();
    for _ in 0..6 {
        engine.step();
    }
    assert_eq!(engine.graph.node(p).unwrap().resources, 12.0);
    engine.step();
    assert_eq!(engine.graph.node(p).unwrap().resources, 14.0);
}

// ===========================================================================
// Scenario 2: capacity ceiling
// ===========================================================================

#[test]
fn bounded_pool_respects_capacity() {
    let mut graph = Graph::new();
    let s = source(&mut graph, "Tap", Rate::Number(1.0));
    let mut pp = PoolProps::default();
    pp.name = "Bucket".to_string();
    pp.capacity = 5.0;
    let p = graph.add_node(NodeProps::Pool(pp), 0.0, 0.0);
    connect(&mut graph, s, p, Rate::Number(1.0));

    let mut engine = Engine::new(graph);
    for _ in 0..20 {
        engine.step();
        let level = engine.graph.node(p).unwrap().resources;
        assert!(level <= 5.0, "capacity breached: {level}");
    }
    assert_eq!(engine.graph.node(p).unwrap().resources, 5.0);
}

#[test]
fn oversized_deposit_clamps_to_capacity() {
    let mut graph = Graph::new();
    let s = source(&mut graph, "Flood", Rate::Number(10.0));
    let mut pp = PoolProps::default();
    pp.name = "Bucket".to_string();
    pp.capacity = 5.0;
    let p = graph.add_node(NodeProps::Pool(pp), 0.0, 0.0);
    connect(&mut graph, s, p, Rate::Number(10.0));

    let mut engine = Engine::new(graph);
    engine.step();
    // A single step fills the pool to its ceiling, not beyond and not zero.
    assert_eq!(engine.graph.node(p).unwrap().resources, 5.0);
}

// ===========================================================================
// Scenario 3: register accumulator
// ===========================================================================
//
// A register with formula `self + 1` counts the steps.

#[test]
fn register_counts_steps() {
    let mut graph = Graph::new();
    let mut rp = RegisterProps::default();
    rp.name = "Counter".to_string();
    rp.formula = "self + 1".to_string();
    let reg = graph.add_node(NodeProps::Register(rp), 0.0, 0.0);

    let mut engine = Engine::new(graph);
    for _ in 0..5 {
        engine.step();
    }
    assert_eq!(engine.graph.node(reg).unwrap().value(), 5.0);
}

// ===========================================================================
// Scenario 4: end condition stops the run at the right step
// ===========================================================================
//
// Source(2) --> Pool; stop when {Pool} >= 5. Holds at 6, on step 3.

#[test]
fn end_condition_stops_at_step_three() {
    let mut graph = Graph::new();
    let s = source(&mut graph, "Feed", Rate::Number(2.0));
    let p = pool(&mut graph, "Pool", 0.0);
    connect(&mut graph, s, p, Rate::Number(2.0));
    let mut ep = EndConditionProps::default();
    ep.condition = "{Pool} >= 5".to_string();
    graph.add_node(NodeProps::EndCondition(ep), 0.0, 0.0);

    let mut engine = Engine::new(graph);
    engine.start();
    let mut steps = 0;
    loop {
        let report = engine.step();
        steps += 1;
        if report.ended {
            break;
        }
        assert!(steps < 100, "end condition never fired");
    }
    assert_eq!(steps, 3);
    assert!(!engine.is_running());
    // The final step still completed in full.
    assert_eq!(engine.graph.node(p).unwrap().resources, 6.0);
    assert_eq!(engine.graph.step_count, 3);
}

// ===========================================================================
// Scenario 5: gate loses refused resources
// ===========================================================================
//
// The gate withdraws its input rate whether or not any output can take
// the total. With no accepting output, the withdrawn resources vanish.

#[test]
fn gate_withdrawal_is_unconditional() {
    let mut graph = Graph::new();
    let a = pool(&mut graph, "In", 10.0);
    let gate = graph.add_node(NodeProps::defaults(NodeKind::Gate), 0.0, 0.0);
    let mut tiny = PoolProps::default();
    tiny.name = "Tiny".to_string();
    tiny.capacity = 1.0;
    let b = graph.add_node(NodeProps::Pool(tiny), 0.0, 0.0);
    connect(&mut graph, a, gate, Rate::Number(4.0));
    connect(&mut graph, gate, b, Rate::Number(1.0));

    let mut engine = Engine::new(graph);
    engine.step();
    // 4 withdrawn, 4 lost: the only output cannot accept the total.
    assert_eq!(engine.graph.node(a).unwrap().resources, 6.0);
    assert_eq!(engine.graph.node(b).unwrap().resources, 0.0);
    assert_eq!(engine.graph.total_resources(), 6.0);
}

// ===========================================================================
// Scenario 6: deterministic gate conserves its total
// ===========================================================================

#[test]
fn deterministic_gate_conserves_total() {
    let mut graph = Graph::new();
    let a = pool(&mut graph, "In", 9.0);
    let mut gp = GateProps::default();
    gp.gate_type = GateKind::Deterministic;
    let gate = graph.add_node(NodeProps::Gate(gp), 0.0, 0.0);
    let outs: Vec<NodeId> = (0..3)
        .map(|i| pool(&mut graph, &format!("Out{i}"), 0.0))
        .collect();
    connect(&mut graph, a, gate, Rate::Number(9.0));
    for &o in &outs {
        connect(&mut graph, gate, o, Rate::Number(1.0));
    }

    let mut engine = Engine::new(graph);
    engine.step();
    let distributed: f64 = outs
        .iter()
        .map(|&o| engine.graph.node(o).unwrap().resources)
        .sum();
    assert_eq!(distributed, 9.0);
    assert_eq!(engine.graph.node(a).unwrap().resources, 0.0);
}

// ===========================================================================
// Scenario 7: trial isolation via document snapshots
// ===========================================================================
//
// Loading the same document into two engines gives fully independent
// runs; neither perturbs the other or the document.

#[test]
fn trials_are_isolated() {
    let mut graph = Graph::new();
    let s = source(&mut graph, "Mine", Rate::Text("2d6".into()));
    let p = pool(&mut graph, "Store", 0.0);
    connect(&mut graph, s, p, Rate::Number(100.0));
    let json = graph.to_json_string().unwrap();

    let mut first = Engine::with_seed(Graph::from_json_str(&json).unwrap(), 1);
    let mut second = Engine::with_seed(Graph::from_json_str(&json).unwrap(), 2);
    for _ in 0..10 {
        first.step();
        second.step();
    }

    assert!(first.graph.node(p).unwrap().resources >= 20.0);
    assert_eq!(graph.node(p).unwrap().resources, 0.0);
    assert_eq!(json, graph.to_json_string().unwrap());
}

#[test]
fn same_document_same_seed_same_outcome() {
    let mut graph = Graph::new();
    let s = source(&mut graph, "Mine", Rate::Text("d20".into()));
    let p = pool(&mut graph, "Store", 0.0);
    connect(&mut graph, s, p, Rate::Number(100.0));
    let json = graph.to_json_string().unwrap();

    let run = |seed| {
        let mut engine = Engine::with_seed(Graph::from_json_str(&json).unwrap(), seed);
        for _ in 0..25 {
            engine.step();
        }
        engine.graph.node(p).unwrap().resources
    };
    assert_eq!(run(7), run(7));
}

// ===========================================================================
// Scenario 8: undo/redo over document snapshots
// ===========================================================================

#[test]
fn history_restores_earlier_documents() {
    let mut history = History::default();
    let mut graph = Graph::new();
    pool(&mut graph, "A", 1.0);

    // Snapshot, then mutate.
    history.push(graph.to_json_string().unwrap());
    pool(&mut graph, "B", 2.0);
    history.push(graph.to_json_string().unwrap());
    pool(&mut graph, "C", 3.0);

    // Undo twice: back to the single-pool document.
    let current = graph.to_json_string().unwrap();
    let one_back = history.undo(current).unwrap();
    let two_back = history.undo(one_back.clone()).unwrap();

    let restored = Graph::from_json_str(&two_back).unwrap();
    assert_eq!(restored.node_count(), 1);
    assert!(restored.find_node_by_name("A").is_some());

    // Redo returns the two-pool document.
    let forward = history.redo(two_back).unwrap();
    assert_eq!(forward, one_back);
    let restored = Graph::from_json_str(&forward).unwrap();
    assert_eq!(restored.node_count(), 2);
}

// ===========================================================================
// Scenario 9: activator-driven faucet
// ===========================================================================
//
// A pool fills while a watcher is below a threshold, then the activator
// shuts the receiving pool off.

#[test]
fn activator_shuts_off_flow() {
    let mut graph = Graph::new();
    let a = pool(&mut graph, "Tank", 100.0);
    let mut bp = PoolProps::default();
    bp.name = "Cup".to_string();
    bp.activation_mode = ActivationMode::Automatic;
    let b = graph.add_node(NodeProps::Pool(bp), 0.0, 0.0);
    connect(&mut graph, a, b, Rate::Number(1.0));

    let mut sp = StateProps::default();
    sp.state_type = StateKind::Activator;
    sp.formula = "< 3".to_string();
    graph.add_connection(b, b, ConnectionProps::State(sp));

    let mut engine = Engine::new(graph);
    for _ in 0..10 {
        engine.step();
    }
    // The cup reaches 3 and the activator stops further pulls.
    assert_eq!(engine.graph.node(b).unwrap().resources, 3.0);
}

// ===========================================================================
// Scenario 10: full document round trip through a run
// ===========================================================================

#[test]
fn loaded_documents_run_identically_to_built_graphs() {
    let mut graph = Graph::new();
    let s = source(&mut graph, "Mine", Rate::Number(2.0));
    let p = pool(&mut graph, "Store", 1.0);
    let d = drain(&mut graph, "Sink", Rate::Number(1.0));
    connect(&mut graph, s, p, Rate::Number(2.0));
    connect(&mut graph, p, d, Rate::Number(1.0));

    let json = graph.to_json_string().unwrap();
    let mut built = Engine::new(graph);
    let mut loaded = Engine::new(Graph::from_json_str(&json).unwrap());

    for _ in 0..15 {
        built.step();
        loaded.step();
        assert_eq!(
            built.graph.node(p).unwrap().resources,
            loaded.graph.node(p).unwrap().resources
        );
    }
}
