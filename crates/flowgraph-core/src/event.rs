//! Step observation: flow events collected during a step and the
//! listener registry the engine notifies after each step.

use crate::id::{ConnectionId, NodeId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Flow events
// ---------------------------------------------------------------------------

/// A resource movement that happened during a step. One event per
/// non-zero transfer, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowEvent {
    pub connection: ConnectionId,
    pub amount: f64,
    pub source: NodeId,
    pub target: NodeId,
}

/// What a completed step did, returned from `Engine::step`.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// The step counter after this step.
    pub step: u64,
    pub flows: Vec<FlowEvent>,
    /// True when an end condition fired; the engine has already stopped.
    pub ended: bool,
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// Called after every completed step with the new step count and the
/// step's flow events.
pub type StepListener = Box<dyn FnMut(u64, &[FlowEvent])>;

/// Called once when an end condition stops the run.
pub type EndListener = Box<dyn FnMut(u64)>;

/// Listener registry. Listeners fire in registration order.
#[derive(Default)]
pub struct Listeners {
    on_step: Vec<StepListener>,
    on_end: Vec<EndListener>,
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("on_step", &self.on_step.len())
            .field("on_end", &self.on_end.len())
            .finish()
    }
}

impl Listeners {
    pub fn add_step_listener(&mut self, listener: StepListener) {
        self.on_step.push(listener);
    }

    pub fn add_end_listener(&mut self, listener: EndListener) {
        self.on_end.push(listener);
    }

    pub fn emit_step(&mut self, step: u64, flows: &[FlowEvent]) {
        for listener in &mut self.on_step {
            listener(step, flows);
        }
    }

    pub fn emit_end(&mut self, step: u64) {
        for listener in &mut self.on_end {
            listener(step);
        }
    }

    pub fn clear(&mut self) {
        self.on_step.clear();
        self.on_end.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn listeners_fire_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut listeners = Listeners::default();
        for tag in ["first", "second"] {
            let log = Rc::clone(&log);
            listeners.add_step_listener(Box::new(move |step, _| {
                log.borrow_mut().push((tag, step));
            }));
        }

        listeners.emit_step(3, &[]);
        assert_eq!(*log.borrow(), vec![("first", 3), ("second", 3)]);
    }

    #[test]
    fn step_listener_sees_flows() {
        let seen = Rc::new(RefCell::new(0usize));
        let mut listeners = Listeners::default();
        {
            let seen = Rc::clone(&seen);
            listeners.add_step_listener(Box::new(move |_, flows| {
                *seen.borrow_mut() = flows.len();
            }));
        }

        let flows = vec![FlowEvent {
            connection: ConnectionId(1),
            amount: 2.0,
            source: NodeId(1),
            target: NodeId(2),
        }];
        listeners.emit_step(1, &flows);
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn end_listener_receives_final_step() {
        let ended_at = Rc::new(RefCell::new(None));
        let mut listeners = Listeners::default();
        {
            let ended_at = Rc::clone(&ended_at);
            listeners.add_end_listener(Box::new(move |step| {
                *ended_at.borrow_mut() = Some(step);
            }));
        }

        listeners.emit_end(7);
        assert_eq!(*ended_at.borrow(), Some(7));
    }

    #[test]
    fn clear_drops_everything() {
        let mut listeners = Listeners::default();
        listeners.add_step_listener(Box::new(|_, _| panic!("should not fire")));
        listeners.clear();
        listeners.emit_step(1, &[]);
    }
}
