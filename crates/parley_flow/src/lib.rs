//! Dialogue flow engines.
//!
//! A flow engine decides, once per turn, what the agent is trying to do:
//! it sets the turn's urgency and freedom and appends instruction
//! templates to the [`Container`].

pub mod fsm;
pub mod goap;

pub use fsm::{select_transition, FsmEngine, State, Transition};
pub use goap::{Action, GoapEngine, Goal, Planner};

use parley_core::Container;

pub trait DialogueFlow: Send {
    /// Advance the flow by one turn.
    fn process(&mut self, container: &mut Container);

    /// Name for logging.
    fn name(&self) -> &str;
}
