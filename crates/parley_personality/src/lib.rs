//! Personality layers.
//!
//! After the flow engine has chosen what to say, a personality decides how:
//! it adds a description of the agent and may insert or overwrite
//! instructions depending on the input and the turn's freedom.

pub mod behavior_tree;
pub mod rules;

pub use behavior_tree::{BehaviorTree, BtNode};
pub use rules::{Rule, RulePersonality};

use parley_core::{Condition, Container};
use serde::Deserialize;

pub trait Personality: Send + Sync {
    fn process(&self, container: &mut Container);

    /// Name for logging.
    fn name(&self) -> &str;
}

/// How a firing rule or action node edits the instruction list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionMode {
    #[default]
    #[serde(alias = "append")]
    Insert,
    Overwrite,
}

impl InstructionMode {
    pub fn apply(self, container: &mut Container, template: &str) {
        match self {
            InstructionMode::Insert => container.push_instruction(template),
            InstructionMode::Overwrite => container.overwrite_instructions(template),
        }
    }
}

/// Score a condition, treating evaluation failures as 0.
pub(crate) fn score(condition: &Condition, input: &str) -> f64 {
    match condition.eval(input) {
        Ok(score) => score,
        Err(e) => {
            tracing::warn!("Condition \"{}\" failed: {:#}", condition.source(), e);
            0.0
        }
    }
}

pub(crate) fn push_description(container: &mut Container, description: &str) {
    if !description.is_empty() {
        container.personality.push(description.to_string());
    }
}
