use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-turn scratchpad threaded through every pipeline stage.
///
/// Created fresh for each input and discarded once the reply has been
/// generated. Flow engines reset `urgency`/`freedom`; every stage may edit
/// `instructions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub input: String,
    pub history: Vec<String>,
    pub urgency: f64,
    pub freedom: f64,
    /// Context snippets collected for the generator (not the FactStore).
    pub facts: Vec<String>,
    pub instructions: Vec<String>,
    pub personality: Vec<String>,
}

impl Default for Container {
    fn default() -> Self {
        Self {
            input: String::new(),
            history: Vec::new(),
            urgency: 0.5,
            freedom: 0.5,
            facts: Vec::new(),
            instructions: Vec::new(),
            personality: Vec::new(),
        }
    }
}

impl Container {
    pub fn new(input: impl Into<String>, history: Vec<String>) -> Self {
        Self {
            input: input.into(),
            history,
            ..Default::default()
        }
    }

    /// Set urgency and freedom together, clamped to [0, 1].
    pub fn set_pacing(&mut self, urgency: f64, freedom: f64) {
        self.urgency = urgency.clamp(0.0, 1.0);
        self.freedom = freedom.clamp(0.0, 1.0);
    }

    /// Append a template; empty templates carry no instruction.
    pub fn push_instruction(&mut self, template: &str) {
        if !template.is_empty() {
            self.instructions.push(template.to_string());
        }
    }

    /// Replace every instruction with `template`. An empty template clears the list.
    pub fn overwrite_instructions(&mut self, template: &str) {
        self.instructions.clear();
        self.push_instruction(template);
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Container(")?;
        writeln!(f, "  urgency={:.2},", self.urgency)?;
        writeln!(f, "  freedom={:.2},", self.freedom)?;
        writeln!(f, "  facts={:?},", self.facts)?;
        writeln!(f, "  instructions={:?},", self.instructions)?;
        writeln!(f, "  personality={:?}", self.personality)?;
        write!(f, ")")
    }
}
