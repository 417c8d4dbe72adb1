use crate::generation::Generation;
use crate::memory::MemoryStage;
use crate::preprocess::Preprocessor;
use anyhow::Result;
use parley_core::Container;
use parley_flow::DialogueFlow;
use parley_personality::Personality;

/// One conversation: runs every stage over a fresh [`Container`] per turn
/// and keeps the running history.
pub struct DialoguePipeline {
    preprocessor: Option<Box<dyn Preprocessor>>,
    flow: Box<dyn DialogueFlow>,
    personality: Option<Box<dyn Personality>>,
    memory: Vec<Box<dyn MemoryStage>>,
    generation: Box<dyn Generation>,
    history: Vec<String>,
}

impl DialoguePipeline {
    pub fn new(flow: Box<dyn DialogueFlow>, generation: Box<dyn Generation>) -> Self {
        Self {
            preprocessor: None,
            flow,
            personality: None,
            memory: Vec::new(),
            generation,
            history: Vec::new(),
        }
    }

    pub fn with_preprocessor(mut self, preprocessor: Box<dyn Preprocessor>) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    pub fn with_personality(mut self, personality: Box<dyn Personality>) -> Self {
        self.personality = Some(personality);
        self
    }

    /// Memory stages run in the order they are added.
    pub fn with_memory_stage(mut self, stage: Box<dyn MemoryStage>) -> Self {
        self.memory.push(stage);
        self
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Run every stage except generation and return the finished container.
    pub fn decide(&mut self, input: &str) -> Container {
        let mut container = Container::new(input, self.history.clone());

        if let Some(preprocessor) = &self.preprocessor {
            preprocessor.process(&mut container);
        }
        self.flow.process(&mut container);
        tracing::debug!("After {}: {:?}", self.flow.name(), container.instructions);
        if let Some(personality) = &self.personality {
            personality.process(&mut container);
            tracing::debug!("After {}: {:?}", personality.name(), container.instructions);
        }
        for stage in &self.memory {
            stage.process(&mut container);
        }

        container
    }

    /// Full turn: decide, generate the reply, then record both sides in
    /// the history.
    pub fn evaluate(&mut self, input: &str) -> Result<String> {
        self.run_turn(input).map(|(_, output)| output)
    }

    /// Like [`evaluate`](Self::evaluate) but also hands back the container
    /// the reply was generated from.
    pub fn run_turn(&mut self, input: &str) -> Result<(Container, String)> {
        let container = self.decide(input);
        let output = self.generation.generate(&container)?;
        self.history.push(container.input.clone());
        self.history.push(output.clone());
        Ok((container, output))
    }
}
