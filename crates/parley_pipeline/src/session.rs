//! Wiring a complete conversation from configuration.

use crate::generation::PromptGenerator;
use crate::memory::{EntityFacts, FactInterpolator};
use crate::pipeline::DialoguePipeline;
use crate::preprocess::SummarizingPreprocessor;
use anyhow::{Context, Result};
use parley_core::config::{FlowStrategy, ParleyConfig, PersonalityKind};
use parley_core::{ConditionCompiler, Container, EventBus, FactStore};
use parley_flow::{DialogueFlow, FsmEngine, GoapEngine};
use parley_personality::{BehaviorTree, Personality, RulePersonality};
use parley_providers::Ports;
use std::sync::Arc;

/// A pipeline together with the fact store and event bus it reacts to.
/// Hosts subscribe to `events` and seed `facts` before the first turn.
pub struct Session {
    pub facts: Arc<FactStore>,
    pub events: Arc<EventBus>,
    pub pipeline: DialoguePipeline,
}

impl Session {
    pub fn from_config(config: &ParleyConfig, ports: Ports) -> Result<Self> {
        let facts = Arc::new(FactStore::with_max_depth(config.facts.max_reaction_depth));
        let events = Arc::new(EventBus::with_max_depth(config.facts.max_reaction_depth));
        for (name, value) in &config.facts.initial {
            facts.set(name, value.clone());
        }

        let compiler = ConditionCompiler::new(facts.clone())
            .with_embedder(ports.embedder.clone())
            .with_sentiment(ports.sentiment.clone())
            .with_paraphraser(ports.paraphraser.clone())
            .with_paraphrasings(config.conditions.paraphrasings)
            .with_equality(config.conditions.equality);

        let flow_path = config
            .flow
            .path
            .as_ref()
            .context("No flow document configured (set [flow].path or PARLEY_FLOW_PATH)")?;
        let flow: Box<dyn DialogueFlow> = match config.flow.strategy {
            FlowStrategy::Fsm => Box::new(
                FsmEngine::load(flow_path, &compiler, events.clone())?
                    .with_thresholds(config.flow.threshold, config.flow.min_diff),
            ),
            FlowStrategy::Goap => Box::new(
                GoapEngine::load(flow_path, &compiler, events.clone())?
                    .with_action_threshold(config.flow.action_threshold)
                    .with_fallback(config.flow.fallback.clone()),
            ),
        };
        tracing::info!("Flow '{}' loaded from {}", flow.name(), flow_path.display());

        let personality: Option<Box<dyn Personality>> = match config.personality.kind {
            PersonalityKind::None => None,
            kind => {
                let path = config
                    .personality
                    .path
                    .as_ref()
                    .context("Personality enabled but [personality].path is not set")?;
                let personality: Box<dyn Personality> = match kind {
                    PersonalityKind::Rules => Box::new(
                        RulePersonality::load(path, &compiler, events.clone())?
                            .with_threshold(config.personality.default_threshold),
                    ),
                    _ => Box::new(
                        BehaviorTree::load(path, &compiler, events.clone())?
                            .with_condition_threshold(config.personality.condition_threshold),
                    ),
                };
                tracing::info!("Personality '{}' loaded from {}", personality.name(), path.display());
                Some(personality)
            }
        };

        let generation = PromptGenerator::new(ports.generator.clone())
            .with_history_limit(config.generation.history_limit);
        let mut pipeline = DialoguePipeline::new(flow, Box::new(generation))
            .with_memory_stage(Box::new(EntityFacts::new(ports.entities.clone(), facts.clone())))
            .with_memory_stage(Box::new(FactInterpolator::new(facts.clone())));
        if config.preprocess.enabled {
            pipeline = pipeline.with_preprocessor(Box::new(SummarizingPreprocessor::new(
                ports.summarizer.clone(),
                config.preprocess.min_input_words,
                config.preprocess.max_input_words,
            )));
        }
        if let Some(personality) = personality {
            pipeline = pipeline.with_personality(personality);
        }

        Ok(Self {
            facts,
            events,
            pipeline,
        })
    }

    pub fn evaluate(&mut self, input: &str) -> Result<String> {
        self.pipeline.evaluate(input)
    }

    pub fn run_turn(&mut self, input: &str) -> Result<(Container, String)> {
        self.pipeline.run_turn(input)
    }

    pub fn decide(&mut self, input: &str) -> Container {
        self.pipeline.decide(input)
    }
}
