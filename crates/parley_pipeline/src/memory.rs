//! Memory stages: bring world facts into the turn.

use parley_core::facts::is_truthy;
use parley_core::{Container, EntityExtractor, FactStore, FactValue};
use regex::{Captures, Regex};
use std::sync::{Arc, LazyLock};

static RE_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{(.*?)\}").unwrap());

pub trait MemoryStage: Send + Sync {
    fn process(&self, container: &mut Container);
}

/// Plain text form of a fact; falsy values render as nothing.
fn render(value: &FactValue) -> String {
    if !is_truthy(value) {
        return String::new();
    }
    match value {
        FactValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replaces `${name}` in every instruction with the named fact.
pub struct FactInterpolator {
    facts: Arc<FactStore>,
}

impl FactInterpolator {
    pub fn new(facts: Arc<FactStore>) -> Self {
        Self { facts }
    }

    pub fn interpolate(&self, template: &str) -> String {
        RE_PLACEHOLDER
            .replace_all(template, |caps: &Captures| render(&self.facts.get(&caps[1])))
            .into_owned()
    }
}

impl MemoryStage for FactInterpolator {
    fn process(&self, container: &mut Container) {
        for instruction in &mut container.instructions {
            *instruction = self.interpolate(instruction);
        }
    }
}

/// Adds `"entity: value"` snippets for entities that name a known fact.
pub struct EntityFacts {
    extractor: Arc<dyn EntityExtractor>,
    facts: Arc<FactStore>,
}

impl EntityFacts {
    pub fn new(extractor: Arc<dyn EntityExtractor>, facts: Arc<FactStore>) -> Self {
        Self { extractor, facts }
    }

    fn lookup(&self, entity: &str) -> Option<FactValue> {
        [entity.to_string(), entity.to_lowercase()]
            .into_iter()
            .filter(|name| self.facts.contains(name))
            .map(|name| self.facts.get(&name))
            .find(|value| !value.is_null())
    }
}

impl MemoryStage for EntityFacts {
    fn process(&self, container: &mut Container) {
        let texts: Vec<String> = std::iter::once(container.input.clone())
            .chain(container.instructions.iter().cloned())
            .collect();
        for text in texts {
            let entities = match self.extractor.extract_entities(&text) {
                Ok(entities) => entities,
                Err(e) => {
                    tracing::warn!("Entity extraction failed: {:#}", e);
                    continue;
                }
            };
            for entity in entities {
                let Some(value) = self.lookup(&entity) else {
                    continue;
                };
                let snippet = format!("{}: {}", entity, render(&value));
                if !container.facts.contains(&snippet) {
                    tracing::debug!("Fact for entity '{}' added", entity);
                    container.facts.push(snippet);
                }
            }
        }
    }
}
