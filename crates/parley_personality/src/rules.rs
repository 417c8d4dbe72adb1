//! Flat rule personality.
//!
//! Rules are checked in declaration order. A rule only speaks up when the
//! turn leaves it room (`container.freedom <= rule.freedom`) and its
//! condition clears the threshold.

use crate::{push_description, score, InstructionMode, Personality};
use parley_core::document::{from_document, load_document};
use parley_core::{Condition, ConditionCompiler, ConfigError, Container, EventBus};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct RulesDocument {
    #[serde(default)]
    description: String,
    #[serde(default)]
    rules: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RuleDocument {
    condition: String,
    template: String,
    #[serde(default = "default_freedom")]
    freedom: f64,
    #[serde(default, rename = "type")]
    mode: InstructionMode,
    callback: Option<String>,
}

fn default_freedom() -> f64 {
    0.5
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub template: String,
    pub condition: Condition,
    /// Highest turn freedom at which the rule still applies.
    pub freedom: f64,
    pub mode: InstructionMode,
    pub callback: Option<String>,
}

pub struct RulePersonality {
    description: String,
    rules: Vec<Rule>,
    events: Arc<EventBus>,
    threshold: f64,
}

impl std::fmt::Debug for RulePersonality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RulePersonality")
            .field("description", &self.description)
            .field("rules", &self.rules)
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl RulePersonality {
    pub const DEFAULT_THRESHOLD: f64 = 0.8;

    pub fn load(
        path: impl AsRef<Path>,
        compiler: &ConditionCompiler,
        events: Arc<EventBus>,
    ) -> Result<Self, ConfigError> {
        Self::from_document(load_document(path)?, compiler, events)
    }

    pub fn from_document(
        document: Value,
        compiler: &ConditionCompiler,
        events: Arc<EventBus>,
    ) -> Result<Self, ConfigError> {
        let doc: RulesDocument = from_document("rules", document)?;
        let mut rules = Vec::with_capacity(doc.rules.len());
        for (name, raw) in doc.rules {
            let rule: RuleDocument = from_document("rules", raw)?;
            let condition = compiler
                .compile(&rule.condition)
                .map_err(|e| ConfigError::condition(format!("rule '{}'", name), e))?;
            rules.push(Rule {
                name,
                template: rule.template,
                condition,
                freedom: rule.freedom,
                mode: rule.mode,
                callback: rule.callback,
            });
        }
        tracing::info!("Loaded {} personality rules", rules.len());
        Ok(Self {
            description: doc.description,
            rules,
            events,
            threshold: Self::DEFAULT_THRESHOLD,
        })
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl Personality for RulePersonality {
    fn process(&self, container: &mut Container) {
        push_description(container, &self.description);

        for rule in &self.rules {
            if container.freedom > rule.freedom {
                continue;
            }
            let value = score(&rule.condition, &container.input);
            tracing::debug!("Rule '{}' scored {:.3}", rule.name, value);
            if value < self.threshold {
                continue;
            }
            match rule.mode {
                InstructionMode::Overwrite => {
                    tracing::info!("All instructions are overwritten to: '{}': {:.3}", rule.template, value)
                }
                InstructionMode::Insert => {
                    tracing::info!("Instruction is inserted: '{}': {:.3}", rule.template, value)
                }
            }
            rule.mode.apply(container, &rule.template);
            self.events.invoke_opt(rule.callback.as_deref());
        }
    }

    fn name(&self) -> &str {
        "rules"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::FactStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn personality(document: Value) -> RulePersonality {
        let compiler = ConditionCompiler::new(Arc::new(FactStore::new()));
        RulePersonality::from_document(document, &compiler, Arc::new(EventBus::new())).unwrap()
    }

    #[test]
    fn test_insert_then_overwrite() {
        let p = personality(json!({
            "description": "A grumpy blacksmith.",
            "rules": {
                "complain": { "condition": "0.9", "template": "Grumble about the heat." },
                "shout": { "condition": "0.85", "template": "Shout at the apprentice.", "type": "overwrite" }
            }
        }));
        let mut c = Container::new("hello", vec![]);
        c.set_pacing(0.5, 0.3);
        c.push_instruction("Greet the customer.");
        p.process(&mut c);
        assert_eq!(c.instructions, vec!["Shout at the apprentice."]);
        assert_eq!(c.personality, vec!["A grumpy blacksmith."]);
    }

    #[test]
    fn test_insert_appends_in_order() {
        let p = personality(json!({
            "rules": {
                "a": { "condition": "1", "template": "First." },
                "b": { "condition": "1", "template": "Second.", "type": "insert" }
            }
        }));
        let mut c = Container::new("hello", vec![]);
        p.process(&mut c);
        assert_eq!(c.instructions, vec!["First.", "Second."]);
        assert!(c.personality.is_empty());
    }

    #[test]
    fn test_freedom_ceiling() {
        let p = personality(json!({
            "rules": {
                "strict": { "condition": "1", "template": "Stay formal.", "freedom": 0.2 },
                "loose": { "condition": "1", "template": "Crack a joke.", "freedom": 0.9 }
            }
        }));
        let mut c = Container::new("hello", vec![]);
        c.set_pacing(0.5, 0.5);
        p.process(&mut c);
        assert_eq!(c.instructions, vec!["Crack a joke."]);

        let mut c = Container::new("hello", vec![]);
        c.set_pacing(0.5, 0.2);
        p.process(&mut c);
        assert_eq!(c.instructions, vec!["Stay formal.", "Crack a joke."]);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let p = personality(json!({
            "rules": {
                "edge": { "condition": "0.8", "template": "At the edge." },
                "below": { "condition": "0.79", "template": "Below." }
            }
        }));
        let mut c = Container::new("hello", vec![]);
        p.process(&mut c);
        assert_eq!(c.instructions, vec!["At the edge."]);

        let p = p.with_threshold(0.5);
        let mut c = Container::new("hello", vec![]);
        p.process(&mut c);
        assert_eq!(c.instructions, vec!["At the edge.", "Below."]);
    }

    #[test]
    fn test_firing_rule_invokes_callback() {
        let events = Arc::new(EventBus::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        events.subscribe("angered", move || {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let compiler = ConditionCompiler::new(Arc::new(FactStore::new()));
        let p = RulePersonality::from_document(
            json!({
                "rules": {
                    "fires": { "condition": "1", "template": "Get angry.", "callback": "angered" },
                    "quiet": { "condition": "0", "template": "Never.", "callback": "angered" }
                }
            }),
            &compiler,
            events,
        )
        .unwrap();
        p.process(&mut Container::new("insult", vec![]));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bad_rule_condition_names_rule() {
        let compiler = ConditionCompiler::new(Arc::new(FactStore::new()));
        let err = RulePersonality::from_document(
            json!({ "rules": { "broken": { "condition": "1 and", "template": "x" } } }),
            &compiler,
            Arc::new(EventBus::new()),
        )
        .unwrap_err();
        assert!(err.to_string().contains("rule 'broken'"));
    }

    #[test]
    fn test_unknown_mode_is_schema_error() {
        let compiler = ConditionCompiler::new(Arc::new(FactStore::new()));
        let err = RulePersonality::from_document(
            json!({ "rules": { "r": { "condition": "1", "template": "x", "type": "replace" } } }),
            &compiler,
            Arc::new(EventBus::new()),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Schema { .. }));
    }
}
