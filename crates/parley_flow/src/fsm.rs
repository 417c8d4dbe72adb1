//! Finite-state dialogue flow.
//!
//! Each state lists guarded transitions. Every turn all transitions of the
//! current state are scored against the input; the best one fires only if
//! it clears the threshold and leads the runner-up by a clear margin.

use crate::DialogueFlow;
use parley_core::document::{from_document, load_document};
use parley_core::{Condition, ConditionCompiler, ConfigError, Container, EventBus};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

// ============================================================================
// Document schema
// ============================================================================

#[derive(Debug, Deserialize)]
struct FsmDocument {
    initial_state: Option<String>,
    /// Kept as a raw map so declaration order survives.
    states: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct StateDocument {
    #[serde(default = "half")]
    urgency: f64,
    #[serde(default = "half")]
    freedom: f64,
    #[serde(default)]
    template: String,
    on_enter: Option<String>,
    on_exit: Option<String>,
    #[serde(default)]
    transitions: Vec<TransitionDocument>,
}

#[derive(Debug, Deserialize)]
struct TransitionDocument {
    to: String,
    condition: String,
    #[serde(default = "half")]
    urgency: f64,
    #[serde(default)]
    freedom: f64,
    #[serde(default)]
    template: String,
    /// Older documents spell the transition event `on_exit`.
    #[serde(alias = "on_exit")]
    on_enter: Option<String>,
}

fn half() -> f64 {
    0.5
}

// ============================================================================
// Loaded machine
// ============================================================================

#[derive(Debug, Clone)]
pub struct Transition {
    /// Index of the target state.
    pub to: usize,
    pub urgency: f64,
    pub freedom: f64,
    pub template: String,
    pub condition: Condition,
    pub on_enter: Option<String>,
}

#[derive(Debug, Clone)]
pub struct State {
    pub name: String,
    pub urgency: f64,
    pub freedom: f64,
    pub template: String,
    pub transitions: Vec<Transition>,
    pub on_enter: Option<String>,
    pub on_exit: Option<String>,
}

/// Pick the transition to fire from its scores, in declaration order.
///
/// The best score must exceed `threshold`; with two or more candidates it
/// must also beat the runner-up by more than `min_diff`. Ties keep
/// declaration order.
pub fn select_transition(scores: &[f64], threshold: f64, min_diff: f64) -> Option<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let best = *order.first()?;
    if scores[best] <= threshold {
        return None;
    }
    if let Some(&second) = order.get(1) {
        if scores[best] - scores[second] <= min_diff {
            return None;
        }
    }
    Some(best)
}

pub struct FsmEngine {
    states: Vec<State>,
    initial: usize,
    current: usize,
    events: Arc<EventBus>,
    threshold: f64,
    min_diff: f64,
}

impl std::fmt::Debug for FsmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsmEngine")
            .field("states", &self.state_names())
            .field("current", &self.current_state())
            .field("threshold", &self.threshold)
            .field("min_diff", &self.min_diff)
            .finish()
    }
}

impl FsmEngine {
    pub const DEFAULT_THRESHOLD: f64 = 0.4;
    pub const DEFAULT_MIN_DIFF: f64 = 0.1;

    pub fn load(
        path: impl AsRef<Path>,
        compiler: &ConditionCompiler,
        events: Arc<EventBus>,
    ) -> Result<Self, ConfigError> {
        Self::from_document(load_document(path)?, compiler, events)
    }

    /// Build the machine from a parsed document, compiling every transition
    /// condition. Unknown target states are rejected here.
    pub fn from_document(
        document: Value,
        compiler: &ConditionCompiler,
        events: Arc<EventBus>,
    ) -> Result<Self, ConfigError> {
        let doc: FsmDocument = from_document("state machine", document)?;
        if doc.states.is_empty() {
            return Err(ConfigError::NoStates);
        }

        let names: Vec<String> = doc.states.keys().cloned().collect();
        let index_of = |location: String, name: &str| {
            names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| ConfigError::UnknownState {
                    location,
                    state: name.to_string(),
                })
        };

        let mut states = Vec::with_capacity(names.len());
        for (name, raw) in doc.states {
            let state: StateDocument = from_document("state machine", raw)?;
            let mut transitions = Vec::with_capacity(state.transitions.len());
            for (i, t) in state.transitions.into_iter().enumerate() {
                let location = format!("state '{}' transition #{}", name, i + 1);
                let to = index_of(location.clone(), &t.to)?;
                let condition = compiler
                    .compile(&t.condition)
                    .map_err(|e| ConfigError::condition(location, e))?;
                transitions.push(Transition {
                    to,
                    urgency: t.urgency,
                    freedom: t.freedom,
                    template: t.template,
                    condition,
                    on_enter: t.on_enter,
                });
            }
            states.push(State {
                name,
                urgency: state.urgency,
                freedom: state.freedom,
                template: state.template,
                transitions,
                on_enter: state.on_enter,
                on_exit: state.on_exit,
            });
        }

        let initial = match &doc.initial_state {
            Some(name) => index_of("initial_state".to_string(), name)?,
            None => 0,
        };

        tracing::info!("Loaded states: {:?}", names);
        tracing::info!("Start state: {}", names[initial]);

        Ok(Self {
            states,
            initial,
            current: initial,
            events,
            threshold: Self::DEFAULT_THRESHOLD,
            min_diff: Self::DEFAULT_MIN_DIFF,
        })
    }

    pub fn with_thresholds(mut self, threshold: f64, min_diff: f64) -> Self {
        self.threshold = threshold;
        self.min_diff = min_diff;
        self
    }

    pub fn current_state(&self) -> &str {
        &self.states[self.current].name
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name == name)
    }

    pub fn state_names(&self) -> Vec<&str> {
        self.states.iter().map(|s| s.name.as_str()).collect()
    }

    /// Return to the initial state without firing any events.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    fn score(condition: &Condition, input: &str) -> f64 {
        match condition.eval(input) {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!("Condition \"{}\" failed: {:#}", condition.source(), e);
                0.0
            }
        }
    }
}

impl DialogueFlow for FsmEngine {
    fn process(&mut self, container: &mut Container) {
        let state = &self.states[self.current];
        let scores: Vec<f64> = state
            .transitions
            .iter()
            .map(|t| Self::score(&t.condition, &container.input))
            .collect();
        tracing::debug!(
            "Possible transitions from '{}': {:?}",
            state.name,
            state
                .transitions
                .iter()
                .zip(&scores)
                .map(|(t, s)| (self.states[t.to].name.as_str(), *s))
                .collect::<Vec<_>>()
        );

        let Some(choice) = select_transition(&scores, self.threshold, self.min_diff) else {
            tracing::info!("No transition from '{}'", state.name);
            container.set_pacing(state.urgency, state.freedom);
            container.push_instruction(&state.template);
            return;
        };

        let from = &self.states[self.current];
        let transition = &from.transitions[choice];
        let to = &self.states[transition.to];
        tracing::info!(
            "Transition '{}' -> '{}' (score {:.3})",
            from.name,
            to.name,
            scores[choice]
        );

        self.events.invoke_opt(from.on_exit.as_deref());
        container.set_pacing(transition.urgency, transition.freedom);
        self.events.invoke_opt(transition.on_enter.as_deref());
        container.push_instruction(&transition.template);
        container.push_instruction(&to.template);
        self.events.invoke_opt(to.on_enter.as_deref());

        self.current = transition.to;
    }

    fn name(&self) -> &str {
        "fsm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::FactStore;
    use serde_json::json;
    use std::sync::Mutex;

    fn compiler() -> ConditionCompiler {
        ConditionCompiler::new(Arc::new(FactStore::new()))
    }

    fn engine(document: Value) -> FsmEngine {
        FsmEngine::from_document(document, &compiler(), Arc::new(EventBus::new())).unwrap()
    }

    #[test]
    fn test_select_transition_margin() {
        assert_eq!(select_transition(&[0.9, 0.85, 0.3], 0.4, 0.1), None);
        assert_eq!(select_transition(&[0.9, 0.5, 0.3], 0.4, 0.1), Some(0));
        assert_eq!(select_transition(&[0.3, 0.95, 0.2], 0.4, 0.1), Some(1));
    }

    #[test]
    fn test_select_transition_threshold() {
        assert_eq!(select_transition(&[], 0.4, 0.1), None);
        assert_eq!(select_transition(&[0.4], 0.4, 0.1), None);
        assert_eq!(select_transition(&[0.41], 0.4, 0.1), Some(0));
        assert_eq!(select_transition(&[0.7, 0.7], 0.4, 0.1), None);
    }

    #[test]
    fn test_first_declared_state_is_initial() {
        let fsm = engine(json!({
            "states": {
                "zeta": { "transitions": [] },
                "alpha": { "transitions": [] }
            }
        }));
        assert_eq!(fsm.current_state(), "zeta");
        assert_eq!(fsm.state_names(), vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_stays_and_applies_state_pacing() {
        let mut fsm = engine(json!({
            "states": {
                "idle": {
                    "urgency": 0.2,
                    "freedom": 0.9,
                    "template": "Chat casually.",
                    "transitions": [{ "to": "shop", "condition": "0.3" }]
                },
                "shop": {}
            }
        }));
        let mut c = Container::new("hello", vec![]);
        fsm.process(&mut c);
        assert_eq!(fsm.current_state(), "idle");
        assert_eq!(c.urgency, 0.2);
        assert_eq!(c.freedom, 0.9);
        assert_eq!(c.instructions, vec!["Chat casually."]);
    }

    #[test]
    fn test_fires_transition_with_events_in_order() {
        let events = Arc::new(EventBus::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["leave_idle", "walk", "arrive_shop"] {
            let l = log.clone();
            events.subscribe(name, move || {
                l.lock().unwrap().push(name);
                Ok(())
            });
        }
        let mut fsm = FsmEngine::from_document(
            json!({
                "states": {
                    "idle": {
                        "on_exit": "leave_idle",
                        "transitions": [
                            { "to": "shop", "condition": "0.9", "urgency": 0.8,
                              "template": "Mention the shop.", "on_exit": "walk" },
                            { "to": "idle", "condition": "0.5" }
                        ]
                    },
                    "shop": { "template": "Offer wares.", "on_enter": "arrive_shop" }
                }
            }),
            &compiler(),
            events,
        )
        .unwrap();

        let mut c = Container::new("take me shopping", vec![]);
        fsm.process(&mut c);
        assert_eq!(fsm.current_state(), "shop");
        assert_eq!(c.urgency, 0.8);
        assert_eq!(c.freedom, 0.0);
        assert_eq!(c.instructions, vec!["Mention the shop.", "Offer wares."]);
        assert_eq!(*log.lock().unwrap(), vec!["leave_idle", "walk", "arrive_shop"]);

        fsm.reset();
        assert_eq!(fsm.current_state(), "idle");
    }

    #[test]
    fn test_fact_guarded_transition() {
        let facts = Arc::new(FactStore::new());
        let compiler = ConditionCompiler::new(facts.clone());
        let mut fsm = FsmEngine::from_document(
            json!({
                "initial_state": "locked",
                "states": {
                    "open": {},
                    "locked": { "transitions": [{ "to": "open", "condition": "fact('has_key')" }] }
                }
            }),
            &compiler,
            Arc::new(EventBus::new()),
        )
        .unwrap();
        assert_eq!(fsm.current_state(), "locked");

        fsm.process(&mut Container::new("open it", vec![]));
        assert_eq!(fsm.current_state(), "locked");

        facts.set("has_key", true);
        fsm.process(&mut Container::new("open it", vec![]));
        assert_eq!(fsm.current_state(), "open");
    }

    #[test]
    fn test_failing_condition_scores_zero() {
        // No classifier wired: `sent` fails at evaluation time.
        let mut fsm = engine(json!({
            "states": {
                "a": { "transitions": [
                    { "to": "b", "condition": "sent('positive')" },
                    { "to": "c", "condition": "0.8" }
                ]},
                "b": {},
                "c": {}
            }
        }));
        fsm.process(&mut Container::new("great", vec![]));
        assert_eq!(fsm.current_state(), "c");
    }

    #[test]
    fn test_load_errors() {
        let err = FsmEngine::from_document(json!({ "states": {} }), &compiler(), Arc::new(EventBus::new()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::NoStates));

        let err = FsmEngine::from_document(
            json!({ "states": { "a": { "transitions": [{ "to": "nowhere", "condition": "1" }] } } }),
            &compiler(),
            Arc::new(EventBus::new()),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownState { ref state, .. } if state == "nowhere"));

        let err = FsmEngine::from_document(
            json!({ "initial_state": "ghost", "states": { "a": {} } }),
            &compiler(),
            Arc::new(EventBus::new()),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownState { .. }));

        let err = FsmEngine::from_document(
            json!({ "states": { "a": { "transitions": [{ "to": "a", "condition": "(1 and 0" }] } } }),
            &compiler(),
            Arc::new(EventBus::new()),
        )
        .unwrap_err();
        assert!(err.to_string().contains("state 'a' transition #1"));
    }

    #[test]
    fn test_load_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.yaml");
        std::fs::write(
            &path,
            "states:\n  greet:\n    template: Say hello.\n    transitions:\n      - to: bye\n        condition: '0.9'\n  bye:\n    template: Say goodbye.\n",
        )
        .unwrap();
        let mut fsm = FsmEngine::load(&path, &compiler(), Arc::new(EventBus::new())).unwrap();
        let mut c = Container::new("bye", vec![]);
        fsm.process(&mut c);
        assert_eq!(fsm.current_state(), "bye");
        assert_eq!(c.instructions, vec!["Say goodbye."]);
    }
}
