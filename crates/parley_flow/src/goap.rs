//! Goal-oriented dialogue flow.
//!
//! A goal is a set of fact values. The planner chains actions whose
//! preconditions hold and whose effects move the world toward the goal;
//! the engine then executes the plan one action per turn, re-planning
//! whenever an action fails.

use crate::DialogueFlow;
use parley_core::document::{from_document, load_document};
use parley_core::facts::values_equal;
use parley_core::{
    Condition, ConditionCompiler, ConfigError, Container, EventBus, FactSource, FactStore,
    FactValue,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

// ============================================================================
// Document schema
// ============================================================================

#[derive(Debug, Deserialize)]
struct GoapDocument {
    goal: serde_json::Map<String, Value>,
    actions: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ActionDocument {
    #[serde(default)]
    preconditions: Vec<String>,
    condition: String,
    #[serde(default)]
    effects: serde_json::Map<String, Value>,
    #[serde(default)]
    template: String,
    on_success: Option<String>,
    on_fail: Option<String>,
}

// ============================================================================
// Actions and planning
// ============================================================================

/// Desired fact values, in declaration order.
pub type Goal = Vec<(String, FactValue)>;

#[derive(Debug, Clone)]
pub struct Action {
    pub name: String,
    pub preconditions: Vec<Condition>,
    /// Scored against the user's input when the action is executed.
    pub condition: Condition,
    pub effects: Vec<(String, FactValue)>,
    pub template: String,
    pub on_success: Option<String>,
    pub on_fail: Option<String>,
}

/// Planned fact values layered over the live store.
struct Snapshot<'a> {
    planned: HashMap<String, FactValue>,
    facts: &'a FactStore,
}

impl FactSource for Snapshot<'_> {
    fn fact(&self, name: &str) -> FactValue {
        match self.planned.get(name) {
            Some(value) => value.clone(),
            None => self.facts.get(name),
        }
    }
}

impl Snapshot<'_> {
    fn satisfies(&self, goal: &Goal) -> bool {
        goal.iter().all(|(k, v)| values_equal(&self.fact(k), v))
    }

    fn changed_by(&self, action: &Action) -> bool {
        action
            .effects
            .iter()
            .any(|(k, v)| !values_equal(&self.fact(k), v))
    }

    fn preconditions_hold(&self, action: &Action) -> bool {
        action.preconditions.iter().all(|p| match p.eval_with("", self) {
            Ok(score) => score > 0.0,
            Err(e) => {
                tracing::warn!(
                    "Precondition \"{}\" of '{}' failed: {:#}",
                    p.source(),
                    action.name,
                    e
                );
                false
            }
        })
    }
}

/// Greedy forward planner: always takes the first applicable action.
#[derive(Debug, Clone)]
pub struct Planner {
    actions: Vec<Action>,
}

impl Planner {
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Find an action sequence that makes `goal` hold, starting from the
    /// current facts. `None` when no applicable action makes progress.
    ///
    /// An action is applicable when its preconditions hold on the planned
    /// world and at least one of its effects would change it. Plans never
    /// grow past the number of known actions.
    pub fn plan(&self, facts: &FactStore, goal: &Goal) -> Option<Vec<usize>> {
        let mut snapshot = Snapshot {
            planned: goal.iter().map(|(k, _)| (k.clone(), facts.get(k))).collect(),
            facts,
        };
        let mut plan = Vec::new();

        while !snapshot.satisfies(goal) {
            if plan.len() >= self.actions.len() {
                tracing::debug!("Plan bound reached after {} actions", plan.len());
                return None;
            }
            let (index, action) = self
                .actions
                .iter()
                .enumerate()
                .find(|(_, a)| snapshot.changed_by(a) && snapshot.preconditions_hold(a))?;
            tracing::debug!("Planned action '{}'", action.name);
            for (k, v) in &action.effects {
                snapshot.planned.insert(k.clone(), v.clone());
            }
            plan.push(index);
        }

        Some(plan)
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct GoapEngine {
    planner: Planner,
    goal: Goal,
    facts: Arc<FactStore>,
    events: Arc<EventBus>,
    /// Remaining action indices, head first.
    plan: Vec<usize>,
    action_threshold: f64,
    fallback: String,
}

impl std::fmt::Debug for GoapEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoapEngine")
            .field("goal", &self.goal)
            .field("plan", &self.current_plan())
            .finish()
    }
}

impl GoapEngine {
    pub const DEFAULT_FALLBACK: &'static str = "I can't help you right now.";

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
        let doc: GoapDocument = from_document("action planner", document)?;

        let mut actions = Vec::with_capacity(doc.actions.len());
        for (name, raw) in doc.actions {
            let action: ActionDocument = from_document("action planner", raw)?;
            let compile = |location: String, expr: &str| {
                compiler
                    .compile(expr)
                    .map_err(|e| ConfigError::condition(location, e))
            };
            let preconditions = action
                .preconditions
                .iter()
                .enumerate()
                .map(|(i, p)| compile(format!("action '{}' precondition #{}", name, i + 1), p))
                .collect::<Result<Vec<_>, _>>()?;
            let condition = compile(format!("action '{}' condition", name), &action.condition)?;
            actions.push(Action {
                name,
                preconditions,
                condition,
                effects: action.effects.into_iter().collect(),
                template: action.template,
                on_success: action.on_success,
                on_fail: action.on_fail,
            });
        }

        let goal: Goal = doc.goal.into_iter().collect();
        tracing::info!(
            "GOAP system initialized with {} actions and goal: {:?}",
            actions.len(),
            goal
        );

        Ok(Self {
            planner: Planner::new(actions),
            goal,
            facts: compiler.facts().clone(),
            events,
            plan: Vec::new(),
            action_threshold: 0.0,
            fallback: Self::DEFAULT_FALLBACK.to_string(),
        })
    }

    pub fn with_action_threshold(mut self, threshold: f64) -> Self {
        self.action_threshold = threshold;
        self
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub fn goal(&self) -> &Goal {
        &self.goal
    }

    /// Names of the actions still to execute.
    pub fn current_plan(&self) -> Vec<&str> {
        self.plan
            .iter()
            .map(|&i| self.planner.actions[i].name.as_str())
            .collect()
    }

    fn replan(&mut self) -> bool {
        tracing::info!("Planning new goal path...");
        match self.planner.plan(&self.facts, &self.goal) {
            Some(plan) => {
                tracing::info!("Plan: {:?}", plan.iter().map(|&i| &self.planner.actions[i].name).collect::<Vec<_>>());
                self.plan = plan;
                true
            }
            None => {
                self.plan.clear();
                false
            }
        }
    }

    /// Score the action against the input; errors count as failure.
    fn succeeded(&self, action: &Action, input: &str) -> bool {
        match action.condition.eval(input) {
            Ok(score) => score > self.action_threshold,
            Err(e) => {
                tracing::error!("Action '{}' failed with error: {:#}", action.name, e);
                false
            }
        }
    }
}

impl DialogueFlow for GoapEngine {
    fn process(&mut self, container: &mut Container) {
        if self.plan.is_empty() {
            if !self.replan() {
                tracing::warn!("Planning failed. No valid path to goal.");
                container.push_instruction(&self.fallback);
                return;
            }
            if self.plan.is_empty() {
                tracing::info!("Goal already satisfied");
                return;
            }
        }

        let index = self.plan[0];
        let action = &self.planner.actions[index];
        tracing::info!("Executing action: {}", action.name);

        if self.succeeded(action, &container.input) {
            tracing::info!("Action '{}' succeeded.", action.name);
            for (k, v) in &action.effects {
                self.events.invoke(k);
                self.facts.set(k, v.clone());
            }
            self.events.invoke_opt(action.on_success.as_deref());
            container.push_instruction(&action.template);
            self.plan.remove(0);
        } else {
            tracing::warn!("Action '{}' failed. Replanning...", action.name);
            self.events.invoke_opt(action.on_fail.as_deref());
            if !self.replan() {
                tracing::warn!("Replanning found no path to goal");
            }
        }

        if self.plan.is_empty() {
            tracing::info!("Goal achieved or no further actions.");
        }
    }

    fn name(&self) -> &str {
        "goap"
    }
}
