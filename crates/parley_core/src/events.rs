//! Named multicast events.
//!
//! States, transitions, actions and rules name events (`on_enter`,
//! `on_success`, `callback`, ...); whoever hosts the engine subscribes
//! actions to those names. One failing action never stops its siblings.

use crate::facts::{run_isolated, ReactionGuard, SubscriptionId, DEFAULT_MAX_REACTION_DEPTH};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type EventAction = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

pub struct EventBus {
    events: Mutex<HashMap<String, Vec<(SubscriptionId, EventAction)>>>,
    next_id: AtomicU64,
    depth: AtomicUsize,
    max_depth: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.event_names())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_REACTION_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            events: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            depth: AtomicUsize::new(0),
            max_depth: max_depth.max(1),
        }
    }

    fn events(&self) -> MutexGuard<'_, HashMap<String, Vec<(SubscriptionId, EventAction)>>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new action under `event`.
    pub fn subscribe<F>(&self, event: &str, action: F) -> SubscriptionId
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe_shared(event, Arc::new(action))
    }

    /// Register a shared action. Registering the same handle twice under
    /// one event is a no-op that returns the original subscription.
    pub fn subscribe_shared(&self, event: &str, action: EventAction) -> SubscriptionId {
        let mut events = self.events();
        let actions = events.entry(event.to_string()).or_default();
        if let Some((id, _)) = actions.iter().find(|(_, a)| Arc::ptr_eq(a, &action)) {
            tracing::debug!("Action already registered to event '{}'", event);
            return *id;
        }
        let id = SubscriptionId::next(&self.next_id);
        actions.push((id, action));
        tracing::debug!("Added action to event '{}'", event);
        id
    }

    /// Remove an action; an event left without actions is forgotten.
    pub fn unsubscribe(&self, event: &str, id: SubscriptionId) -> bool {
        let mut events = self.events();
        let Some(actions) = events.get_mut(event) else {
            return false;
        };
        let before = actions.len();
        actions.retain(|(i, _)| *i != id);
        let removed = actions.len() != before;
        if actions.is_empty() {
            events.remove(event);
            tracing::debug!("Removed event '{}' as it has no more actions", event);
        }
        removed
    }

    /// Run every action registered under `event`. Empty and unknown names
    /// are no-ops.
    pub fn invoke(&self, event: &str) {
        if event.is_empty() {
            return;
        }
        let actions: Vec<EventAction> = match self.events().get(event) {
            Some(actions) => actions.iter().map(|(_, a)| a.clone()).collect(),
            None => return,
        };
        let Some(_guard) = ReactionGuard::enter(&self.depth, self.max_depth) else {
            tracing::warn!(
                "Event depth {} exceeded while invoking '{}'; actions skipped",
                self.max_depth,
                event
            );
            return;
        };
        tracing::info!("Event invoked: '{}'", event);
        for action in &actions {
            run_isolated("event", event, || action());
        }
    }

    /// Convenience for optional event names carried by configuration.
    pub fn invoke_opt(&self, event: Option<&str>) {
        if let Some(event) = event {
            self.invoke(event);
        }
    }

    pub fn has_event(&self, event: &str) -> bool {
        self.events().contains_key(event)
    }

    pub fn action_count(&self, event: &str) -> usize {
        self.events().get(event).map_or(0, Vec::len)
    }

    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.events().keys().cloned().collect();
        names.sort();
        names
    }
}
