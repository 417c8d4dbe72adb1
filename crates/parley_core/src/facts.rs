//! Reactive fact store.
//!
//! A fact is a named value cell that notifies listeners when it changes.
//! Cells are created lazily: reading an unseen name registers an empty
//! fact, so listeners attached afterwards see the first real `set`.
//!
//! Listeners run after the store lock is released, which lets a reaction
//! read or write other facts. Nested reactions are bounded by a depth guard
//! so a cycle between facts cannot livelock the turn.

use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Value held by a fact. `Null` means "never set".
pub type FactValue = serde_json::Value;

type NoArgsListener = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;
type NewValueListener = Arc<dyn Fn(&FactValue) -> anyhow::Result<()> + Send + Sync>;
type OldNewListener = Arc<dyn Fn(&FactValue, &FactValue) -> anyhow::Result<()> + Send + Sync>;

/// Default bound on nested listener chains.
pub const DEFAULT_MAX_REACTION_DEPTH: usize = 16;

/// Opaque handle returned by every subscription; `unsubscribe` consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn next(counter: &AtomicU64) -> Self {
        Self(counter.fetch_add(1, Ordering::Relaxed))
    }
}

/// Anything conditions can read facts from: the store itself, or a
/// planning overlay that shadows some names.
pub trait FactSource {
    fn fact(&self, name: &str) -> FactValue;
}

#[derive(Default)]
struct FactCell {
    value: FactValue,
    no_args: Vec<(SubscriptionId, NoArgsListener)>,
    new_value: Vec<(SubscriptionId, NewValueListener)>,
    old_new: Vec<(SubscriptionId, OldNewListener)>,
}

impl FactCell {
    fn listener_count(&self) -> usize {
        self.no_args.len() + self.new_value.len() + self.old_new.len()
    }
}

/// Listener lists cloned out of a cell so they can run unlocked.
struct Snapshot {
    no_args: Vec<NoArgsListener>,
    new_value: Vec<NewValueListener>,
    old_new: Vec<OldNewListener>,
}

pub struct FactStore {
    cells: Mutex<HashMap<String, FactCell>>,
    next_id: AtomicU64,
    depth: AtomicUsize,
    max_depth: usize,
}

impl Default for FactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactStore")
            .field("facts", &self.snapshot())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl FactStore {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_REACTION_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            depth: AtomicUsize::new(0),
            max_depth: max_depth.max(1),
        }
    }

    fn cells(&self) -> MutexGuard<'_, HashMap<String, FactCell>> {
        self.cells.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current value of `name`, registering an empty fact if it is unseen.
    pub fn get(&self, name: &str) -> FactValue {
        self.cells()
            .entry(name.to_string())
            .or_default()
            .value
            .clone()
    }

    /// Typed read. `None` when the fact is unset or has another shape.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        match self.get(name) {
            FactValue::Null => None,
            value => serde_json::from_value(value).ok(),
        }
    }

    /// Whether `name` has been registered, without registering it.
    pub fn contains(&self, name: &str) -> bool {
        self.cells().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cells().keys().cloned().collect();
        names.sort();
        names
    }

    /// All registered facts with their current values, sorted by name.
    pub fn snapshot(&self) -> BTreeMap<String, FactValue> {
        self.cells()
            .iter()
            .map(|(k, cell)| (k.clone(), cell.value.clone()))
            .collect()
    }

    /// Create or update a fact. Listeners fire only when the value actually
    /// changes; returns whether it did.
    pub fn set(&self, name: &str, value: impl Into<FactValue>) -> bool {
        let value = value.into();
        let (old, listeners) = {
            let mut cells = self.cells();
            let cell = cells.entry(name.to_string()).or_default();
            if values_equal(&cell.value, &value) {
                return false;
            }
            let old = std::mem::replace(&mut cell.value, value.clone());
            let listeners = Snapshot {
                no_args: cell.no_args.iter().map(|(_, l)| l.clone()).collect(),
                new_value: cell.new_value.iter().map(|(_, l)| l.clone()).collect(),
                old_new: cell.old_new.iter().map(|(_, l)| l.clone()).collect(),
            };
            (old, listeners)
        };
        tracing::info!("Fact '{}' updated: {} -> {}", name, old, value);
        self.notify(name, &old, &value, listeners);
        true
    }

    fn notify(&self, name: &str, old: &FactValue, new: &FactValue, listeners: Snapshot) {
        let Some(_guard) = ReactionGuard::enter(&self.depth, self.max_depth) else {
            tracing::warn!(
                "Reaction depth {} exceeded while updating '{}'; listeners skipped",
                self.max_depth,
                name
            );
            return;
        };
        for listener in &listeners.no_args {
            run_isolated("no-arg", name, || listener());
        }
        for listener in &listeners.new_value {
            run_isolated("new-value", name, || listener(new));
        }
        for listener in &listeners.old_new {
            run_isolated("old-new", name, || listener(old, new));
        }
    }

    /// Listen for any change of `name`.
    pub fn subscribe<F>(&self, name: &str, listener: F) -> SubscriptionId
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId::next(&self.next_id);
        self.cells()
            .entry(name.to_string())
            .or_default()
            .no_args
            .push((id, Arc::new(listener)));
        id
    }

    /// Listen for changes of `name`, receiving the new value.
    pub fn subscribe_value<F>(&self, name: &str, listener: F) -> SubscriptionId
    where
        F: Fn(&FactValue) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId::next(&self.next_id);
        self.cells()
            .entry(name.to_string())
            .or_default()
            .new_value
            .push((id, Arc::new(listener)));
        id
    }

    /// Listen for changes of `name`, receiving the old and the new value.
    pub fn subscribe_old_new<F>(&self, name: &str, listener: F) -> SubscriptionId
    where
        F: Fn(&FactValue, &FactValue) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId::next(&self.next_id);
        self.cells()
            .entry(name.to_string())
            .or_default()
            .old_new
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if the handle was not registered
    /// under `name`.
    pub fn unsubscribe(&self, name: &str, id: SubscriptionId) -> bool {
        let mut cells = self.cells();
        let Some(cell) = cells.get_mut(name) else {
            return false;
        };
        let before = cell.listener_count();
        cell.no_args.retain(|(i, _)| *i != id);
        cell.new_value.retain(|(i, _)| *i != id);
        cell.old_new.retain(|(i, _)| *i != id);
        cell.listener_count() != before
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.cells().get(name).map_or(0, FactCell::listener_count)
    }
}

impl FactSource for FactStore {
    fn fact(&self, name: &str) -> FactValue {
        self.get(name)
    }
}

/// Equality used for change suppression: numbers compare by value, so
/// `1` and `1.0` are the same fact value.
pub fn values_equal(a: &FactValue, b: &FactValue) -> bool {
    match (a, b) {
        (FactValue::Number(x), FactValue::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Score of a fact inside a condition: 0 when unset, the number itself,
/// 1/0 for booleans, 1 for any other present value.
pub fn fact_score(value: &FactValue) -> f64 {
    match value {
        FactValue::Null => 0.0,
        FactValue::Number(n) => n.as_f64().unwrap_or(0.0),
        FactValue::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => 1.0,
    }
}

/// Falsy facts: null, false, zero and the empty string/collection.
pub fn is_truthy(value: &FactValue) -> bool {
    match value {
        FactValue::Null => false,
        FactValue::Bool(b) => *b,
        FactValue::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        FactValue::String(s) => !s.is_empty(),
        FactValue::Array(a) => !a.is_empty(),
        FactValue::Object(o) => !o.is_empty(),
    }
}

/// Run one listener, logging its error or panic instead of propagating.
pub(crate) fn run_isolated<F>(kind: &str, name: &str, listener: F)
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(listener)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Error in {} listener for '{}': {:#}", kind, name, e),
        Err(_) => tracing::error!("{} listener for '{}' panicked", kind, name),
    }
}

/// RAII depth counter shared by facts and events.
pub(crate) struct ReactionGuard<'a> {
    depth: &'a AtomicUsize,
}

impl<'a> ReactionGuard<'a> {
    pub(crate) fn enter(depth: &'a AtomicUsize, max_depth: usize) -> Option<Self> {
        let previous = depth.fetch_add(1, Ordering::SeqCst);
        if previous >= max_depth {
            depth.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(Self { depth })
    }
}

impl Drop for ReactionGuard<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}
