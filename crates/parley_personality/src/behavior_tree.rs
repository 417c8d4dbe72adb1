//! Behavior-tree personality.

use crate::{push_description, score, InstructionMode, Personality};
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
struct TreeDocument {
    #[serde(default)]
    description: String,
    behavior_tree: NodeDocument,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum NodeDocument {
    Sequence {
        #[serde(default)]
        children: Vec<NodeDocument>,
    },
    Selector {
        #[serde(default)]
        children: Vec<NodeDocument>,
    },
    Condition {
        condition: String,
    },
    Action {
        #[serde(default)]
        template: String,
        callback: Option<String>,
        #[serde(default)]
        mode: InstructionMode,
    },
}

// ============================================================================
// Nodes
// ============================================================================

#[derive(Debug, Clone)]
pub enum BtNode {
    /// Succeeds when every child succeeds; stops at the first failure.
    Sequence(Vec<BtNode>),
    /// Succeeds at the first successful child.
    Selector(Vec<BtNode>),
    Condition(Condition),
    /// Always succeeds.
    Action {
        template: String,
        callback: Option<String>,
        mode: InstructionMode,
    },
}

impl BtNode {
    fn compile(doc: NodeDocument, compiler: &ConditionCompiler, path: &str) -> Result<Self, ConfigError> {
        let children = |children: Vec<NodeDocument>| {
            children
                .into_iter()
                .enumerate()
                .map(|(i, child)| Self::compile(child, compiler, &format!("{}/{}", path, i)))
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(match doc {
            NodeDocument::Sequence { children: c } => BtNode::Sequence(children(c)?),
            NodeDocument::Selector { children: c } => BtNode::Selector(children(c)?),
            NodeDocument::Condition { condition } => BtNode::Condition(
                compiler
                    .compile(&condition)
                    .map_err(|e| ConfigError::condition(format!("behavior tree node {}", path), e))?,
            ),
            NodeDocument::Action {
                template,
                callback,
                mode,
            } => BtNode::Action {
                template,
                callback,
                mode,
            },
        })
    }
}

pub struct BehaviorTree {
    description: String,
    root: BtNode,
    events: Arc<EventBus>,
    condition_threshold: f64,
}

impl std::fmt::Debug for BehaviorTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorTree")
            .field("description", &self.description)
            .field("root", &self.root)
            .field("condition_threshold", &self.condition_threshold)
            .finish_non_exhaustive()
    }
}

impl BehaviorTree {
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
        let doc: TreeDocument = from_document("behavior tree", document)?;
        let root = BtNode::compile(doc.behavior_tree, compiler, "root")?;
        tracing::info!("Loaded behavior tree");
        Ok(Self::new(root, events).with_description(doc.description))
    }

    pub fn new(root: BtNode, events: Arc<EventBus>) -> Self {
        Self {
            description: String::new(),
            root,
            events,
            condition_threshold: 0.0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// A condition node succeeds when its score is above this.
    pub fn with_condition_threshold(mut self, threshold: f64) -> Self {
        self.condition_threshold = threshold;
        self
    }

    pub fn root(&self) -> &BtNode {
        &self.root
    }

    /// Run the tree once, returning the root's result.
    pub fn tick(&self, container: &mut Container) -> bool {
        self.run(&self.root, container)
    }

    fn run(&self, node: &BtNode, container: &mut Container) -> bool {
        match node {
            BtNode::Sequence(children) => children.iter().all(|c| self.run(c, container)),
            BtNode::Selector(children) => children.iter().any(|c| self.run(c, container)),
            BtNode::Condition(condition) => {
                score(condition, &container.input) > self.condition_threshold
            }
            BtNode::Action {
                template,
                callback,
                mode,
            } => {
                self.events.invoke_opt(callback.as_deref());
                mode.apply(container, template);
                true
            }
        }
    }
}

impl Personality for BehaviorTree {
    fn process(&self, container: &mut Container) {
        push_description(container, &self.description);
        let result = self.tick(container);
        tracing::info!("Behavior tree result: {}", result);
    }

    fn name(&self) -> &str {
        "behavior_tree"
    }
}
