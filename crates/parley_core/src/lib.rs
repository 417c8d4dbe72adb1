pub mod capability;
pub mod condition;
pub mod config;
pub mod container;
pub mod document;
pub mod error;
pub mod events;
pub mod facts;

pub use capability::{
    cosine_similarity, Embedder, Embedding, EntityExtractor, Paraphraser, SentimentClassifier,
    SentimentScore, Summarizer, TextGenerator, Unconfigured,
};
pub use condition::{CompareOp, Condition, ConditionCompiler, EqualitySemantics, Expr};
pub use config::ParleyConfig;
pub use container::Container;
pub use error::{ConditionError, ConfigError, SyntaxError};
pub use events::{EventAction, EventBus};
pub use facts::{FactSource, FactStore, FactValue, SubscriptionId};
