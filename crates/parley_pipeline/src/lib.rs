pub mod generation;
pub mod memory;
pub mod pipeline;
pub mod preprocess;
pub mod session;

pub use generation::{Generation, PromptGenerator};
pub use memory::{EntityFacts, FactInterpolator, MemoryStage};
pub use pipeline::DialoguePipeline;
pub use preprocess::{Preprocessor, SummarizingPreprocessor};
pub use session::Session;
