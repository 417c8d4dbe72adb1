use crate::condition::EqualitySemantics;
use crate::facts::{FactValue, DEFAULT_MAX_REACTION_DEPTH};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub flow: FlowConfig,
    pub personality: PersonalityConfig,
    pub conditions: ConditionConfig,
    pub facts: FactsConfig,
    pub preprocess: PreprocessConfig,
    pub generation: GenerationConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
}

impl ParleyConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: ParleyConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from path; if the file doesn't exist, return defaults with env overrides.
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("Config file {} not found, using defaults", path.display());
            let mut cfg = Self::default();
            cfg.apply_env_overrides();
            return Ok(cfg);
        }
        Self::load(path)
    }

    /// Apply environment variable overrides on top of file-based config.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PARLEY_LLM_PROVIDER") {
            self.llm.provider = v;
        }
        if let Ok(v) = std::env::var("PARLEY_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("OLLAMA_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("PARLEY_EMBEDDING_PROVIDER") {
            self.embedding.provider = v;
        }
        if let Ok(v) = std::env::var("PARLEY_FLOW_PATH") {
            self.flow.path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("PARLEY_PERSONALITY_PATH") {
            self.personality.path = Some(PathBuf::from(v));
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStrategy {
    #[default]
    Fsm,
    Goap,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub strategy: FlowStrategy,
    pub path: Option<PathBuf>,
    /// Minimum score a transition must exceed to fire.
    pub threshold: f64,
    /// Lead the best transition needs over the runner-up.
    pub min_diff: f64,
    /// A planned action succeeds when its score is above this.
    pub action_threshold: f64,
    /// Instruction appended when no plan reaches the goal.
    pub fallback: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            strategy: FlowStrategy::Fsm,
            path: None,
            threshold: 0.4,
            min_diff: 0.1,
            action_threshold: 0.0,
            fallback: "I can't help you right now.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonalityKind {
    #[default]
    None,
    Rules,
    BehaviorTree,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersonalityConfig {
    pub kind: PersonalityKind,
    pub path: Option<PathBuf>,
    pub default_threshold: f64,
    pub condition_threshold: f64,
}

impl Default for PersonalityConfig {
    fn default() -> Self {
        Self {
            kind: PersonalityKind::None,
            path: None,
            default_threshold: 0.8,
            condition_threshold: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConditionConfig {
    /// Paraphrases requested per `sim` phrase at load time.
    pub paraphrasings: usize,
    pub equality: EqualitySemantics,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FactsConfig {
    pub max_reaction_depth: usize,
    /// Facts seeded into a new session before the first turn.
    pub initial: BTreeMap<String, FactValue>,
}

impl Default for FactsConfig {
    fn default() -> Self {
        Self {
            max_reaction_depth: DEFAULT_MAX_REACTION_DEPTH,
            initial: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub enabled: bool,
    pub min_input_words: usize,
    pub max_input_words: usize,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_input_words: 10,
            max_input_words: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// History entries included in the prompt.
    pub history_limit: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { history_limit: 5 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3".to_string(),
            base_url: None,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "fastembed".to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ParleyConfig::default();
        assert_eq!(cfg.flow.strategy, FlowStrategy::Fsm);
        assert_eq!(cfg.flow.threshold, 0.4);
        assert_eq!(cfg.flow.min_diff, 0.1);
        assert_eq!(cfg.personality.kind, PersonalityKind::None);
        assert_eq!(cfg.personality.default_threshold, 0.8);
        assert_eq!(cfg.conditions.equality, EqualitySemantics::Exact);
        assert_eq!(cfg.facts.max_reaction_depth, 16);
        assert_eq!(cfg.generation.history_limit, 5);
        assert_eq!(cfg.llm.provider, "ollama");
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[flow]
strategy = "goap"
path = "configs/goap_dialogue.yaml"
"#;
        let cfg: ParleyConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.flow.strategy, FlowStrategy::Goap);
        assert_eq!(cfg.flow.path, Some(PathBuf::from("configs/goap_dialogue.yaml")));
        // Defaults for unspecified fields
        assert_eq!(cfg.flow.threshold, 0.4);
        assert_eq!(cfg.flow.fallback, "I can't help you right now.");
        assert!(cfg.preprocess.enabled);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[flow]
strategy = "fsm"
path = "configs/fsm_dialogue.json"
threshold = 0.5
min_diff = 0.2
action_threshold = 0.3
fallback = "Let me think about that."

[personality]
kind = "behavior_tree"
path = "configs/bt_personality.yaml"
default_threshold = 0.7
condition_threshold = 0.1

[conditions]
paraphrasings = 3
equality = "less_or_equal"

[facts]
max_reaction_depth = 4
initial = { reward = 50, innkeeper = "Barliman" }

[preprocess]
enabled = false
min_input_words = 5
max_input_words = 20

[generation]
history_limit = 8

[llm]
provider = "echo"
model = "mistral"
base_url = "http://localhost:11434/v1"
temperature = 0.2

[embedding]
provider = "hashing"
"#;
        let cfg: ParleyConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.flow.threshold, 0.5);
        assert_eq!(cfg.flow.fallback, "Let me think about that.");
        assert_eq!(cfg.personality.kind, PersonalityKind::BehaviorTree);
        assert_eq!(cfg.personality.condition_threshold, 0.1);
        assert_eq!(cfg.conditions.paraphrasings, 3);
        assert_eq!(cfg.conditions.equality, EqualitySemantics::LessOrEqual);
        assert_eq!(cfg.facts.max_reaction_depth, 4);
        assert_eq!(cfg.facts.initial["reward"], serde_json::json!(50));
        assert_eq!(cfg.facts.initial["innkeeper"], serde_json::json!("Barliman"));
        assert!(!cfg.preprocess.enabled);
        assert_eq!(cfg.generation.history_limit, 8);
        assert_eq!(cfg.llm.base_url.as_deref(), Some("http://localhost:11434/v1"));
        assert_eq!(cfg.embedding.provider, "hashing");
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let toml_str = r#"
[flow]
strategy = "markov"
"#;
        assert!(toml::from_str::<ParleyConfig>(toml_str).is_err());
    }

    #[test]
    fn test_env_overrides_and_defaults() {
        // Part 1: env overrides
        std::env::set_var("PARLEY_LLM_PROVIDER", "echo");
        std::env::set_var("PARLEY_FLOW_PATH", "flows/shop.json");

        let mut cfg = ParleyConfig::default();
        cfg.apply_env_overrides();

        assert_eq!(cfg.llm.provider, "echo");
        assert_eq!(cfg.flow.path, Some(PathBuf::from("flows/shop.json")));

        // Clean up env vars before testing defaults
        std::env::remove_var("PARLEY_LLM_PROVIDER");
        std::env::remove_var("PARLEY_FLOW_PATH");

        // Part 2: nonexistent path returns defaults (no env interference)
        let cfg = ParleyConfig::load_or_default("/nonexistent/parley.toml").unwrap();
        assert_eq!(cfg.llm.provider, "ollama");
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.toml");
        std::fs::write(
            &path,
            r#"
[flow]
strategy = "goap"
threshold = "high"
"#,
        )
        .unwrap();

        let err = ParleyConfig::load_or_default(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse TOML config"));
        assert!(ParleyConfig::load(&path).is_err());
    }
}
