use anyhow::{Context, Result};
use parley_core::{Container, TextGenerator};
use std::sync::Arc;

pub trait Generation: Send + Sync {
    fn generate(&self, container: &Container) -> Result<String>;
}

/// Turns the finished container into a roleplay prompt for a text
/// generator.
pub struct PromptGenerator {
    generator: Arc<dyn TextGenerator>,
    history_limit: usize,
}

impl PromptGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            history_limit: 5,
        }
    }

    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    pub fn build_prompt(&self, container: &Container) -> String {
        let urgency_desc = if container.urgency >= 0.75 {
            "Respond quickly and decisively."
        } else if container.urgency >= 0.5 {
            "Respond in a timely and calm manner."
        } else {
            "Take your time and respond thoughtfully."
        };

        let personality = if container.personality.is_empty() {
            "neutral".to_string()
        } else {
            container.personality.join(", ")
        };
        let facts = if container.facts.is_empty() {
            "No specific context.".to_string()
        } else {
            container.facts.join(" ")
        };
        let instructions = if container.instructions.is_empty() {
            "- No specific instructions.".to_string()
        } else {
            container
                .instructions
                .iter()
                .map(|i| format!("- {}", i))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let skip = container.history.len().saturating_sub(self.history_limit);
        let history = container.history[skip..].join("\n");

        format!(
            "You are roleplaying a character with the following personality traits: **{personality}**.

Context to consider:
- **Known facts**:
{facts}
- **Urgency**: {urgency:.2} → {urgency_desc}

Your task:
- React naturally to the user's input.
- Follow the intent of the instructions below, but rephrase them in a natural, in-character way.
- Stay grounded in the provided facts and personality.
- Do not invent new actions or topics, only reword what's given.
- Write a short response.

Conversation history:
{history}

User input:
\"{input}\"

Following intent of instruction below rephrase:
{instructions}

Your short response:",
            urgency = container.urgency,
            input = container.input,
        )
    }
}

/// Remove one layer of matching surrounding quotes.
pub fn strip_quotes(response: &str) -> &str {
    for quote in ['"', '\''] {
        if response.len() >= 2 && response.starts_with(quote) && response.ends_with(quote) {
            return &response[1..response.len() - 1];
        }
    }
    response
}

impl Generation for PromptGenerator {
    fn generate(&self, container: &Container) -> Result<String> {
        let prompt = self.build_prompt(container);
        tracing::debug!("Generated prompt for LLM:\n{}", prompt);
        let response = self
            .generator
            .generate(&prompt)
            .context("Text generation failed")?;
        Ok(strip_quotes(response.trim()).to_string())
    }
}
