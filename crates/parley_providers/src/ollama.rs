//! Ollama provider.
//!
//! Ollama exposes an OpenAI-compatible API at localhost:11434/v1. One
//! client serves generation, paraphrasing and summarization; each is a
//! single non-streaming chat completion.

use anyhow::{Context, Result};
use parley_core::{Paraphraser, Summarizer, TextGenerator};
use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaClient {
    /// `base_url` falls back to `OLLAMA_BASE_URL`, then the local default.
    pub fn new(model: &str, base_url: Option<&str>) -> Result<Self> {
        let base_url = base_url
            .map(str::to_string)
            .or_else(|| env::var("OLLAMA_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()?,
            base_url,
            model: model.to_string(),
            temperature: 0.7,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat(&self, system: Option<&str>, user: &str) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": user}));

        let payload = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "stream": false,
        });

        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!("POST {} ({} chars)", url, user.len());

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let err_text = response.text().unwrap_or_default();
            anyhow::bail!("Ollama error {}: {}", status, err_text);
        }

        let resp_json: Value = response.json()?;
        parse_chat_response(&resp_json)
    }
}

/// Extract the first choice's text from an OpenAI-compatible response.
pub(crate) fn parse_chat_response(resp_json: &Value) -> Result<String> {
    resp_json["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("No message content in response: {}", resp_json))
}

/// One paraphrase per line; list markers and numbering are stripped.
pub(crate) fn parse_paraphrases(text: &str, count: usize) -> Vec<String> {
    text.lines()
        .map(|l| {
            l.trim()
                .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*'))
                .trim()
                .trim_matches('"')
                .to_string()
        })
        .filter(|l| !l.is_empty())
        .take(count)
        .collect()
}

impl TextGenerator for OllamaClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        self.chat(None, prompt)
    }
}

impl Paraphraser for OllamaClient {
    fn paraphrase(&self, count: usize, text: &str) -> Result<Vec<String>> {
        let prompt = format!(
            "Write {} different paraphrases of the sentence below. \
             Reply with one paraphrase per line and nothing else.\n\n{}",
            count, text
        );
        let reply = self.chat(Some("You rewrite sentences without changing their meaning."), &prompt)?;
        Ok(parse_paraphrases(&reply, count))
    }
}

impl Summarizer for OllamaClient {
    fn summarize(&self, text: &str, min_words: usize, max_words: usize) -> Result<String> {
        let prompt = format!(
            "Summarize the text below in {} to {} words. Reply with the summary only.\n\n{}",
            min_words, max_words, text
        );
        self.chat(Some("You write short, faithful summaries."), &prompt)
    }
}
