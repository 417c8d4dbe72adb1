//! Condition expressions.
//!
//! A tiny scoring language used by transitions, actions and personality
//! rules:
//!
//! ```text
//! expr      := and_expr ('or' and_expr)*
//! and_expr  := cmp_expr ('and' cmp_expr)*
//! cmp_expr  := primary (('<='|'>='|'=='|'<'|'>') primary)*
//! primary   := NUMBER | sim('TEXT') | sent('TEXT') | fact('TEXT') | '(' expr ')'
//! ```
//!
//! Scores live in [0, 1]: `and` is the minimum, `or` the maximum and a
//! comparison yields 1.0 or 0.0. Expressions compile once at load time;
//! `sim` leaves embed their phrases during compilation, never per turn.

mod lexer;
mod parser;

use crate::capability::{
    cosine_similarity, Embedder, Embedding, Paraphraser, SentimentClassifier, SentimentScore,
    Unconfigured,
};
use crate::error::{ConditionError, SyntaxError};
use crate::facts::{fact_score, FactSource, FactStore};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "==",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `==` means. Older dialogue configurations were written against an
/// evaluator whose `==` actually tested `<=`; `LessOrEqual` keeps them
/// behaving the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EqualitySemantics {
    #[default]
    Exact,
    LessOrEqual,
}

/// `sim(...)` leaf: the literal phrase, its paraphrases, and their
/// embeddings computed at compile time.
#[derive(Debug, Clone)]
pub struct SimilarityLeaf {
    pub phrases: Vec<String>,
    embeddings: Vec<Embedding>,
}

impl SimilarityLeaf {
    pub fn embeddings(&self) -> &[Embedding] {
        &self.embeddings
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Numeric(f64),
    Similarity(SimilarityLeaf),
    Sentiment(String),
    Fact(String),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, CompareOp, Box<Expr>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Numeric(v) => write!(f, "{}", v),
            Expr::Similarity(leaf) => {
                write!(f, "sim('{}')", leaf.phrases.first().map_or("", String::as_str))
            }
            Expr::Sentiment(label) => write!(f, "sent('{}')", label),
            Expr::Fact(name) => write!(f, "fact('{}')", name),
            Expr::And(l, r) => write!(f, "({} and {})", l, r),
            Expr::Or(l, r) => write!(f, "({} or {})", l, r),
            Expr::Compare(l, op, r) => write!(f, "({} {} {})", l, op, r),
        }
    }
}

/// Services a compiled condition reads at evaluation time.
struct EvalEnv {
    embedder: Arc<dyn Embedder>,
    sentiment: Arc<dyn SentimentClassifier>,
    facts: Arc<FactStore>,
    equality: EqualitySemantics,
}

/// A compiled, immutable condition bound to its capability ports and
/// fact store.
#[derive(Clone)]
pub struct Condition {
    source: String,
    root: Expr,
    env: Arc<EvalEnv>,
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("source", &self.source)
            .field("expr", &self.root.to_string())
            .finish()
    }
}

impl Condition {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.root
    }

    /// Score `input` against the live fact store.
    pub fn eval(&self, input: &str) -> Result<f64> {
        self.eval_with(input, self.env.facts.as_ref())
    }

    /// Score `input` reading facts from `facts` instead of the bound store.
    pub fn eval_with(&self, input: &str, facts: &dyn FactSource) -> Result<f64> {
        let mut scope = Scope {
            input,
            env: &self.env,
            facts,
            embedding: None,
            sentiment: None,
        };
        let score = scope.eval(&self.root)?;
        tracing::debug!("Condition \"{}\" scored {:.3}", self.source, score);
        Ok(score)
    }
}

/// Per-evaluation cache: the input is embedded and classified at most once.
struct Scope<'a> {
    input: &'a str,
    env: &'a EvalEnv,
    facts: &'a dyn FactSource,
    embedding: Option<Embedding>,
    sentiment: Option<SentimentScore>,
}

impl Scope<'_> {
    fn input_embedding(&mut self) -> Result<&Embedding> {
        let embedding = match self.embedding.take() {
            Some(e) => e,
            None => self.env.embedder.embed(self.input).context("embedding input")?,
        };
        Ok(self.embedding.insert(embedding))
    }

    fn input_sentiment(&mut self) -> Result<&SentimentScore> {
        let sentiment = match self.sentiment.take() {
            Some(s) => s,
            None => self
                .env
                .sentiment
                .classify(self.input)
                .context("classifying input sentiment")?,
        };
        Ok(self.sentiment.insert(sentiment))
    }

    fn eval(&mut self, expr: &Expr) -> Result<f64> {
        Ok(match expr {
            Expr::Numeric(v) => *v,
            Expr::Similarity(leaf) => {
                let input = self.input_embedding()?;
                let score = leaf
                    .embeddings
                    .iter()
                    .map(|e| cosine_similarity(input, e) as f64)
                    .fold(0.0, f64::max);
                tracing::debug!("Similarity evaluation: {:.3}", score);
                score
            }
            Expr::Sentiment(label) => {
                let sentiment = self.input_sentiment()?;
                tracing::debug!("Sentiment evaluation: {:?}", sentiment);
                if sentiment.is(label) {
                    sentiment.score
                } else {
                    0.0
                }
            }
            Expr::Fact(name) => fact_score(&self.facts.fact(name)),
            Expr::And(l, r) => {
                let (l, r) = (self.eval(l)?, self.eval(r)?);
                l.min(r)
            }
            Expr::Or(l, r) => {
                let (l, r) = (self.eval(l)?, self.eval(r)?);
                l.max(r)
            }
            Expr::Compare(l, op, r) => {
                let (l, r) = (self.eval(l)?, self.eval(r)?);
                let holds = match op {
                    CompareOp::Lt => l < r,
                    CompareOp::Le => l <= r,
                    CompareOp::Gt => l > r,
                    CompareOp::Ge => l >= r,
                    CompareOp::Eq => match self.env.equality {
                        EqualitySemantics::Exact => (l - r).abs() <= f64::EPSILON,
                        EqualitySemantics::LessOrEqual => l <= r,
                    },
                };
                if holds {
                    1.0
                } else {
                    0.0
                }
            }
        })
    }
}

/// Compiles condition text against a fixed set of capability ports.
///
/// Ports default to [`Unconfigured`]: a configuration that never uses
/// `sim` or `sent` needs no embedder or classifier.
#[derive(Clone)]
pub struct ConditionCompiler {
    embedder: Arc<dyn Embedder>,
    sentiment: Arc<dyn SentimentClassifier>,
    paraphraser: Arc<dyn Paraphraser>,
    facts: Arc<FactStore>,
    paraphrasings: usize,
    equality: EqualitySemantics,
}

impl ConditionCompiler {
    pub fn new(facts: Arc<FactStore>) -> Self {
        Self {
            embedder: Arc::new(Unconfigured),
            sentiment: Arc::new(Unconfigured),
            paraphraser: Arc::new(Unconfigured),
            facts,
            paraphrasings: 0,
            equality: EqualitySemantics::default(),
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_sentiment(mut self, sentiment: Arc<dyn SentimentClassifier>) -> Self {
        self.sentiment = sentiment;
        self
    }

    pub fn with_paraphraser(mut self, paraphraser: Arc<dyn Paraphraser>) -> Self {
        self.paraphraser = paraphraser;
        self
    }

    /// Number of paraphrases requested for every `sim` phrase.
    pub fn with_paraphrasings(mut self, count: usize) -> Self {
        self.paraphrasings = count;
        self
    }

    pub fn with_equality(mut self, equality: EqualitySemantics) -> Self {
        self.equality = equality;
        self
    }

    pub fn facts(&self) -> &Arc<FactStore> {
        &self.facts
    }

    pub fn compile(&self, expr: &str) -> Result<Condition, ConditionError> {
        tracing::info!("Parsing condition: {}", expr);
        let tokens = lexer::tokenize(expr).map_err(|source| ConditionError::Syntax {
            expr: expr.to_string(),
            source,
        })?;
        if tokens.is_empty() {
            return Err(ConditionError::Syntax {
                expr: expr.to_string(),
                source: SyntaxError::UnexpectedEnd,
            });
        }
        tracing::debug!(
            "tokens: {:?}",
            tokens.iter().map(|t| t.text.as_str()).collect::<Vec<_>>()
        );
        let root = parser::Parser::new(expr, &tokens, self).parse()?;
        Ok(Condition {
            source: expr.to_string(),
            root,
            env: Arc::new(EvalEnv {
                embedder: self.embedder.clone(),
                sentiment: self.sentiment.clone(),
                facts: self.facts.clone(),
                equality: self.equality,
            }),
        })
    }

    pub(crate) fn similarity_leaf(
        &self,
        expr: &str,
        phrase: &str,
    ) -> Result<SimilarityLeaf, ConditionError> {
        let capability_error = |capability: &'static str, e: anyhow::Error| ConditionError::Capability {
            expr: expr.to_string(),
            capability,
            message: format!("{:#}", e),
        };

        let mut phrases = vec![phrase.to_string()];
        if self.paraphrasings > 0 {
            let extra = self
                .paraphraser
                .paraphrase(self.paraphrasings, phrase)
                .map_err(|e| capability_error("paraphraser", e))?;
            phrases.extend(
                extra
                    .into_iter()
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty()),
            );
        }

        let embeddings = self
            .embedder
            .embed_batch(&phrases)
            .map_err(|e| capability_error("embedder", e))?;
        if embeddings.len() != phrases.len() {
            return Err(capability_error(
                "embedder",
                anyhow::anyhow!("expected {} embeddings, got {}", phrases.len(), embeddings.len()),
            ));
        }

        Ok(SimilarityLeaf { phrases, embeddings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Embeds known phrases to fixed vectors and counts calls.
    struct TableEmbedder {
        table: HashMap<&'static str, Vec<f32>>,
        calls: AtomicUsize,
    }

    impl TableEmbedder {
        fn new() -> Self {
            let mut table = HashMap::new();
            table.insert("hello", vec![1.0, 0.0, 0.0]);
            table.insert("hi there", vec![0.9, 0.1, 0.0]);
            table.insert("goodbye", vec![0.0, 1.0, 0.0]);
            table.insert("see you", vec![0.0, 0.8, 0.6]);
            Self {
                table,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Embedder for TableEmbedder {
        fn embed(&self, text: &str) -> Result<Embedding> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.table.get(text).cloned().unwrap_or_else(|| vec![0.0, 0.0, 1.0]))
        }
    }

    struct FixedSentiment(&'static str, f64);

    impl SentimentClassifier for FixedSentiment {
        fn classify(&self, _text: &str) -> Result<SentimentScore> {
            Ok(SentimentScore::new(self.0, self.1))
        }
    }

    struct ListParaphraser;

    impl Paraphraser for ListParaphraser {
        fn paraphrase(&self, count: usize, _text: &str) -> Result<Vec<String>> {
            Ok(vec!["hi there".to_string(), "  ".to_string()].into_iter().take(count).collect())
        }
    }

    fn compiler() -> ConditionCompiler {
        ConditionCompiler::new(Arc::new(FactStore::new()))
    }

    fn score(expr: &str) -> f64 {
        compiler().compile(expr).unwrap().eval("").unwrap()
    }

    #[test]
    fn test_numeric_and_or() {
        assert_eq!(score("0.3 and 0.7"), 0.3);
        assert_eq!(score("0.3 or 0.7"), 0.7);
        assert_eq!(score("(0.3 or 0.7) and 0.5"), 0.5);
    }

    #[test]
    fn test_precedence_and_binds_tighter_than_or() {
        let c = compiler().compile("0.2 and 0.9 or 0.4").unwrap();
        assert_eq!(c.expr().to_string(), "((0.2 and 0.9) or 0.4)");
        assert_eq!(c.eval("").unwrap(), 0.4);
    }

    #[test]
    fn test_comparison_binds_tighter_than_and() {
        let c = compiler().compile("0.5 > 0.2 and 0.3").unwrap();
        assert_eq!(c.expr().to_string(), "((0.5 > 0.2) and 0.3)");
        assert_eq!(c.eval("").unwrap(), 0.3);
    }

    #[test]
    fn test_comparisons_yield_binary_scores() {
        assert_eq!(score("0.5 < 0.7"), 1.0);
        assert_eq!(score("0.5 >= 0.7"), 0.0);
        assert_eq!(score("0.7 <= 0.7"), 1.0);
        assert_eq!(score("1 < 2 < 0.5"), 0.0);
    }

    #[test]
    fn test_equality_semantics_are_explicit() {
        assert_eq!(score("0.2 == 0.5"), 0.0);
        assert_eq!(score("0.5 == 0.5"), 1.0);
        let legacy = compiler().with_equality(EqualitySemantics::LessOrEqual);
        assert_eq!(legacy.compile("0.2 == 0.5").unwrap().eval("").unwrap(), 1.0);
        assert_eq!(legacy.compile("0.7 == 0.5").unwrap().eval("").unwrap(), 0.0);
    }

    #[test]
    fn test_fact_leaf_reads_store() {
        let facts = Arc::new(FactStore::new());
        let compiler = ConditionCompiler::new(facts.clone());
        let c = compiler.compile("fact('gold') >= 10").unwrap();
        assert_eq!(c.eval("").unwrap(), 0.0);
        facts.set("gold", 12);
        assert_eq!(c.eval("").unwrap(), 1.0);

        let named = compiler.compile("fact('name')").unwrap();
        assert_eq!(named.eval("").unwrap(), 0.0);
        facts.set("name", json!("Aria"));
        assert_eq!(named.eval("").unwrap(), 1.0);
    }

    #[test]
    fn test_similarity_takes_best_phrase() {
        let embedder = Arc::new(TableEmbedder::new());
        let c = compiler()
            .with_embedder(embedder.clone())
            .compile("sim('goodbye') or sim('hello')")
            .unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);

        let s = c.eval("hi there").unwrap();
        assert!(s > 0.9 && s <= 1.0, "score {}", s);
        // One extra embedding for the input, shared by both leaves.
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_similarity_phrases_embedded_once_at_compile_time() {
        let embedder = Arc::new(TableEmbedder::new());
        let c = compiler()
            .with_embedder(embedder.clone())
            .with_paraphraser(Arc::new(ListParaphraser))
            .with_paraphrasings(2)
            .compile("sim('hello')")
            .unwrap();
        match c.expr() {
            Expr::Similarity(leaf) => {
                assert_eq!(leaf.phrases, vec!["hello", "hi there"]);
                assert_eq!(leaf.embeddings().len(), 2);
            }
            other => panic!("expected similarity leaf, got {}", other),
        }
        for _ in 0..3 {
            c.eval("goodbye").unwrap();
        }
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2 + 3);
    }

    #[test]
    fn test_phrase_and_paraphrases_embedded_in_one_batch() {
        struct Batching {
            batches: Mutex<Vec<Vec<String>>>,
            short: bool,
        }
        impl Embedder for Batching {
            fn embed(&self, _text: &str) -> Result<Embedding> {
                Ok(vec![1.0, 0.0])
            }
            fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
                self.batches.lock().unwrap().push(texts.to_vec());
                let n = if self.short { texts.len() - 1 } else { texts.len() };
                Ok(vec![vec![1.0, 0.0]; n])
            }
        }

        let embedder = Arc::new(Batching {
            batches: Mutex::new(Vec::new()),
            short: false,
        });
        compiler()
            .with_embedder(embedder.clone())
            .with_paraphraser(Arc::new(ListParaphraser))
            .with_paraphrasings(2)
            .compile("sim('hello')")
            .unwrap();
        assert_eq!(*embedder.batches.lock().unwrap(), vec![vec!["hello", "hi there"]]);

        let err = compiler()
            .with_embedder(Arc::new(Batching {
                batches: Mutex::new(Vec::new()),
                short: true,
            }))
            .with_paraphraser(Arc::new(ListParaphraser))
            .with_paraphrasings(2)
            .compile("sim('hello')")
            .unwrap_err();
        assert!(matches!(err, ConditionError::Capability { capability: "embedder", .. }));
    }

    #[test]
    fn test_negative_similarity_floors_at_zero() {
        struct Opposite;
        impl Embedder for Opposite {
            fn embed(&self, text: &str) -> Result<Embedding> {
                Ok(if text == "yes" { vec![1.0] } else { vec![-1.0] })
            }
        }
        let c = compiler().with_embedder(Arc::new(Opposite)).compile("sim('yes')").unwrap();
        assert_eq!(c.eval("no").unwrap(), 0.0);
    }

    #[test]
    fn test_sentiment_matches_label_case_insensitively() {
        let c = compiler()
            .with_sentiment(Arc::new(FixedSentiment("POSITIVE", 0.8)))
            .compile("sent('positive')")
            .unwrap();
        assert_eq!(c.eval("great").unwrap(), 0.8);

        let other = compiler()
            .with_sentiment(Arc::new(FixedSentiment("NEGATIVE", 0.8)))
            .compile("sent('positive')")
            .unwrap();
        assert_eq!(other.eval("awful").unwrap(), 0.0);
    }

    #[test]
    fn test_missing_embedder_fails_at_compile_time() {
        let err = compiler().compile("sim('hello')").unwrap_err();
        assert!(matches!(err, ConditionError::Capability { capability: "embedder", .. }));
    }

    #[test]
    fn test_missing_classifier_fails_at_eval_time() {
        let c = compiler().compile("sent('positive')").unwrap();
        assert!(c.eval("hello").is_err());
    }

    #[test]
    fn test_syntax_errors() {
        let cases = [
            ("", SyntaxError::UnexpectedEnd),
            ("(0.5 and 1", SyntaxError::MissingClosingParen { position: 0 }),
            ("0.5 and", SyntaxError::UnexpectedEnd),
            ("and 0.5", SyntaxError::UnexpectedToken { position: 0, found: "and".into() }),
            ("0.5 0.6", SyntaxError::UnexpectedToken { position: 4, found: "0.6".into() }),
            ("0.5 )", SyntaxError::UnexpectedToken { position: 4, found: ")".into() }),
            ("x", SyntaxError::UnexpectedChar { position: 0, found: 'x' }),
        ];
        for (expr, expected) in cases {
            let err = compiler().compile(expr).unwrap_err();
            assert_eq!(err.syntax(), Some(&expected), "expression {:?}", expr);
        }
    }

    #[test]
    fn test_eval_with_overlay_source() {
        struct Overlay;
        impl FactSource for Overlay {
            fn fact(&self, name: &str) -> crate::facts::FactValue {
                if name == "door_open" {
                    json!(true)
                } else {
                    json!(null)
                }
            }
        }
        let c = compiler().compile("fact('door_open') and fact('key')").unwrap();
        assert_eq!(c.eval_with("", &Overlay).unwrap(), 0.0);
        let c = compiler().compile("fact('door_open')").unwrap();
        assert_eq!(c.eval_with("", &Overlay).unwrap(), 1.0);
    }
}
