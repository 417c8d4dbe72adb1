use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use parley_core::config::{FlowStrategy, ParleyConfig, PersonalityKind};
use parley_pipeline::Session;
use parley_providers::Ports;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Fsm,
    Goap,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PersonalityArg {
    None,
    Rules,
    BehaviorTree,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the engine config file [default: parley.toml, if present]
    #[arg(short, long, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Dialogue flow document (JSON, YAML or TOML)
    #[arg(short, long)]
    flow: Option<PathBuf>,

    /// Flow strategy for the document given with --flow
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Personality document (JSON, YAML or TOML)
    #[arg(short, long)]
    personality: Option<PathBuf>,

    /// Personality kind for the document given with --personality
    #[arg(long, value_enum)]
    personality_kind: Option<PersonalityArg>,

    /// Use offline providers: hashing embeddings, keyword sentiment, echo generation
    #[arg(long)]
    offline: bool,

    /// Print the decision container before each reply
    #[arg(long)]
    show_container: bool,
}

const DEFAULT_CONFIG: &str = "parley.toml";

impl Args {
    /// An explicit config path must exist; the default one is optional.
    fn load_config(&self) -> Result<ParleyConfig> {
        let mut config = match &self.config {
            Some(path) => ParleyConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ParleyConfig::load_or_default(DEFAULT_CONFIG)
                .with_context(|| format!("Failed to load config {}", DEFAULT_CONFIG))?,
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(&self, config: &mut ParleyConfig) {
        if let Some(path) = &self.flow {
            config.flow.path = Some(path.clone());
        }
        if let Some(strategy) = self.strategy {
            config.flow.strategy = match strategy {
                StrategyArg::Fsm => FlowStrategy::Fsm,
                StrategyArg::Goap => FlowStrategy::Goap,
            };
        }
        if let Some(path) = &self.personality {
            config.personality.path = Some(path.clone());
            // A document without a kind defaults to a rule table
            if config.personality.kind == PersonalityKind::None {
                config.personality.kind = PersonalityKind::Rules;
            }
        }
        if let Some(kind) = self.personality_kind {
            config.personality.kind = match kind {
                PersonalityArg::None => PersonalityKind::None,
                PersonalityArg::Rules => PersonalityKind::Rules,
                PersonalityArg::BehaviorTree => PersonalityKind::BehaviorTree,
            };
        }
    }
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    info!("Initializing Parley...");
    let config = args.load_config()?;

    let ports = if args.offline {
        info!("Using offline providers");
        Ports::offline()
    } else {
        Ports::from_config(&config).context("Failed to initialize providers")?
    };
    let mut session = Session::from_config(&config, ports).context("Failed to build dialogue session")?;

    if io::stdin().is_terminal() {
        run_interactive(&mut session, args.show_container)
    } else {
        run_piped(&mut session, args.show_container)
    }
}

// ============================================================================
// Turn loop
// ============================================================================

enum Command {
    Quit,
    Skip,
    Facts,
    Reset,
    Say,
}

fn classify(line: &str) -> Command {
    match line {
        "quit" | "exit" => Command::Quit,
        "" => Command::Skip,
        "/facts" => Command::Facts,
        "/reset" => Command::Reset,
        _ => Command::Say,
    }
}

/// Handle one line of input. Returns `false` when the user asked to leave.
fn handle_line(session: &mut Session, line: &str, show_container: bool) -> Result<bool> {
    let line = line.trim();
    match classify(line) {
        Command::Quit => return Ok(false),
        Command::Skip => {}
        Command::Facts => {
            let facts = serde_json::to_string_pretty(&session.facts.snapshot())?;
            println!("{}", facts);
        }
        Command::Reset => {
            session.pipeline.clear_history();
            println!("History cleared.");
        }
        Command::Say => match session.run_turn(line) {
            Ok((container, reply)) => {
                if show_container {
                    println!("{}", container);
                }
                println!("Parley: {}", reply);
            }
            Err(e) => {
                error!("Turn failed: {:#}", e);
                println!("[System Error]: {:#}", e);
            }
        },
    }
    io::stdout().flush()?;
    Ok(true)
}

fn run_piped(session: &mut Session, show_container: bool) -> Result<()> {
    for line in io::stdin().lock().lines() {
        if !handle_line(session, &line?, show_container)? {
            break;
        }
    }
    Ok(())
}

fn history_path() -> Option<PathBuf> {
    let dir = dirs::data_dir()?.join("parley");
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir.join("history.txt"))
}

fn run_interactive(session: &mut Session, show_container: bool) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    let history = history_path();
    if let Some(path) = &history {
        // Missing on first run
        let _ = editor.load_history(path);
    }

    println!("Parley online. Type 'quit' to exit, '/facts' to list facts, '/reset' to clear history.");
    loop {
        match editor.readline("> ") {
            Ok(line) => {
                if !line.trim().is_empty() {
                    editor.add_history_entry(line.as_str())?;
                }
                if !handle_line(session, &line, show_container)? {
                    break;
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(path) = &history {
        if let Err(e) = editor.save_history(path) {
            tracing::warn!("Failed to save history: {}", e);
        }
    }
    Ok(())
}
