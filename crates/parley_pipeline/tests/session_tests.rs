//! Integration tests for complete sessions built from the shipped configs.
//!
//! All tests run on the offline ports: a hashing embedder (identical
//! phrases score 1.0), keyword sentiment and the echo generator, which
//! replies with the final instructions joined by spaces.

use parley_core::config::{FlowStrategy, ParleyConfig, PersonalityKind};
use parley_pipeline::Session;
use parley_providers::Ports;
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

// ============================================================================
// Helpers
// ============================================================================

fn config_path(name: &str) -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../../configs")).join(name)
}

/// The shipped parley.toml with document paths made absolute.
fn shipped_config() -> ParleyConfig {
    let mut config = ParleyConfig::load(config_path("parley.toml")).unwrap();
    config.flow.path = Some(config_path("fsm_dialogue.json"));
    config.personality.path = Some(config_path("rule_personality.json"));
    config
}

fn tavern_config() -> ParleyConfig {
    let mut config = ParleyConfig::default();
    config.flow.strategy = FlowStrategy::Goap;
    config.flow.path = Some(config_path("goap_dialogue.yaml"));
    config.flow.action_threshold = 0.5;
    config.personality.kind = PersonalityKind::BehaviorTree;
    config.personality.path = Some(config_path("bt_personality.yaml"));
    config.facts.initial.insert("inn".into(), json!("Prancing Pony"));
    config.facts.initial.insert("price".into(), json!(3));
    config
}

/// Record every named event in firing order.
fn record(session: &Session, names: &[&str]) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for name in names {
        let log = log.clone();
        let event = name.to_string();
        session.events.subscribe(name, move || {
            log.lock().unwrap().push(event.clone());
            Ok(())
        });
    }
    log
}

// ============================================================================
// FSM + rule personality
// ============================================================================

#[test]
fn test_shipped_config_parses() {
    let config = ParleyConfig::load(config_path("parley.toml")).unwrap();
    assert_eq!(config.flow.strategy, FlowStrategy::Fsm);
    assert_eq!(config.personality.kind, PersonalityKind::Rules);
    assert_eq!(config.facts.initial["reward"], json!(50));
    assert_eq!(config.preprocess.max_input_words, 15);
}

#[test]
fn test_blacksmith_quest_conversation() {
    let mut session = Session::from_config(&shipped_config(), Ports::offline()).unwrap();
    let log = record(&session, &["quest_offered", "quest_accepted", "quest_started"]);

    let reply = session.evaluate("I am looking for work").unwrap();
    assert_eq!(
        reply,
        "Mention that there is trouble in the old mine. Ask whether they will clear the mine for 50 gold."
    );
    assert_eq!(*log.lock().unwrap(), vec!["quest_offered"]);

    let reply = session.evaluate("Yes, I would love to help!").unwrap();
    assert_eq!(reply, "Wish them luck and point the way to the mine.");
    assert_eq!(
        *log.lock().unwrap(),
        vec!["quest_offered", "quest_accepted", "quest_started"]
    );

    assert_eq!(session.pipeline.history().len(), 4);
    assert_eq!(session.pipeline.history()[0], "I am looking for work");
}

#[test]
fn test_personality_description_and_irritation() {
    let mut session = Session::from_config(&shipped_config(), Ports::offline()).unwrap();
    session.evaluate("I am looking for work").unwrap();

    let container = session.decide("No, I hate this, it is terrible");
    assert_eq!(container.personality, vec!["A gruff but kind-hearted blacksmith"]);
    assert_eq!(
        container.instructions,
        vec![
            "Accept the refusal with a shrug.",
            "Greet the traveller and ask what brings them to the forge.",
            "Answer curtly and let some irritation show.",
        ]
    );
}

#[test]
fn test_joke_rule_overwrites_flow() {
    let mut session = Session::from_config(&shipped_config(), Ports::offline()).unwrap();
    let log = record(&session, &["joked"]);

    let container = session.decide("tell me a joke");
    assert_eq!(container.instructions, vec!["Tell a short joke about hammers instead."]);
    assert_eq!(*log.lock().unwrap(), vec!["joked"]);
}

#[test]
fn test_long_input_is_summarized_into_history() {
    let mut session = Session::from_config(&shipped_config(), Ports::offline()).unwrap();
    let long = "well met smith I have walked for many days across the hills and valleys to reach this forge";
    session.evaluate(long).unwrap();
    assert_eq!(
        session.pipeline.history()[0],
        "well met smith I have walked for many days across the hills and valleys to"
    );
}

// ============================================================================
// GOAP + behavior tree
// ============================================================================

#[test]
fn test_tavern_plan_runs_to_goal() {
    let mut session = Session::from_config(&tavern_config(), Ports::offline()).unwrap();
    let log = record(&session, &["greeted", "order_taken", "order_served", "served"]);

    let container = session.decide("Hello there");
    assert_eq!(container.personality, vec!["A nervous apprentice minding the shop"]);
    assert_eq!(
        container.instructions,
        vec![
            "Welcome the guest to the Prancing Pony and ask what they would like.",
            "Stammer a little while answering.",
        ]
    );

    let reply = session.evaluate("I would like an ale").unwrap();
    assert_eq!(
        reply,
        "Confirm the order and mention it costs 3 coins. Stammer a little while answering."
    );

    let reply = session.evaluate("Thanks").unwrap();
    assert_eq!(reply, "Serve the drink with a smile. Stammer a little while answering.");
    assert_eq!(session.facts.get("order_served"), json!(true));
    assert_eq!(
        *log.lock().unwrap(),
        vec!["greeted", "order_taken", "order_served", "served"]
    );

    // Goal reached: the flow stays quiet
    let container = session.decide("Anything else?");
    assert_eq!(container.instructions, vec!["Stammer a little while answering."]);
}

#[test]
fn test_tavern_failed_order_and_flustered_apprentice() {
    let mut session = Session::from_config(&tavern_config(), Ports::offline()).unwrap();
    let log = record(&session, &["order_unclear", "flustered"]);

    session.decide("Hello there");
    let container = session.decide("No, this is terrible and I hate waiting");
    assert_eq!(
        container.instructions,
        vec!["Apologise nervously and promise to fetch the master."]
    );
    assert_eq!(*log.lock().unwrap(), vec!["order_unclear", "flustered"]);
    assert_eq!(session.facts.get("order_taken"), json!(null));
}

#[test]
fn test_fact_driven_branch_overwrites() {
    let mut session = Session::from_config(&tavern_config(), Ports::offline()).unwrap();
    session.facts.set("master_away", true);

    let container = session.decide("Hello there");
    assert_eq!(
        container.instructions,
        vec!["Admit that the master is away and offer to take a message."]
    );
}

// ============================================================================
// Wiring errors
// ============================================================================

#[test]
fn test_missing_flow_path_is_an_error() {
    let err = Session::from_config(&ParleyConfig::default(), Ports::offline())
        .err()
        .unwrap();
    assert!(err.to_string().contains("No flow document configured"));
}

#[test]
fn test_personality_without_path_is_an_error() {
    let mut config = shipped_config();
    config.personality.path = None;
    assert!(Session::from_config(&config, Ports::offline()).is_err());
}

#[test]
fn test_flow_document_from_tempdir() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tiny.toml");
    std::fs::write(
        &path,
        r#"
[states.idle]
template = "Nod at ${visitor}."
"#,
    )
    .unwrap();

    let mut config = ParleyConfig::default();
    config.flow.path = Some(path);
    config.facts.initial.insert("visitor".into(), json!("the stranger"));
    let mut session = Session::from_config(&config, Ports::offline()).unwrap();
    assert_eq!(session.evaluate("hi").unwrap(), "Nod at the stranger.");
}
