// tests/classify_topics.rs
use pulsewatch::ingest::classify::{TopicClassifier, TopicRule};

fn rules() -> Vec<TopicRule> {
    serde_json::from_str(
        r#"[
            {"topic": "environment",
             "keywords": ["climate", "wildfire", "emissions", "ecosystem"],
             "phrases": ["extreme weather", "global warming"]},
            {"topic": "politics",
             "keywords": ["election", "parliament", "vote", "government"],
             "phrases": ["prime minister"]},
            {"topic": "humanity",
             "keywords": ["refugee", "famine", "displaced"],
             "phrases": ["humanitarian aid"]}
        ]"#,
    )
    .expect("inline rules parse")
}

fn classifier() -> TopicClassifier {
    TopicClassifier::new(rules()).expect("rules compile")
}

#[test]
fn classifies_environment() {
    let topic = classifier().classify(
        "Climate change threatens global ecosystems",
        Some("Rising temperatures and extreme weather events"),
        None,
    );
    assert_eq!(topic.as_deref(), Some("environment"));
}

#[test]
fn classifies_politics() {
    let topic = classifier().classify(
        "Election results show major shift",
        Some("New government formed after democratic vote"),
        None,
    );
    assert_eq!(topic.as_deref(), Some("politics"));
}

#[test]
fn classifies_humanity() {
    let topic = classifier().classify(
        "Refugee crisis escalates in region",
        Some("Humanitarian aid needed for displaced families"),
        None,
    );
    assert_eq!(topic.as_deref(), Some("humanity"));
}

#[test]
fn source_hint_wins_over_text() {
    let topic = classifier().classify(
        "Election results show major shift",
        Some("vote vote vote"),
        Some("environment"),
    );
    assert_eq!(topic.as_deref(), Some("environment"));
}

#[test]
fn unknown_hint_falls_through_to_keywords() {
    let topic = classifier().classify("Parliament session resumes", None, Some("finance"));
    assert_eq!(topic.as_deref(), Some("politics"));
}

#[test]
fn no_match_is_none_not_an_error() {
    let topic = classifier().classify("Local bakery wins award", Some("Croissants praised"), None);
    assert_eq!(topic, None);
}

#[test]
fn tie_break_follows_configured_rule_order() {
    // "climate" (environment) and "election" (politics): one hit each.
    let topic = classifier().classify("Climate pledges shape the election", None, None);
    assert_eq!(topic.as_deref(), Some("environment"));

    // Same tie with the order reversed flips the winner.
    let mut reversed = rules();
    reversed.reverse();
    let flipped = TopicClassifier::new(reversed).expect("rules compile");
    let topic = flipped.classify("Climate pledges shape the election", None, None);
    assert_eq!(topic.as_deref(), Some("politics"));
}

#[test]
fn shipped_rules_file_compiles_and_orders_topics() {
    let c = TopicClassifier::from_json_file(std::path::Path::new("config/topic_rules.json"))
        .expect("shipped rules load");
    assert_eq!(c.topics(), vec!["environment", "politics", "humanity"]);
}
