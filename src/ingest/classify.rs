// src/ingest/classify.rs
//! Keyword-based topic classification.
//!
//! Rules are an *ordered* list of topics, each with a keyword/phrase set.
//! The order is load-bearing: when two topics tie on match count, the one
//! configured first wins. Classification never fails; "no topic matched"
//! is a normal outcome and callers apply their own default.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

/// One configured topic with its match patterns.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicRule {
    pub topic: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub phrases: Vec<String>,
}

struct CompiledRule {
    topic: String,
    // None when the rule has no patterns at all.
    re: Option<Regex>,
}

/// Compiled classifier. Construct once at startup and share.
pub struct TopicClassifier {
    rules: Vec<CompiledRule>,
}

impl TopicClassifier {
    /// Compile an ordered rule list into case-insensitive matchers.
    pub fn new(rules: Vec<TopicRule>) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let patterns: Vec<String> = rule
                .keywords
                .iter()
                .chain(rule.phrases.iter())
                .filter(|p| !p.trim().is_empty())
                .map(|p| regex::escape(p.trim()))
                .collect();
            let re = if patterns.is_empty() {
                None
            } else {
                Some(
                    Regex::new(&format!("(?i){}", patterns.join("|")))
                        .with_context(|| format!("compiling rules for topic `{}`", rule.topic))?,
                )
            };
            compiled.push(CompiledRule {
                topic: rule.topic,
                re,
            });
        }
        Ok(Self { rules: compiled })
    }

    /// Load rules from a JSON file holding the ordered rule array.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading topic rules from {}", path.display()))?;
        let rules: Vec<TopicRule> =
            serde_json::from_str(&content).context("parsing topic rules json")?;
        Self::new(rules)
    }

    /// Configured topic labels, in rule order.
    pub fn topics(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.topic.as_str()).collect()
    }

    fn is_known_topic(&self, label: &str) -> bool {
        self.rules.iter().any(|r| r.topic == label)
    }

    /// Map text to a topic label.
    ///
    /// A recognized `source_hint` short-circuits: the source config's own
    /// topic assignment always wins. Otherwise the topic with the most
    /// keyword/phrase occurrences in `title + summary` wins; ties go to the
    /// earliest configured topic. Returns `None` when nothing matches.
    pub fn classify(
        &self,
        title: &str,
        summary: Option<&str>,
        source_hint: Option<&str>,
    ) -> Option<String> {
        if let Some(hint) = source_hint {
            if self.is_known_topic(hint) {
                return Some(hint.to_string());
            }
        }

        let mut text = title.to_string();
        if let Some(s) = summary {
            text.push(' ');
            text.push_str(s);
        }
        let text = text.to_lowercase();

        let mut best: Option<(&str, usize)> = None;
        for rule in &self.rules {
            let Some(re) = &rule.re else { continue };
            let matches = re.find_iter(&text).count();
            if matches == 0 {
                continue;
            }
            // Strict > keeps the earliest configured topic on ties.
            match best {
                Some((_, n)) if matches <= n => {}
                _ => best = Some((rule.topic.as_str(), matches)),
            }
        }
        best.map(|(topic, _)| topic.to_string())
    }
}
