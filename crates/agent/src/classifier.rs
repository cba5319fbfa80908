use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use switchboard_core::{Capability, ClassifierError};
use tera::{Context, Tera};
use tracing::debug;

use crate::llm::LlmClient;

/// What a classifier sees of a registered capability.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
}

impl From<&Capability> for Candidate {
    fn from(capability: &Capability) -> Self {
        Self {
            name: capability.name.clone(),
            description: capability.description.clone(),
            keywords: capability.keywords.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Classification {
    /// `None` when nothing fits.
    pub chosen: Option<String>,
    pub confidence: Option<f32>,
}

impl Classification {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Picks at most one capability for an instruction. The dispatcher calls this
/// exactly once per dispatch.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        instruction: &str,
        candidates: &[Candidate],
    ) -> Result<Classification, ClassifierError>;

    fn label(&self) -> &'static str {
        "custom"
    }
}

/// Deterministic keyword overlap. Multi-word keywords score one point per
/// word and keywords sharing a stem count once; ties go to the candidate
/// registered first.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    fn score(tokens: &[String], candidate: &Candidate) -> usize {
        let phrases: BTreeSet<Vec<String>> = if candidate.keywords.is_empty() {
            candidate
                .name
                .split(['_', '.', '-'])
                .filter(|part| !part.is_empty())
                .map(|part| vec![stem(part)])
                .collect()
        } else {
            candidate.keywords.iter().map(|keyword| stem_all(keyword)).collect()
        };

        phrases
            .iter()
            .filter(|phrase| !phrase.is_empty())
            .filter(|phrase| tokens.windows(phrase.len()).any(|window| window == phrase.as_slice()))
            .map(Vec::len)
            .sum()
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(
        &self,
        instruction: &str,
        candidates: &[Candidate],
    ) -> Result<Classification, ClassifierError> {
        let tokens = stem_all(instruction);
        let mut best: Option<(&Candidate, usize)> = None;
        let mut runner_up = 0usize;

        for candidate in candidates {
            let score = Self::score(&tokens, candidate);
            match best {
                Some((_, best_score)) if score > best_score => {
                    runner_up = best_score;
                    best = Some((candidate, score));
                }
                Some((_, best_score)) => runner_up = runner_up.max(score.min(best_score)),
                None if score > 0 => best = Some((candidate, score)),
                None => {}
            }
        }

        Ok(match best {
            Some((candidate, score)) => Classification {
                chosen: Some(candidate.name.clone()),
                confidence: Some(score as f32 / (score + runner_up) as f32),
            },
            None => Classification::none(),
        })
    }

    fn label(&self) -> &'static str {
        "keyword"
    }
}

const PROMPT_TEMPLATE: &str = "classify_prompt";
const PROMPT: &str = r#"You route a user's instruction to exactly one automation capability.

Capabilities:
{% for candidate in candidates %}- {{ candidate.name }}: {{ candidate.description }}{% if candidate.keywords %} (keywords: {{ candidate.keywords | join(sep=", ") }}){% endif %}
{% endfor %}
Instruction: {{ instruction }}

Reply with the capability name only, or `none` if no capability fits."#;

/// Delegates the choice to a language model. Replies that do not name exactly
/// one candidate count as no match.
pub struct LlmClassifier {
    client: Arc<dyn LlmClient>,
    templates: Tera,
}

impl LlmClassifier {
    pub fn new(client: Arc<dyn LlmClient>) -> Result<Self, ClassifierError> {
        let mut templates = Tera::default();
        templates
            .add_raw_template(PROMPT_TEMPLATE, PROMPT)
            .map_err(|error| ClassifierError::Prompt(error.to_string()))?;
        Ok(Self { client, templates })
    }

    pub fn render_prompt(
        &self,
        instruction: &str,
        candidates: &[Candidate],
    ) -> Result<String, ClassifierError> {
        let mut context = Context::new();
        context.insert("instruction", instruction);
        context.insert("candidates", candidates);
        self.templates
            .render(PROMPT_TEMPLATE, &context)
            .map_err(|error| ClassifierError::Prompt(error.to_string()))
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(
        &self,
        instruction: &str,
        candidates: &[Candidate],
    ) -> Result<Classification, ClassifierError> {
        if candidates.is_empty() {
            return Ok(Classification::none());
        }

        let prompt = self.render_prompt(instruction, candidates)?;
        let reply = self
            .client
            .complete(&prompt)
            .await
            .map_err(|error| ClassifierError::Unavailable(format!("{error:#}")))?;

        let chosen = parse_reply(&reply, candidates);
        debug!(
            event_name = "agent.classifier.llm_reply",
            reply = %reply.trim(),
            chosen = chosen.as_deref().unwrap_or("none"),
            "llm classifier replied"
        );
        Ok(Classification { chosen, confidence: None })
    }

    fn label(&self) -> &'static str {
        "llm"
    }
}

fn parse_reply(reply: &str, candidates: &[Candidate]) -> Option<String> {
    let answer = reply
        .trim()
        .trim_matches(|character: char| matches!(character, '`' | '"' | '\'' | '.' | '*'))
        .trim()
        .to_ascii_lowercase();
    if answer.is_empty() || answer == "none" {
        return None;
    }
    if let Some(exact) = candidates.iter().find(|candidate| candidate.name == answer) {
        return Some(exact.name.clone());
    }

    let mut mentioned = candidates.iter().filter(|candidate| answer.contains(&candidate.name));
    match (mentioned.next(), mentioned.next()) {
        (Some(only), None) => Some(only.name.clone()),
        _ => None,
    }
}

fn stem_all(text: &str) -> Vec<String> {
    text.split(|character: char| !character.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| stem(&word.to_lowercase()))
        .collect()
}

/// Crude suffix stripping so "meeting", "meetings" and "meet" compare equal.
fn stem(word: &str) -> String {
    let mut stemmed = word.to_lowercase();
    for _ in 0..2 {
        let Some(suffix) = ["ing", "ed", "es", "s", "e"].into_iter().find(|suffix| {
            stemmed.ends_with(suffix) && stemmed.chars().count() >= suffix.len() + 3
        }) else {
            break;
        };
        stemmed.truncate(stemmed.len() - suffix.len());
    }
    stemmed
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use switchboard_core::ClassifierError;

    use super::{stem, Candidate, Classifier, KeywordClassifier, LlmClassifier};
    use crate::llm::LlmClient;

    fn candidate(name: &str, keywords: &[&str]) -> Candidate {
        Candidate {
            name: name.to_string(),
            description: format!("{name} capability"),
            keywords: keywords.iter().map(|keyword| keyword.to_string()).collect(),
        }
    }

    fn candidates() -> Vec<Candidate> {
        vec![
            candidate("send_email", &["email", "send", "mail"]),
            candidate("schedule_meeting", &["schedule", "meeting", "calendar"]),
            candidate("create_task", &["task", "todo", "follow up"]),
        ]
    }

    struct ScriptedLlm {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().expect("lock").push(prompt.to_string());
            self.reply.clone().map_err(|message| anyhow!(message))
        }
    }

    fn scripted(reply: Result<&str, &str>) -> Arc<ScriptedLlm> {
        Arc::new(ScriptedLlm {
            reply: reply.map(str::to_string).map_err(str::to_string),
            prompts: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn stemming_folds_common_suffixes() {
        assert_eq!(stem("meeting"), stem("meet"));
        assert_eq!(stem("Emails"), stem("email"));
        assert_eq!(stem("scheduled"), stem("schedule"));
        assert_eq!(stem("is"), "is");
    }

    #[tokio::test]
    async fn keyword_classifier_picks_highest_overlap() {
        let classification = KeywordClassifier::new()
            .classify("Schedule a meeting with John for tomorrow at 2 PM", &candidates())
            .await
            .expect("classification");

        assert_eq!(classification.chosen.as_deref(), Some("schedule_meeting"));
        assert_eq!(classification.confidence, Some(1.0));
    }

    #[tokio::test]
    async fn keyword_ties_go_to_first_registered() {
        let classification = KeywordClassifier::new()
            .classify("email the calendar", &candidates())
            .await
            .expect("classification");

        assert_eq!(classification.chosen.as_deref(), Some("send_email"));
        assert_eq!(classification.confidence, Some(0.5));
    }

    #[tokio::test]
    async fn keywords_sharing_a_stem_score_once() {
        let candidates = vec![
            candidate("send_email", &["email", "send"]),
            candidate("schedule_meeting", &["schedule", "meeting", "meet", "meetings"]),
        ];
        let classification = KeywordClassifier::new()
            .classify("Email John about tomorrow's meeting", &candidates)
            .await
            .expect("classification");

        assert_eq!(classification.chosen.as_deref(), Some("send_email"));
        assert_eq!(classification.confidence, Some(0.5));
    }

    #[tokio::test]
    async fn phrase_keywords_need_adjacent_words() {
        let matched = KeywordClassifier::new()
            .classify("please follow up with the vendor", &candidates())
            .await
            .expect("classification");
        assert_eq!(matched.chosen.as_deref(), Some("create_task"));

        let unmatched = KeywordClassifier::new()
            .classify("follow the vendor up", &candidates())
            .await
            .expect("classification");
        assert_eq!(unmatched.chosen, None);
    }

    #[tokio::test]
    async fn gibberish_and_empty_registries_match_nothing() {
        let classifier = KeywordClassifier::new();
        assert_eq!(classifier.classify("asdkjhaskjdh", &candidates()).await.expect("ok").chosen, None);
        assert_eq!(classifier.classify("send an email", &[]).await.expect("ok").chosen, None);
    }

    #[tokio::test]
    async fn keywordless_candidates_fall_back_to_name_parts() {
        let candidates = vec![candidate("analyze_sentiment", &[])];
        let classification = KeywordClassifier::new()
            .classify("what is the sentiment of this review", &candidates)
            .await
            .expect("classification");
        assert_eq!(classification.chosen.as_deref(), Some("analyze_sentiment"));
    }

    #[tokio::test]
    async fn llm_classifier_accepts_only_candidate_names() {
        let llm = scripted(Ok("`schedule_meeting`"));
        let classifier = LlmClassifier::new(llm.clone()).expect("template");
        let chosen = classifier.classify("set up time with John", &candidates()).await.expect("ok");
        assert_eq!(chosen.chosen.as_deref(), Some("schedule_meeting"));

        let prompts = llm.prompts.lock().expect("lock");
        assert!(prompts[0].contains("- send_email: send_email capability (keywords: email, send, mail)"));
        assert!(prompts[0].contains("Instruction: set up time with John"));
        drop(prompts);

        let outside = LlmClassifier::new(scripted(Ok("book_flight"))).expect("template");
        assert_eq!(outside.classify("fly to Oslo", &candidates()).await.expect("ok").chosen, None);

        let declined = LlmClassifier::new(scripted(Ok("none"))).expect("template");
        assert_eq!(declined.classify("hello", &candidates()).await.expect("ok").chosen, None);
    }

    #[tokio::test]
    async fn llm_failures_surface_as_unavailable() {
        let classifier = LlmClassifier::new(scripted(Err("connection refused"))).expect("template");
        let error = classifier
            .classify("send an email", &candidates())
            .await
            .expect_err("llm failure must propagate");

        assert!(matches!(error, ClassifierError::Unavailable(message) if message.contains("refused")));
    }
}
