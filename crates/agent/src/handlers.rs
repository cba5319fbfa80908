use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::Sha256;
use switchboard_core::{Arguments, CapabilityHandler, HandlerError};
use thiserror::Error;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-switchboard-signature";

const POSITIVE_WORDS: [&str; 5] = ["good", "great", "excellent", "amazing", "wonderful"];
const NEGATIVE_WORDS: [&str; 5] = ["bad", "terrible", "awful", "horrible", "disappointing"];
const KNOWLEDGE_EXTENSIONS: [&str; 2] = ["txt", "md"];
const SEARCH_LIMIT: usize = 3;

fn required_text<'a>(arguments: &'a Arguments, name: &str) -> Result<&'a str, HandlerError> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| HandlerError::Rejected(format!("argument `{name}` is required")))
}

fn optional_text<'a>(arguments: &'a Arguments, name: &str, fallback: &'a str) -> &'a str {
    arguments.get(name).and_then(Value::as_str).unwrap_or(fallback)
}

/// Confirms the action without contacting any external system. Stands in for
/// email, calendar and task integrations until a webhook is configured.
#[derive(Clone, Copy)]
pub struct AcknowledgingHandler {
    summarize: fn(&Arguments) -> Result<String, HandlerError>,
}

impl AcknowledgingHandler {
    pub fn email() -> Self {
        Self {
            summarize: |arguments| {
                let to = required_text(arguments, "to")?;
                let subject = optional_text(arguments, "subject", "Follow-up");
                Ok(format!("Email to {to} queued with subject '{subject}'"))
            },
        }
    }

    pub fn meeting() -> Self {
        Self {
            summarize: |arguments| {
                let attendee = required_text(arguments, "attendee")?;
                let time = required_text(arguments, "time")?;
                let title = optional_text(arguments, "title", "Meeting");
                Ok(format!("Meeting '{title}' scheduled with {attendee} at {time}"))
            },
        }
    }

    pub fn task() -> Self {
        Self {
            summarize: |arguments| {
                let title = required_text(arguments, "title")?;
                let priority = optional_text(arguments, "priority", "medium");
                Ok(format!("Task '{title}' created with priority {priority}"))
            },
        }
    }
}

#[async_trait]
impl CapabilityHandler for AcknowledgingHandler {
    async fn invoke(&self, arguments: &Arguments) -> Result<Value, HandlerError> {
        let summary = (self.summarize)(arguments)?;
        Ok(json!({ "status": "accepted", "summary": summary }))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SentimentHandler;

impl SentimentHandler {
    pub fn classify(text: &str) -> (&'static str, usize, usize) {
        let lowered = text.to_lowercase();
        let positive = POSITIVE_WORDS.iter().filter(|word| lowered.contains(*word)).count();
        let negative = NEGATIVE_WORDS.iter().filter(|word| lowered.contains(*word)).count();
        let label = match positive.cmp(&negative) {
            std::cmp::Ordering::Greater => "positive",
            std::cmp::Ordering::Less => "negative",
            std::cmp::Ordering::Equal => "neutral",
        };
        (label, positive, negative)
    }
}

#[async_trait]
impl CapabilityHandler for SentimentHandler {
    async fn invoke(&self, arguments: &Arguments) -> Result<Value, HandlerError> {
        let text = required_text(arguments, "text")?;
        let (sentiment, positive_hits, negative_hits) = Self::classify(text);
        Ok(json!({
            "sentiment": sentiment,
            "positive_hits": positive_hits,
            "negative_hits": negative_hits,
        }))
    }
}

#[derive(Debug, Error)]
pub enum KnowledgeBaseError {
    #[error("knowledge base directory `{0}` does not exist")]
    MissingDirectory(PathBuf),
    #[error("could not read knowledge base file `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
}

#[derive(Clone, Debug)]
struct Passage {
    source: String,
    text: String,
    terms: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub source: String,
    pub excerpt: String,
    pub score: usize,
}

/// Paragraphs of the `.txt`/`.md` files in one directory, searched by term overlap.
#[derive(Clone, Debug, Default)]
pub struct KnowledgeBase {
    passages: Vec<Passage>,
    documents: usize,
}

impl KnowledgeBase {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(dir: &Path) -> Result<Self, KnowledgeBaseError> {
        if !dir.is_dir() {
            return Err(KnowledgeBaseError::MissingDirectory(dir.to_path_buf()));
        }
        let read_error =
            |path: &Path, source| KnowledgeBaseError::Read { path: path.to_path_buf(), source };

        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|source| read_error(dir, source))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|extension| extension.to_str())
                    .is_some_and(|extension| KNOWLEDGE_EXTENSIONS.contains(&extension))
            })
            .collect();
        files.sort();

        let mut knowledge = Self::default();
        for path in &files {
            let contents = fs::read_to_string(path).map_err(|source| read_error(path, source))?;
            let source = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            knowledge.add_document(&source, &contents);
        }

        debug!(
            event_name = "agent.knowledge_base.loaded",
            dir = %dir.display(),
            documents = knowledge.documents,
            passages = knowledge.passages.len(),
            "knowledge base loaded"
        );
        Ok(knowledge)
    }

    pub fn add_document(&mut self, source: &str, contents: &str) {
        self.documents += 1;
        for paragraph in contents.split("\n\n") {
            let text = paragraph.split_whitespace().collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                continue;
            }
            let terms = search_terms(&text);
            self.passages.push(Passage { source: source.to_string(), text, terms });
        }
    }

    pub fn document_count(&self) -> usize {
        self.documents
    }

    pub fn passage_count(&self) -> usize {
        self.passages.len()
    }

    /// Best passages first; equal scores keep file order.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let wanted = search_terms(query);
        let mut hits: Vec<SearchHit> = self
            .passages
            .iter()
            .filter_map(|passage| {
                let score = passage.terms.intersection(&wanted).count();
                (score > 0).then(|| SearchHit {
                    source: passage.source.clone(),
                    excerpt: passage.text.clone(),
                    score,
                })
            })
            .collect();
        hits.sort_by(|left, right| right.score.cmp(&left.score));
        hits.truncate(limit);
        hits
    }
}

fn search_terms(text: &str) -> BTreeSet<String> {
    text.split(|character: char| !character.is_alphanumeric())
        .filter(|word| word.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}

#[derive(Clone, Debug)]
pub struct KnowledgeBaseHandler {
    knowledge: Arc<KnowledgeBase>,
}

impl KnowledgeBaseHandler {
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self { knowledge }
    }
}

#[async_trait]
impl CapabilityHandler for KnowledgeBaseHandler {
    async fn invoke(&self, arguments: &Arguments) -> Result<Value, HandlerError> {
        let query = required_text(arguments, "query")?;
        let results = self.knowledge.search(query, SEARCH_LIMIT);
        Ok(json!({ "query": query, "results": results }))
    }
}

/// Forwards the invocation to an HTTP endpoint (typically an n8n workflow).
#[derive(Clone, Debug)]
pub struct WebhookHandler {
    client: reqwest::Client,
    capability: String,
    url: String,
    signing_secret: Option<SecretString>,
}

impl WebhookHandler {
    pub fn new(
        capability: impl Into<String>,
        url: impl Into<String>,
        signing_secret: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, HandlerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| HandlerError::Unavailable(format!("http client: {error}")))?;
        Ok(Self { client, capability: capability.into(), url: url.into(), signing_secret })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CapabilityHandler for WebhookHandler {
    async fn invoke(&self, arguments: &Arguments) -> Result<Value, HandlerError> {
        let payload = json!({
            "capability": self.capability,
            "arguments": arguments,
            "sent_at": Utc::now().to_rfc3339(),
        });
        let body = serde_json::to_vec(&payload)
            .map_err(|error| HandlerError::Rejected(format!("arguments not serializable: {error}")))?;

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.signing_secret {
            request = request.header(
                SIGNATURE_HEADER,
                format!("sha256={}", sign_payload(secret.expose_secret().as_bytes(), &body)),
            );
        }

        let response = request.body(body).send().await.map_err(|error| {
            warn!(
                event_name = "agent.webhook.unreachable",
                capability = %self.capability,
                error = %error,
                "webhook request failed"
            );
            HandlerError::Unavailable(format!("webhook for `{}` unreachable: {error}", self.capability))
        })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            return Err(HandlerError::Rejected(format!("webhook returned {status}: {text}")));
        }
        if !status.is_success() {
            return Err(HandlerError::Upstream(format!("webhook returned {status}: {text}")));
        }

        let response = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        Ok(json!({ "status": "delivered", "http_status": status.as_u16(), "response": response }))
    }
}

pub fn sign_payload(secret: &[u8], payload: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    encode_hex(mac.finalize().into_bytes().as_slice())
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}
