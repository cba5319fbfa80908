use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use switchboard_core::config::{AppConfig, ClassifierKind};
use switchboard_core::{
    ApplicationError, CapabilityCard, ClassifierError, ConversationTurn, DispatchError,
    HandlerError, Invocation, RegistryError, SessionId,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::default_capabilities;
use crate::classifier::{Classifier, KeywordClassifier, LlmClassifier};
use crate::clock::{Clock, SystemClock};
use crate::conversation::ConversationStore;
use crate::dispatcher::Dispatcher;
use crate::handlers::{KnowledgeBase, KnowledgeBaseError};
use crate::llm::OpenAiCompatibleClient;
use crate::registry::CapabilityRegistry;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    KnowledgeBase(#[from] KnowledgeBaseError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("could not bind capability handler: {0}")]
    Handler(#[from] HandlerError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error("could not build llm client: {0}")]
    Llm(String),
}

impl From<BuildError> for ApplicationError {
    fn from(value: BuildError) -> Self {
        match value {
            BuildError::Registry(error) => Self::Registry(error),
            other => Self::Configuration(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    pub invocation_id: String,
    pub capability: String,
    pub output: Value,
    pub elapsed_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RuntimeStatus {
    pub classifier: String,
    pub capability_count: usize,
    pub capabilities: Vec<String>,
    pub session_count: usize,
    pub max_session_turns: usize,
    pub knowledge_documents: usize,
}

/// Owns the registry, the conversation store and the dispatcher, and runs
/// chosen capabilities through their handlers.
pub struct AgentRuntime {
    registry: Arc<CapabilityRegistry>,
    conversations: Arc<ConversationStore>,
    dispatcher: Dispatcher,
    knowledge: Arc<KnowledgeBase>,
}

impl AgentRuntime {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        conversations: Arc<ConversationStore>,
        classifier: Arc<dyn Classifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&conversations),
            classifier,
            clock,
        );
        Self { registry, conversations, dispatcher, knowledge: Arc::new(KnowledgeBase::empty()) }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, BuildError> {
        Self::from_config_with_clock(config, Arc::new(SystemClock))
    }

    /// Registers the stock catalog and picks the configured classifier.
    pub fn from_config_with_clock(
        config: &AppConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, BuildError> {
        let knowledge = Arc::new(match &config.dispatcher.knowledge_base_dir {
            Some(dir) => KnowledgeBase::load(dir)?,
            None => KnowledgeBase::empty(),
        });

        let registry = Arc::new(CapabilityRegistry::new());
        registry.register_all(default_capabilities(
            Arc::clone(&knowledge),
            &config.webhooks,
            Duration::from_secs(config.dispatcher.dispatch_timeout_secs),
        )?)?;

        let classifier: Arc<dyn Classifier> = match config.dispatcher.classifier {
            ClassifierKind::Keyword => Arc::new(KeywordClassifier::new()),
            ClassifierKind::Llm => {
                let client = OpenAiCompatibleClient::from_config(&config.llm)
                    .map_err(|error| BuildError::Llm(format!("{error:#}")))?;
                Arc::new(LlmClassifier::new(Arc::new(client))?)
            }
        };

        let conversations = Arc::new(ConversationStore::new(config.dispatcher.max_session_turns));
        let mut runtime = Self::new(registry, conversations, classifier, clock);
        runtime.knowledge = knowledge;

        info!(
            event_name = "agent.runtime.ready",
            classifier = runtime.dispatcher.classifier_label(),
            capabilities = runtime.registry.len(),
            knowledge_documents = runtime.knowledge.document_count(),
            "agent runtime ready"
        );
        Ok(runtime)
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub async fn dispatch(
        &self,
        instruction: &str,
        context: &Value,
        session_id: Option<&SessionId>,
    ) -> Result<Invocation, DispatchError> {
        self.dispatcher.dispatch(instruction, context, session_id).await
    }

    /// Runs the handler bound to the invocation's capability.
    pub async fn execute(&self, invocation: &Invocation) -> Result<ExecutionOutcome, ApplicationError> {
        let name = invocation.capability_name().ok_or(ApplicationError::NothingToExecute)?;
        let capability = self
            .registry
            .lookup(name)
            .ok_or_else(|| ApplicationError::CapabilityNotFound(name.to_string()))?;

        let started = Instant::now();
        let result = capability.handler.invoke(invocation.arguments()).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(output) => {
                info!(
                    event_name = "agent.execution.completed",
                    invocation_id = %invocation.id(),
                    capability = name,
                    elapsed_ms,
                    "capability executed"
                );
                Ok(ExecutionOutcome {
                    invocation_id: invocation.id().to_string(),
                    capability: name.to_string(),
                    output,
                    elapsed_ms,
                })
            }
            Err(error) => {
                warn!(
                    event_name = "agent.execution.failed",
                    invocation_id = %invocation.id(),
                    capability = name,
                    elapsed_ms,
                    error = %error,
                    "capability execution failed"
                );
                Err(error.into())
            }
        }
    }

    pub fn history(&self, session_id: &SessionId, limit: Option<usize>) -> Vec<ConversationTurn> {
        self.conversations.history(session_id, limit)
    }

    pub fn clear(&self, session_id: &SessionId) {
        self.conversations.clear(session_id);
    }

    pub fn capabilities(&self) -> Vec<CapabilityCard> {
        self.registry.snapshot().iter().map(|capability| capability.card()).collect()
    }

    pub fn status(&self) -> RuntimeStatus {
        let capabilities = self.registry.list();
        RuntimeStatus {
            classifier: self.dispatcher.classifier_label().to_string(),
            capability_count: capabilities.len(),
            capabilities,
            session_count: self.conversations.session_count(),
            max_session_turns: self.conversations.max_turns(),
            knowledge_documents: self.knowledge.document_count(),
        }
    }
}
