use std::sync::Arc;

use serde_json::{Map, Value};
use switchboard_core::{DispatchError, Invocation, NoMatchReason, SessionId, TurnRecord};
use tracing::{debug, info, warn};

use crate::classifier::{Candidate, Classification, Classifier};
use crate::clock::Clock;
use crate::conversation::ConversationStore;
use crate::extract::{extract_arguments, ContactDirectory, ExtractionInput};
use crate::registry::{CapabilityRegistry, RegistrySnapshot};

/// Turns one free-form instruction into an [`Invocation`].
///
/// A dispatch classifies against a single registry snapshot, extracts the
/// chosen capability's arguments, and (when a session is given) appends
/// exactly one turn. There is no await point between building the invocation
/// and appending it, so a cancelled dispatch records nothing.
pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    conversations: Arc<ConversationStore>,
    classifier: Arc<dyn Classifier>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        conversations: Arc<ConversationStore>,
        classifier: Arc<dyn Classifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { registry, conversations, classifier, clock }
    }

    pub fn classifier_label(&self) -> &'static str {
        self.classifier.label()
    }

    pub async fn dispatch(
        &self,
        instruction: &str,
        context: &Value,
        session_id: Option<&SessionId>,
    ) -> Result<Invocation, DispatchError> {
        let empty = Map::new();
        let context = match context {
            Value::Object(fields) => fields,
            Value::Null => &empty,
            other => {
                return Err(DispatchError::InvalidArguments(format!(
                    "context must be a JSON object, got {}",
                    json_kind(other)
                )))
            }
        };
        let directory = ContactDirectory::from_context(context)?;

        let snapshot = self.registry.snapshot();
        let candidates: Vec<Candidate> =
            snapshot.iter().map(|capability| Candidate::from(capability.as_ref())).collect();

        let classification =
            self.classifier.classify(instruction, &candidates).await.map_err(|error| {
                warn!(
                    event_name = "agent.dispatch.classifier_failed",
                    classifier = self.classifier.label(),
                    error = %error,
                    "classifier failed"
                );
                DispatchError::from(error)
            })?;

        let recent_contacts = session_id
            .map(|session_id| self.conversations.recent_contacts(session_id))
            .unwrap_or_default();
        let (invocation, contacts) = self.build_invocation(
            &snapshot,
            classification,
            &ExtractionInput {
                instruction,
                context,
                directory: &directory,
                recent_contacts: &recent_contacts,
                now: self.clock.now(),
            },
        );

        if let Some(session_id) = session_id {
            let turn = self.conversations.append(
                session_id,
                TurnRecord {
                    instruction: instruction.to_string(),
                    invocation: invocation.clone(),
                    contacts,
                },
            );
            debug!(
                event_name = "agent.dispatch.turn_recorded",
                session_id = %session_id,
                sequence = turn.sequence,
                "turn recorded"
            );
        }

        info!(
            event_name = "agent.dispatch.completed",
            invocation_id = %invocation.id(),
            capability = invocation.capability_name().unwrap_or("none"),
            confidence = invocation.confidence().map(f64::from),
            reason = invocation.reason().map(NoMatchReason::message).as_deref(),
            session_id = session_id.map(SessionId::as_str),
            "instruction dispatched"
        );
        Ok(invocation)
    }

    fn build_invocation(
        &self,
        snapshot: &RegistrySnapshot,
        classification: Classification,
        input: &ExtractionInput<'_>,
    ) -> (Invocation, Vec<String>) {
        let confidence = classification.confidence;
        let Some(chosen) = classification.chosen else {
            return (Invocation::none(NoMatchReason::NoMatch, confidence), Vec::new());
        };
        let Some(capability) = snapshot.get(&chosen) else {
            return (
                Invocation::none(NoMatchReason::UnknownCapability { name: chosen }, confidence),
                Vec::new(),
            );
        };

        let extraction = extract_arguments(&capability.argument_schema, input);
        if !extraction.is_complete() {
            let reason = NoMatchReason::MissingArguments {
                capability: capability.name.clone(),
                missing: extraction.missing,
            };
            return (Invocation::none(reason, confidence), extraction.contacts);
        }

        (
            Invocation::matched(capability.name.clone(), extraction.arguments, confidence),
            extraction.contacts,
        )
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
