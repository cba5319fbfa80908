use std::sync::Arc;
use std::time::Duration;

use switchboard_core::config::WebhookConfig;
use switchboard_core::{ArgumentKind, ArgumentSpec, Capability, CapabilityHandler, HandlerError};
use tracing::info;

use crate::handlers::{
    AcknowledgingHandler, KnowledgeBase, KnowledgeBaseHandler, SentimentHandler, WebhookHandler,
};

pub const TASK_PRIORITIES: [&str; 4] = ["low", "medium", "high", "urgent"];

/// The stock automation capabilities in their registration order. Capabilities
/// with a configured webhook endpoint are bound to it instead of the built-in
/// handler.
pub fn default_capabilities(
    knowledge: Arc<KnowledgeBase>,
    webhooks: &WebhookConfig,
    webhook_timeout: Duration,
) -> Result<Vec<Capability>, HandlerError> {
    let capabilities = vec![
        Capability::new(
            "search_knowledge_base",
            "Search the business knowledge base for answers to questions",
            Arc::new(KnowledgeBaseHandler::new(knowledge)),
        )
        .keywords([
            "search",
            "find",
            "look up",
            "knowledge base",
            "faq",
            "policy",
            "documentation",
            "how do",
            "what is",
        ])
        .argument(
            "query",
            ArgumentSpec::required(ArgumentKind::Text)
                .from_instruction()
                .describe("What to look for"),
        ),
        Capability::new(
            "send_email",
            "Send an email to a contact",
            Arc::new(AcknowledgingHandler::email()),
        )
        .keywords(["email", "send", "mail", "write to", "reply"])
        .argument("to", ArgumentSpec::required(ArgumentKind::Contact).describe("Recipient"))
        .argument(
            "to_address",
            ArgumentSpec::optional(ArgumentKind::EmailAddress).describe("Recipient address"),
        )
        .argument(
            "subject",
            ArgumentSpec::optional(ArgumentKind::Text).with_default("Follow-up"),
        )
        .argument("body", ArgumentSpec::optional(ArgumentKind::Text))
        .requires_arguments(),
        Capability::new(
            "schedule_meeting",
            "Schedule a meeting with a contact",
            Arc::new(AcknowledgingHandler::meeting()),
        )
        .keywords(["schedule", "meeting", "calendar", "appointment", "book"])
        .argument("attendee", ArgumentSpec::required(ArgumentKind::Contact))
        .argument(
            "time",
            ArgumentSpec::required(ArgumentKind::DateTime).describe("Start, local time"),
        )
        .argument("title", ArgumentSpec::optional(ArgumentKind::Text).with_default("Meeting"))
        .requires_arguments(),
        Capability::new(
            "create_task",
            "Create a task or reminder in the task tracker",
            Arc::new(AcknowledgingHandler::task()),
        )
        .keywords(["task", "todo", "remind", "reminder", "follow up"])
        .argument(
            "title",
            ArgumentSpec::required(ArgumentKind::Text).from_instruction(),
        )
        .argument(
            "priority",
            ArgumentSpec::optional(ArgumentKind::Choice(
                TASK_PRIORITIES.iter().map(|priority| priority.to_string()).collect(),
            ))
            .with_default("medium"),
        )
        .argument("due", ArgumentSpec::optional(ArgumentKind::DateTime)),
        Capability::new(
            "analyze_sentiment",
            "Analyze the sentiment of a piece of text",
            Arc::new(SentimentHandler),
        )
        .keywords(["sentiment", "analyze", "tone", "mood", "feeling"])
        .argument(
            "text",
            ArgumentSpec::required(ArgumentKind::Text).from_instruction(),
        ),
    ];

    capabilities
        .into_iter()
        .map(|capability| match webhooks.endpoints.get(&capability.name) {
            Some(url) => {
                let handler: Arc<dyn CapabilityHandler> = Arc::new(WebhookHandler::new(
                    capability.name.clone(),
                    url.clone(),
                    webhooks.signing_secret.clone(),
                    webhook_timeout,
                )?);
                info!(
                    event_name = "agent.catalog.webhook_bound",
                    capability = %capability.name,
                    url = %url,
                    "capability bound to webhook"
                );
                Ok(Capability { handler, ..capability })
            }
            None => Ok(capability),
        })
        .collect()
}
