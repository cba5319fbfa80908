use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use switchboard_core::{ArgumentKind, Capability, RegistryError};
use tracing::info;

/// Argument a well-known capability must declare, whoever registers it.
struct MinimumArgument {
    capability: &'static str,
    needs: &'static str,
    accepts: fn(&ArgumentKind) -> bool,
}

fn is_recipient(kind: &ArgumentKind) -> bool {
    matches!(kind, ArgumentKind::Contact | ArgumentKind::EmailAddress)
}

fn is_contact(kind: &ArgumentKind) -> bool {
    matches!(kind, ArgumentKind::Contact)
}

fn is_text(kind: &ArgumentKind) -> bool {
    matches!(kind, ArgumentKind::Text)
}

const MINIMUM_ARGUMENTS: [MinimumArgument; 4] = [
    MinimumArgument {
        capability: "send_email",
        needs: "a recipient (contact or email address)",
        accepts: is_recipient,
    },
    MinimumArgument { capability: "schedule_meeting", needs: "an attendee contact", accepts: is_contact },
    MinimumArgument { capability: "create_task", needs: "a text title", accepts: is_text },
    MinimumArgument { capability: "analyze_sentiment", needs: "the text to analyze", accepts: is_text },
];

fn check_minimum_arguments(capability: &Capability) -> Result<(), RegistryError> {
    let Some(minimum) =
        MINIMUM_ARGUMENTS.iter().find(|minimum| minimum.capability == capability.name)
    else {
        return Ok(());
    };

    let declared = capability
        .argument_schema
        .iter()
        .any(|field| field.spec.required && (minimum.accepts)(&field.spec.kind));
    if declared {
        return Ok(());
    }
    Err(RegistryError::InvalidSchema {
        capability: capability.name.clone(),
        reason: format!("schema must declare a required argument for {}", minimum.needs),
    })
}

/// Immutable view of the registry. A dispatch works against one snapshot so a
/// concurrent registration can never be observed half-applied.
#[derive(Clone, Debug, Default)]
pub struct RegistrySnapshot {
    entries: Vec<Arc<Capability>>,
    index: HashMap<String, usize>,
}

impl RegistrySnapshot {
    pub fn get(&self, name: &str) -> Option<&Arc<Capability>> {
        self.index.get(name).map(|position| &self.entries[*position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Capability>> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|capability| capability.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn upsert(&mut self, capability: Capability) -> bool {
        let capability = Arc::new(capability);
        match self.index.get(&capability.name) {
            Some(position) => {
                self.entries[*position] = capability;
                true
            }
            None => {
                self.index.insert(capability.name.clone(), self.entries.len());
                self.entries.push(capability);
                false
            }
        }
    }
}

/// Process-wide capability table. Writers swap in a new snapshot; readers
/// only clone the current `Arc`.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a capability by name. A replacement keeps the slot the
    /// name was first registered in.
    pub fn register(&self, capability: Capability) -> Result<(), RegistryError> {
        capability.validate()?;
        check_minimum_arguments(&capability)?;

        let name = capability.name.clone();
        let argument_count = capability.argument_schema.len();
        let mut current = self.current.write();
        let mut next = RegistrySnapshot::clone(&current);
        let replaced = next.upsert(capability);
        *current = Arc::new(next);

        info!(
            event_name = "agent.registry.registered",
            capability = %name,
            argument_count,
            replaced,
            "capability registered"
        );
        Ok(())
    }

    pub fn register_all<I>(&self, capabilities: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = Capability>,
    {
        capabilities.into_iter().try_for_each(|capability| self.register(capability))
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Capability>> {
        self.snapshot().get(name).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        self.snapshot().names()
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::Value;
    use switchboard_core::{
        ArgumentKind, ArgumentSpec, Arguments, Capability, CapabilityHandler, HandlerError,
        RegistryError,
    };

    use super::CapabilityRegistry;

    struct Noop;

    #[async_trait]
    impl CapabilityHandler for Noop {
        async fn invoke(&self, _arguments: &Arguments) -> Result<Value, HandlerError> {
            Ok(Value::Null)
        }
    }

    fn capability(name: &str) -> Capability {
        Capability::new(name, format!("{name} capability"), Arc::new(Noop))
    }

    fn email_capability() -> Capability {
        capability("send_email").argument("to", ArgumentSpec::required(ArgumentKind::Contact))
    }

    #[test]
    fn list_preserves_registration_order() {
        let registry = CapabilityRegistry::new();
        for name in ["search_knowledge_base", "send_fax", "book_room", "archive_thread"] {
            registry.register(capability(name)).expect("valid capability");
        }

        assert_eq!(
            registry.list(),
            vec!["search_knowledge_base", "send_fax", "book_room", "archive_thread"]
        );
    }

    #[test]
    fn duplicate_registration_replaces_binding_in_place() {
        let registry = CapabilityRegistry::new();
        registry.register(email_capability()).expect("first registration");
        registry.register(capability("archive_thread")).expect("second capability");
        registry
            .register(
                capability("send_email")
                    .argument("to", ArgumentSpec::required(ArgumentKind::EmailAddress))
                    .argument("subject", ArgumentSpec::optional(ArgumentKind::Text)),
            )
            .expect("replacement");

        assert_eq!(registry.list(), vec!["send_email", "archive_thread"]);
        let found = registry.lookup("send_email").expect("registered");
        assert_eq!(found.argument_schema.len(), 2);
        assert_eq!(
            found.argument_schema.get("to").map(|spec| spec.kind.clone()),
            Some(ArgumentKind::EmailAddress)
        );
    }

    #[test]
    fn lookup_of_unknown_name_is_absent() {
        let registry = CapabilityRegistry::new();
        registry.register(email_capability()).expect("valid");
        assert!(registry.lookup("send_fax").is_none());
    }

    #[test]
    fn invalid_schema_never_enters_registry() {
        let registry = CapabilityRegistry::new();
        let error = registry
            .register(capability("archive_thread").requires_arguments())
            .expect_err("schema without arguments must be rejected");

        assert!(matches!(error, RegistryError::InvalidSchema { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn send_email_must_declare_a_recipient() {
        let registry = CapabilityRegistry::new();

        let bare = registry.register(capability("send_email")).expect_err("no recipient");
        assert!(matches!(
            bare,
            RegistryError::InvalidSchema { ref capability, ref reason }
                if capability == "send_email" && reason.contains("recipient")
        ));

        let subject_only = capability("send_email")
            .argument("subject", ArgumentSpec::required(ArgumentKind::Text))
            .argument("to", ArgumentSpec::optional(ArgumentKind::Contact));
        assert!(registry.register(subject_only).is_err());
        assert!(registry.list().is_empty());

        let by_address = capability("send_email")
            .argument("to", ArgumentSpec::required(ArgumentKind::EmailAddress));
        registry.register(by_address).expect("address recipient");
        assert_eq!(registry.list(), vec!["send_email"]);
    }

    #[test]
    fn rejected_replacement_keeps_the_previous_binding() {
        let registry = CapabilityRegistry::new();
        registry.register(email_capability()).expect("valid");

        registry.register(capability("send_email")).expect_err("no recipient");

        let current = registry.lookup("send_email").expect("still registered");
        assert_eq!(current.argument_schema.len(), 1);
    }

    #[test]
    fn snapshots_are_unaffected_by_later_registrations() {
        let registry = CapabilityRegistry::new();
        registry.register(email_capability()).expect("valid");
        let before = registry.snapshot();

        registry.register(capability("archive_thread")).expect("valid");

        assert_eq!(before.len(), 1);
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[test]
    fn concurrent_readers_see_whole_registrations() {
        let registry = Arc::new(CapabilityRegistry::new());
        let writer = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for index in 0..50 {
                    registry
                        .register(capability(&format!("capability_{index}")))
                        .expect("valid capability");
                }
            })
        };

        for _ in 0..200 {
            let snapshot = registry.snapshot();
            assert_eq!(snapshot.names().len(), snapshot.len());
            for name in snapshot.names() {
                assert!(snapshot.get(&name).is_some());
            }
        }

        writer.join().expect("writer thread");
        assert_eq!(registry.len(), 50);
    }
}
