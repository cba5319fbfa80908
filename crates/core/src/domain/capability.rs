use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{HandlerError, RegistryError};

/// Extracted argument values keyed by argument name.
pub type Arguments = BTreeMap<String, Value>;

/// Wire format for `DateTime` argument values.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Performs the action behind a capability. The dispatcher only decides to
/// invoke; implementations live at the edge (email, calendar, webhooks).
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn invoke(&self, arguments: &Arguments) -> Result<Value, HandlerError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "options", rename_all = "snake_case")]
pub enum ArgumentKind {
    Text,
    DateTime,
    Contact,
    EmailAddress,
    Choice(Vec<String>),
}

impl ArgumentKind {
    pub fn accepts(&self, value: &Value) -> bool {
        let Some(raw) = value.as_str() else {
            return false;
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return false;
        }

        match self {
            Self::Text | Self::Contact => true,
            Self::DateTime => NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT).is_ok(),
            Self::EmailAddress => looks_like_email(raw),
            Self::Choice(options) => options.iter().any(|option| option.eq_ignore_ascii_case(raw)),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::DateTime => "datetime",
            Self::Contact => "contact",
            Self::EmailAddress => "email_address",
            Self::Choice(_) => "choice",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentSpec {
    pub kind: ArgumentKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Falls back to the full instruction text when nothing narrower is found.
    #[serde(default)]
    pub whole_instruction: bool,
}

impl ArgumentSpec {
    pub fn required(kind: ArgumentKind) -> Self {
        Self { kind, required: true, default: None, description: String::new(), whole_instruction: false }
    }

    pub fn optional(kind: ArgumentKind) -> Self {
        Self { required: false, ..Self::required(kind) }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn from_instruction(mut self) -> Self {
        self.whole_instruction = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentField {
    pub name: String,
    #[serde(flatten)]
    pub spec: ArgumentSpec,
}

/// Ordered argument declarations. Inserting an existing name replaces it in place.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArgumentSchema {
    fields: Vec<ArgumentField>,
}

impl ArgumentSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, spec: ArgumentSpec) {
        let name = name.into();
        match self.fields.iter_mut().find(|field| field.name == name) {
            Some(existing) => existing.spec = spec,
            None => self.fields.push(ArgumentField { name, spec }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ArgumentSpec> {
        self.fields.iter().find(|field| field.name == name).map(|field| &field.spec)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArgumentField> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Clone)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub argument_schema: ArgumentSchema,
    pub requires_arguments: bool,
    pub handler: Arc<dyn CapabilityHandler>,
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("keywords", &self.keywords)
            .field("argument_schema", &self.argument_schema)
            .field("requires_arguments", &self.requires_arguments)
            .finish_non_exhaustive()
    }
}

impl Capability {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            keywords: Vec::new(),
            argument_schema: ArgumentSchema::new(),
            requires_arguments: false,
            handler,
        }
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn argument(mut self, name: impl Into<String>, spec: ArgumentSpec) -> Self {
        self.argument_schema.insert(name, spec);
        self
    }

    pub fn requires_arguments(mut self) -> Self {
        self.requires_arguments = true;
        self
    }

    pub fn card(&self) -> CapabilityCard {
        CapabilityCard {
            name: self.name.clone(),
            description: self.description.clone(),
            keywords: self.keywords.clone(),
            arguments: self.argument_schema.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |reason: String| RegistryError::InvalidSchema {
            capability: self.name.clone(),
            reason,
        };

        if !is_valid_name(&self.name) {
            return Err(invalid(
                "name must be non-empty lowercase ascii, digits, `_`, `.` or `-`".to_string(),
            ));
        }

        if self.requires_arguments && self.argument_schema.is_empty() {
            return Err(invalid("capability requires at least one declared argument".to_string()));
        }

        for field in self.argument_schema.iter() {
            if field.name.trim().is_empty() {
                return Err(invalid("argument names must be non-empty".to_string()));
            }
            if let ArgumentKind::Choice(options) = &field.spec.kind {
                if options.is_empty() {
                    return Err(invalid(format!(
                        "choice argument `{}` declares no options",
                        field.name
                    )));
                }
            }
            if let Some(default) = &field.spec.default {
                if !field.spec.kind.accepts(default) {
                    return Err(invalid(format!(
                        "default for `{}` is not a valid {}",
                        field.name,
                        field.spec.kind.label()
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Serializable view of a capability, as presented to classifiers and API callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityCard {
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub arguments: ArgumentSchema,
}

pub fn looks_like_email(candidate: &str) -> bool {
    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !candidate.chars().any(char::is_whitespace)
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|character| {
            character.is_ascii_lowercase()
                || character.is_ascii_digit()
                || matches!(character, '_' | '.' | '-')
        })
}
