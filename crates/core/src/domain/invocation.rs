use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::capability::Arguments;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoMatchReason {
    NoMatch,
    MissingArguments { capability: String, missing: Vec<String> },
    UnknownCapability { name: String },
}

impl NoMatchReason {
    pub fn message(&self) -> String {
        match self {
            Self::NoMatch => "no registered capability matched the instruction".to_string(),
            Self::MissingArguments { capability, missing } => {
                format!("`{capability}` is missing required arguments: {}", missing.join(", "))
            }
            Self::UnknownCapability { name } => {
                format!("classifier chose `{name}`, which is not registered")
            }
        }
    }
}

/// The dispatcher's decision for one instruction. Built once, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    id: Uuid,
    capability_name: Option<String>,
    arguments: Arguments,
    confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<NoMatchReason>,
}

impl Invocation {
    pub fn matched(
        capability_name: impl Into<String>,
        arguments: Arguments,
        confidence: Option<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            capability_name: Some(capability_name.into()),
            arguments,
            confidence: confidence.map(clamp_unit),
            reason: None,
        }
    }

    pub fn none(reason: NoMatchReason, confidence: Option<f32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            capability_name: None,
            arguments: Arguments::new(),
            confidence: confidence.map(clamp_unit),
            reason: Some(reason),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn capability_name(&self) -> Option<&str> {
        self.capability_name.as_deref()
    }

    pub fn is_none(&self) -> bool {
        self.capability_name.is_none()
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    pub fn confidence(&self) -> Option<f32> {
        self.confidence
    }

    pub fn reason(&self) -> Option<&NoMatchReason> {
        self.reason.as_ref()
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
