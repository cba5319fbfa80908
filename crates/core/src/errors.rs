use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid schema for capability `{capability}`: {reason}")]
    InvalidSchema { capability: String, reason: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
    #[error("classifier returned an unusable response: {0}")]
    InvalidResponse(String),
    #[error("classifier prompt could not be rendered: {0}")]
    Prompt(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("handler rejected arguments: {0}")]
    Rejected(String),
    #[error("upstream service failed: {0}")]
    Upstream(String),
    #[error("handler unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Handler(#[from] HandlerError),
    #[error("invocation has no capability to execute")]
    NothingToExecute,
    #[error("capability `{0}` is no longer registered")]
    CapabilityNotFound(String),
    #[error("dispatch timed out after {0}s")]
    Timeout(u64),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("bad gateway: {message}")]
    BadGateway { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::BadGateway { .. } => "A downstream integration failed to complete the action.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::BadGateway { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::BadGateway { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::BadGateway { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Dispatch(DispatchError::InvalidArguments(message)) => {
                Self::BadRequest { message, correlation_id }
            }
            ApplicationError::NothingToExecute | ApplicationError::CapabilityNotFound(_) => {
                Self::BadRequest { message: value.to_string(), correlation_id }
            }
            ApplicationError::Handler(HandlerError::Rejected(message)) => {
                Self::BadRequest { message, correlation_id }
            }
            ApplicationError::Handler(HandlerError::Upstream(message)) => {
                Self::BadGateway { message, correlation_id }
            }
            ApplicationError::Dispatch(DispatchError::Classifier(error)) => {
                Self::ServiceUnavailable { message: error.to_string(), correlation_id }
            }
            ApplicationError::Handler(HandlerError::Unavailable(message)) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Timeout(_) => {
                Self::ServiceUnavailable { message: value.to_string(), correlation_id }
            }
            ApplicationError::Registry(error) => {
                Self::Internal { message: error.to_string(), correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{
        ApplicationError, ClassifierError, DispatchError, HandlerError, InterfaceError,
        RegistryError,
    };

    #[test]
    fn malformed_context_maps_to_bad_request() {
        let interface = ApplicationError::from(DispatchError::InvalidArguments(
            "context must be a JSON object".to_owned(),
        ))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn classifier_failure_maps_to_service_unavailable() {
        let interface = ApplicationError::from(DispatchError::from(ClassifierError::Unavailable(
            "model endpoint refused connection".to_owned(),
        )))
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert!(interface.message().contains("refused connection"));
    }

    #[test]
    fn upstream_handler_failure_maps_to_bad_gateway() {
        let interface =
            ApplicationError::from(HandlerError::Upstream("webhook returned 500".to_owned()))
                .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::BadGateway { .. }));
        assert_eq!(interface.correlation_id(), "req-3");
    }

    #[test]
    fn registry_error_maps_to_internal() {
        let interface = ApplicationError::from(RegistryError::InvalidSchema {
            capability: "send_email".to_owned(),
            reason: "missing recipient".to_owned(),
        })
        .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
