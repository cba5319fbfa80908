pub mod config;
pub mod domain;
pub mod errors;

pub use domain::capability::{
    ArgumentField, ArgumentKind, ArgumentSchema, ArgumentSpec, Arguments, Capability,
    CapabilityCard, CapabilityHandler,
};
pub use domain::invocation::{Invocation, NoMatchReason};
pub use domain::session::{ConversationTurn, SessionId, TurnRecord};
pub use errors::{
    ApplicationError, ClassifierError, DispatchError, HandlerError, InterfaceError, RegistryError,
};
