use serde_json::{json, Value};
use switchboard_agent::AgentRuntime;
use switchboard_core::{ApplicationError, DispatchError, SessionId};

use crate::commands::{block_on, load_runtime, CommandResult, EXIT_DISPATCH};

const COMMAND: &str = "dispatch";

#[derive(Debug, Clone, Default)]
pub struct DispatchArgs {
    pub instruction: String,
    pub context: Option<String>,
    pub session: Option<String>,
    pub execute: bool,
}

pub fn run(args: DispatchArgs) -> CommandResult {
    let context = match parse_context(args.context.as_deref()) {
        Ok(context) => context,
        Err(result) => return result,
    };
    let (_, runtime) = match load_runtime(COMMAND) {
        Ok(loaded) => loaded,
        Err(result) => return result,
    };
    let session = args.session.map(SessionId::new);

    block_on(
        COMMAND,
        dispatch_once(&runtime, COMMAND, &args.instruction, &context, session.as_ref(), args.execute),
    )
    .unwrap_or_else(|result| result)
}

pub(crate) fn parse_context(raw: Option<&str>) -> Result<Value, CommandResult> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(Value::Null);
    };
    serde_json::from_str(raw).map_err(|error| {
        CommandResult::failure(
            COMMAND,
            "invalid_context",
            format!("--context is not valid JSON: {error}"),
            EXIT_DISPATCH,
        )
    })
}

/// Dispatches one instruction and optionally executes the result.
pub(crate) async fn dispatch_once(
    runtime: &AgentRuntime,
    command: &str,
    instruction: &str,
    context: &Value,
    session: Option<&SessionId>,
    execute: bool,
) -> CommandResult {
    if instruction.trim().is_empty() {
        return CommandResult::failure(
            command,
            "invalid_arguments",
            "instruction must not be empty",
            EXIT_DISPATCH,
        );
    }

    let invocation = match runtime.dispatch(instruction, context, session).await {
        Ok(invocation) => invocation,
        Err(error) => return application_failure(command, error.into()),
    };

    let message = match (invocation.capability_name(), invocation.reason()) {
        (Some(name), _) => format!("dispatched to `{name}`"),
        (None, Some(reason)) => reason.message(),
        (None, None) => "no capability matched".to_string(),
    };

    let execution = if execute && !invocation.is_none() {
        match runtime.execute(&invocation).await {
            Ok(outcome) => Some(outcome),
            Err(error) => return application_failure(command, error),
        }
    } else {
        None
    };

    CommandResult::success_with(
        command,
        message,
        Some(json!({ "invocation": invocation, "execution": execution })),
    )
}

fn application_failure(command: &str, error: ApplicationError) -> CommandResult {
    let error_class = match &error {
        ApplicationError::Dispatch(DispatchError::InvalidArguments(_)) => "invalid_arguments",
        ApplicationError::Dispatch(DispatchError::Classifier(_)) => "classifier",
        ApplicationError::Handler(_) => "handler",
        ApplicationError::NothingToExecute | ApplicationError::CapabilityNotFound(_) => {
            "execution"
        }
        ApplicationError::Timeout(_) => "timeout",
        ApplicationError::Registry(_) | ApplicationError::Configuration(_) => "runtime",
    };
    CommandResult::failure(command, error_class, error.to_string(), EXIT_DISPATCH)
}
