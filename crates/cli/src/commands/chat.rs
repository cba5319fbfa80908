use std::io::{self, BufRead, Write};

use anyhow::Context;
use serde_json::{json, Value};
use switchboard_agent::AgentRuntime;
use switchboard_core::SessionId;

use crate::commands::dispatch::dispatch_once;
use crate::commands::{block_on, load_runtime, CommandResult, EXIT_DISPATCH};

const COMMAND: &str = "chat";
const DEFAULT_SESSION: &str = "cli";

pub fn run(session: Option<String>, execute: bool) -> CommandResult {
    let (_, runtime) = match load_runtime(COMMAND) {
        Ok(loaded) => loaded,
        Err(result) => return result,
    };
    let session = SessionId::new(session.unwrap_or_else(|| DEFAULT_SESSION.to_string()));

    let stdin = io::stdin();
    let stdout = io::stdout();
    run_with(&runtime, &session, execute, stdin.lock(), stdout.lock())
}

/// Reads instructions line by line, printing one JSON outcome per line.
///
/// `/history` prints the session log, `/clear` forgets it, and `quit` or
/// `exit` (or end of input) ends the session.
pub fn run_with(
    runtime: &AgentRuntime,
    session: &SessionId,
    execute: bool,
    input: impl BufRead,
    output: impl Write,
) -> CommandResult {
    match block_on(COMMAND, session_loop(runtime, session, execute, input, output)) {
        Ok(Ok(turns)) => CommandResult::success(
            COMMAND,
            format!("chat session `{session}` ended after {turns} instruction(s)"),
        ),
        Ok(Err(error)) => {
            CommandResult::failure(COMMAND, "io", format!("{error:#}"), EXIT_DISPATCH)
        }
        Err(result) => result,
    }
}

async fn session_loop(
    runtime: &AgentRuntime,
    session: &SessionId,
    execute: bool,
    input: impl BufRead,
    mut output: impl Write,
) -> anyhow::Result<usize> {
    let mut turns = 0;

    for line in input.lines() {
        let line = line.context("failed to read instruction")?;
        let instruction = line.trim();

        let rendered = match instruction {
            "" => continue,
            "quit" | "exit" => break,
            "/history" => CommandResult::success_with(
                COMMAND,
                format!("history for session `{session}`"),
                Some(json!({ "turns": runtime.history(session, None) })),
            ),
            "/clear" => {
                runtime.clear(session);
                CommandResult::success(COMMAND, format!("session `{session}` cleared"))
            }
            instruction => {
                turns += 1;
                dispatch_once(runtime, COMMAND, instruction, &Value::Null, Some(session), execute)
                    .await
            }
        };

        writeln!(output, "{}", rendered.output).context("failed to write outcome")?;
        output.flush().context("failed to flush output")?;
    }

    Ok(turns)
}
