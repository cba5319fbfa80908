pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use switchboard_core::config::{AppConfig, LoadOptions};

use crate::commands::dispatch::DispatchArgs;

#[derive(Debug, Parser)]
#[command(
    name = "switchboard",
    about = "Switchboard operator CLI",
    long_about = "Route natural-language instructions to registered capabilities, inspect the capability catalog, and check runtime readiness.",
    after_help = "Examples:\n  switchboard dispatch \"Schedule a meeting with John tomorrow at 2 PM\"\n  switchboard chat --session ops\n  switchboard doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Dispatch one instruction and print the resulting invocation as JSON")]
    Dispatch {
        #[arg(help = "Natural-language instruction to route")]
        instruction: String,
        #[arg(long, help = "JSON object with structured context (e.g. known contacts)")]
        context: Option<String>,
        #[arg(long, help = "Session id to record the turn under")]
        session: Option<String>,
        #[arg(long, help = "Run the matched capability's handler")]
        execute: bool,
    },
    #[command(about = "Read instructions from stdin, sharing one conversation session")]
    Chat {
        #[arg(long, help = "Session id for the conversation (default: cli)")]
        session: Option<String>,
        #[arg(long, help = "Run the matched capability's handler for each instruction")]
        execute: bool,
    },
    #[command(about = "List registered capabilities and their argument schemas")]
    Capabilities,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, build the runtime, and run a dispatch probe")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Dispatch { instruction, context, session, execute } => {
            commands::dispatch::run(DispatchArgs { instruction, context, session, execute })
        }
        Command::Chat { session, execute } => commands::chat::run(session, execute),
        Command::Capabilities => commands::capabilities::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging() {
    use switchboard_core::config::LogFormat::*;
    use tracing::Level;

    let Ok(config) = AppConfig::load(LoadOptions::default()) else {
        return;
    };
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::WARN);
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(log_level);

    let _ = match config.logging.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    };
}
