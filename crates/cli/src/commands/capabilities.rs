use serde_json::json;

use crate::commands::{load_runtime, CommandResult};

pub fn run() -> CommandResult {
    let (config, runtime) = match load_runtime("capabilities") {
        Ok(loaded) => loaded,
        Err(result) => return result,
    };

    let cards = runtime.capabilities();
    CommandResult::success_with(
        "capabilities",
        format!("{} capabilities registered", cards.len()),
        Some(json!({
            "classifier": runtime.status().classifier,
            "webhook_bound": config.webhooks.endpoints.keys().collect::<Vec<_>>(),
            "capabilities": cards,
        })),
    )
}
