use std::env;
use std::io::Cursor;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use switchboard_agent::AgentRuntime;
use switchboard_cli::commands::dispatch::DispatchArgs;
use switchboard_cli::commands::{capabilities, chat, config, dispatch, doctor};
use switchboard_core::config::AppConfig;
use switchboard_core::SessionId;

fn args(instruction: &str) -> DispatchArgs {
    DispatchArgs { instruction: instruction.to_string(), ..DispatchArgs::default() }
}

#[test]
fn dispatch_routes_instruction_with_default_env() {
    with_env(&[], || {
        let result = dispatch::run(args("send an email to maria@example.com about the renewal"));
        assert_eq!(result.exit_code, 0, "expected successful dispatch");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "dispatch");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["invocation"]["capability_name"], "send_email");
        assert_eq!(payload["data"]["execution"], Value::Null);
    });
}

#[test]
fn dispatch_of_gibberish_succeeds_with_no_capability() {
    with_env(&[], || {
        let result = dispatch::run(args("asdkjhaskjdh"));
        assert_eq!(result.exit_code, 0, "a none invocation is a normal outcome");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["invocation"]["capability_name"], Value::Null);
        assert_eq!(payload["data"]["invocation"]["reason"]["kind"], "no_match");
    });
}

#[test]
fn dispatch_executes_matched_capability_when_requested() {
    with_env(&[], || {
        let result = dispatch::run(DispatchArgs {
            execute: true,
            ..args("Create a task \"Renew the SSL certificate\"")
        });
        assert_eq!(result.exit_code, 0, "expected successful execution");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["invocation"]["capability_name"], "create_task");
        assert_eq!(payload["data"]["execution"]["output"]["status"], "accepted");
    });
}

#[test]
fn dispatch_rejects_context_that_is_not_an_object() {
    with_env(&[], || {
        let result = dispatch::run(DispatchArgs {
            context: Some("[1, 2, 3]".to_string()),
            ..args("send an email to Maria")
        });
        assert_eq!(result.exit_code, 3, "expected dispatch failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "invalid_arguments");
    });
}

#[test]
fn dispatch_rejects_unparseable_context() {
    with_env(&[], || {
        let result = dispatch::run(DispatchArgs {
            context: Some("{not json".to_string()),
            ..args("send an email to Maria")
        });
        assert_eq!(result.exit_code, 3);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_context");
    });
}

#[test]
fn dispatch_returns_config_failure_with_invalid_env() {
    with_env(&[("SWITCHBOARD_DISPATCHER_MAX_SESSION_TURNS", "0")], || {
        let result = dispatch::run(args("send an email to Maria"));
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "dispatch");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn chat_shares_one_session_across_follow_ups() {
    with_env(&[], || {
        let runtime = AgentRuntime::from_config(&AppConfig::default()).expect("runtime");
        let session = SessionId::from("ops");
        let input = Cursor::new(
            "Schedule a meeting with Maria tomorrow at 3pm\n\nnow send an email to her\nquit\nignored after quit\n",
        );
        let mut output = Vec::new();

        let result = chat::run_with(&runtime, &session, false, input, &mut output);
        assert_eq!(result.exit_code, 0, "expected chat to end cleanly");
        assert!(parse_payload(&result.output)["message"]
            .as_str()
            .unwrap_or_default()
            .contains("after 2 instruction(s)"));

        let printed = String::from_utf8(output).expect("utf8");
        let lines: Vec<Value> = printed.lines().map(parse_payload).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["data"]["invocation"]["capability_name"], "schedule_meeting");
        assert_eq!(lines[1]["data"]["invocation"]["capability_name"], "send_email");
        assert_eq!(lines[1]["data"]["invocation"]["arguments"]["to"], "Maria");
        assert_eq!(runtime.history(&session, None).len(), 2);
    });
}

#[test]
fn chat_history_and_clear_commands_operate_on_the_session() {
    with_env(&[], || {
        let runtime = AgentRuntime::from_config(&AppConfig::default()).expect("runtime");
        let session = SessionId::from("ops");
        let input = Cursor::new("asdkjhaskjdh\n/history\n/clear\n/history\n");
        let mut output = Vec::new();

        chat::run_with(&runtime, &session, false, input, &mut output);

        let printed = String::from_utf8(output).expect("utf8");
        let lines: Vec<Value> = printed.lines().map(parse_payload).collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1]["data"]["turns"].as_array().map(Vec::len), Some(1));
        assert_eq!(lines[2]["message"], "session `ops` cleared");
        assert_eq!(lines[3]["data"]["turns"].as_array().map(Vec::len), Some(0));
    });
}

#[test]
fn capabilities_lists_stock_catalog_in_registration_order() {
    with_env(&[], || {
        let result = capabilities::run();
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let names: Vec<&str> = payload["data"]["capabilities"]
            .as_array()
            .expect("capability list")
            .iter()
            .filter_map(|card| card["name"].as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "search_knowledge_base",
                "send_email",
                "schedule_meeting",
                "create_task",
                "analyze_sentiment"
            ]
        );
        assert_eq!(payload["data"]["classifier"], "keyword");
    });
}

#[test]
fn config_attributes_env_sources_and_redacts_secrets() {
    with_env(
        &[("SWITCHBOARD_SERVER_PORT", "9100"), ("SWITCHBOARD_LLM_API_KEY", "sk-super-secret")],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);

            assert!(result
                .output
                .contains("- server.port = 9100 (source: env (SWITCHBOARD_SERVER_PORT))"));
            assert!(result.output.contains("- server.bind_address = 127.0.0.1 (source: default)"));
            assert!(result.output.contains("- llm.api_key = sk-***"));
            assert!(!result.output.contains("super-secret"));
        },
    );
}

#[test]
fn config_reports_validation_failure() {
    with_env(&[("SWITCHBOARD_LOGGING_FORMAT", "yaml")], || {
        let result = config::run();
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn doctor_passes_with_default_env() {
    with_env(&[], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "expected all doctor checks to pass");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        let statuses: Vec<(&str, &str)> = payload["checks"]
            .as_array()
            .expect("checks")
            .iter()
            .map(|check| {
                (check["name"].as_str().unwrap_or(""), check["status"].as_str().unwrap_or(""))
            })
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("config_validation", "pass"),
                ("classifier_readiness", "pass"),
                ("capability_registry", "pass"),
                ("knowledge_base", "skipped"),
                ("dispatch_probe", "pass"),
            ]
        );
    });
}

#[test]
fn doctor_fails_when_llm_classifier_has_no_key() {
    with_env(&[("SWITCHBOARD_DISPATCHER_CLASSIFIER", "llm")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 2);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] config_validation:"));
        assert!(result.output.contains("- [skip] dispatch_probe:"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SWITCHBOARD_SERVER_BIND_ADDRESS",
        "SWITCHBOARD_SERVER_PORT",
        "SWITCHBOARD_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "SWITCHBOARD_DISPATCHER_MAX_SESSION_TURNS",
        "SWITCHBOARD_DISPATCHER_TIMEOUT_SECS",
        "SWITCHBOARD_DISPATCHER_CLASSIFIER",
        "SWITCHBOARD_KNOWLEDGE_BASE_DIR",
        "SWITCHBOARD_LLM_PROVIDER",
        "SWITCHBOARD_LLM_API_KEY",
        "SWITCHBOARD_LLM_BASE_URL",
        "SWITCHBOARD_LLM_MODEL",
        "SWITCHBOARD_LLM_TIMEOUT_SECS",
        "SWITCHBOARD_WEBHOOK_SIGNING_SECRET",
        "SWITCHBOARD_LOGGING_LEVEL",
        "SWITCHBOARD_LOGGING_FORMAT",
        "SWITCHBOARD_LOG_LEVEL",
        "SWITCHBOARD_LOG_FORMAT",
        "OPENAI_API_KEY",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
