use serde::Serialize;
use serde_json::Value;
use switchboard_agent::AgentRuntime;
use switchboard_core::config::{AppConfig, ClassifierKind, LoadOptions};
use switchboard_core::SessionId;

use crate::commands::{CommandResult, EXIT_CONFIG, EXIT_OK};

const PROBE_SESSION: &str = "doctor-probe";
const PROBE_INSTRUCTION: &str = "switchboard doctor probe";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { EXIT_OK } else { EXIT_CONFIG };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.push(check_classifier(&config));
            match AgentRuntime::from_config(&config) {
                Ok(runtime) => {
                    checks.push(check_registry(&runtime));
                    checks.push(check_knowledge_base(&config, &runtime));
                    checks.push(check_dispatch_probe(&runtime));
                }
                Err(error) => {
                    checks.push(DoctorCheck::fail("capability_registry", error.to_string()));
                    checks.push(DoctorCheck::skipped("knowledge_base", "the runtime did not build"));
                    checks.push(DoctorCheck::skipped("dispatch_probe", "the runtime did not build"));
                }
            }
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in ["classifier_readiness", "capability_registry", "knowledge_base", "dispatch_probe"]
            {
                checks.push(DoctorCheck::skipped(name, "configuration did not load"));
            }
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_classifier(config: &AppConfig) -> DoctorCheck {
    match config.dispatcher.classifier {
        ClassifierKind::Keyword => {
            DoctorCheck::pass("classifier_readiness", "keyword classifier needs no credentials")
        }
        ClassifierKind::Llm => DoctorCheck::pass(
            "classifier_readiness",
            format!(
                "llm classifier configured for {:?} model `{}`",
                config.llm.provider, config.llm.model
            ),
        ),
    }
}

fn check_registry(runtime: &AgentRuntime) -> DoctorCheck {
    let names = runtime.registry().list();
    if names.is_empty() {
        return DoctorCheck::fail("capability_registry", "no capabilities registered");
    }
    DoctorCheck::pass(
        "capability_registry",
        format!("{} capabilities registered: {}", names.len(), names.join(", ")),
    )
}

fn check_knowledge_base(config: &AppConfig, runtime: &AgentRuntime) -> DoctorCheck {
    let Some(dir) = &config.dispatcher.knowledge_base_dir else {
        return DoctorCheck::skipped("knowledge_base", "dispatcher.knowledge_base_dir is unset");
    };
    let documents = runtime.status().knowledge_documents;
    if documents == 0 {
        return DoctorCheck::fail(
            "knowledge_base",
            format!("no .md or .txt documents found in `{}`", dir.display()),
        );
    }
    DoctorCheck::pass("knowledge_base", format!("{documents} documents loaded from `{}`", dir.display()))
}

fn check_dispatch_probe(runtime: &AgentRuntime) -> DoctorCheck {
    let tokio_runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::fail(
                "dispatch_probe",
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    let session = SessionId::new(PROBE_SESSION);
    let result = tokio_runtime
        .block_on(runtime.dispatch(PROBE_INSTRUCTION, &Value::Null, Some(&session)));
    let recorded = runtime.history(&session, None).len();
    runtime.clear(&session);

    match result {
        Ok(_) if recorded == 1 => {
            DoctorCheck::pass("dispatch_probe", "probe instruction dispatched and recorded")
        }
        Ok(_) => DoctorCheck::fail(
            "dispatch_probe",
            format!("probe dispatched but {recorded} turns were recorded"),
        ),
        Err(error) => DoctorCheck::fail("dispatch_probe", format!("probe dispatch failed: {error}")),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
