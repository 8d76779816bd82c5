//! Prometheus metrics surface, scraped at `GET /metrics`.
//!
//! `metrics` + `metrics-exporter-prometheus` is the common way a
//! long-running Rust daemon exposes a scraped endpoint. Registration happens
//! once at startup (`install`); every other call site uses the `metrics`
//! crate's facade macros directly rather than threading a handle through the
//! codebase.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::incident::{IncidentStatus, Outcome, StageName, ToolOutcome};

/// Install the Prometheus recorder and return a handle whose `render()`
/// produces the text exposition format served at `/metrics`.
pub fn install() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("installing the global metrics recorder must only happen once per process");

    metrics::describe_counter!("incidents_total", "Incidents that reached a terminal state.");
    metrics::describe_counter!("tool_invocations_total", "Tool invocations by tool and outcome.");
    metrics::describe_counter!("approvals_total", "Approval Gate decisions by decision kind.");
    metrics::describe_gauge!("incidents_in_flight", "Incidents currently being driven by the pipeline.");
    metrics::describe_gauge!("memory_records", "Rows currently stored in the vector incident memory.");
    metrics::describe_gauge!("success_rate", "Fraction of closed incidents whose outcome was resolved.");
    metrics::describe_histogram!("incident_duration_seconds", "Incident wall-clock time from intake to terminal state.");
    metrics::describe_histogram!("stage_duration_seconds", "Per-stage wall-clock time.");
    metrics::describe_histogram!("llm_tokens_per_incident", "Total prompt+completion tokens spent per incident.");

    handle
}

pub fn record_incident_terminal(status: IncidentStatus, outcome: Option<Outcome>, duration_seconds: f64) {
    let outcome_label = outcome.map(|o| format!("{o:?}").to_lowercase()).unwrap_or_else(|| "none".into());
    metrics::counter!("incidents_total", "status" => format!("{status:?}").to_lowercase(), "outcome" => outcome_label).increment(1);
    metrics::histogram!("incident_duration_seconds").record(duration_seconds);
}

pub fn record_tool_invocation(tool: &str, outcome: ToolOutcome) {
    let outcome_label = match outcome {
        ToolOutcome::Ok => "ok",
        ToolOutcome::Error => "error",
        ToolOutcome::Denied => "denied",
        ToolOutcome::Dryrun => "dryrun",
    };
    metrics::counter!("tool_invocations_total", "tool" => tool.to_string(), "outcome" => outcome_label).increment(1);
}

pub fn record_approval_decision(decision: &str) {
    metrics::counter!("approvals_total", "decision" => decision.to_string()).increment(1);
}

pub fn record_stage_duration(stage: StageName, seconds: f64) {
    metrics::histogram!("stage_duration_seconds", "stage" => stage.as_str()).record(seconds);
}

pub fn record_llm_tokens(total_tokens: u64) {
    metrics::histogram!("llm_tokens_per_incident").record(total_tokens as f64);
}

pub fn set_incidents_in_flight(count: usize) {
    metrics::gauge!("incidents_in_flight").set(count as f64);
}

pub fn set_memory_records(count: usize) {
    metrics::gauge!("memory_records").set(count as f64);
}

pub fn set_success_rate(rate: f64) {
    metrics::gauge!("success_rate").set(rate);
}
