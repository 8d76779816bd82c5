//! Axum handlers for the HTTP ingress: `POST /alert`, `GET /health`,
//! `GET /stats`, `GET /incidents`, `GET /metrics`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine;
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::channels::ChannelMessage;
use crate::domain::alert::{Alert, AlertStatus};
use crate::domain::incident::Incident;
use crate::memory::VectorMemory;
use crate::pipeline::store::IncidentStore;

/// Shared state handed to every gateway handler.
#[derive(Clone)]
pub struct GatewayState {
    pub intake: mpsc::Sender<Alert>,
    pub store: Arc<IncidentStore>,
    pub memory: Arc<dyn VectorMemory>,
    pub metrics_handle: PrometheusHandle,
    pub webhook_secret: Option<String>,
    /// Feeds inbound `APPROVE`/`REJECT` replies into the registered chat
    /// channel's `listen()` loop. `None` when no chat channel is configured.
    pub commands: Option<mpsc::Sender<ChannelMessage>>,
}

/// Build the gateway router. Mounted at the root by the caller.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/alert", post(post_alert))
        .route("/health", get(get_health))
        .route("/stats", get(get_stats))
        .route("/incidents", get(get_incidents))
        .route("/metrics", get(get_metrics))
        .route("/commands", post(post_command))
        .with_state(state)
}

// ─── POST /alert ──────────────────────────────────────────────────────────────

/// One entry of an Alertmanager v4 webhook payload.
#[derive(Debug, Deserialize)]
struct AlertmanagerAlert {
    status: String,
    #[serde(default)]
    labels: HashMap<String, String>,
    #[serde(default)]
    annotations: HashMap<String, String>,
    #[serde(rename = "startsAt")]
    starts_at: DateTime<Utc>,
    #[serde(rename = "endsAt", default)]
    ends_at: Option<DateTime<Utc>>,
    #[serde(rename = "generatorURL", default)]
    generator_url: Option<String>,
    fingerprint: String,
}

/// The full Alertmanager v4 webhook body.
#[derive(Debug, Deserialize)]
struct AlertmanagerPayload {
    #[allow(dead_code)]
    status: String,
    alerts: Vec<AlertmanagerAlert>,
    #[serde(rename = "commonLabels", default)]
    #[allow(dead_code)]
    common_labels: HashMap<String, String>,
    #[serde(rename = "commonAnnotations", default)]
    #[allow(dead_code)]
    common_annotations: HashMap<String, String>,
}

impl From<AlertmanagerAlert> for Alert {
    fn from(a: AlertmanagerAlert) -> Self {
        let status = if a.status.eq_ignore_ascii_case("resolved") {
            AlertStatus::Resolved
        } else {
            AlertStatus::Firing
        };
        let severity = a.labels.get("severity").cloned().unwrap_or_else(|| "warning".to_string());
        // `endsAt` is "0001-01-01T00:00:00Z" for still-firing alerts in the
        // Alertmanager wire format rather than an absent field.
        let ends_at = a.ends_at.filter(|t| t.timestamp() > 0);
        Alert {
            fingerprint: a.fingerprint,
            status,
            severity,
            labels: a.labels,
            annotations: a.annotations,
            starts_at: a.starts_at,
            ends_at,
            generator_url: a.generator_url,
        }
    }
}

#[derive(Debug, Serialize)]
struct AcceptedResponse {
    accepted: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

async fn post_alert(State(state): State<GatewayState>, headers: HeaderMap, body: String) -> Response {
    if let Some(expected) = &state.webhook_secret {
        let provided = headers.get("X-Webhook-Secret").and_then(|v| v.to_str().ok()).unwrap_or_default();
        if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
            return (StatusCode::UNAUTHORIZED, Json(ErrorResponse { error: "invalid webhook secret".into() }))
                .into_response();
        }
    }

    let payload: AlertmanagerPayload = match serde_json::from_str(&body) {
        Ok(p) => p,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: format!("malformed payload: {e}") }))
                .into_response();
        }
    };

    let mut accepted = 0;
    for entry in payload.alerts {
        let alert: Alert = entry.into();
        match state.intake.try_send(alert) {
            Ok(()) => accepted += 1,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("intake queue full, rejecting webhook delivery");
                return (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse { error: "intake queue full".into() }))
                    .into_response();
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ErrorResponse { error: "pipeline not accepting alerts".into() }),
                )
                    .into_response();
            }
        }
    }

    (StatusCode::ACCEPTED, Json(AcceptedResponse { accepted })).into_response()
}

// ─── POST /commands ───────────────────────────────────────────────────────────

/// Body posted by a chat relay (Slack slash command, generic webhook
/// callback) carrying an operator's reply to an approval prompt.
#[derive(Debug, Deserialize)]
struct CommandPayload {
    content: String,
    #[serde(default)]
    sender: Option<String>,
}

async fn post_command(State(state): State<GatewayState>, headers: HeaderMap, Json(body): Json<CommandPayload>) -> Response {
    if let Some(expected) = &state.webhook_secret {
        let provided = headers.get("X-Webhook-Secret").and_then(|v| v.to_str().ok()).unwrap_or_default();
        if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
            return (StatusCode::UNAUTHORIZED, Json(ErrorResponse { error: "invalid webhook secret".into() }))
                .into_response();
        }
    }

    let Some(commands) = &state.commands else {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse { error: "no chat channel registered".into() }))
            .into_response();
    };

    let mut msg = ChannelMessage::new("chat", body.content);
    if let Some(sender) = body.sender {
        msg = msg.with_sender(sender);
    }
    match commands.try_send(msg) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(mpsc::error::TrySendError::Full(_)) => {
            (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse { error: "command queue full".into() })).into_response()
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse { error: "chat channel not listening".into() }))
                .into_response()
        }
    }
}

// ─── GET /health ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct HealthMemory {
    status: String,
    count: usize,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    memory: HealthMemory,
}

async fn get_health(State(state): State<GatewayState>) -> Response {
    let (status, count) = match state.memory.stats().await {
        Ok(stats) => ("ok".to_string(), stats.total),
        Err(e) => {
            tracing::warn!("memory health check failed: {e}");
            ("unavailable".to_string(), 0)
        }
    };
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        memory: HealthMemory { status, count },
    })
    .into_response()
}

// ─── GET /stats ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct StatsResponse {
    total: usize,
    #[serde(rename = "successRate")]
    success_rate: f64,
    #[serde(rename = "avgDurationSeconds")]
    avg_duration_seconds: f64,
    #[serde(rename = "costUsd")]
    cost_usd: f64,
    #[serde(rename = "bySeverity")]
    by_severity: HashMap<String, usize>,
}

async fn get_stats(State(state): State<GatewayState>) -> Response {
    match state.memory.stats().await {
        Ok(s) => {
            crate::metrics::set_memory_records(s.total);
            crate::metrics::set_success_rate(s.success_rate);
            Json(StatsResponse {
                total: s.total,
                success_rate: s.success_rate,
                avg_duration_seconds: s.avg_duration_seconds,
                cost_usd: s.cost_usd,
                by_severity: s.by_severity,
            })
            .into_response()
        }
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse { error: e })).into_response(),
    }
}

// ─── GET /incidents ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct IncidentsQuery {
    limit: Option<usize>,
    cursor: Option<String>,
}

#[derive(Debug, Serialize)]
struct IncidentSummary {
    id: Uuid,
    fingerprint: String,
    #[serde(rename = "receivedAt")]
    received_at: DateTime<Utc>,
    status: String,
    severity: String,
    outcome: Option<String>,
    summary: String,
}

impl From<&Incident> for IncidentSummary {
    fn from(i: &Incident) -> Self {
        Self {
            id: i.id,
            fingerprint: i.fingerprint.clone(),
            received_at: i.received_at,
            status: format!("{:?}", i.status).to_lowercase(),
            severity: i.severity.clone(),
            outcome: i.outcome.map(|o| format!("{o:?}").to_lowercase()),
            summary: i.summary.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct IncidentsResponse {
    items: Vec<IncidentSummary>,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    next_cursor: Option<String>,
}

const DEFAULT_PAGE_LIMIT: usize = 50;
const MAX_PAGE_LIMIT: usize = 500;

fn encode_cursor(cursor: (DateTime<Utc>, Uuid)) -> String {
    let raw = format!("{}|{}", cursor.0.to_rfc3339(), cursor.1);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw)
}

fn decode_cursor(s: &str) -> Option<(DateTime<Utc>, Uuid)> {
    let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(s).ok()?;
    let raw = String::from_utf8(raw).ok()?;
    let (ts, id) = raw.split_once('|')?;
    let ts = DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc);
    let id = Uuid::parse_str(id).ok()?;
    Some((ts, id))
}

async fn get_incidents(State(state): State<GatewayState>, Query(q): Query<IncidentsQuery>) -> Response {
    let limit = q.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    let cursor = match q.cursor.as_deref() {
        Some(s) => match decode_cursor(s) {
            Some(c) => Some(c),
            None => {
                return (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: "malformed cursor".into() }))
                    .into_response();
            }
        },
        None => None,
    };

    let (page, next) = state.store.page(cursor, limit).await;
    Json(IncidentsResponse {
        items: page.iter().map(IncidentSummary::from).collect(),
        next_cursor: next.map(encode_cursor),
    })
    .into_response()
}

// ─── GET /metrics ─────────────────────────────────────────────────────────────

async fn get_metrics(State(state): State<GatewayState>) -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "text/plain; version=0.0.4")], state.metrics_handle.render())
}
