use crate::infra::{AppState, CollectionService};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use debtflow::error::AppError;
use debtflow::workflows::escalation::EscalationSummary;
use debtflow::workflows::notification::{DrainSummary, PlanSummary};
use debtflow::workflows::reconciliation::{ClinicId, DelinquencySnapshot, SyncSummary};

#[derive(Debug, Deserialize)]
pub(crate) struct SyncRequest {
    pub(crate) clinic_id: String,
    pub(crate) snapshots: Vec<DelinquencySnapshot>,
    #[serde(default)]
    pub(crate) now: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SyncResponse {
    pub(crate) sync: SyncSummary,
    pub(crate) planning: PlanSummary,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RunRequest {
    #[serde(default)]
    pub(crate) now: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NotificationRunResponse {
    pub(crate) channels: Vec<ChannelRunView>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChannelRunView {
    pub(crate) channel: String,
    #[serde(flatten)]
    pub(crate) summary: DrainSummary,
}

pub(crate) fn collection_router(service: Arc<CollectionService>) -> axum::Router {
    axum::Router::new()
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route("/api/v1/sync", axum::routing::post(sync_endpoint))
        .route(
            "/api/v1/notifications/run",
            axum::routing::post(notifications_run_endpoint),
        )
        .route(
            "/api/v1/escalations/run",
            axum::routing::post(escalations_run_endpoint),
        )
        .with_state(service)
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn sync_endpoint(
    State(service): State<Arc<CollectionService>>,
    Json(payload): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, AppError> {
    let now = payload.now.unwrap_or_else(Utc::now);
    let clinic = ClinicId(payload.clinic_id);
    let started = std::time::Instant::now();
    let (sync, planning) = service.sync(&clinic, &payload.snapshots, now)?;

    counter!("debtflow_sync_runs_total").increment(1);
    counter!("debtflow_sync_patients_total").increment(sync.processed as u64);
    counter!("debtflow_sync_records_failed_total").increment(sync.failed as u64);
    counter!("debtflow_schedules_created_total").increment(planning.scheduled as u64);
    histogram!("debtflow_sync_duration_seconds").record(started.elapsed().as_secs_f64());

    Ok(Json(SyncResponse { sync, planning }))
}

pub(crate) async fn notifications_run_endpoint(
    State(service): State<Arc<CollectionService>>,
    payload: Option<Json<RunRequest>>,
) -> Result<Json<NotificationRunResponse>, AppError> {
    let now = payload.and_then(|Json(request)| request.now).unwrap_or_else(Utc::now);
    let started = std::time::Instant::now();
    let summaries = service.run_notifications(now)?;
    histogram!("debtflow_notification_run_duration_seconds")
        .record(started.elapsed().as_secs_f64());

    let mut channels = Vec::new();
    for (channel, summary) in summaries {
        counter!("debtflow_notifications_sent_total", "channel" => channel.label())
            .increment(summary.sent as u64);
        counter!("debtflow_notifications_failed_total", "channel" => channel.label())
            .increment(summary.failed as u64);
        channels.push(ChannelRunView {
            channel: channel.label().to_string(),
            summary,
        });
    }

    Ok(Json(NotificationRunResponse { channels }))
}

pub(crate) async fn escalations_run_endpoint(
    State(service): State<Arc<CollectionService>>,
    payload: Option<Json<RunRequest>>,
) -> Result<Json<EscalationSummary>, AppError> {
    let now = payload.and_then(|Json(request)| request.now).unwrap_or_else(Utc::now);
    let summary = service.escalate(now)?;

    counter!("debtflow_collection_cases_created_total").increment(summary.created as u64);

    Ok(Json(summary))
}
