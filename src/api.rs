//! HTTP surface: health/status probes plus the inbound-reply webhook that
//! drives the reactive path. Everything heavier lives behind the scheduler.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use tower_http::cors::CorsLayer;

use crate::lead::{Channel, CommunicationRecord, Direction};
use crate::scheduler::NurtureScheduler;
use crate::store::LeadStore;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<NurtureScheduler>,
    pub store: Arc<dyn LeadStore>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status))
        .route("/hooks/reply", post(reply_hook))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Serialize)]
struct StatusResp {
    enabled: bool,
    dry_run: bool,
    rollout_percent: u8,
    batch_cap: usize,
    totals: crate::scheduler::CycleStats,
}

async fn status(State(state): State<AppState>) -> Json<StatusResp> {
    let cfg = state.scheduler.config();
    Json(StatusResp {
        enabled: cfg.enabled,
        dry_run: cfg.dry_run,
        rollout_percent: cfg.rollout_percent,
        batch_cap: cfg.batch_cap,
        totals: state.scheduler.totals(),
    })
}

#[derive(serde::Deserialize)]
struct ReplyHook {
    lead_id: String,
    channel: Channel,
    content: String,
}

#[derive(serde::Serialize)]
struct ReplyHookResp {
    disposition: crate::scheduler::Disposition,
}

/// Inbound reply webhook. Records the communication, then runs the shared
/// per-lead pipeline out of band. Unknown leads are a 404 (the event
/// references a lead that no longer exists; the unit of work is skipped).
async fn reply_hook(
    State(state): State<AppState>,
    Json(hook): Json<ReplyHook>,
) -> Result<Json<ReplyHookResp>, StatusCode> {
    let now = Utc::now();

    let lead = state
        .store
        .lead(&hook.lead_id)
        .await
        .map_err(|e| {
            tracing::warn!("reply hook: lead lookup failed: {e:#}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    let record = CommunicationRecord {
        id: uuid::Uuid::new_v4().to_string(),
        lead_id: lead.id.clone(),
        direction: Direction::Inbound,
        channel: hook.channel,
        content: hook.content,
        sent_at: now,
        manual: false,
        sent_by: None,
    };
    state.store.append_communication(record).await.map_err(|e| {
        tracing::warn!("reply hook: persist failed: {e:#}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let disposition = state
        .scheduler
        .process_reactive(&lead.id, now)
        .await
        .map_err(|e| {
            tracing::warn!(lead_id = %lead.id, "reactive processing failed: {e:#}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(ReplyHookResp { disposition }))
}
