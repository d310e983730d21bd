// tests/api_http.rs
//
// Router-level tests via tower::ServiceExt::oneshot, no real listener.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::Request,
};
use chrono::{Duration, TimeZone, Utc};
use http::StatusCode;
use tower::ServiceExt; // for `oneshot`

use lead_nurture_engine::channel::RecordingSender;
use lead_nurture_engine::lead::{Channel, Consent, Direction, LeadSnapshot, Stage};
use lead_nurture_engine::notify::NotifierMux;
use lead_nurture_engine::oracle::{MockOracle, ProposedAction};
use lead_nurture_engine::store::{InMemoryStore, LeadStore};
use lead_nurture_engine::{api, AgentConfig, AppState, NurtureScheduler};

fn test_state() -> (AppState, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    // Wait proposals keep hook responses independent of wall-clock quiet
    // hours (wait is exempt from every send rule).
    let oracle = Arc::new(MockOracle::always(ProposedAction::wait(Some(2.0))));
    let scheduler = Arc::new(NurtureScheduler::new(
        store.clone(),
        oracle,
        Arc::new(RecordingSender::new(Channel::Sms)),
        Arc::new(RecordingSender::new(Channel::Email)),
        Arc::new(NotifierMux::none()),
        AgentConfig::default(),
    ));
    (
        AppState {
            scheduler,
            store: store.clone(),
        },
        store,
    )
}

fn seeded_lead() -> LeadSnapshot {
    let created = Utc.with_ymd_and_hms(2025, 9, 1, 9, 0, 0).unwrap();
    LeadSnapshot {
        id: "lead-1".into(),
        name: "Ada".into(),
        region: "UK".into(),
        stage: Stage::Engaged,
        consent: Consent {
            sms: true,
            email: false,
            call: false,
        },
        phone: Some("+4470000001".into()),
        email: None,
        created_at: created,
        last_contacted_at: Some(created + Duration::hours(1)),
        next_review_at: None,
        application_started_at: None,
        attributes: Default::default(),
        autonomous: true,
        automation_disabled: false,
        locked_until: None,
    }
}

#[tokio::test]
async fn health_returns_ok() {
    let (state, _) = test_state();
    let router = api::create_router(state);

    let resp = router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn status_reflects_config() {
    let (state, _) = test_state();
    let router = api::create_router(state);

    let resp = router
        .oneshot(
            Request::builder()
                .uri("/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["enabled"], serde_json::json!(true));
    assert_eq!(v["rollout_percent"], serde_json::json!(100));
    assert!(v["totals"].is_object());
}

#[tokio::test]
async fn reply_hook_unknown_lead_is_404() {
    let (state, _) = test_state();
    let router = api::create_router(state);

    let payload = serde_json::json!({
        "lead_id": "missing",
        "channel": "SMS",
        "content": "hello?"
    });
    let resp = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/hooks/reply")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reply_hook_records_and_processes() {
    let (state, store) = test_state();
    store.seed_lead(seeded_lead());
    let router = api::create_router(state);

    let payload = serde_json::json!({
        "lead_id": "lead-1",
        "channel": "SMS",
        "content": "yes, Thursday works"
    });
    let resp = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/hooks/reply")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["disposition"], serde_json::json!("WAITED"));

    // The inbound reply is on record.
    let comms = store.communications("lead-1", 10).await.unwrap();
    assert_eq!(comms.len(), 1);
    assert_eq!(comms[0].direction, Direction::Inbound);
    assert_eq!(comms[0].content, "yes, Thursday works");

    // The reactive pipeline rescheduled the lead.
    let snapshot = store.lead("lead-1").await.unwrap().unwrap();
    assert!(snapshot.next_review_at.is_some());
}
