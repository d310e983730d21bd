//! Lead Nurture Engine — Binary Entrypoint
//! Boots the Axum HTTP server and the two background loops (batch cycle,
//! outcome sweep), wiring config, store, oracle, channels, and alerts.

use std::sync::Arc;

use chrono::Utc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lead_nurture_engine::channel::{SmsWebhookGateway, SmtpEmailGateway};
use lead_nurture_engine::oracle::{DecisionOracle, DisabledOracle, HttpOracle};
use lead_nurture_engine::outcome::OutcomeSweeper;
use lead_nurture_engine::{
    api, metrics::Metrics, AgentConfig, AppState, InMemoryStore, NotifierMux, NurtureScheduler,
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lead_nurture_engine=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = AgentConfig::load();
    tracing::info!(?config, "agent configuration loaded");

    let metrics = Metrics::init(config.batch_cap);

    // The in-memory store is the dev backend; a real deployment swaps in a
    // CRM-backed implementation of `LeadStore` here.
    let store = Arc::new(InMemoryStore::new());

    let oracle: Arc<dyn DecisionOracle> = match HttpOracle::from_env() {
        Some(o) => Arc::new(o),
        None => {
            tracing::warn!("no ORACLE_ENDPOINT configured; oracle disabled (always waits)");
            Arc::new(DisabledOracle)
        }
    };

    let scheduler = Arc::new(NurtureScheduler::new(
        store.clone(),
        oracle,
        Arc::new(SmsWebhookGateway::from_env()),
        Arc::new(SmtpEmailGateway::from_env()),
        Arc::new(NotifierMux::from_env()),
        config.clone(),
    ));

    // Batch cycle loop.
    {
        let scheduler = scheduler.clone();
        let interval_secs = config.cycle_interval_secs;
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                if let Err(e) = scheduler.run_cycle(Utc::now()).await {
                    tracing::warn!("batch cycle failed: {e:#}");
                }
            }
        });
    }

    // Outcome sweep loop, independent of the batch cadence.
    {
        let sweeper = OutcomeSweeper::new(store.clone());
        let interval_secs = config.outcome_sweep_interval_secs;
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                match sweeper.sweep(Utc::now()).await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!(evaluated = n, "outcome sweep complete"),
                    Err(e) => tracing::warn!("outcome sweep failed: {e:#}"),
                }
            }
        });
    }

    let state = AppState {
        scheduler,
        store,
    };
    let router = api::create_router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "serving");
    axum::serve(listener, router).await?;
    Ok(())
}
