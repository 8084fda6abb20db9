//! TenantGuard - Main Entry Point

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tenantguard_api::{build_router, telemetry, AppState, Settings};
use tenantguard_common::{Branding, KeyEnvironment, MemoryStore, PlanTier, SystemClock, Tenant, TenantId};
use tenantguard_entitlements::builtin_plan;
use tenantguard_keys::IssueKeyRequest;
use tracing::{info, warn};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Development data for the in-memory store
fn seed(store: &MemoryStore) {
    for tier in PlanTier::ALL {
        store.insert_plan(builtin_plan(tier));
    }
    store.upsert_tenant(
        Tenant::new("demo", "Demo Bistro", PlanTier::Pro)
            .with_slug("demo")
            .with_vertical("restaurant")
            .with_channel("whatsapp", true)
            .with_branding(Branding {
                display_name: "Demo Bistro".into(),
                logo_url: None,
                primary_color: Some("#0f766e".into()),
            }),
    );
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    info!("TenantGuard v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load().context("failed to load settings")?;

    let store = Arc::new(MemoryStore::new());
    seed(&store);
    let state = AppState::in_memory(&settings, store, SystemClock::shared()).context("failed to build state")?;

    let demo = state
        .keys
        .issue_key(
            &TenantId::new("demo"),
            IssueKeyRequest {
                name: "demo".into(),
                scopes: vec!["admin".into()],
                environment: KeyEnvironment::Test,
                expires_at: None,
                rate_limit_per_hour: None,
            },
        )
        .await
        .context("failed to issue demo key")?;
    info!(tenant_id = "demo", key = %demo.secret, "demo key issued, in-memory store only");

    let _sweeper = state.idempotency.clone().spawn_sweeper();
    let _maintenance = state.spawn_maintenance(MAINTENANCE_INTERVAL);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", settings.server.bind))?;
    info!(addr = %settings.server.bind, "listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
