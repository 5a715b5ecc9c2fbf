mod config;
mod db;
mod frame;
mod grid;
mod rate_limit;
mod routes;
mod services;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use config::{AppConfig, StoreKind};
use rate_limit::{RateLimitConfig, RateLimiter};
use services::avatar::LocalAvatarStore;
use services::claim::ClaimStore;
use services::claim_store::{MemoryClaimStore, PgClaimStore};
use services::mask::SlotMask;

/// How often idle rate-limit buckets are dropped.
const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env().expect("invalid configuration");

    let claims: Arc<dyn ClaimStore> = match &config.store {
        StoreKind::Postgres { database_url, max_connections } => {
            let pool = db::init_pool(database_url, *max_connections)
                .await
                .expect("database init failed");
            Arc::new(PgClaimStore::new(pool))
        }
        StoreKind::Memory => {
            tracing::warn!("CLAIM_STORE=memory; claims are lost on restart");
            Arc::new(MemoryClaimStore::new())
        }
    };

    let mask = match &config.mask_path {
        Some(path) => SlotMask::load(path, config.mask_alpha_threshold).expect("mask load failed"),
        None => SlotMask::all_eligible(),
    };
    tracing::info!(eligible = mask.eligible_count(), "slot mask ready");

    let avatars = Arc::new(LocalAvatarStore::new(config.avatar_dir.clone(), &config.public_base_url));
    let rate_limiter = RateLimiter::new(RateLimitConfig::from_env());

    let state = state::AppState::new(
        claims,
        avatars,
        mask,
        rate_limiter.clone(),
        config.upload,
        config.note_max_chars,
    );

    // Spawn background rate-limit pruning.
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RATE_LIMIT_PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            rate_limiter.prune_idle();
        }
    });

    let app = routes::app(state, &config.static_dir, &config.avatar_dir);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .expect("failed to bind");

    tracing::info!(port = config.port, "mosaic listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .expect("server failed");
}
