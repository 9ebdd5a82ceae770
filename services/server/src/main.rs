use std::env;
use std::time::Duration;

use axum::extract::ws::Message;
use server::batcher::BatcherConfig;
use server::state::AppState;
use server::{build_router, db};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn env_duration_secs(name: &str, default_secs: u64) -> Duration {
    let secs = env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
    let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

    let batcher_config = BatcherConfig {
        max_reconnect_attempts: env::var("MAX_RECONNECT_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5),
        reconnect_delay: env_duration_secs("RECONNECT_DELAY", 1),
        cached_message_upload_timer: env_duration_secs("CACHED_MESSAGE_UPLOAD_TIMER", 30),
    };

    info!("connecting to database...");
    let pool = db::create_pool(&database_url).await;
    db::run_migrations(&pool).await;
    info!("migrations applied");

    let state = AppState::new(pool, jwt_secret.as_bytes(), batcher_config);
    let router = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %bind_addr, "server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    shutdown_hub(&state).await;
    info!("server shut down gracefully");
}

/// Cancels the Batcher loop with one final flush, then force-closes every
/// live connection. Both steps are awaited before the process exits.
async fn shutdown_hub(state: &AppState) {
    state.batcher.flush_and_stop().await;

    let outbound_senders: Vec<_> = state
        .live_connections
        .read()
        .await
        .values()
        .map(|conn| conn.outbound.clone())
        .collect();
    for outbound in outbound_senders {
        let _ = outbound.send(Message::Close(None)).await;
    }
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
