use std::sync::Arc;

use clap::Parser;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use gatekeep_queue::QueueManager;
use gatekeep_release::{ReleaseController, ReleaseScheduler, WebhookDispatcher};
use gatekeep_server::GatekeepConfig;
use gatekeep_state::{CircuitBreakingStore, StoreAdapter};
use gatekeep_state_memory::MemoryStore;
use gatekeep_token::{KeyRing, TokenCodec};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = GatekeepConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone())),
        )
        .init();

    if let Err(err) = config.validate() {
        error!(error = %err, "invalid configuration");
        return Err(Box::new(err));
    }

    let store = build_store(&config)?;
    let queue = QueueManager::new(Arc::clone(&store));

    let keyring = KeyRing::single(SecretString::from(
        config.token_secret.expose_secret().to_owned(),
    ));
    let webhook = Arc::new(WebhookDispatcher::new(config.webhook_hmac_secret.clone()));

    let release = Arc::new(ReleaseController::new(
        Arc::clone(&store),
        queue.clone(),
        TokenCodec::new(keyring.clone()),
        webhook,
    ));

    let shutdown = CancellationToken::new();
    let scheduler = ReleaseScheduler::new(Arc::clone(&store), queue.clone(), Arc::clone(&release));
    let scheduler_shutdown = shutdown.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(scheduler_shutdown).await;
    });

    let state = gatekeep_server::AppState::new(
        store,
        queue,
        release,
        keyring,
        SecretString::from(config.admin_api_key.expose_secret().to_owned()),
    );
    let app = gatekeep_server::api::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "gatekeep-server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    shutdown.cancel();
    scheduler_handle.await.ok();
    info!("gatekeep-server shut down");
    Ok(())
}

/// Build the store backend named by `STORE_BACKEND`, wrapped in the
/// circuit-breaking decorator every backend gets (§4.A Failure model).
fn build_store(
    config: &GatekeepConfig,
) -> Result<Arc<dyn StoreAdapter>, Box<dyn std::error::Error>> {
    match config.store_backend.as_str() {
        "memory" => Ok(Arc::new(CircuitBreakingStore::new(MemoryStore::new()))),
        #[cfg(feature = "redis")]
        "redis" => {
            let redis_addr = config
                .redis_addr
                .clone()
                .expect("validate() rejects a missing REDIS_ADDR before this point");
            let redis_config = gatekeep_state_redis::RedisConfig {
                url: redis_addr,
                password: config
                    .redis_password
                    .as_ref()
                    .map(|p| p.expose_secret().to_owned()),
                ..gatekeep_state_redis::RedisConfig::default()
            };
            let store = gatekeep_state_redis::RedisStore::new(&redis_config)?;
            Ok(Arc::new(CircuitBreakingStore::new(store)))
        }
        other => Err(format!("unknown STORE_BACKEND: {other}").into()),
    }
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful
/// shutdown of both the HTTP server and the release scheduler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
