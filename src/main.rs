use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use identity_sync::config::AppConfig;
use identity_sync::http_server::{self, ServerState};
use identity_sync::logger;
use identity_sync::{InMemoryUserStore, SignatureVerifier, SqliteUserStore, UserStore, WebhookPipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    logger::init_tracing(&config.logging());

    let store: Arc<dyn UserStore> = if config.uses_memory_store() {
        tracing::warn!("using in-memory user store; data is lost on restart");
        Arc::new(InMemoryUserStore::new())
    } else {
        let store = SqliteUserStore::connect(&config.database_url, config.database_max_connections)
            .await
            .context("failed to open user database")?;
        store.migrate().await.context("failed to prepare user database")?;
        Arc::new(store)
    };

    let verifier = SignatureVerifier::new(&config.webhook_secret);
    let pipeline = Arc::new(WebhookPipeline::new(verifier, store));
    let app = http_server::router(ServerState::new(pipeline), config.max_body_bytes);

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    http_server::serve(listener, app).await?;
    tracing::info!("webhook receiver stopped");
    Ok(())
}
