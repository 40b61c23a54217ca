//! agent-worlds HTTP/WebSocket server binary.
//!
//! # Environment Variables
//!
//! - `PORT` - HTTP port (default: 8080)
//! - `AGENT_WORLDS_STORE` - Storage backend: "file" (default) or "memory"
//! - `AGENT_WORLDS_DATA_PATH` - Root of the file store (default: ./data/worlds)
//! - `AGENT_WORLDS_TURN_LIMIT`, `AGENT_WORLDS_LLM_TIMEOUT_SECS`,
//!   `AGENT_WORLDS_STREAMING`, `AGENT_WORLDS_RELEASE_IDLE` - runtime settings
//! - `OPENAI_API_KEY`, `OPENAI_BASE_URL` - chat-completions endpoint
//! - `RUST_LOG` - Tracing filter (default: "info,agent_worlds=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin server
//! ```

use std::sync::Arc;

use anyhow::Context;

use agent_worlds::config::RuntimeSettings;
use agent_worlds::llms::providers::OpenAiCompatibleProvider;
use agent_worlds::server::{app_router, AppState};
use agent_worlds::storage::{FileStorage, MemoryStorage, WorldStorage};
use agent_worlds::world::WorldManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,agent_worlds=debug".into()),
        )
        .init();

    let settings = RuntimeSettings::from_env();
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind_addr = format!("0.0.0.0:{}", port);

    let storage: Arc<dyn WorldStorage> = match std::env::var("AGENT_WORLDS_STORE").as_deref() {
        Ok("memory") => {
            tracing::info!("using in-memory store");
            Arc::new(MemoryStorage::new())
        }
        _ => {
            tracing::info!(path = %settings.data_path.display(), "using file store");
            tokio::fs::create_dir_all(&settings.data_path)
                .await
                .with_context(|| format!("creating data directory {}", settings.data_path.display()))?;
            Arc::new(FileStorage::new(settings.data_path.clone()))
        }
    };

    let llm = Arc::new(OpenAiCompatibleProvider::new(None, None));
    tracing::info!(base_url = %llm.base_url(), "LLM provider configured");

    let manager = Arc::new(WorldManager::new(storage, llm, settings));
    let registry = manager.registry().clone();
    let app = app_router(AppState::new(manager));

    tracing::info!("agent-worlds server starting on {}", bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET /health           - liveness probe");
    tracing::info!("  GET /worlds           - world summaries");
    tracing::info!("  GET /worlds/:world    - world with agents");
    tracing::info!("  GET /worlds/:world/ws - websocket subscription");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .context("server failed")?;

    let closed = registry.destroy_all();
    tracing::info!(worlds = closed, "live worlds closed");
    Ok(())
}
