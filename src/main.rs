//! Synthos assistant - streaming chat session manager
//!
//! Serves a single brand-assistant conversation backed by a remote
//! generative-language model, streaming replies into a shared transcript.

mod api;
mod llm;
mod profile;
mod session;

use api::{create_router, AppState};
use llm::{AssistantConfig, GeminiClient, LoggingClient, RemoteAssistantClient};
use profile::BehaviorProfile;
use session::{SessionController, SharedController};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "synthos_assistant=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = AssistantConfig::from_env();

    let port: u16 = std::env::var("SYNTHOS_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    if !config.has_credential() {
        tracing::warn!("No assistant credential configured. Set API_KEY or LLM_GATEWAY.");
    }

    let gemini = GeminiClient::new(&config)?;
    let client: Arc<dyn RemoteAssistantClient> =
        Arc::new(LoggingClient::new(Arc::new(gemini)));
    let profile = BehaviorProfile::with_override(config.system_prompt.as_deref());

    tracing::info!(
        model = %client.model_id(),
        stream_timeout_secs = ?config.stream_timeout.map(|t| t.as_secs()),
        "Assistant client initialized"
    );

    let controller: SharedController =
        Arc::new(SessionController::new(client, profile, config.stream_timeout));
    controller.start().await;

    let shutdown = CancellationToken::new();
    let state = AppState::new(Arc::clone(&controller), shutdown.clone());

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Synthos assistant listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    controller.teardown();
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
