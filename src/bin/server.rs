//! HTTP server entry point (§6).
//!
//! Wires [`crate::api::router`] to a bound TCP listener. Everything this
//! binary does beyond that (env loading, logging setup, provider selection)
//! is ambient plumbing, not orchestration logic — the engine itself lives in
//! the library crate and knows nothing about HTTP or `main`.

use hierarchical_agents::api::{router, AppState};
use hierarchical_agents::error::ModelError;
use hierarchical_agents::model::openai::OpenAiModelClient;
use hierarchical_agents::model::openrouter::OpenRouterModelClient;
use hierarchical_agents::model::provider::ProviderClient;
use hierarchical_agents::model::ModelClient;
use hierarchical_agents::settings::Settings;
use std::sync::Arc;

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Picks a [`ProviderClient`] variant from whichever provider credential is
/// present in the environment (§6 "`<provider credentials read opaquely by
/// ModelClient>`"), then hands it back as the one `Arc<dyn ModelClient>` type
/// the rest of the process holds (§9 "selection is data, not subclass
/// polymorphism"). Neither credential set means there is nothing for workers
/// or supervisors to call, which is a fatal init error (exit code 1).
fn build_model_client() -> Result<Arc<dyn ModelClient>, ModelError> {
    let model = std::env::var("MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
    let provider = if std::env::var("OPENAI_API_KEY").is_ok() {
        ProviderClient::OpenAi(OpenAiModelClient::from_env(model)?)
    } else if std::env::var("OPENROUTER_API_KEY").is_ok() {
        ProviderClient::OpenRouter(OpenRouterModelClient::from_env(model)?)
    } else {
        return Err(ModelError::Permanent(
            "no provider credentials found; set OPENAI_API_KEY or OPENROUTER_API_KEY".to_string(),
        ));
    };
    Ok(Arc::new(provider))
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let settings = Settings::from_env();
    log::info!("starting hierarchical-agents on {}:{}", settings.host, settings.port);

    let client = match build_model_client() {
        Ok(client) => client,
        Err(err) => {
            log::error!("fatal init error: {}", err);
            std::process::exit(1);
        }
    };

    let addr = format!("{}:{}", settings.host, settings.port);
    let state = AppState::new(client, settings.clone());

    hierarchical_agents::run::spawn_retention_sweeper(state.registry.clone(), std::time::Duration::from_secs(60));

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            log::error!("fatal init error: could not bind {}: {}", addr, err);
            std::process::exit(1);
        }
    };

    let app = router(state);
    if let Err(err) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        log::error!("server error: {}", err);
        std::process::exit(1);
    }
    log::info!("shutdown complete");
}

/// Resolves once SIGINT (or, on Unix, SIGTERM) arrives, so a normal `Ctrl-C`
/// stop exits the process with status 0 instead of axum's serve loop being
/// killed mid-request.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl-C handler");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}
