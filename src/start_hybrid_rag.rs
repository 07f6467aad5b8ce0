//! Startup helpers for the hybrid RAG server.
//!
//! Local mode: Ollama is expected on this machine and spawned if missing.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crate::llm::{DEFAULT_OLLAMA_URL, OllamaRuntime};
use crate::rag::core::config::RagConfig;
use crate::rag::core::errors::RagResult;
use crate::rag::engine::RagEngine;
use crate::rag::maintenance::CacheSweeper;
use crate::server::{self, AppState};

/// Path of a JSON config file.
const CONFIG_ENV: &str = "HYBRID_RAG_CONFIG";
/// Ollama base URL override for both generation and embeddings.
const OLLAMA_URL_ENV: &str = "HYBRID_RAG_OLLAMA_URL";
/// HTTP port.
const PORT_ENV: &str = "HYBRID_RAG_PORT";

/// Run the server (used by the `hybrid-rag-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting hybrid RAG v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load config: {e}");
            return ExitCode::from(1);
        }
    };

    let ollama_url = config
        .llm
        .base_url
        .clone()
        .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
    tracing::info!("Ollama endpoint: {ollama_url}");
    match OllamaRuntime::new(&ollama_url) {
        Ok(runtime) => {
            let spawn = runtime.is_local();
            match runtime.ensure_running(spawn) {
                Ok(state) => tracing::info!(?state, "Ollama ready"),
                Err(e) => tracing::warn!("Ollama not ready, requests will fail until it is: {e}"),
            }
        }
        Err(e) => {
            tracing::error!("Invalid Ollama endpoint: {e}");
            return ExitCode::from(1);
        }
    }

    let port = get_port();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(serve(config, port)) {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

async fn serve(
    config: RagConfig,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let engine = Arc::new(RagEngine::from_config(config).await?);

    let sweeper = CacheSweeper::new(Arc::clone(&engine));
    let sweeper_shutdown = sweeper.shutdown_notifier();
    let sweeper_handle = sweeper.spawn();

    let result =
        server::run_server_with_shutdown(AppState::new(engine), port, shutdown_signal()).await;

    sweeper_shutdown.notify_one();
    if let Err(e) = sweeper_handle.await {
        tracing::warn!("Cache sweeper task failed: {e}");
    }
    result
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Load the configuration from `HYBRID_RAG_CONFIG` and apply env overrides.
///
/// # Errors
/// Returns an error if the config file is unreadable or invalid.
pub fn load_config() -> RagResult<RagConfig> {
    config_from(
        std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        std::env::var(OLLAMA_URL_ENV).ok(),
    )
}

fn config_from(path: Option<PathBuf>, ollama_url: Option<String>) -> RagResult<RagConfig> {
    let mut config = match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading config file");
            RagConfig::from_json_file(path)?
        }
        None => RagConfig::default(),
    };
    if let Some(url) = ollama_url.filter(|url| !url.trim().is_empty()) {
        config.set_ollama_base_url(url.trim());
    }
    config.validate()?;
    Ok(config)
}

/// Get configured server port.
#[must_use]
pub fn get_port() -> u16 {
    parse_port(std::env::var(PORT_ENV).ok().as_deref())
}

fn parse_port(raw: Option<&str>) -> u16 {
    raw.and_then(|p| p.trim().parse().ok())
        .unwrap_or(server::DEFAULT_PORT)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port(None), 8000);
        assert_eq!(parse_port(Some("9001")), 9001);
        assert_eq!(parse_port(Some("not a port")), 8000);
    }

    #[test]
    fn test_config_defaults_and_override() {
        let config = config_from(None, Some("http://10.0.0.5:11434".to_string())).unwrap();
        assert_eq!(config.llm.base_url.as_deref(), Some("http://10.0.0.5:11434"));
        assert_eq!(
            config.embedding.base_url.as_deref(),
            Some("http://10.0.0.5:11434")
        );

        let config = config_from(None, Some("  ".to_string())).unwrap();
        assert!(config.llm.base_url.is_none());
    }

    #[test]
    fn test_config_file_and_invalid_override() {
        let path = std::env::temp_dir().join(format!("hybrid_rag_config_{}.json", Uuid::new_v4()));
        std::fs::write(&path, r#"{ "retrieval": { "top_k": 5 } }"#).unwrap();

        let config = config_from(Some(path.clone()), None).unwrap();
        assert_eq!(config.retrieval.top_k, 5);
        assert!(config_from(Some(path.clone()), Some("not a url".to_string())).is_err());

        let _ = std::fs::remove_file(path);
    }
}
