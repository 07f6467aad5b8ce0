//! Ollama runtime readiness check.
//!
//! Behaviour:
//! - Check whether Ollama is reachable via `GET /api/version`.
//! - If not reachable and the endpoint is local, spawn `ollama serve` and
//!   poll until it answers.
//!
//! Uses the blocking HTTP client: call it before the tokio runtime starts.

use std::process::{Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use url::Url;

/// Default Ollama API base URL.
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Startup wait settings.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(15);
const STARTUP_RETRY: Duration = Duration::from_millis(250);

/// HTTP I/O timeout for readiness probes.
const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors produced while checking or starting Ollama.
#[derive(Debug, thiserror::Error)]
pub enum OllamaRuntimeError {
    /// The base URL could not be parsed.
    #[error("invalid ollama url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The HTTP client could not be built.
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    /// Spawning `ollama serve` failed.
    #[error("failed to spawn ollama: {0}")]
    Spawn(#[from] std::io::Error),
    /// Ollama is not reachable and spawning was not allowed.
    #[error("ollama is not reachable at {0}")]
    Unreachable(String),
    /// Ollama did not become ready in time.
    #[error("ollama startup timed out")]
    StartupTimeout,
}

/// How Ollama became available.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeState {
    /// Ollama was already answering.
    AlreadyRunning,
    /// `ollama serve` was spawned by this process.
    Started,
}

/// Blocking probe for a (possibly local) Ollama server.
pub struct OllamaRuntime {
    client: Client,
    base_url: Url,
    ollama_bin: String,
}

impl OllamaRuntime {
    /// Create a probe for `base_url`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, OllamaRuntimeError> {
        let client = Client::builder()
            .connect_timeout(IO_TIMEOUT)
            .timeout(IO_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
            ollama_bin: "ollama".to_string(),
        })
    }

    /// Use another `ollama` executable.
    #[must_use]
    pub fn with_binary(mut self, ollama_bin: impl Into<String>) -> Self {
        self.ollama_bin = ollama_bin.into();
        self
    }

    /// Whether the endpoint points at this machine (and may be spawned).
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(
            self.base_url.host_str(),
            Some("localhost" | "127.0.0.1" | "::1" | "[::1]")
        )
    }

    /// Whether Ollama answers `GET /api/version`.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let Ok(url) = self.base_url.join("api/version") else {
            return false;
        };
        self.client
            .get(url)
            .send()
            .is_ok_and(|response| response.status().is_success())
    }

    /// Make sure Ollama is reachable, spawning `ollama serve` when allowed.
    ///
    /// # Errors
    /// Returns an error if Ollama is unreachable and cannot be started in time.
    pub fn ensure_running(&self, spawn_if_missing: bool) -> Result<RuntimeState, OllamaRuntimeError> {
        if self.is_ready() {
            tracing::debug!(url = %self.base_url, "Ollama already running");
            return Ok(RuntimeState::AlreadyRunning);
        }
        if !spawn_if_missing {
            return Err(OllamaRuntimeError::Unreachable(self.base_url.to_string()));
        }

        tracing::info!(bin = %self.ollama_bin, "Ollama not reachable, spawning `ollama serve`");
        self.spawn_serve()?;
        self.wait_until_ready()?;
        Ok(RuntimeState::Started)
    }

    fn spawn_serve(&self) -> Result<(), OllamaRuntimeError> {
        // `ollama serve` keeps running after this process drops the handle.
        let _child = Command::new(&self.ollama_bin)
            .arg("serve")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(())
    }

    fn wait_until_ready(&self) -> Result<(), OllamaRuntimeError> {
        let deadline = Instant::now() + STARTUP_TIMEOUT;

        while Instant::now() < deadline {
            if self.is_ready() {
                return Ok(());
            }
            sleep(STARTUP_RETRY);
        }

        Err(OllamaRuntimeError::StartupTimeout)
    }
}
