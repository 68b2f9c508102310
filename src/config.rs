//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keychain service name used for stored Jupyter credentials.
const KEYCHAIN_SERVICE: &str = "notebook-mcp";

/// Configurable timeout values (seconds) for blocking session operations.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Maximum wall-clock wait for a single cell execution.
    #[serde(default = "default_execute_seconds")]
    pub execute_seconds: u64,
    /// Maximum wait for kernel and document binding during attach.
    #[serde(default = "default_attach_seconds")]
    pub attach_seconds: u64,
}

fn default_execute_seconds() -> u64 {
    300
}

fn default_attach_seconds() -> u64 {
    30
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            execute_seconds: default_execute_seconds(),
            attach_seconds: default_attach_seconds(),
        }
    }
}

/// Automatic dependency remediation settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RemediationConfig {
    /// Whether a `MissingDependency` failure triggers an install + retry.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Shell-escape install command prefix executed through the kernel.
    /// The missing module name is appended.
    #[serde(default = "default_install_command")]
    pub install_command: String,
}

fn default_true() -> bool {
    true
}

fn default_install_command() -> String {
    "!uv pip install".into()
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            install_command: default_install_command(),
        }
    }
}

fn default_server_url() -> String {
    "http://localhost:8888".into()
}

/// Global configuration parsed from `config.toml`.
///
/// The bearer credential is loaded at runtime via OS keychain or the
/// `JUPYTER_TOKEN` environment variable, never from the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Base URL of the Jupyter server hosting kernels and documents.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Bearer token for both external collaborators (populated at runtime).
    #[serde(skip)]
    pub token: String,
    /// Timeout configuration for blocking flows.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Dependency remediation policy settings.
    #[serde(default)]
    pub remediation: RemediationConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            token: String::new(),
            timeouts: TimeoutConfig::default(),
            remediation: RemediationConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the Jupyter bearer token from OS keychain with env-var fallback.
    ///
    /// Tries the `notebook-mcp` keyring service first, then falls back to
    /// the `JUPYTER_TOKEN` environment variable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither keychain nor env var provides
    /// the token.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.token = load_credential("jupyter_token", "JUPYTER_TOKEN").await?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.server_url.is_empty() {
            return Err(AppError::Config("server_url must not be empty".into()));
        }
        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "server_url must be an http(s) URL, got: {}",
                self.server_url
            )));
        }
        if self.timeouts.execute_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.execute_seconds must be greater than zero".into(),
            ));
        }
        if self.remediation.install_command.trim().is_empty() {
            return Err(AppError::Config(
                "remediation.install_command must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // Try OS keychain first via spawn_blocking (keyring is synchronous I/O).
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYCHAIN_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    // Fallback to environment variable.
    env::var(env_key).map_err(|_| {
        AppError::Config(format!(
            "credential {keyring_key} not found in keychain ({KEYCHAIN_SERVICE}) or {env_key} env var"
        ))
    })
}
