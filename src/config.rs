use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Which backend implementation answers questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Cloud,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Cloud => "cloud",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "cloud" => Ok(BackendKind::Cloud),
            other => anyhow::bail!("unknown backend kind: '{}'. Must be local or cloud.", other),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_kind")]
    pub kind: BackendKind,
    #[serde(default = "default_local_url")]
    pub local_url: String,
    #[serde(default = "default_cloud_url")]
    pub cloud_url: String,
    /// Model identifier; the backend's default model is used when unset.
    #[serde(default)]
    pub model: Option<String>,
    /// Cloud credential. Usually supplied via `TOGETHER_API_KEY` instead of
    /// the config file.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            kind: default_kind(),
            local_url: default_local_url(),
            cloud_url: default_cloud_url(),
            model: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_kind() -> BackendKind {
    BackendKind::Local
}
fn default_local_url() -> String {
    "http://localhost:1234".to_string()
}
fn default_cloud_url() -> String {
    "https://api.together.xyz/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,
    #[serde(default = "default_context_budget")]
    pub context_budget: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_file_bytes: default_max_file_bytes(),
            history_depth: default_history_depth(),
            context_budget: default_context_budget(),
        }
    }
}

fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}
fn default_history_depth() -> usize {
    20
}
fn default_context_budget() -> usize {
    4000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7878".to_string()
}

/// Load configuration from a TOML file, falling back to defaults when the
/// file does not exist, then apply environment overrides and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    apply_overrides(&mut config, &|name| std::env::var(name).ok());
    validate(&config)?;
    Ok(config)
}

/// Overlay environment variables onto a parsed config.
///
/// Recognized: `DATALYST_BACKEND`, `DATALYST_LOCAL_URL`, `TOGETHER_API_KEY`.
fn apply_overrides(config: &mut Config, var: &dyn Fn(&str) -> Option<String>) {
    if let Some(kind) = var("DATALYST_BACKEND") {
        if let Ok(kind) = kind.parse() {
            config.backend.kind = kind;
        }
    }
    if let Some(url) = var("DATALYST_LOCAL_URL") {
        config.backend.local_url = url;
    }
    if config.backend.api_key.is_none() {
        config.backend.api_key = var("TOGETHER_API_KEY");
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.backend.timeout_secs == 0 {
        anyhow::bail!("backend.timeout_secs must be > 0");
    }
    if config.limits.max_file_bytes == 0 {
        anyhow::bail!("limits.max_file_bytes must be > 0");
    }
    if config.limits.history_depth == 0 {
        anyhow::bail!("limits.history_depth must be >= 1");
    }
    if config.limits.context_budget < 200 {
        anyhow::bail!("limits.context_budget must be >= 200");
    }
    Ok(())
}
