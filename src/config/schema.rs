use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

// ── Top-level config ──────────────────────────────────────────────

/// Top-level sagechat configuration, loaded from `config.toml`.
///
/// Resolution order: `SAGECHAT_CONFIG_DIR` env → `~/.sagechat/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory (databases live here) - computed, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Server bind configuration (`[server]`).
    #[serde(default)]
    pub server: ServerConfig,

    /// Access token signing configuration (`[auth]`).
    #[serde(default)]
    pub auth: AuthConfig,

    /// Chat session protocol configuration (`[chat]`).
    #[serde(default)]
    pub chat: ChatConfig,

    /// Generation provider configuration (`[provider]`).
    #[serde(default)]
    pub provider: ProviderConfig,
}

/// Server bind configuration (`[server]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default: 127.0.0.1)
    #[serde(default = "default_server_host")]
    pub host: String,
    /// Port to bind (default: 42910)
    #[serde(default = "default_server_port")]
    pub port: u16,
}

/// Access token configuration (`[auth]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC signing secret for access tokens. Overridden by `SAGECHAT_AUTH_SECRET`.
    /// When unset, a random secret is generated at startup and minted tokens
    /// do not survive a restart.
    pub secret: Option<String>,
    /// Minted token lifetime in seconds. Default: `86400` (24h).
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

/// Chat session protocol configuration (`[chat]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Key of the shared knowledge base all sessions chat against. Default: `"unified_kb"`.
    #[serde(default = "default_knowledge_base_key")]
    pub knowledge_base_key: String,
    /// Context passages retrieved per question. Default: `4`.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Conversation turns kept in the in-memory history window. Default: `10`.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Seconds a new connection may wait before sending its initialization
    /// message. Default: `30`.
    #[serde(default = "default_init_timeout_secs")]
    pub init_timeout_secs: u64,
    /// Heartbeat sweep period in seconds. Default: `30`.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

/// Generation provider configuration (`[provider]` section).
///
/// Any OpenAI-compatible `/chat/completions` endpoint works here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the provider API. Default: `"https://api.openai.com/v1"`.
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    /// API key for the provider. Overridden by `SAGECHAT_API_KEY` or `API_KEY`.
    pub api_key: Option<String>,
    /// Model routed through the provider. Default: `"gpt-4o-mini"`.
    #[serde(default = "default_provider_model")]
    pub model: String,
    /// Sampling temperature (0.0–2.0). Default: `0.3`.
    #[serde(default = "default_provider_temperature")]
    pub temperature: f64,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    42910
}

fn default_token_ttl_secs() -> u64 {
    86_400
}

fn default_knowledge_base_key() -> String {
    "unified_kb".to_string()
}

fn default_top_k() -> usize {
    4
}

fn default_history_window() -> usize {
    10
}

fn default_init_timeout_secs() -> u64 {
    30
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_provider_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_provider_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_provider_temperature() -> f64 {
    0.3
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            knowledge_base_key: default_knowledge_base_key(),
            top_k: default_top_k(),
            history_window: default_history_window(),
            init_timeout_secs: default_init_timeout_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            api_key: None,
            model: default_provider_model(),
            temperature: default_provider_temperature(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::new(),
            config_path: PathBuf::new(),
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            chat: ChatConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("SAGECHAT_CONFIG_DIR") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let user_dirs = UserDirs::new().context("Could not determine home directory")?;
    Ok(user_dirs.home_dir().join(".sagechat"))
}

impl Config {
    pub async fn load_or_init() -> Result<Self> {
        let config_dir = default_config_dir()?;
        let config_path = config_dir.join("config.toml");

        fs::create_dir_all(&config_dir)
            .await
            .with_context(|| format!("Failed to create config directory {config_dir:?}"))?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path;
            config.workspace_dir = config_dir;
            config.apply_env_overrides();
            config.validate()?;
            tracing::info!(
                path = %config.config_path.display(),
                initialized = false,
                "Config loaded"
            );
            Ok(config)
        } else {
            let mut config = Config::default();
            config.config_path = config_path.clone();
            config.workspace_dir = config_dir;
            config.save().await?;

            // Restrict permissions on newly created config file (may contain API keys)
            #[cfg(unix)]
            {
                use std::{fs::Permissions, os::unix::fs::PermissionsExt};
                let _ = fs::set_permissions(&config_path, Permissions::from_mode(0o600)).await;
            }

            config.apply_env_overrides();
            config.validate()?;
            tracing::info!(
                path = %config.config_path.display(),
                initialized = true,
                "Config loaded"
            );
            Ok(config)
        }
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("SAGECHAT_API_KEY").or_else(|_| std::env::var("API_KEY")) {
            if !key.trim().is_empty() {
                self.provider.api_key = Some(key);
            }
        }
        if let Ok(secret) = std::env::var("SAGECHAT_AUTH_SECRET") {
            if !secret.trim().is_empty() {
                self.auth.secret = Some(secret);
            }
        }
    }

    /// Validate configuration values that would cause runtime failures.
    ///
    /// Called after TOML deserialization and env-override application to catch
    /// obviously invalid values early instead of failing at arbitrary runtime points.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            anyhow::bail!("server.host must not be empty");
        }
        if self.chat.knowledge_base_key.trim().is_empty() {
            anyhow::bail!("chat.knowledge_base_key must not be empty");
        }
        if self.chat.top_k == 0 {
            anyhow::bail!("chat.top_k must be greater than 0");
        }
        if self.chat.history_window == 0 {
            anyhow::bail!("chat.history_window must be greater than 0");
        }
        if self.chat.init_timeout_secs == 0 {
            anyhow::bail!("chat.init_timeout_secs must be greater than 0");
        }
        if self.chat.heartbeat_interval_secs == 0 {
            anyhow::bail!("chat.heartbeat_interval_secs must be greater than 0");
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            anyhow::bail!("provider.temperature must be between 0.0 and 2.0");
        }
        Ok(())
    }

    pub async fn save(&self) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }
        fs::write(&self.config_path, contents)
            .await
            .with_context(|| format!("Failed to write config to {:?}", self.config_path))?;
        Ok(())
    }

    /// Path of the sqlite database holding sessions and knowledge-base chunks.
    pub fn database_path(&self) -> PathBuf {
        self.workspace_dir.join("sagechat.db")
    }

    /// Test helper: a config rooted at an arbitrary directory, no file I/O.
    pub fn for_workspace(dir: &Path) -> Self {
        let mut config = Config::default();
        config.workspace_dir = dir.to_path_buf();
        config.config_path = dir.join("config.toml");
        config
    }
}
