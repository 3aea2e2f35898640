//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/blackfynn/bf.toml`
//! - Windows: `%APPDATA%/blackfynn/bf.toml`
//!
//! `BLACKFYNN_API_KEY` and `BLACKFYNN_API_SECRET` override the stored
//! credentials.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use blackfynn_client::ClientConfig;
use serde::{Deserialize, Serialize};

pub const API_KEY_ENV: &str = "BLACKFYNN_API_KEY";
pub const API_SECRET_ENV: &str = "BLACKFYNN_API_SECRET";

/// CLI configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub api_secret: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    #[serde(default = "default_renewal_margin")]
    pub renewal_margin: f64,

    /// Seconds a renewal waits for in-flight calls; unset waits forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drain_timeout_secs: Option<u64>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Seconds a file download may take; unset means no limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_timeout_secs: Option<u64>,
}

fn default_base_url() -> String {
    ClientConfig::default().base_url
}

fn default_page_size() -> u32 {
    ClientConfig::default().page_size
}

fn default_chunk_size() -> u64 {
    ClientConfig::default().chunk_size
}

fn default_renewal_margin() -> f64 {
    ClientConfig::default().renewal_margin
}

fn default_timeout_secs() -> u64 {
    ClientConfig::default().timeout.as_secs()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            base_url: default_base_url(),
            page_size: default_page_size(),
            chunk_size: default_chunk_size(),
            renewal_margin: default_renewal_margin(),
            drain_timeout_secs: None,
            timeout_secs: default_timeout_secs(),
            download_timeout_secs: None,
        }
    }
}

impl std::fmt::Debug for CliConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliConfig")
            .field("api_key", &"***REDACTED***")
            .field("api_secret", &"***REDACTED***")
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .field("chunk_size", &self.chunk_size)
            .field("renewal_margin", &self.renewal_margin)
            .field("drain_timeout_secs", &self.drain_timeout_secs)
            .field("timeout_secs", &self.timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .finish()
    }
}

impl CliConfig {
    /// Loads configuration from `path`, or defaults if the file is absent.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: CliConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Restrict permissions on Unix (contains the API secret).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Replaces stored credentials with any set in the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.is_empty()) {
            self.api_key = key;
        }
        if let Some(secret) = lookup(API_SECRET_ENV).filter(|v| !v.is_empty()) {
            self.api_secret = secret;
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.api_key.clone(), self.api_secret.clone())
            .with_base_url(self.base_url.clone())
            .with_page_size(self.page_size)
            .with_chunk_size(self.chunk_size)
            .with_renewal_margin(self.renewal_margin)
            .with_drain_timeout(self.drain_timeout_secs.map(Duration::from_secs))
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_download_timeout(self.download_timeout_secs.map(Duration::from_secs))
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("blackfynn").join("bf.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("blackfynn")
            .join("bf.toml")
    }
}
