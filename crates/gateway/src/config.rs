//! Configuration schema and discovery.
//!
//! Config lives in `dormbot.toml`, found next to the working directory or in
//! the platform config directory. Every field has a default so a missing
//! file yields a runnable (if unconnected) instance.

use std::path::{Path, PathBuf};

use {
    directories::ProjectDirs,
    secrecy::Secret,
    serde::Deserialize,
    tracing::{debug, info},
};

use crate::{Result, env_subst::substitute_env, error::Context as _};

pub const CONFIG_FILE: &str = "dormbot.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub channel: ChannelConfig,
    pub verifier: VerifierConfig,
    pub media: MediaConfig,
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8330,
        }
    }
}

/// Messaging-platform credentials and API base.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub api_base: String,
    pub access_token: Secret<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.chat.example".to_string(),
            access_token: Secret::new(String::new()),
        }
    }
}

impl std::fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("api_base", &self.api_base)
            .field("access_token", &"[redacted]")
            .finish()
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    pub endpoint: String,
    pub token: Secret<String>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://verifier.example/api/verify".to_string(),
            token: Secret::new(String::new()),
        }
    }
}

impl std::fmt::Debug for VerifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifierConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub dir: PathBuf,
    /// Public base URL under which stored media is served.
    pub public_base: String,
    pub max_width: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./media"),
            public_base: "http://localhost:8330/media".to_string(),
            max_width: 1280,
        }
    }
}

/// Chat identities granted roles ahead of the store seed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RolesConfig {
    pub admins: Vec<String>,
    pub staff: Vec<String>,
}

impl Config {
    /// Load from an explicit path, or discover. A missing file is not an
    /// error; defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => discover(),
        };
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let substituted = substitute_env(&raw);
        let config: Self = toml::from_str(&substituted)
            .with_context(|| format!("invalid config {}", path.display()))?;
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }
}

/// Project-local file first, then the platform config directory.
fn discover() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return local;
    }
    match ProjectDirs::from("", "", "dormbot") {
        Some(dirs) => dirs.config_dir().join(CONFIG_FILE),
        None => local,
    }
}
