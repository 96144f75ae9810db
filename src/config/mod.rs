use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub web: WebConfig,
    pub proxy: ProxyConfig,
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Scheme+authority to use as the proxy origin when rewriting playlists.
    /// When unset, the origin is derived per-request from the inbound `Host` header.
    pub public_origin: Option<String>,
    /// TOML file listing the channels the registry loads at startup.
    pub channels_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            web: WebConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            proxy: ProxyConfig {
                public_origin: None,
                channels_file: PathBuf::from("./channels.toml"),
            },
            fetch: FetchConfig {
                timeout_secs: 18,
                max_attempts: 3,
            },
        }
    }
}

impl Config {
    /// Load configuration from `path`, falling back to built-in defaults
    /// (written out to `path` so a fresh deployment has something to edit)
    /// when the file does not yet exist.
    pub fn load(path: &str) -> Result<Self> {
        if std::path::Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(path, contents)?;
            Ok(default_config)
        }
    }
}
