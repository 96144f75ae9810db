//! The channel registry: a read-only, concurrency-safe capability mapping
//! channel id -> source URL + optional per-channel request headers.
//!
//! This is the one external collaborator the proxy engine is specified
//! against. Only a file-backed implementation ships here, loaded once at
//! startup; the trait boundary exists so an alternative backend could be
//! substituted without touching the proxy handlers.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

/// A single proxied channel.
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub source_url: String,
    pub headers: HashMap<String, String>,
}

/// Capability the proxy engine depends on: lookup by id.
///
/// Intentionally minimal — no create/update/delete, no listing. A
/// management surface over this data is an external collaborator, not
/// part of this trait.
pub trait ChannelRegistry: Send + Sync {
    fn get(&self, id: &str) -> Option<Channel>;
}

#[derive(Debug, Deserialize)]
struct ChannelsFile {
    #[serde(default)]
    channels: Vec<ChannelEntry>,
}

#[derive(Debug, Deserialize)]
struct ChannelEntry {
    id: String,
    name: String,
    source_url: String,
    #[serde(default)]
    headers: HashMap<String, String>,
}

/// Immutable, in-memory registry loaded once from a TOML file.
///
/// There is no mutation after construction, so concurrent reads never
/// contend with each other or with a writer.
pub struct InMemoryChannelRegistry {
    channels: HashMap<String, Channel>,
}

impl InMemoryChannelRegistry {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading channels file {}", path.display()))?;
        let parsed: ChannelsFile = toml::from_str(&contents)
            .with_context(|| format!("parsing channels file {}", path.display()))?;

        let channels = parsed
            .channels
            .into_iter()
            .map(|entry| {
                (
                    entry.id.clone(),
                    Channel {
                        id: entry.id,
                        name: entry.name,
                        source_url: entry.source_url,
                        headers: entry.headers,
                    },
                )
            })
            .collect();

        Ok(Self { channels })
    }

    pub fn from_channels(channels: Vec<Channel>) -> Self {
        Self {
            channels: channels.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }
}

impl ChannelRegistry for InMemoryChannelRegistry {
    fn get(&self, id: &str) -> Option<Channel> {
        self.channels.get(id).cloned()
    }
}

pub type SharedRegistry = Arc<dyn ChannelRegistry>;
