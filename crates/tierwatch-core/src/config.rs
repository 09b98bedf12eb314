//! Environment-sourced configuration for the acquisition pipeline,
//! the resolution policy and the batch orchestrator.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::retry::RetryPolicy;

pub const DEFAULT_LISTING_URL: &str = "https://aion.plaync.com/ranking/battle?world=classic&serverId={server_id}&characterName={name}";
pub const DEFAULT_DETAIL_URL: &str = "https://aion.plaync.com/characters/view?world=classic&serverId={server_id}&characterId={char_key}";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7";
const DEFAULT_SERVERS: &str = "Siel=30:시엘,Israphel=55:이스라펠,Ex=54:엑스";

/// Which character source the process runs with. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Live,
    Synthetic,
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "live" | "external" => Ok(SourceKind::Live),
            "synthetic" | "dummy" => Ok(SourceKind::Synthetic),
            _ => Err(format!("Unknown source kind: {s}")),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Live => f.write_str("live"),
            SourceKind::Synthetic => f.write_str("synthetic"),
        }
    }
}

/// Upstream identity of a game server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    pub upstream_id: String,
    /// Server name as printed on the upstream listing page.
    pub local_label: Option<String>,
}

/// Maps server names to their upstream ids and local-language labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerDirectory {
    entries: BTreeMap<String, ServerEntry>,
}

impl ServerDirectory {
    /// Parse `Name=id[:label],Name=id[:label]`.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let mut entries = BTreeMap::new();
        for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, rest) = item.split_once('=').ok_or_else(|| {
                AppError::ConfigError(format!("Invalid server entry '{item}': expected Name=id"))
            })?;
            let (id, label) = match rest.split_once(':') {
                Some((id, label)) => (id, Some(label.trim().to_string())),
                None => (rest, None),
            };
            if id.trim().is_empty() {
                return Err(AppError::ConfigError(format!(
                    "Invalid server entry '{item}': empty id"
                )));
            }
            entries.insert(
                name.trim().to_string(),
                ServerEntry {
                    upstream_id: id.trim().to_string(),
                    local_label: label.filter(|l| !l.is_empty()),
                },
            );
        }
        Ok(Self { entries })
    }

    pub fn get(&self, server: &str) -> Option<&ServerEntry> {
        self.entries.get(server)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Settings for talking to the upstream site.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub listing_url: String,
    pub detail_url: String,
    pub servers: ServerDirectory,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Bound on the whole detail navigation step.
    pub detail_timeout: Duration,
    pub user_agent: String,
    pub accept_language: String,
    pub proxy: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            detail_url: DEFAULT_DETAIL_URL.to_string(),
            servers: ServerDirectory::parse(DEFAULT_SERVERS).unwrap_or_default(),
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(10),
            detail_timeout: Duration::from_secs(5),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            proxy: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl UpstreamConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();
        let retry = RetryPolicy::new(env_or("TIERWATCH_MAX_RETRIES", 3u32)?)
            .with_bounds(
                env_secs("TIERWATCH_RETRY_MIN_WAIT_SECS", 1)?,
                env_secs("TIERWATCH_RETRY_MAX_WAIT_SECS", 10)?,
            );
        let servers = match std::env::var("TIERWATCH_SERVERS") {
            Ok(raw) => ServerDirectory::parse(&raw)?,
            Err(_) => defaults.servers,
        };

        Ok(Self {
            listing_url: env_string("TIERWATCH_LISTING_URL", DEFAULT_LISTING_URL),
            detail_url: env_string("TIERWATCH_DETAIL_URL", DEFAULT_DETAIL_URL),
            servers,
            connect_timeout: env_secs("TIERWATCH_CONNECT_TIMEOUT_SECS", 3)?,
            read_timeout: env_secs("TIERWATCH_READ_TIMEOUT_SECS", 10)?,
            detail_timeout: env_secs("TIERWATCH_DETAIL_TIMEOUT_SECS", 5)?,
            user_agent: env_string("TIERWATCH_USER_AGENT", DEFAULT_USER_AGENT),
            accept_language: env_string("TIERWATCH_ACCEPT_LANGUAGE", DEFAULT_ACCEPT_LANGUAGE),
            proxy: std::env::var("TIERWATCH_PROXY").ok().filter(|p| !p.is_empty()),
            retry,
        })
    }
}

/// Longest accepted refresh cooldown: one day.
pub const MAX_RATE_LIMIT_WINDOW_SECS: u64 = 24 * 60 * 60;
/// Longest accepted freshness window: thirty days.
pub const MAX_FRESHNESS_MINUTES: u64 = 30 * 24 * 60;

/// Knobs of the tiered resolution policy.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub freshness_window: Duration,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub rate_limit_enabled: bool,
    pub rate_limit_window: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            freshness_window: Duration::from_secs(60 * 60),
            cache_enabled: true,
            cache_ttl: Duration::from_secs(60),
            rate_limit_enabled: true,
            rate_limit_window: Duration::from_secs(60),
        }
    }
}

impl ResolverConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            freshness_window: Duration::from_secs(
                at_most(
                    "TIERWATCH_FRESHNESS_MINUTES",
                    env_or("TIERWATCH_FRESHNESS_MINUTES", 60u64)?,
                    MAX_FRESHNESS_MINUTES,
                )? * 60,
            ),
            cache_enabled: env_or("TIERWATCH_CACHE_ENABLED", true)?,
            cache_ttl: env_secs("TIERWATCH_CACHE_TTL_SECS", 60)?,
            rate_limit_enabled: env_or("TIERWATCH_RATE_LIMIT_ENABLED", true)?,
            rate_limit_window: Duration::from_secs(at_most(
                "TIERWATCH_RATE_LIMIT_WINDOW_SECS",
                env_or("TIERWATCH_RATE_LIMIT_WINDOW_SECS", 60u64)?,
                MAX_RATE_LIMIT_WINDOW_SECS,
            )?),
        })
    }
}

/// Settings for the periodic scoring batch.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub interval: Duration,
    /// Servers with fewer scored characters use the relaxed rank table.
    pub min_sample_size: usize,
    pub top_n: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(600),
            min_sample_size: 10,
            top_n: 100,
        }
    }
}

impl BatchConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            interval: env_secs("TIERWATCH_BATCH_INTERVAL_SECS", 600)?,
            min_sample_size: env_or("TIERWATCH_MIN_SAMPLE_SIZE", 10usize)?,
            top_n: 100,
        })
    }
}

/// Read the source selection from `TIERWATCH_SOURCE` (defaults to live).
pub fn source_kind_from_env() -> Result<SourceKind, AppError> {
    env_or("TIERWATCH_SOURCE", SourceKind::Live)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::ConfigError(format!("Invalid {key} '{raw}'"))),
    }
}

fn env_secs(key: &str, default: u64) -> Result<Duration, AppError> {
    env_or(key, default).map(Duration::from_secs)
}

fn at_most(key: &str, value: u64, max: u64) -> Result<u64, AppError> {
    if value > max {
        return Err(AppError::ConfigError(format!(
            "{key} must be at most {max}, got {value}"
        )));
    }
    Ok(value)
}
