//! Configuration loading for the Prismis daemon.
//!
//! Config lives at `$XDG_CONFIG_HOME/prismis/config.toml` with the user
//! context document (`context.md`) beside it. Every string value may be
//! indirected through the environment as `env:VARNAME`. Validation
//! failures are fatal at startup and carry a specific message.

pub mod defaults;
mod paths;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use prismis_core::{ArchivalWindows, Error, Result, SourceKind};

pub use paths::{audio_dir, config_dir, data_dir, db_path, observability_dir};

pub const SUPPORTED_PROVIDERS: &[&str] = &["openai", "anthropic", "groq", "ollama"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSection {
    pub fetch_interval: u64,
    pub max_items_rss: u32,
    pub max_items_reddit: u32,
    pub max_items_youtube: u32,
    pub max_days_lookback: u32,
    /// Top-level forum comments appended per post; 0 means unlimited.
    pub reddit_max_comments: u32,
    pub llm_max_retries: u32,
    pub llm_retry_backoff_base: u64,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            fetch_interval: 30,
            max_items_rss: 25,
            max_items_reddit: 25,
            max_items_youtube: 10,
            max_days_lookback: 7,
            reddit_max_comments: 20,
            llm_max_retries: 2,
            llm_retry_backoff_base: 2,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub provider: String,
    pub model: String,
    pub api_key: String,
    /// Required for `ollama`; optional custom endpoint otherwise.
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditSection {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl Default for RedditSection {
    fn default() -> Self {
        Self {
            client_id: "env:REDDIT_CLIENT_ID".to_string(),
            client_secret: "env:REDDIT_CLIENT_SECRET".to_string(),
            user_agent: "prismis/0.1 (content aggregator)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsSection {
    pub high_priority_only: bool,
    pub command: String,
}

impl Default for NotificationsSection {
    fn default() -> Self {
        Self {
            high_priority_only: true,
            command: "terminal-notifier".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub key: String,
    pub host: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            key: String::new(),
            // Loopback by default; binding to a LAN address is an explicit
            // opt-in via config.
            host: "127.0.0.1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchivalSection {
    pub enabled: bool,
    /// Days before a *read* HIGH item is archived; absent means never.
    #[serde(default)]
    pub high_read: Option<i64>,
    pub medium_unread: i64,
    pub medium_read: i64,
    pub low_unread: i64,
    pub low_read: i64,
}

impl Default for ArchivalSection {
    fn default() -> Self {
        Self {
            enabled: true,
            high_read: Some(30),
            medium_unread: 14,
            medium_read: 14,
            low_unread: 7,
            low_read: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSection {
    pub provider: String,
    pub voice: String,
    /// TTS command invoked for briefing synthesis.
    pub command: String,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            provider: "system".to_string(),
            voice: "default".to_string(),
            command: "lspeak".to_string(),
        }
    }
}

/// The full, validated daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub daemon: DaemonSection,
    pub llm: LlmSection,
    pub reddit: RedditSection,
    pub notifications: NotificationsSection,
    pub api: ApiSection,
    pub archival: ArchivalSection,
    pub audio: AudioSection,
    /// The user context document (`context.md`), consumed verbatim by the
    /// priority evaluator. Not part of the TOML.
    #[serde(skip)]
    pub context: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon: DaemonSection::default(),
            llm: LlmSection::default(),
            reddit: RedditSection::default(),
            notifications: NotificationsSection::default(),
            api: ApiSection::default(),
            archival: ArchivalSection::default(),
            audio: AudioSection::default(),
            context: defaults::DEFAULT_CONTEXT_MD.to_string(),
        }
    }
}

impl Config {
    /// Load and validate the config from the default XDG location.
    pub fn load() -> Result<Self> {
        Self::load_from(config_dir().join("config.toml"))
    }

    /// Load and validate the config from an explicit path. `context.md`
    /// is read from the same directory when present.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|_| {
            Error::Config(format!(
                "config file not found: {}. Create it or run the daemon once to write defaults",
                path.display()
            ))
        })?;

        let mut config: Config = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;

        config.context = read_context(path.parent());
        config.expand_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn max_items(&self, kind: SourceKind) -> u32 {
        match kind {
            SourceKind::Feed => self.daemon.max_items_rss,
            SourceKind::Forum => self.daemon.max_items_reddit,
            SourceKind::Video => self.daemon.max_items_youtube,
            SourceKind::File => 25,
        }
    }

    pub fn archival_windows(&self) -> ArchivalWindows {
        ArchivalWindows {
            high_read: self.archival.high_read,
            medium_unread: self.archival.medium_unread,
            medium_read: self.archival.medium_read,
            low_unread: self.archival.low_unread,
            low_read: self.archival.low_read,
        }
    }

    /// Resolve every `env:VARNAME` indirection in string values.
    fn expand_env(&mut self) -> Result<()> {
        for (label, value) in [
            ("llm.api_key", &mut self.llm.api_key),
            ("reddit.client_id", &mut self.reddit.client_id),
            ("reddit.client_secret", &mut self.reddit.client_secret),
            ("api.key", &mut self.api.key),
        ] {
            if let Some(var) = value.strip_prefix("env:") {
                match env::var(var) {
                    Ok(resolved) => *value = resolved,
                    // Reddit credentials are optional; leave the marker so
                    // validation can warn rather than fail.
                    Err(_) if label.starts_with("reddit.") => {}
                    Err(_) => {
                        return Err(Error::Config(format!(
                            "{label} references env:{var} but ${var} is not set"
                        )));
                    }
                }
            }
        }
        if let Some(base) = &mut self.llm.api_base {
            if let Some(var) = base.strip_prefix("env:") {
                *base = env::var(var).map_err(|_| {
                    Error::Config(format!("llm.api_base references env:{var} but ${var} is not set"))
                })?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.key.is_empty() {
            return Err(Error::Config(
                "API key not configured. Add [api] section with key = \"your-random-key\"".into(),
            ));
        }

        for (name, value) in [
            ("max_items_rss", self.daemon.max_items_rss),
            ("max_items_reddit", self.daemon.max_items_reddit),
            ("max_items_youtube", self.daemon.max_items_youtube),
        ] {
            if !(1..=100).contains(&value) {
                return Err(Error::Config(format!(
                    "daemon.{name} must be between 1 and 100, got {value}"
                )));
            }
        }

        if self.daemon.fetch_interval < 1 {
            return Err(Error::Config(format!(
                "daemon.fetch_interval must be at least 1 minute, got {}",
                self.daemon.fetch_interval
            )));
        }

        if !(1..=365).contains(&self.daemon.max_days_lookback) {
            return Err(Error::Config(format!(
                "daemon.max_days_lookback must be between 1 and 365 days, got {}",
                self.daemon.max_days_lookback
            )));
        }

        let provider = self.llm.provider.to_lowercase();
        if !SUPPORTED_PROVIDERS.contains(&provider.as_str()) {
            return Err(Error::Config(format!(
                "llm.provider must be one of {SUPPORTED_PROVIDERS:?}, got '{}'",
                self.llm.provider
            )));
        }
        if self.llm.model.is_empty() {
            return Err(Error::Config("llm.model must be set".into()));
        }
        if provider == "ollama" && self.llm.api_base.as_deref().unwrap_or("").is_empty() {
            return Err(Error::Config(
                "llm.provider = \"ollama\" requires llm.api_base (e.g. \"http://localhost:11434\")"
                    .into(),
            ));
        }

        Ok(())
    }
}

fn read_context(config_parent: Option<&Path>) -> String {
    let context_path: Option<PathBuf> = config_parent.map(|dir| dir.join("context.md"));
    match context_path {
        Some(path) if path.exists() => {
            fs::read_to_string(&path).unwrap_or_else(|_| defaults::DEFAULT_CONTEXT_MD.to_string())
        }
        _ => defaults::DEFAULT_CONTEXT_MD.to_string(),
    }
}
