//! First-run bootstrap: default config.toml and context.md.

use std::fs;
use std::path::Path;

use prismis_core::{Error, Result};

use crate::config_dir;

pub const DEFAULT_CONFIG_TOML: &str = r#"# Prismis daemon configuration.
# Values of the form "env:VARNAME" are resolved from the environment.

[daemon]
fetch_interval = 30        # minutes between fetch cycles
max_items_rss = 25
max_items_reddit = 25
max_items_youtube = 10
max_days_lookback = 7      # ignore items older than this many days
reddit_max_comments = 20   # 0 = unlimited

[llm]
provider = "openai"        # openai | anthropic | groq | ollama
model = "gpt-4o-mini"
api_key = "env:OPENAI_API_KEY"
# api_base = "http://localhost:11434"   # required for ollama

[reddit]
client_id = "env:REDDIT_CLIENT_ID"
client_secret = "env:REDDIT_CLIENT_SECRET"
user_agent = "prismis/0.1 (content aggregator)"

[notifications]
high_priority_only = true
command = "terminal-notifier"

[api]
key = ""                   # REQUIRED: set to a random secret
host = "127.0.0.1"         # loopback only; change deliberately

[archival]
enabled = true
high_read = 30             # remove this line to never archive HIGH items
medium_unread = 14
medium_read = 14
low_unread = 7
low_read = 3

[audio]
provider = "system"
voice = "default"
command = "lspeak"
"#;

pub const DEFAULT_CONTEXT_MD: &str = r#"# My Interests

Tell Prismis what you care about. The evaluator reads this file verbatim.

## High Priority Topics

- Things you want to see immediately

## Medium Priority Topics

- Things worth reading when you have time

## Low Priority Topics

- Background interests

## Not Interested

- Topics to always skip
"#;

/// Write the default config.toml and context.md if they do not exist yet.
/// Never overwrites user files.
pub fn ensure_config_files() -> Result<()> {
    ensure_config_files_in(&config_dir())
}

pub fn ensure_config_files_in(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .map_err(|e| Error::Config(format!("cannot create {}: {e}", dir.display())))?;

    let config_path = dir.join("config.toml");
    if !config_path.exists() {
        fs::write(&config_path, DEFAULT_CONFIG_TOML)
            .map_err(|e| Error::Config(format!("cannot write {}: {e}", config_path.display())))?;
    }

    let context_path = dir.join("context.md");
    if !context_path.exists() {
        fs::write(&context_path, DEFAULT_CONTEXT_MD)
            .map_err(|e| Error::Config(format!("cannot write {}: {e}", context_path.display())))?;
    }

    Ok(())
}
