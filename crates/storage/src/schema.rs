//! Database schema definitions.

/// Content sources (feeds, subreddits, channels, monitored files).
pub const CREATE_SOURCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sources (
    id TEXT PRIMARY KEY NOT NULL,
    url TEXT NOT NULL UNIQUE,
    type TEXT NOT NULL CHECK (type IN ('rss', 'reddit', 'youtube', 'file')),
    name TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    error_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    last_fetched_at TEXT,
    created_at TEXT NOT NULL DEFAULT (CURRENT_TIMESTAMP),
    updated_at TEXT NOT NULL DEFAULT (CURRENT_TIMESTAMP)
)
"#;

/// Content items. `source_id` is a nullable back-reference: favorited
/// items survive source deletion as orphans.
pub const CREATE_CONTENT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS content (
    id TEXT PRIMARY KEY NOT NULL,
    source_id TEXT REFERENCES sources(id),
    external_id TEXT NOT NULL,
    title TEXT NOT NULL,
    url TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL DEFAULT '',
    summary TEXT,
    analysis TEXT,
    priority TEXT CHECK (priority IN ('high', 'medium', 'low')),
    published_at TEXT,
    fetched_at TEXT,
    read INTEGER NOT NULL DEFAULT 0,
    favorited INTEGER NOT NULL DEFAULT 0,
    flagged_interesting INTEGER NOT NULL DEFAULT 0,
    notes TEXT,
    archived_at TEXT,
    created_at TEXT NOT NULL DEFAULT (CURRENT_TIMESTAMP),
    updated_at TEXT NOT NULL DEFAULT (CURRENT_TIMESTAMP)
)
"#;

/// Durable embedding rows (raw little-endian f32 blobs).
pub const CREATE_EMBEDDINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS embeddings (
    content_id TEXT PRIMARY KEY NOT NULL,
    embedding BLOB NOT NULL,
    model TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (CURRENT_TIMESTAMP)
)
"#;

/// Vector-search mirror of `embeddings`. No foreign-key cascade: every
/// content deletion path must purge orphans here explicitly.
pub const CREATE_VEC_CONTENT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS vec_content (
    content_id TEXT PRIMARY KEY NOT NULL,
    embedding F32_BLOB(384) NOT NULL
)
"#;

pub const CREATE_CONTENT_EXTERNAL_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_content_source_external
ON content(source_id, external_id)
WHERE source_id IS NOT NULL
"#;

pub const CREATE_CONTENT_PRIORITY_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_content_priority
ON content(priority)
"#;

pub const CREATE_CONTENT_PUBLISHED_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_content_published
ON content(published_at DESC)
"#;

pub const CREATE_CONTENT_SOURCE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_content_source
ON content(source_id)
"#;

pub const ALL_STATEMENTS: &[&str] = &[
    CREATE_SOURCES_TABLE,
    CREATE_CONTENT_TABLE,
    CREATE_EMBEDDINGS_TABLE,
    CREATE_VEC_CONTENT_TABLE,
    CREATE_CONTENT_EXTERNAL_INDEX,
    CREATE_CONTENT_PRIORITY_INDEX,
    CREATE_CONTENT_PUBLISHED_INDEX,
    CREATE_CONTENT_SOURCE_INDEX,
];
