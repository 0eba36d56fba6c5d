//! Domain models and the shared error taxonomy for the Prismis daemon.

pub mod error;
pub mod model;
pub mod time;
pub mod urls;

pub use error::{Error, Result};
pub use model::{
    ArchivalWindows, ContentItem, ContentRecord, FeedbackStats, Priority, Source, SourceKind,
    TickStats,
};
pub use urls::{extract_name_from_url, normalize_source_url, short_hash};
