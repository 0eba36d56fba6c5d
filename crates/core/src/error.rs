use thiserror::Error;

/// Error taxonomy shared across the daemon.
///
/// The API layer maps each variant to an HTTP status deterministically;
/// the orchestrator decides per variant whether to skip an item, abort a
/// source, or abort the process.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input, unsupported values, or a failed source validator.
    #[error("{0}")]
    Validation(String),

    /// A resource id that does not exist.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// Missing or wrong API key.
    #[error("{0}")]
    Authentication(String),

    /// Timeout, 5xx, or rate-limit signal from the LLM provider. Retried
    /// with backoff; surfaced only on exhaustion.
    #[error("transient provider error: {0}")]
    TransientProvider(String),

    /// Quota/billing exhaustion. Feeds the circuit breaker; never crashes
    /// a tick.
    #[error("quota error: {0}")]
    Quota(String),

    /// Source unreachable or returned an invalid body. Increments the
    /// source's consecutive-error counter.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Wrapped database failure; the transaction was rolled back.
    #[error("storage error: {0}")]
    Storage(String),

    /// Missing file, malformed TOML, missing keys, unresolvable env
    /// indirection, or an invalid provider. Fatal at startup.
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Error::Storage(err.to_string())
    }

    pub fn fetch(err: impl std::fmt::Display) -> Self {
        Error::Fetch(err.to_string())
    }

    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            resource,
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
