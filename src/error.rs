//! Unified error types for the smartbins simulator.
//!
//! A single [`Error`] enum that every subsystem converts into, keeping the
//! process loop's error handling uniform.  Each subsystem keeps its own
//! narrower enum so callers can match on what actually went wrong:
//!
//! | Subsystem    | Error               | Severity in the loop               |
//! |--------------|---------------------|------------------------------------|
//! | config       | [`ConfigError`]     | fatal before the loop starts       |
//! | persistence  | [`PersistenceError`]| logged, cycle's rows dropped       |
//! | enrichment   | [`EnrichmentError`] | warning, simulated value kept      |

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the simulator funnels into this type.
#[derive(Debug)]
pub enum Error {
    /// Configuration is missing or invalid.
    Config(ConfigError),
    /// The persistence gateway rejected or failed an operation.
    Persistence(PersistenceError),
    /// The enrichment collaborator could not supply observations.
    Enrichment(EnrichmentError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Persistence(e) => write!(f, "persistence: {e}"),
            Self::Enrichment(e) => write!(f, "enrichment: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Persistence(e) => Some(e),
            Self::Enrichment(e) => Some(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set.
    Missing(&'static str),
    /// A variable is set but cannot be parsed.
    Invalid { key: String, value: String },
    /// A parsed value failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "required variable {key} is not set"),
            Self::Invalid { key, value } => write!(f, "cannot parse {key}={value:?}"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Persistence errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum PersistenceError {
    /// The store could not be opened or has been closed.
    Unavailable(String),
    /// The backend reported an error (lock, I/O, constraint other than dedup).
    Backend(rusqlite::Error),
    /// A stored row could not be decoded into a record.
    Decode(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            Self::Backend(e) => write!(f, "backend error: {e}"),
            Self::Decode(msg) => write!(f, "cannot decode row: {msg}"),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(e)
    }
}

impl From<PersistenceError> for Error {
    fn from(e: PersistenceError) -> Self {
        Self::Persistence(e)
    }
}

// ---------------------------------------------------------------------------
// Enrichment errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentError {
    /// The upstream request failed (connect, timeout, HTTP status).
    Request(String),
    /// The upstream answered with a payload we cannot use.
    BadPayload(String),
    /// No due sensor has known coordinates.
    NoCoordinates,
    /// Every upstream fetch in this refresh failed.
    AllFailed { attempted: usize },
}

impl fmt::Display for EnrichmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(msg) => write!(f, "request failed: {msg}"),
            Self::BadPayload(msg) => write!(f, "unusable payload: {msg}"),
            Self::NoCoordinates => write!(f, "no coordinates for due sensors"),
            Self::AllFailed { attempted } => {
                write!(f, "all {attempted} upstream fetches failed")
            }
        }
    }
}

impl std::error::Error for EnrichmentError {}

impl From<EnrichmentError> for Error {
    fn from(e: EnrichmentError) -> Self {
        Self::Enrichment(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
