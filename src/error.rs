//! Unified error handling for ridebank.
//!
//! Every fallible operation returns [`RideError`]. Uniqueness conflicts during
//! ingestion are expected and never surface here.

use thiserror::Error;

use crate::polyline::DecodeError;

/// Coarse classification of a [`RideError`], for callers that only need to
/// report which kind of fault occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    Fetch,
    Storage,
    Decode,
    InvalidInput,
    Config,
}

/// Unified error type for ridebank operations.
#[derive(Debug, Error)]
pub enum RideError {
    /// No usable bearer token (never authorized, expired, or rejected by the provider)
    #[error("Not authenticated: {message}")]
    Unauthenticated { message: String },

    /// Remote feed unreachable or returned a malformed response
    #[error("Fetch failed{}: {message}", fetch_context(.page, .status_code))]
    Fetch {
        page: Option<u32>,
        status_code: Option<u16>,
        message: String,
    },

    /// Persistence layer fault (anything other than a uniqueness conflict)
    #[error("Storage error during {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },

    /// Stored geometry could not be decoded
    #[error("Invalid geometry{}: {source}", activity_context(.activity_id))]
    Decode {
        activity_id: Option<i64>,
        #[source]
        source: DecodeError,
    },

    /// Caller-supplied query parameter could not be interpreted
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
}

fn fetch_context(page: &Option<u32>, status_code: &Option<u16>) -> String {
    match (page, status_code) {
        (Some(page), Some(code)) => format!(" (page {}, HTTP {})", page, code),
        (Some(page), None) => format!(" (page {})", page),
        (None, Some(code)) => format!(" (HTTP {})", code),
        (None, None) => String::new(),
    }
}

fn activity_context(activity_id: &Option<i64>) -> String {
    activity_id
        .map(|id| format!(" for activity {}", id))
        .unwrap_or_default()
}

impl RideError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RideError::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            RideError::Fetch { .. } => ErrorKind::Fetch,
            RideError::Storage { .. } => ErrorKind::Storage,
            RideError::Decode { .. } => ErrorKind::Decode,
            RideError::InvalidInput { .. } => ErrorKind::InvalidInput,
            RideError::Config { .. } => ErrorKind::Config,
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        RideError::Unauthenticated {
            message: message.into(),
        }
    }

    pub fn fetch(page: Option<u32>, status_code: Option<u16>, message: impl Into<String>) -> Self {
        RideError::Fetch {
            page,
            status_code,
            message: message.into(),
        }
    }

    pub fn storage(operation: &'static str, message: impl ToString) -> Self {
        RideError::Storage {
            operation,
            message: message.to_string(),
        }
    }

    pub fn decode(activity_id: i64, source: DecodeError) -> Self {
        RideError::Decode {
            activity_id: Some(activity_id),
            source,
        }
    }
}

impl From<DecodeError> for RideError {
    fn from(source: DecodeError) -> Self {
        RideError::Decode {
            activity_id: None,
            source,
        }
    }
}

/// Result type alias for ridebank operations.
pub type Result<T> = std::result::Result<T, RideError>;

/// A synchronization run that aborted part-way.
///
/// Pages committed before the fault stay committed; `inserted` says how many
/// routes that was. Retrying the run is safe because ingestion deduplicates.
#[derive(Debug, Error)]
#[error("Synchronization aborted after {inserted} new routes ({pages_completed} pages): {source}")]
pub struct SyncFailure {
    pub inserted: usize,
    pub pages_completed: u32,
    #[source]
    pub source: RideError,
}

impl SyncFailure {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}
