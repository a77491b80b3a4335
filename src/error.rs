//! Error classification shared by all modules
//!
//! Each module owns its own `thiserror` enum; this file only defines the
//! coarse classification callers branch on.

use std::fmt;

/// Coarse error class
///
/// - `Validation`: rejected before any write, no effect
/// - `DomainState`: rejected against fresh state, no partial effect
/// - `Contention`: retries exhausted; retrying the whole operation may succeed
/// - `PartialFailure`: some money moved; see the error for what was compensated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Forbidden,
    NotFound,
    DomainState,
    Contention,
    PartialFailure,
    Infrastructure,
}

impl ErrorKind {
    /// Only contention is worth retrying as-is
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Contention)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::DomainState => "DOMAIN_STATE",
            ErrorKind::Contention => "CONTENTION",
            ErrorKind::PartialFailure => "PARTIAL_FAILURE",
            ErrorKind::Infrastructure => "INFRASTRUCTURE",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Contention => 409,
            ErrorKind::DomainState => 422,
            ErrorKind::PartialFailure | ErrorKind::Infrastructure => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
