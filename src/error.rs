//! Error taxonomy shared by the record store, the query engine and the
//! HTTP layer.

use thiserror::Error;

/// Failures surfaced to callers of the record service.
#[derive(Debug, Error)]
pub enum Error {
    /// A malformed parameter: unknown eye colour, zero or negative page
    /// length, negative offset, non-numeric value. Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backing store failed. The query engine does not retry.
    #[error("store unavailable: {0:#}")]
    StoreUnavailable(anyhow::Error),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Whether the caller, not the server, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::StoreUnavailable(err)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
