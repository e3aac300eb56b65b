//! Error types for the market-dl library.

use thiserror::Error;

/// Errors that can occur while resolving, downloading or installing a package.
///
/// Every variant is terminal for the current run: the pipeline never retries.
#[derive(Error, Debug)]
pub enum Error {
    /// The platform android id was missing or not a number.
    #[error("Device ID not found")]
    DeviceIdUnavailable,

    /// The server answered with an error status; `body` is the raw error page.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Response status code.
        status: u16,
        /// Response body, surfaced verbatim.
        body: String,
    },

    /// A response did not contain a value the next stage needs.
    #[error("Missing {0} in response")]
    MissingResponseField(&'static str),

    /// A required input for the market request was empty.
    #[error("Missing {0} for market request")]
    MissingField(&'static str),

    /// A field is too long for the 32-bit length prefix of the wire format.
    #[error("Field too large to encode: {len} bytes")]
    FieldTooLarge {
        /// Length of the rejected field.
        len: usize,
    },

    /// The transfer ended with a byte count different from the declared length.
    #[error("Insufficient response: expected {expected} bytes, received {received}")]
    IncompleteTransfer {
        /// Declared content length.
        expected: u64,
        /// Bytes actually written.
        received: u64,
    },

    /// The redirect stage answered with something other than a redirect.
    #[error("Wrong response code for download: {0}")]
    UnexpectedStatus(u16),

    /// The run was cancelled through its cancellation token.
    #[error("Cancelled")]
    Cancelled,

    /// The install hand-off failed.
    #[error("Install failed: {0}")]
    Install(String),

    /// The configuration file could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level HTTP client error.
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl Error {
    /// Returns the raw server body for HTTP errors.
    #[must_use]
    pub fn http_body(&self) -> Option<&str> {
        match self {
            Self::Http { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// A specialized `Result` type for market-dl operations.
pub type Result<T> = std::result::Result<T, Error>;
