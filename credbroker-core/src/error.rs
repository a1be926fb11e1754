//! Top-level error type for the credential helper.
//!
//! Every message produced by the helper itself carries the
//! `credbroker/helper: ` prefix. Store and OAuth errors pass through
//! transparently so that callers can match on them, in particular on
//! [`StoreError::NotFound`].

use thiserror::Error;

use crate::store::StoreError;
use crate::token::TokenError;

/// Boxed cause attached to [`HelperError::Context`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for credential helper operations.
#[derive(Debug, Error)]
pub enum HelperError {
    /// The operation is not available for privileged registries.
    #[error("credbroker/helper: {message}")]
    Unsupported { message: String },

    /// A configured token source identifier is not recognized.
    #[error("credbroker/helper: unknown token source: {source_id}")]
    UnknownTokenSource { source_id: String },

    /// The token source list is empty.
    #[error("credbroker/helper: no token sources configured")]
    NoTokenSources,

    /// A token source produced a token that failed validation.
    #[error("credbroker/helper: {message}")]
    InvalidToken { message: String },

    /// The gcloud executable is not on `PATH`.
    #[error("credbroker/helper: {program} not found on PATH")]
    GcloudNotFound { program: String },

    /// An external command could not be run or exited unsuccessfully.
    #[error("credbroker/helper: {command} failed: {detail}")]
    CommandFailed { command: String, detail: String },

    /// An external command succeeded but printed nothing.
    #[error("credbroker/helper: {command} returned empty access_token")]
    EmptyToken { command: String },

    /// A token source did not finish within its deadline.
    #[error("credbroker/helper: token source {source_id} timed out after {seconds}s")]
    Timeout { source_id: String, seconds: u64 },

    /// Error from the credential store, unwrapped.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Error from the OAuth capability, unwrapped.
    #[error(transparent)]
    OAuth(#[from] TokenError),

    /// An underlying failure with operation context.
    #[error("credbroker/helper: {message}: {source}")]
    Context {
        message: String,
        #[source]
        source: BoxError,
    },
}

impl HelperError {
    /// Wrap an error with a description of the failed operation.
    pub fn context(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Context {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Whether this is the store's "no credentials for this server" error.
    ///
    /// Only true for the unwrapped form; a wrapped not-found is an ordinary
    /// failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_not_found())
    }
}
