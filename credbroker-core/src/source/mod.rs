//! Token acquisition strategies.
//!
//! Each strategy obtains a GCR access token from one independent origin:
//! - [`EnvToken`] - application default credentials (`"env"`)
//! - [`GcloudSdkToken`] - `gcloud auth print-access-token` (`"gcloud_sdk"`)
//! - [`StoreToken`] - refresh token held in the credential store (`"store"`)
//!
//! [`Timeout`] bounds any strategy with a deadline.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::HelperError;

mod env;
mod gcloud;
mod store;

pub use env::EnvToken;
pub use gcloud::GcloudSdkToken;
pub use store::StoreToken;

/// One way of obtaining an access token.
#[async_trait]
pub trait TokenStrategy: Send + Sync {
    /// Produce a raw access token string.
    async fn access_token(&self) -> Result<String, HelperError>;
}

/// Bounds an inner strategy with a deadline.
///
/// The inner future is dropped when the deadline passes; [`GcloudSdkToken`]
/// kills its child process in that case.
pub struct Timeout<S> {
    inner: S,
    duration: Duration,
    label: String,
}

impl<S: TokenStrategy> Timeout<S> {
    pub fn new(inner: S, duration: Duration, label: impl Into<String>) -> Self {
        Self {
            inner,
            duration,
            label: label.into(),
        }
    }
}

#[async_trait]
impl<S: TokenStrategy> TokenStrategy for Timeout<S> {
    async fn access_token(&self) -> Result<String, HelperError> {
        match tokio::time::timeout(self.duration, self.inner.access_token()).await {
            Ok(result) => result,
            Err(_) => Err(HelperError::Timeout {
                source_id: self.label.clone(),
                seconds: self.duration.as_secs(),
            }),
        }
    }
}
