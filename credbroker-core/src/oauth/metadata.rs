//! GCE metadata server token source.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::token::{AccessToken, TokenError, TokenSource};

/// Default metadata server address.
const DEFAULT_METADATA_HOST: &str = "169.254.169.254";

/// Environment variable overriding the metadata server host.
pub const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";

const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: String,
}

/// Token source reading the default service account token from the
/// compute metadata server.
#[derive(Debug, Clone)]
pub struct MetadataTokenSource {
    base_url: String,
    scopes: Vec<String>,
    http_client: reqwest::Client,
}

impl MetadataTokenSource {
    /// Create a source for the metadata server at `base_url`
    /// (for example `http://169.254.169.254`).
    pub fn new(base_url: impl Into<String>, scopes: Vec<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            scopes,
            http_client,
        }
    }

    /// Create a source honoring `GCE_METADATA_HOST`.
    pub fn from_env(scopes: Vec<String>) -> Self {
        let host = std::env::var(METADATA_HOST_ENV)
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string());
        Self::new(format!("http://{}", host), scopes)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check whether a metadata server answers at the configured address.
    pub async fn is_available(&self) -> bool {
        let response = self
            .http_client
            .get(format!("{}/", self.base_url))
            .header("Metadata-Flavor", "Google")
            .send()
            .await;

        match response {
            Ok(resp) => resp
                .headers()
                .get("Metadata-Flavor")
                .map(|v| v == "Google")
                .unwrap_or(false),
            Err(e) => {
                tracing::debug!("Metadata server not reachable at {}: {}", self.base_url, e);
                false
            }
        }
    }
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    async fn token(&self) -> Result<AccessToken, TokenError> {
        let mut request = self
            .http_client
            .get(format!("{}{}", self.base_url, TOKEN_PATH))
            .header("Metadata-Flavor", "Google");

        if !self.scopes.is_empty() {
            request = request.query(&[("scopes", self.scopes.join(","))]);
        }

        let response = request.send().await.map_err(|e| TokenError::NetworkError {
            message: format!("metadata server request failed: {}", e),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::RefreshFailed {
                message: format!("metadata server returned {}: {}", status, body.trim()),
            });
        }

        let body: MetadataTokenResponse =
            response.json().await.map_err(|e| TokenError::NetworkError {
                message: format!("invalid metadata token response: {}", e),
            })?;

        let mut token = AccessToken::new(body.access_token).with_token_type(&body.token_type);
        if let Some(seconds) = body.expires_in {
            token = token.expires_in(seconds);
        }

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::gcr_scopes;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    #[tokio::test]
    async fn test_metadata_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .and(header("Metadata-Flavor", "Google"))
            .and(query_param(
                "scopes",
                "https://www.googleapis.com/auth/cloud-platform",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.metadata",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(&mock_server)
            .await;

        let source = MetadataTokenSource::new(mock_server.uri(), gcr_scopes());
        let token = source.token().await.unwrap();

        assert_eq!(token.access_token.expose(), "ya29.metadata");
        assert!(token.is_bearer());
        assert!(token.is_valid());
    }

    #[tokio::test]
    async fn test_metadata_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&mock_server)
            .await;

        let source = MetadataTokenSource::new(mock_server.uri(), vec![]);
        let result = source.token().await;

        assert!(matches!(result, Err(TokenError::RefreshFailed { .. })));
    }

    #[tokio::test]
    async fn test_is_available_requires_flavor_header() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).insert_header("Metadata-Flavor", "Google"))
            .mount(&mock_server)
            .await;

        let source = MetadataTokenSource::new(mock_server.uri(), vec![]);
        assert!(source.is_available().await);

        let plain_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&plain_server)
            .await;

        let source = MetadataTokenSource::new(plain_server.uri(), vec![]);
        assert!(!source.is_available().await);
    }
}
