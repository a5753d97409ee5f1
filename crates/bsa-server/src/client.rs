//! HTTP client for a running authority

use crate::api::ProposeAccepted;
use bsa_core::{CanonicalState, Proposal};

/// Default server address
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport or decoding failure
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Typed client for the `/api/v1` endpoints
#[derive(Debug, Clone)]
pub struct BsaClient {
    base_url: String,
    http: reqwest::Client,
}

impl BsaClient {
    /// Client for `base_url`; a trailing `/` is ignored
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    /// Server address requests are sent to
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch canonical state
    ///
    /// # Errors
    /// - `ClientError::Http` on transport or decoding failure
    /// - `ClientError::Status` on a non-2xx response
    pub async fn get_state(&self, version: Option<&str>) -> Result<CanonicalState, ClientError> {
        let mut request = self.http.get(format!("{}/api/v1/state", self.base_url));
        if let Some(version) = version.filter(|v| !v.is_empty()) {
            request = request.query(&[("version", version)]);
        }
        let response = Self::check(request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Submit a proposal for staging
    ///
    /// # Errors
    /// - `ClientError::Http` on transport or decoding failure
    /// - `ClientError::Status` on a non-2xx response, including validation
    ///   failures (400)
    pub async fn propose_change(
        &self,
        proposal: &Proposal,
    ) -> Result<ProposeAccepted, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/v1/propose", self.base_url))
            .json(proposal)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status { status, body })
    }
}

impl Default for BsaClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_trimmed() {
        let client = BsaClient::new("http://localhost:9000/");
        assert_eq!(client.base_url(), "http://localhost:9000");
    }

    #[test]
    fn default_targets_local_server() {
        assert_eq!(BsaClient::default().base_url(), DEFAULT_BASE_URL);
    }
}
