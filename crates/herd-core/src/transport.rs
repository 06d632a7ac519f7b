//! HTTP transport to the coordination server.
//!
//! The transport is deliberately dumb: no retries, no state. A failed
//! call aborts the cycle and the next scheduled cycle tries again, which
//! is safe because device state only persists at cycle end.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Response, StatusCode};

use crate::error::{Error, Result};
use crate::protocol::{
    DeltaResponse, HealthResponse, PushRequest, PushResponse, ResetResponse, StateBody,
};
use crate::util::{compact_text, is_http_url, normalize_text_option};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// The five server endpoints, abstracted for testability.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn health(&self) -> Result<HealthResponse>;
    async fn state(&self) -> Result<StateBody>;
    async fn delta(&self, since: DateTime<Utc>) -> Result<DeltaResponse>;
    async fn push(&self, request: &PushRequest) -> Result<PushResponse>;
    async fn reset(&self) -> Result<ResetResponse>;
}

/// Bearer-authenticated reqwest transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    token: String,
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with an explicit server base URL and bearer
    /// token.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let token = normalize_text_option(Some(token.into())).ok_or_else(|| {
            Error::InvalidConfiguration("bearer token must not be empty".to_string())
        })?;
        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            base_url,
            token,
            client,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn check(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized(compact_text(&body)));
        }
        Err(Error::Api {
            status: status.as_u16(),
            message: compact_text(&body),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn health(&self) -> Result<HealthResponse> {
        let response = self.client.get(self.url("/health")).send().await?;
        Ok(self.check(response).await?.json().await?)
    }

    async fn state(&self) -> Result<StateBody> {
        let response = self
            .client
            .get(self.url("/state"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(self.check(response).await?.json().await?)
    }

    async fn delta(&self, since: DateTime<Utc>) -> Result<DeltaResponse> {
        let response = self
            .client
            .get(self.url("/delta"))
            .query(&[("since", since.to_rfc3339_opts(SecondsFormat::Millis, true))])
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(self.check(response).await?.json().await?)
    }

    async fn push(&self, request: &PushRequest) -> Result<PushResponse> {
        let response = self
            .client
            .post(self.url("/push"))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        Ok(self.check(response).await?.json().await?)
    }

    async fn reset(&self) -> Result<ResetResponse> {
        let response = self
            .client
            .delete(self.url("/reset"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(self.check(response).await?.json().await?)
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let normalized = normalize_text_option(Some(raw)).ok_or_else(|| {
        Error::InvalidConfiguration("server URL must not be empty".to_string())
    })?;
    if is_http_url(&normalized) {
        Ok(normalized.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidConfiguration(
            "server URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_empty_base_url() {
        assert!(HttpTransport::new("", "token").is_err());
    }

    #[test]
    fn new_rejects_missing_scheme() {
        assert!(HttpTransport::new("sync.example.com", "token").is_err());
    }

    #[test]
    fn new_rejects_empty_token() {
        assert!(HttpTransport::new("https://sync.example.com", "  ").is_err());
    }

    #[test]
    fn base_url_trims_trailing_slash() {
        let transport = HttpTransport::new("https://sync.example.com/", "token").unwrap();
        assert_eq!(transport.base_url(), "https://sync.example.com");
        assert_eq!(transport.url("/push"), "https://sync.example.com/push");
    }
}
