//! Origin HTTP Adapter
//!
//! Implements the `OriginClient` port with `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

use crate::domain::ports::{ArticleId, OriginClient};
use crate::error::{Error, Result};

/// Default origin server.
pub const DEFAULT_ORIGIN_URL: &str = "http://cs5700cdnorigin.ccs.neu.edu:8080";

/// Configuration for the origin client
#[derive(Debug, Clone)]
pub struct OriginConfig {
    /// Base URL, `scheme://host:port` without a trailing slash
    pub base_url: String,
    /// Whole-request timeout
    pub timeout: Duration,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ORIGIN_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl OriginConfig {
    /// Build a config from a bare `host[:port]` or a full URL.
    pub fn from_origin(origin: &str) -> Self {
        let base_url = if origin.starts_with("http://") || origin.starts_with("https://") {
            origin.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", origin.trim_end_matches('/'))
        };
        Self {
            base_url,
            ..Default::default()
        }
    }
}

/// Origin client speaking plain HTTP GET `/<article>`.
pub struct HttpOriginClient {
    config: OriginConfig,
    client: Client,
}

impl HttpOriginClient {
    /// Create a new origin client
    pub fn new(config: OriginConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// URL the article is fetched from
    pub fn article_url(&self, article: &ArticleId) -> String {
        format!("{}/{}", self.config.base_url, article)
    }
}

impl std::fmt::Debug for HttpOriginClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOriginClient")
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

#[async_trait]
impl OriginClient for HttpOriginClient {
    #[instrument(skip(self), fields(article = %article))]
    async fn fetch(&self, article: &ArticleId) -> Result<Bytes> {
        let url = self.article_url(article);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::OriginFetch {
                article: article.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::OriginNotFound(article.to_string()));
        }
        if !status.is_success() {
            return Err(Error::OriginFetch {
                article: article.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        let body = response.bytes().await.map_err(|e| Error::OriginFetch {
            article: article.to_string(),
            reason: e.to_string(),
        })?;

        debug!(bytes = body.len(), "Fetched article from origin");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_config_from_host_port() {
        let config = OriginConfig::from_origin("origin.example.com:8080");
        assert_eq!(config.base_url, "http://origin.example.com:8080");

        let config = OriginConfig::from_origin("https://origin.example.com/");
        assert_eq!(config.base_url, "https://origin.example.com");
    }

    #[test]
    fn test_article_url() {
        let client = HttpOriginClient::new(OriginConfig::from_origin("localhost:8080")).unwrap();
        let url = client.article_url(&ArticleId::from_title("Albert Einstein"));
        assert_eq!(url, "http://localhost:8080/Albert_Einstein");
    }

    #[test]
    fn test_client_debug() {
        let client = HttpOriginClient::new(OriginConfig::default()).unwrap();
        assert!(format!("{:?}", client).contains("HttpOriginClient"));
    }
}
