//! Outbound HTTP transport
//!
//! Requests either go straight to the engine URL or, when a SERP proxy API is
//! configured, are wrapped in a proxy request
//! (`POST {zone, url, format: "raw"}` with a bearer key).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client, RequestBuilder};
use serde::Serialize;

use super::BackendRequest;
use crate::config::TransportConfig;
use crate::error::{SearchError, SearchResult};

/// Anything that can deliver a backend request and return its body
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: &BackendRequest) -> SearchResult<String>;
}

#[derive(Debug, Serialize)]
struct ProxyRequest<'a> {
    zone: &'a str,
    url: &'a str,
    format: &'static str,
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> SearchResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| SearchError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Same client with a different proxy API key
    pub fn with_api_key(&self, api_key: impl Into<String>) -> Self {
        let mut config = self.config.clone();
        config.api_key = Some(api_key.into());
        Self {
            client: self.client.clone(),
            config,
        }
    }

    pub fn uses_proxy(&self) -> bool {
        self.config.proxy_url.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// GET straight to the engine, asking for the body shape the dialect parses
    fn direct_request(&self, request: &BackendRequest) -> RequestBuilder {
        self.client
            .get(request.url.clone())
            .header(ACCEPT, request.format.accept_header())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: &BackendRequest) -> SearchResult<String> {
        let response = match self.config.proxy_url.as_deref().filter(|u| !u.is_empty()) {
            Some(proxy_url) => {
                let body = ProxyRequest {
                    zone: self.config.zone.as_deref().unwrap_or("serp"),
                    url: request.url.as_str(),
                    format: "raw",
                };
                let mut builder = self.client.post(proxy_url).json(&body);
                if let Some(ref key) = self.config.api_key {
                    builder = builder.bearer_auth(key);
                }
                builder.send().await?
            }
            None => self.direct_request(request).send().await?,
        };

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let preview: String = text.chars().take(200).collect();
            return Err(SearchError::Transport(format!(
                "{} error {}: {}",
                request.backend, status, preview
            )));
        }

        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::ResponseFormat;

    #[test]
    fn test_with_api_key_keeps_settings() {
        let config = TransportConfig {
            proxy_url: Some("https://proxy.example/request".into()),
            zone: Some("serp_zone".into()),
            ..Default::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        let keyed = transport.with_api_key("key-2");
        assert!(keyed.uses_proxy());
        assert_eq!(keyed.config.api_key.as_deref(), Some("key-2"));
        assert_eq!(keyed.config.zone.as_deref(), Some("serp_zone"));
        assert!(transport.config.api_key.is_none());
    }

    #[test]
    fn test_proxy_body_shape() {
        let body = ProxyRequest {
            zone: "serp",
            url: "https://www.google.com/search?q=acme",
            format: "raw",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["zone"], "serp");
        assert_eq!(json["format"], "raw");
        assert_eq!(json["url"], "https://www.google.com/search?q=acme");
    }

    #[test]
    fn test_direct_request_accept_header() {
        let transport = HttpTransport::new(&TransportConfig::default()).unwrap();
        for (format, expected) in [
            (ResponseFormat::Json, "application/json"),
            (ResponseFormat::Markup, "text/html,application/xhtml+xml"),
        ] {
            let request = BackendRequest {
                backend: "google".into(),
                url: "https://www.google.com/search?q=acme".parse().unwrap(),
                format,
            };
            let built = transport.direct_request(&request).build().unwrap();
            assert_eq!(built.method(), reqwest::Method::GET);
            assert_eq!(built.url(), &request.url);
            assert_eq!(built.headers()[ACCEPT], expected);
        }
    }

    #[test]
    fn test_direct_mode_without_proxy() {
        let transport = HttpTransport::new(&TransportConfig::default()).unwrap();
        assert!(!transport.uses_proxy());
    }
}
