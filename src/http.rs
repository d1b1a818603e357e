//! Shared HTTP client construction and the page-fetching seam.

use crate::models::HttpConfig;
use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;

const MAX_REDIRECTS: usize = 5;
const MAX_ERROR_LEN: usize = 50;

pub fn build_client(config: &HttpConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.as_str())
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .danger_accept_invalid_certs(true)
        .build()
        .context("Failed to build HTTP client")
}

/// What happened when a page was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Response { status: u16, body: Option<String> },
    Timeout,
    ConnectFailed(String),
    Failed(String),
}

pub trait PageFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = FetchOutcome> + Send;
}

impl PageFetcher for reqwest::Client {
    fn fetch(&self, url: &str) -> impl Future<Output = FetchOutcome> + Send {
        let request = self.get(url);
        async move {
            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.ok();
                    FetchOutcome::Response { status, body }
                }
                Err(e) if e.is_timeout() => FetchOutcome::Timeout,
                Err(e) if e.is_connect() => FetchOutcome::ConnectFailed(short_error(&e)),
                Err(e) => FetchOutcome::Failed(short_error(&e)),
            }
        }
    }
}

/// A downloaded body with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub status: u16,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

pub trait BinaryFetcher {
    fn download(&self, url: &str) -> impl Future<Output = Result<Download>> + Send;
}

impl BinaryFetcher for reqwest::Client {
    fn download(&self, url: &str) -> impl Future<Output = Result<Download>> + Send {
        let request = self.get(url);
        let url = url.to_string();
        async move {
            let response = request
                .send()
                .await
                .with_context(|| format!("Failed to download {}", url))?;
            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let bytes = response
                .bytes()
                .await
                .with_context(|| format!("Failed to read body of {}", url))?
                .to_vec();
            Ok(Download {
                status,
                content_type,
                bytes,
            })
        }
    }
}

pub fn short_error(error: &dyn std::fmt::Display) -> String {
    error.to_string().chars().take(MAX_ERROR_LEN).collect()
}

/// Ensures a scheme so bare domains from spreadsheets can be requested.
pub fn with_scheme(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Host without a leading `www.`.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(&with_scheme(url)).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.trim_start_matches("www.").to_string())
}

/// `scheme://host` of a URL.
pub fn homepage_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(&with_scheme(url)).ok()?;
    let host = parsed.host_str()?;
    Some(format!("{}://{}", parsed.scheme(), host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domains_and_homepages() {
        assert_eq!(domain_of("https://www.Example.com/about").as_deref(), Some("example.com"));
        assert_eq!(domain_of("acme.org").as_deref(), Some("acme.org"));
        assert_eq!(homepage_of("http://shop.acme.org/a/b?c=d").as_deref(), Some("http://shop.acme.org"));
        assert_eq!(domain_of(""), None);
    }

    #[test]
    fn errors_are_truncated() {
        let long = "x".repeat(200);
        assert_eq!(short_error(&long).len(), 50);
    }
}
