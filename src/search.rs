//! SerpAPI web and image search.

use crate::http::{domain_of, homepage_of};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

pub const SERPAPI_ENDPOINT: &str = "https://serpapi.com/search.json";
const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Social networks and business directories never count as an official site.
pub const SKIP_DOMAINS: [&str; 15] = [
    "facebook.com",
    "linkedin.com",
    "twitter.com",
    "instagram.com",
    "youtube.com",
    "yelp.com",
    "wikipedia.org",
    "bloomberg.com",
    "crunchbase.com",
    "zoominfo.com",
    "glassdoor.com",
    "indeed.com",
    "yellowpages.com",
    "bbb.org",
    "mapquest.com",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OrganicResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ImageResult {
    #[serde(default)]
    pub original: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    #[serde(default)]
    images_results: Vec<ImageResult>,
    error: Option<String>,
}

pub trait WebSearcher {
    fn web_search(&self, query: &str) -> impl Future<Output = Result<Vec<OrganicResult>>> + Send;
}

pub trait ImageSearcher {
    fn image_search(&self, query: &str) -> impl Future<Output = Result<Vec<ImageResult>>> + Send;
}

#[derive(Clone)]
pub struct SerpApi {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl SerpApi {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            endpoint: SERPAPI_ENDPOINT.to_string(),
        }
    }

    fn request(&self, params: &[(&str, &str)]) -> reqwest::RequestBuilder {
        self.client
            .get(&self.endpoint)
            .query(params)
            .query(&[("api_key", self.api_key.as_str())])
            .timeout(SEARCH_TIMEOUT)
    }
}

async fn send(request: reqwest::RequestBuilder, query: String) -> Result<SearchResponse> {
    let response = request
        .send()
        .await
        .with_context(|| format!("SerpAPI request failed for '{}'", query))?;
    let status = response.status();
    if !status.is_success() {
        bail!("HTTP {}", status.as_u16());
    }
    let body: SearchResponse = response
        .json()
        .await
        .with_context(|| format!("Invalid SerpAPI response for '{}'", query))?;
    if let Some(error) = body.error.as_deref() {
        // SerpAPI reports empty searches as an error string.
        if !error.contains("hasn't returned any results") {
            bail!("SerpAPI error: {}", error);
        }
    }
    Ok(body)
}

impl WebSearcher for SerpApi {
    fn web_search(&self, query: &str) -> impl Future<Output = Result<Vec<OrganicResult>>> + Send {
        let request = self.request(&[("engine", "google"), ("q", query), ("num", "10")]);
        let query = query.to_string();
        async move { Ok(send(request, query).await?.organic_results) }
    }
}

impl ImageSearcher for SerpApi {
    fn image_search(&self, query: &str) -> impl Future<Output = Result<Vec<ImageResult>>> + Send {
        let request = self.request(&[
            ("engine", "google_images"),
            ("q", query),
            ("num", "20"),
            ("safe", "active"),
        ]);
        let query = query.to_string();
        async move { Ok(send(request, query).await?.images_results) }
    }
}

/// Scores organic results for an organization whose site went dead.
///
/// Each organization word longer than three letters found in a result's
/// domain is worth 10, the top result gets 3 more. Ties keep search order.
pub fn pick_replacement_url(org: &str, old_url: &str, results: &[OrganicResult]) -> Option<String> {
    let old_domain = domain_of(old_url).unwrap_or_default();
    let words: Vec<String> = org
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().count() > 3)
        .map(str::to_string)
        .collect();

    let mut best: Option<(i32, String)> = None;
    for (i, result) in results.iter().take(10).enumerate() {
        if result.link.is_empty() {
            continue;
        }
        let Some(domain) = domain_of(&result.link) else {
            continue;
        };
        let skipped = SKIP_DOMAINS.iter().any(|skip| domain.contains(skip))
            || (!old_domain.is_empty() && domain.contains(&old_domain));
        if skipped {
            continue;
        }
        let Some(homepage) = homepage_of(&result.link) else {
            continue;
        };

        let mut score = 10 * words.iter().filter(|w| domain.contains(w.as_str())).count() as i32;
        if i == 0 {
            score += 3;
        }
        if best.as_ref().map_or(true, |(top, _)| score > *top) {
            best = Some((score, homepage));
        }
    }
    best.map(|(_, homepage)| homepage)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(link: &str) -> OrganicResult {
        OrganicResult {
            title: String::new(),
            link: link.to_string(),
        }
    }

    #[test]
    fn prefers_domain_with_org_words() {
        let results = vec![
            result("https://www.linkedin.com/company/harbor-point"),
            result("https://news.example.com/article"),
            result("https://www.harborpointrealty.com/about-us"),
        ];
        let picked = pick_replacement_url("Harbor Point Realty", "http://harborpoint.net", &results);
        assert_eq!(picked.as_deref(), Some("https://www.harborpointrealty.com"));
    }

    #[test]
    fn skips_the_dead_domain() {
        let results = vec![result("https://acmeholdings.com/contact")];
        assert_eq!(pick_replacement_url("Acme Holdings", "acmeholdings.com", &results), None);
    }

    #[test]
    fn first_result_wins_ties() {
        let results = vec![result("https://first.com/x"), result("https://second.com")];
        assert_eq!(
            pick_replacement_url("Zed Co", "dead.com", &results).as_deref(),
            Some("https://first.com")
        );
    }

    #[test]
    fn response_parses_both_result_kinds() {
        let json = r#"{"organic_results":[{"title":"Acme","link":"https://acme.com","position":1}],
                       "images_results":[{"original":"https://acme.com/logo.png","source":"acme.com"}]}"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.organic_results[0].link, "https://acme.com");
        assert_eq!(parsed.images_results[0].title, "");
        assert!(parsed.error.is_none());
    }
}
