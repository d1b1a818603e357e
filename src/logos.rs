//! Logo acquisition for portfolio organizations.
//!
//! Each organization is tried in order: a direct logo URL built from its
//! domain, then an image search driven by a chat-model query. Every
//! candidate must pass size and type checks and a vision review before it
//! is saved.

use crate::http::{domain_of, BinaryFetcher, Download};
use crate::models::LogoConfig;
use crate::openai::OpenAiClient;
use crate::search::{ImageResult, ImageSearcher};
use crate::table::{safe_float, Table};
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Stock photo sites whose results are watermarked or unrelated.
pub const BAD_SOURCES: [&str; 5] = ["getty", "shutterstock", "istock", "alamy", "dreamstime"];
const IMAGE_EXTENSIONS: [&str; 5] = [".png", ".jpg", ".jpeg", ".webp", ".gif"];
pub const PROGRESS_HEADERS: [&str; 5] = ["org_name", "status", "source", "attempts", "error"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoQuery {
    pub description: Option<String>,
    pub full_name: Option<String>,
    pub search: String,
}

/// Chat and vision decisions about logos.
pub trait LogoJudge {
    fn search_query(&self, org: &str) -> impl Future<Output = Result<Option<LogoQuery>>> + Send;
    fn is_logo(&self, name: &str, image: &[u8]) -> impl Future<Output = Result<bool>> + Send;
}

impl LogoJudge for OpenAiClient {
    fn search_query(&self, org: &str) -> impl Future<Output = Result<Option<LogoQuery>>> + Send {
        let prompt = format!(
            "I need to find the official logo for: \"{org}\"\n\n\
             This is a company/organization that owns, manages, or occupies commercial real estate buildings.\n\n\
             Tell me:\n\
             1. What is this company? (1 sentence)\n\
             2. What is their official/full company name?\n\
             3. What Google Image search query should I use to find their official logo?\n\n\
             Respond in this exact format:\n\
             DESCRIPTION: [what the company is]\n\
             FULL_NAME: [official company name]\n\
             SEARCH: [the search query to use]"
        );
        async move {
            let answer = self.chat(&prompt, 200).await?;
            Ok(parse_query(&answer))
        }
    }

    fn is_logo(&self, name: &str, image: &[u8]) -> impl Future<Output = Result<bool>> + Send {
        let prompt = format!(
            "Is this the official LOGO for \"{name}\"?\n\n\
             Rules:\n\
             - Must be a LOGO (graphic/vector design), NOT a photo, screenshot, or building image\n\
             - Must be for this specific company (name/brand visible or clearly matches)\n\
             - Reject if it's a different company's logo\n\
             - Reject if it's low quality or has watermarks\n\n\
             Answer ONLY: GOOD or BAD"
        );
        let image = image.to_vec();
        async move { self.vision_yes_no(&prompt, &image, "GOOD").await }
    }
}

/// Reads the `DESCRIPTION:` / `FULL_NAME:` / `SEARCH:` lines of a chat answer.
pub fn parse_query(answer: &str) -> Option<LogoQuery> {
    let mut description = None;
    let mut full_name = None;
    let mut search = None;
    for line in answer.lines().map(str::trim) {
        let value = |prefix: &str| {
            line.strip_prefix(prefix)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        if let Some(v) = value("SEARCH:") {
            search = Some(v);
        } else if let Some(v) = value("FULL_NAME:") {
            full_name = Some(v);
        } else if let Some(v) = value("DESCRIPTION:") {
            description = Some(v);
        }
    }
    Some(LogoQuery {
        description,
        full_name,
        search: search?,
    })
}

pub fn logo_filename(org: &str) -> String {
    format!("{}.png", org.trim().replace(' ', "_"))
}

pub fn is_bad_source(source: &str) -> bool {
    let source = source.to_lowercase();
    BAD_SOURCES.iter().any(|bad| source.contains(bad))
}

/// Size, status and type checks on a downloaded candidate.
pub fn acceptable_image(download: &Download, url: &str, config: &LogoConfig) -> bool {
    if download.status != 200 {
        return false;
    }
    let lower = url.to_lowercase();
    let looks_like_image = download.content_type.contains("image")
        || IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext));
    let size = download.bytes.len();
    looks_like_image && size >= config.min_bytes && size <= config.max_bytes
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    pub name: String,
    pub url: String,
    pub logo_file: String,
}

/// Organizations without a logo, most-referenced first.
pub fn orgs_without_logos(path: impl AsRef<Path>) -> Result<Vec<Organization>> {
    let table = Table::load(path)?;
    let mut orgs: Vec<(f64, Organization)> = (0..table.len())
        .filter_map(|row| {
            let name = [table.get(row, "organization_name"), table.get(row, "organization")]
                .into_iter()
                .find(|v| !v.trim().is_empty())?
                .trim()
                .to_string();
            let logo_file = table.get(row, "logo_file").trim().to_string();
            if !logo_file.is_empty() {
                return None;
            }
            let count = safe_float(table.get(row, "total_count")).unwrap_or(0.0);
            Some((
                count,
                Organization {
                    name,
                    url: table.get(row, "org_url").trim().to_string(),
                    logo_file,
                },
            ))
        })
        .collect();
    orgs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    Ok(orgs.into_iter().map(|(_, org)| org).collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoStatus {
    Success,
    Failed,
}

impl LogoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogoStatus::Success => "SUCCESS",
            LogoStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoOutcome {
    pub org: String,
    pub status: LogoStatus,
    pub source: String,
    pub attempts: usize,
    pub error: String,
    pub saved: Option<PathBuf>,
}

impl LogoOutcome {
    fn failed(org: &str, attempts: usize, error: &str) -> Self {
        Self {
            org: org.to_string(),
            status: LogoStatus::Failed,
            source: String::new(),
            attempts,
            error: error.to_string(),
            saved: None,
        }
    }
}

struct Candidate {
    source: String,
    bytes: Vec<u8>,
}

pub struct LogoFetcher<'a, S, J, D> {
    pub searcher: &'a S,
    pub judge: &'a J,
    pub downloader: &'a D,
    pub config: &'a LogoConfig,
    pub logos_dir: &'a Path,
}

impl<S, J, D> LogoFetcher<'_, S, J, D>
where
    S: ImageSearcher + Sync,
    J: LogoJudge + Sync,
    D: BinaryFetcher + Sync,
{
    async fn try_download(&self, url: &str) -> Option<Vec<u8>> {
        match self.downloader.download(url).await {
            Ok(download) if acceptable_image(&download, url, self.config) => Some(download.bytes),
            Ok(download) => {
                debug!(%url, status = download.status, bytes = download.bytes.len(), "candidate rejected");
                None
            }
            Err(e) => {
                debug!(%url, error = %e, "candidate download failed");
                None
            }
        }
    }

    async fn search_candidates(&self, query: &str) -> Result<Vec<Candidate>> {
        let results: Vec<ImageResult> = self.searcher.image_search(query).await?;
        let mut candidates = Vec::new();
        for result in results {
            if result.original.is_empty() || is_bad_source(&result.source) {
                continue;
            }
            if let Some(bytes) = self.try_download(&result.original).await {
                candidates.push(Candidate {
                    source: result.source,
                    bytes,
                });
                if candidates.len() >= self.config.max_candidates {
                    break;
                }
            }
        }
        Ok(candidates)
    }

    fn save(&self, org: &str, bytes: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(self.logos_dir)
            .with_context(|| format!("Failed to create {}", self.logos_dir.display()))?;
        let path = self.logos_dir.join(logo_filename(org));
        std::fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    fn success(&self, org: &str, source: &str, attempts: usize, bytes: &[u8]) -> Result<LogoOutcome> {
        let saved = self.save(org, bytes)?;
        info!(%org, %source, file = %saved.display(), "logo saved");
        Ok(LogoOutcome {
            org: org.to_string(),
            status: LogoStatus::Success,
            source: source.to_string(),
            attempts,
            error: String::new(),
            saved: Some(saved),
        })
    }

    pub async fn fetch(&self, org: &Organization) -> Result<LogoOutcome> {
        let name = org.name.as_str();
        let mut attempts = 0;

        if let (Some(template), Some(domain)) = (&self.config.direct_url_template, domain_of(&org.url)) {
            let url = template.replace("{domain}", &domain);
            if let Some(bytes) = self.try_download(&url).await {
                attempts += 1;
                if self.judge.is_logo(name, &bytes).await.unwrap_or(false) {
                    return self.success(name, &url, attempts, &bytes);
                }
            }
        }

        let query = match self.judge.search_query(name).await {
            Ok(Some(query)) => query,
            Ok(None) | Err(_) => return Ok(LogoOutcome::failed(name, attempts, "OpenAI failed to identify")),
        };
        debug!(%name, search = %query.search, "logo search");

        let candidates = match self.search_candidates(&query.search).await {
            Ok(candidates) if !candidates.is_empty() => candidates,
            Ok(_) => return Ok(LogoOutcome::failed(name, attempts, "No candidates")),
            Err(e) => {
                warn!(%name, error = %e, "image search failed");
                return Ok(LogoOutcome::failed(name, attempts, "No candidates"));
            }
        };

        let check_name = query.full_name.as_deref().unwrap_or(name);
        for candidate in &candidates {
            attempts += 1;
            match self.judge.is_logo(check_name, &candidate.bytes).await {
                Ok(true) => return self.success(name, &candidate.source, attempts, &candidate.bytes),
                Ok(false) => debug!(%name, source = %candidate.source, "logo rejected"),
                Err(e) => warn!(%name, error = %e, "logo validation failed"),
            }
        }
        Ok(LogoOutcome::failed(name, attempts, "All failed validation"))
    }
}

/// Appends one row, writing the header when the file is new.
pub fn append_progress(path: impl AsRef<Path>, outcome: &LogoOutcome) -> Result<()> {
    let path = path.as_ref();
    let exists = path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    if !exists {
        writer.write_record(PROGRESS_HEADERS)?;
    }
    writer.write_record([
        outcome.org.as_str(),
        outcome.status.as_str(),
        outcome.source.as_str(),
        outcome.attempts.to_string().as_str(),
        outcome.error.as_str(),
    ])?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeSearch(Vec<ImageResult>);

    impl ImageSearcher for FakeSearch {
        fn image_search(&self, _query: &str) -> impl Future<Output = Result<Vec<ImageResult>>> + Send {
            let results = self.0.clone();
            async move { Ok(results) }
        }
    }

    /// Approves only images whose first byte matches.
    struct FakeJudge {
        good_byte: u8,
    }

    impl LogoJudge for FakeJudge {
        fn search_query(&self, org: &str) -> impl Future<Output = Result<Option<LogoQuery>>> + Send {
            let query = parse_query(&format!("DESCRIPTION: REIT\nFULL_NAME: {org} Inc\nSEARCH: {org} logo"));
            async move { Ok(query) }
        }

        fn is_logo(&self, _name: &str, image: &[u8]) -> impl Future<Output = Result<bool>> + Send {
            let good = image.first() == Some(&self.good_byte);
            async move { Ok(good) }
        }
    }

    struct FakeDownloads(HashMap<String, Download>);

    impl BinaryFetcher for FakeDownloads {
        fn download(&self, url: &str) -> impl Future<Output = Result<Download>> + Send {
            let found = self.0.get(url).cloned();
            let url = url.to_string();
            async move { found.with_context(|| format!("404 {}", url)) }
        }
    }

    fn png(first: u8, len: usize) -> Download {
        let mut bytes = vec![0u8; len];
        bytes[0] = first;
        Download {
            status: 200,
            content_type: "image/png".to_string(),
            bytes,
        }
    }

    fn image(url: &str, source: &str) -> ImageResult {
        ImageResult {
            original: url.to_string(),
            source: source.to_string(),
            title: String::new(),
        }
    }

    #[test]
    fn query_lines_are_parsed() {
        let q = parse_query("DESCRIPTION: A REIT.\nFULL_NAME: Acme Realty Trust\nSEARCH: Acme Realty logo").unwrap();
        assert_eq!(q.search, "Acme Realty logo");
        assert_eq!(q.full_name.as_deref(), Some("Acme Realty Trust"));
        assert!(parse_query("I don't know this company").is_none());
    }

    #[test]
    fn filenames_and_sources() {
        assert_eq!(logo_filename(" Acme Realty Trust "), "Acme_Realty_Trust.png");
        assert!(is_bad_source("Getty Images"));
        assert!(!is_bad_source("acme.com"));
    }

    #[test]
    fn size_bounds_are_enforced() {
        let config = LogoConfig {
            direct_url_template: None,
            max_candidates: 8,
            min_bytes: 3_000,
            max_bytes: 2_000_000,
        };
        assert!(acceptable_image(&png(1, 3_000), "x", &config));
        assert!(!acceptable_image(&png(1, 2_999), "x", &config));
        let mut html = png(1, 5_000);
        html.content_type = "text/html".to_string();
        assert!(!acceptable_image(&html, "https://a.com/logo", &config));
        assert!(acceptable_image(&html, "https://a.com/logo.PNG", &config));
    }

    #[tokio::test]
    async fn search_candidates_are_judged_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogoConfig {
            direct_url_template: Some("https://logos.test/{domain}".to_string()),
            max_candidates: 8,
            min_bytes: 3_000,
            max_bytes: 2_000_000,
        };
        let searcher = FakeSearch(vec![
            image("https://stock.test/a.png", "Shutterstock"),
            image("https://small.test/b.png", "small.test"),
            image("https://bad.test/c.png", "bad.test"),
            image("https://good.test/d.png", "good.test"),
        ]);
        let downloads = FakeDownloads(HashMap::from([
            ("https://logos.test/acme.com".to_string(), png(0, 4_000)),
            ("https://stock.test/a.png".to_string(), png(9, 4_000)),
            ("https://small.test/b.png".to_string(), png(9, 100)),
            ("https://bad.test/c.png".to_string(), png(0, 4_000)),
            ("https://good.test/d.png".to_string(), png(9, 4_000)),
        ]));
        let judge = FakeJudge { good_byte: 9 };
        let fetcher = LogoFetcher {
            searcher: &searcher,
            judge: &judge,
            downloader: &downloads,
            config: &config,
            logos_dir: dir.path(),
        };
        let org = Organization {
            name: "Acme Realty".to_string(),
            url: "https://www.acme.com".to_string(),
            logo_file: String::new(),
        };

        let outcome = fetcher.fetch(&org).await.unwrap();
        assert_eq!(outcome.status, LogoStatus::Success);
        assert_eq!(outcome.source, "good.test");
        // direct URL, bad.test, good.test
        assert_eq!(outcome.attempts, 3);
        assert!(dir.path().join("Acme_Realty.png").exists());

        let progress = dir.path().join("progress.csv");
        append_progress(&progress, &outcome).unwrap();
        append_progress(&progress, &LogoOutcome::failed("Other", 0, "No candidates")).unwrap();
        let text = std::fs::read_to_string(&progress).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("org_name,status,source,attempts,error"));
    }
}
