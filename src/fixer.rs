//! Replacement URLs for organizations whose websites are dead or parked.
//!
//! The dead-link CSV is only read. Findings go to a progress CSV that grows
//! as searches finish and to a recommendations CSV written at the end.

use crate::http::{FetchOutcome, PageFetcher};
use crate::scraper::{detect_parked, STRICT_PARKED_PATTERNS};
use crate::search::{pick_replacement_url, WebSearcher};
use crate::table::Table;
use anyhow::{Context, Result};
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, warn};

pub const PROGRESS_HEADERS: [&str; 6] = [
    "organization",
    "old_url",
    "status",
    "new_url",
    "validated",
    "validation_reason",
];
pub const RECOMMENDATION_HEADERS: [&str; 5] = ["organization", "old_url", "new_url", "validated", "action"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLink {
    pub organization: String,
    pub url: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Replace,
    ManualCheck,
    NeedsResearch,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Replace => "REPLACE",
            Action::ManualCheck => "MANUAL_CHECK",
            Action::NeedsResearch => "NEEDS_RESEARCH",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlFix {
    pub link: DeadLink,
    pub new_url: Option<String>,
    pub validated: bool,
    pub reason: String,
}

impl UrlFix {
    pub fn action(&self) -> Action {
        match (&self.new_url, self.validated) {
            (Some(_), true) => Action::Replace,
            (Some(_), false) => Action::ManualCheck,
            (None, _) => Action::NeedsResearch,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixerOptions {
    pub search_concurrency: usize,
    pub validate_concurrency: usize,
    pub search_delay: Duration,
}

/// FOR_SALE rows only survive when a strict parked pattern was matched;
/// broad matches are often false positives on healthy sites.
pub fn is_genuinely_dead(status: &str, matched: &str, issue: &str) -> bool {
    if matches!(status, "DEAD" | "TIMEOUT" | "ERROR") {
        return true;
    }
    let matched = matched.to_lowercase();
    let issue = issue.to_lowercase();
    STRICT_PARKED_PATTERNS
        .iter()
        .any(|p| matched.contains(p) || issue.contains(p))
}

pub fn load_dead_links(path: impl AsRef<Path>) -> Result<Vec<DeadLink>> {
    let table = Table::load(path)?;
    let links = (0..table.len())
        .filter(|&row| {
            is_genuinely_dead(
                table.get(row, "status"),
                table.get(row, "match"),
                table.get(row, "issue"),
            )
        })
        .map(|row| DeadLink {
            organization: table.get(row, "organization").to_string(),
            url: table.get(row, "url").to_string(),
            status: table.get(row, "status").to_string(),
        })
        .collect();
    Ok(links)
}

/// Returns whether a candidate is usable and why.
pub fn judge_candidate(outcome: &FetchOutcome) -> (bool, String) {
    match outcome {
        FetchOutcome::Response { status, .. } if *status >= 400 => (false, format!("HTTP {}", status)),
        FetchOutcome::Response { body, .. } => {
            match body.as_deref().and_then(detect_parked) {
                Some(pattern) => (false, format!("Matched: {}", pattern)),
                None => (true, "OK".to_string()),
            }
        }
        FetchOutcome::Timeout => (false, "Timeout".to_string()),
        FetchOutcome::ConnectFailed(e) | FetchOutcome::Failed(e) => (false, e.clone()),
    }
}

async fn find_fix<S, F>(
    searcher: &S,
    fetcher: &F,
    link: &DeadLink,
    search_permits: &Semaphore,
    validate_permits: &Semaphore,
    delay: Duration,
) -> UrlFix
where
    S: WebSearcher + Sync,
    F: PageFetcher + Sync,
{
    let query = format!("{} official website", link.organization);
    let searched = {
        let _permit = search_permits.acquire().await.ok();
        let results = searcher.web_search(&query).await;
        tokio::time::sleep(delay).await;
        results
    };

    let new_url = match searched {
        Ok(results) if results.is_empty() => Err("No results".to_string()),
        Ok(results) => pick_replacement_url(&link.organization, &link.url, &results)
            .ok_or_else(|| format!("No alternatives (only found {})", link.url)),
        Err(e) => Err(crate::http::short_error(&e)),
    };

    match new_url {
        Ok(url) => {
            let outcome = {
                let _permit = validate_permits.acquire().await.ok();
                fetcher.fetch(&url).await
            };
            let (validated, reason) = judge_candidate(&outcome);
            UrlFix {
                link: link.clone(),
                new_url: Some(url),
                validated,
                reason,
            }
        }
        Err(reason) => UrlFix {
            link: link.clone(),
            new_url: None,
            validated: false,
            reason,
        },
    }
}

pub async fn fix_dead_links<S, F>(
    searcher: &S,
    fetcher: &F,
    links: &[DeadLink],
    options: FixerOptions,
    progress_path: impl AsRef<Path>,
) -> Result<Vec<UrlFix>>
where
    S: WebSearcher + Sync,
    F: PageFetcher + Sync,
{
    let progress_path = progress_path.as_ref();
    let file = File::create(progress_path)
        .with_context(|| format!("Failed to create {}", progress_path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(PROGRESS_HEADERS)?;
    writer.flush()?;
    let writer = Mutex::new(writer);

    let search_permits = Arc::new(Semaphore::new(options.search_concurrency.max(1)));
    let validate_permits = Arc::new(Semaphore::new(options.validate_concurrency.max(1)));
    info!(dead = links.len(), "searching replacement URLs");

    let tasks = links.iter().map(|link| {
        let writer = &writer;
        let search_permits = Arc::clone(&search_permits);
        let validate_permits = Arc::clone(&validate_permits);
        async move {
            let fix = find_fix(
                searcher,
                fetcher,
                link,
                &search_permits,
                &validate_permits,
                options.search_delay,
            )
            .await;
            match (&fix.new_url, fix.validated) {
                (Some(url), true) => info!(org = %link.organization, %url, "replacement validated"),
                (Some(url), false) => warn!(org = %link.organization, %url, reason = %fix.reason, "replacement invalid"),
                (None, _) => warn!(org = %link.organization, reason = %fix.reason, "no replacement found"),
            }

            let mut w = writer.lock().await;
            let written = w
                .write_record([
                    fix.link.organization.as_str(),
                    fix.link.url.as_str(),
                    fix.link.status.as_str(),
                    fix.new_url.as_deref().unwrap_or(""),
                    if fix.validated { "True" } else { "False" },
                    fix.reason.as_str(),
                ])
                .and_then(|_| w.flush().map_err(csv::Error::from));
            if let Err(e) = written {
                warn!(org = %link.organization, error = %e, "failed to record progress");
            }
            drop(w);
            fix
        }
    });

    Ok(futures::future::join_all(tasks).await)
}

pub fn write_recommendations(fixes: &[UrlFix], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(RECOMMENDATION_HEADERS)?;
    for fix in fixes {
        writer.write_record([
            fix.link.organization.as_str(),
            fix.link.url.as_str(),
            fix.new_url.as_deref().unwrap_or(""),
            if fix.validated { "True" } else { "False" },
            fix.action().as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn false_positive_for_sale_rows_are_dropped() {
        assert!(is_genuinely_dead("DEAD", "", "HTTP 404"));
        assert!(is_genuinely_dead("FOR_SALE", "hugedomains", ""));
        assert!(!is_genuinely_dead("FOR_SALE", "coming soon", "Domain appears parked/for sale"));
    }

    #[test]
    fn candidate_judgement() {
        let ok = FetchOutcome::Response { status: 200, body: Some("<p>Welcome</p>".into()) };
        assert_eq!(judge_candidate(&ok), (true, "OK".to_string()));

        let parked = FetchOutcome::Response { status: 200, body: Some("Buy this domain".into()) };
        assert_eq!(judge_candidate(&parked).1, "Matched: buy this domain");

        let gone = FetchOutcome::Response { status: 403, body: None };
        assert_eq!(judge_candidate(&gone), (false, "HTTP 403".to_string()));
    }

    #[test]
    fn lander_script_does_not_reject_healthy_candidate() {
        let body = r#"<html><head><title>Gone Holdings</title></head>
            <body><h1>Gone Holdings</h1><p>Industrial portfolio since 1962.</p>
            <script>window.ads = { fallback: "https://www.hugedomains.com/domain_profile.cfm" };</script>
            </body></html>"#;
        let candidate = FetchOutcome::Response { status: 200, body: Some(body.into()) };
        assert_eq!(judge_candidate(&candidate), (true, "OK".to_string()));
    }

    #[test]
    fn actions_follow_validation() {
        let link = DeadLink {
            organization: "Acme".into(),
            url: "acme.com".into(),
            status: "DEAD".into(),
        };
        let mut fix = UrlFix { link, new_url: None, validated: false, reason: String::new() };
        assert_eq!(fix.action(), Action::NeedsResearch);
        fix.new_url = Some("https://acme.co".into());
        assert_eq!(fix.action(), Action::ManualCheck);
        fix.validated = true;
        assert_eq!(fix.action(), Action::Replace);
    }
}
