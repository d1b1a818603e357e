//! Dead-link checking for organization websites.
//!
//! Every URL is fetched once under a shared semaphore. Anything that is not
//! OK is appended to the output CSV the moment its request finishes, so a
//! long run that is interrupted still leaves usable results behind.

use crate::http::{with_scheme, FetchOutcome, PageFetcher};
use crate::scraper::{find_pattern, SALE_PATTERNS};
use crate::table::Table;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

/// Statuses treated as a dead site rather than a transient failure.
pub const DEAD_STATUSES: [u16; 9] = [404, 410, 502, 503, 504, 521, 522, 523, 524];

pub const OUTPUT_HEADERS: [&str; 6] = ["organization", "url", "status", "status_code", "issue", "match"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LinkStatus {
    Ok,
    ForSale,
    Dead,
    Timeout,
    Error,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Ok => "OK",
            LinkStatus::ForSale => "FOR_SALE",
            LinkStatus::Dead => "DEAD",
            LinkStatus::Timeout => "TIMEOUT",
            LinkStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCheck {
    pub status: LinkStatus,
    pub status_code: Option<u16>,
    pub issue: String,
    pub matched: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgLink {
    pub organization: String,
    pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct LinkSummary {
    pub checked: usize,
    pub by_status: BTreeMap<LinkStatus, usize>,
}

impl LinkSummary {
    pub fn count(&self, status: LinkStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

pub fn classify(outcome: &FetchOutcome, timeout_secs: u64) -> LinkCheck {
    match outcome {
        FetchOutcome::Response { status, body } => {
            if DEAD_STATUSES.contains(status) {
                return LinkCheck {
                    status: LinkStatus::Dead,
                    status_code: Some(*status),
                    issue: format!("HTTP {}", status),
                    matched: None,
                };
            }
            let matched = body.as_deref().and_then(|b| find_pattern(b, SALE_PATTERNS));
            match matched {
                Some(pattern) => LinkCheck {
                    status: LinkStatus::ForSale,
                    status_code: Some(*status),
                    issue: "Domain appears parked/for sale".to_string(),
                    matched: Some(pattern),
                },
                None => LinkCheck {
                    status: LinkStatus::Ok,
                    status_code: Some(*status),
                    issue: String::new(),
                    matched: None,
                },
            }
        }
        FetchOutcome::Timeout => LinkCheck {
            status: LinkStatus::Timeout,
            status_code: None,
            issue: format!("Timeout after {}s", timeout_secs),
            matched: None,
        },
        FetchOutcome::ConnectFailed(e) => LinkCheck {
            status: LinkStatus::Dead,
            status_code: None,
            issue: format!("Connection failed: {}", e),
            matched: None,
        },
        FetchOutcome::Failed(e) => LinkCheck {
            status: LinkStatus::Error,
            status_code: None,
            issue: e.clone(),
            matched: None,
        },
    }
}

/// Reads `organization` / `org_url` pairs, skipping rows without a URL.
pub fn load_org_links(path: impl AsRef<Path>) -> Result<Vec<OrgLink>> {
    let table = Table::load(path)?;
    let links = (0..table.len())
        .filter_map(|row| {
            let url = table.get(row, "org_url").trim();
            if url.is_empty() {
                return None;
            }
            Some(OrgLink {
                organization: table.get(row, "organization").trim().to_string(),
                url: url.to_string(),
            })
        })
        .collect();
    Ok(links)
}

pub async fn check_links<F: PageFetcher + Sync>(
    fetcher: &F,
    links: &[OrgLink],
    max_concurrent: usize,
    timeout_secs: u64,
    output: impl AsRef<Path>,
) -> Result<LinkSummary> {
    let output = output.as_ref();
    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(OUTPUT_HEADERS)?;
    writer.flush()?;
    let writer = Mutex::new(writer);

    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    info!(urls = links.len(), max_concurrent, "checking organization URLs");

    let tasks = links.iter().map(|link| {
        let semaphore = Arc::clone(&semaphore);
        let writer = &writer;
        async move {
            let _permit = semaphore.acquire().await.ok();
            let outcome = fetcher.fetch(&with_scheme(&link.url)).await;
            let check = classify(&outcome, timeout_secs);
            debug!(url = %link.url, status = %check.status, "checked");

            if check.status != LinkStatus::Ok {
                let code = check.status_code.map(|c| c.to_string()).unwrap_or_default();
                let mut w = writer.lock().await;
                let written = w
                    .write_record([
                        link.organization.as_str(),
                        link.url.as_str(),
                        check.status.as_str(),
                        code.as_str(),
                        check.issue.as_str(),
                        check.matched.unwrap_or(""),
                    ])
                    .and_then(|_| w.flush().map_err(csv::Error::from));
                if let Err(e) = written {
                    warn!(url = %link.url, error = %e, "failed to record result");
                }
            }
            check.status
        }
    });

    let statuses = futures::future::join_all(tasks).await;

    let mut summary = LinkSummary {
        checked: statuses.len(),
        ..Default::default()
    };
    for status in statuses {
        *summary.by_status.entry(status).or_insert(0) += 1;
    }
    info!(
        checked = summary.checked,
        dead = summary.count(LinkStatus::Dead),
        for_sale = summary.count(LinkStatus::ForSale),
        "link check finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_statuses_are_dead() {
        let outcome = FetchOutcome::Response {
            status: 404,
            body: Some("domain for sale".to_string()),
        };
        let check = classify(&outcome, 10);
        assert_eq!(check.status, LinkStatus::Dead);
        assert_eq!(check.issue, "HTTP 404");
        assert_eq!(check.matched, None);
    }

    #[test]
    fn other_error_statuses_are_not_dead() {
        let outcome = FetchOutcome::Response { status: 500, body: None };
        assert_eq!(classify(&outcome, 10).status, LinkStatus::Ok);
    }

    #[test]
    fn parked_body_is_for_sale() {
        let outcome = FetchOutcome::Response {
            status: 200,
            body: Some("<h1>Buy this domain</h1>".to_string()),
        };
        let check = classify(&outcome, 10);
        assert_eq!(check.status, LinkStatus::ForSale);
        assert_eq!(check.matched, Some("buy this domain"));
    }

    #[test]
    fn network_failures() {
        assert_eq!(classify(&FetchOutcome::Timeout, 10).issue, "Timeout after 10s");
        let refused = classify(&FetchOutcome::ConnectFailed("refused".into()), 10);
        assert_eq!(refused.status, LinkStatus::Dead);
        assert_eq!(refused.issue, "Connection failed: refused");
        assert_eq!(classify(&FetchOutcome::Failed("tls".into()), 10).status, LinkStatus::Error);
    }
}
