//! Exterior photos for portfolio buildings.
//!
//! Street View is tried first. When it has no imagery, or its shot fails
//! review, a Google Images search on the address supplies candidates.
//! Nothing is saved without a vision check that it shows the outside of
//! a building.

use crate::geo::LatLon;
use crate::http::{BinaryFetcher, Download};
use crate::logos::is_bad_source;
use crate::openai::OpenAiClient;
use crate::search::{ImageResult as SearchImage, ImageSearcher};
use crate::table::{safe_float, Table};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

pub const METADATA_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/streetview/metadata";
pub const IMAGE_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/streetview";
pub const RESULT_HEADERS: [&str; 5] = ["building_id", "status", "source", "file", "error"];

pub const STREET_VIEW_SOURCE: &str = "streetview";
/// Smaller downloads are error pages or placeholder tiles.
pub const MIN_IMAGE_BYTES: usize = 5_000;
const MAX_SEARCH_CANDIDATES: usize = 3;
const BAD_TITLE_WORDS: [&str; 7] = ["interior", "inside", "room", "lobby", "floor plan", "map", "logo"];

pub trait StreetViewSource {
    /// Whether imagery exists near the point.
    fn has_imagery(&self, at: LatLon) -> impl Future<Output = Result<bool>> + Send;
    fn image(&self, at: LatLon) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

#[derive(Debug, Deserialize)]
struct Metadata {
    status: String,
}

#[derive(Clone)]
pub struct StreetView {
    client: reqwest::Client,
    api_key: String,
}

impl StreetView {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
        }
    }
}

fn location_param(at: LatLon) -> String {
    format!("{},{}", at.lat, at.lon)
}

impl StreetViewSource for StreetView {
    fn has_imagery(&self, at: LatLon) -> impl Future<Output = Result<bool>> + Send {
        let request = self.client.get(METADATA_ENDPOINT).query(&[
            ("location", location_param(at)),
            ("key", self.api_key.clone()),
        ]);
        async move {
            let response = request.send().await.context("Street View metadata request failed")?;
            if !response.status().is_success() {
                return Ok(false);
            }
            let metadata: Metadata = response.json().await.context("Invalid Street View metadata")?;
            Ok(metadata.status == "OK")
        }
    }

    fn image(&self, at: LatLon) -> impl Future<Output = Result<Vec<u8>>> + Send {
        let request = self.client.get(IMAGE_ENDPOINT).query(&[
            ("size", "640x480".to_string()),
            ("location", location_param(at)),
            ("fov", "90".to_string()),
            ("pitch", "10".to_string()),
            ("key", self.api_key.clone()),
        ]);
        async move {
            let response = request.send().await.context("Street View image request failed")?;
            let status = response.status();
            if !status.is_success() {
                bail!("HTTP {}", status.as_u16());
            }
            Ok(response.bytes().await?.to_vec())
        }
    }
}

/// Vision review of a candidate photo.
pub trait ImageJudge {
    fn is_exterior(&self, address: &str, image: &[u8]) -> impl Future<Output = Result<bool>> + Send;
}

impl ImageJudge for OpenAiClient {
    fn is_exterior(&self, address: &str, image: &[u8]) -> impl Future<Output = Result<bool>> + Send {
        let prompt = format!(
            "This photo is a candidate for a commercial building database entry at \"{address}\".\n\n\
             Is it an EXTERIOR shot of an actual BUILDING?\n\
             - NO if: interior, lobby, hallway, room inside\n\
             - NO if: sign only, map, logo, person, landscape without a building\n\
             - NO if: extremely blurry, tiny, or mostly black/white\n\n\
             Answer ONLY: YES or NO"
        );
        let image = image.to_vec();
        async move { self.vision_yes_no(&prompt, &image, "YES").await }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildingLocation {
    pub building_id: String,
    pub location: Option<LatLon>,
    pub address: String,
    pub city: String,
}

impl BuildingLocation {
    /// Image search query; `None` without a street address.
    pub fn search_query(&self) -> Option<String> {
        if self.address.is_empty() {
            return None;
        }
        Some(format!("{} {} building exterior", self.address, self.city).replace("  ", " "))
    }

    fn label(&self) -> String {
        [self.address.as_str(), self.city.as_str()]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Buildings with coordinates or an address that have no image on disk yet.
pub fn buildings_needing_images(table: &Table, images_dir: &Path) -> Vec<BuildingLocation> {
    (0..table.len())
        .filter_map(|row| {
            let id = table.get(row, "id_building").trim();
            if id.is_empty() || image_path(images_dir, id).exists() {
                return None;
            }
            let location = match (safe_float(table.get(row, "loc_lat")), safe_float(table.get(row, "loc_lon"))) {
                (Some(lat), Some(lon)) => Some(LatLon::new(lat, lon)),
                _ => None,
            };
            let address = table.get(row, "loc_address").trim().to_string();
            if location.is_none() && address.is_empty() {
                return None;
            }
            Some(BuildingLocation {
                building_id: id.to_string(),
                location,
                address,
                city: table.get(row, "loc_city").trim().to_string(),
            })
        })
        .collect()
}

pub fn image_path(images_dir: &Path, building_id: &str) -> PathBuf {
    images_dir.join(format!("{}.jpg", building_id))
}

/// Search hits worth downloading: no stock sites, no interior or map titles.
pub fn usable_search_result(result: &SearchImage) -> bool {
    let title = result.title.to_lowercase();
    !result.original.is_empty()
        && !is_bad_source(&result.source)
        && !BAD_TITLE_WORDS.iter().any(|w| title.contains(w))
}

fn acceptable_download(download: &Download) -> bool {
    download.status == 200 && download.bytes.len() >= MIN_IMAGE_BYTES
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageStatus {
    Success,
    /// No source produced a candidate.
    NoImagery,
    /// Candidates were found but none passed review.
    Rejected,
    Failed,
}

impl ImageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStatus::Success => "SUCCESS",
            ImageStatus::NoImagery => "NO_IMAGERY",
            ImageStatus::Rejected => "VALIDATION_FAILED",
            ImageStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResult {
    pub building_id: String,
    pub status: ImageStatus,
    pub source: String,
    pub file: Option<PathBuf>,
    pub error: String,
}

impl ImageResult {
    fn new(building: &BuildingLocation, status: ImageStatus) -> Self {
        Self {
            building_id: building.building_id.clone(),
            status,
            source: String::new(),
            file: None,
            error: String::new(),
        }
    }
}

pub struct ImageFetcher<'a, V, S, J, D> {
    pub street_view: &'a V,
    pub searcher: &'a S,
    pub judge: &'a J,
    pub downloader: &'a D,
    pub images_dir: &'a Path,
}

impl<V, S, J, D> ImageFetcher<'_, V, S, J, D>
where
    V: StreetViewSource + Sync,
    S: ImageSearcher + Sync,
    J: ImageJudge + Sync,
    D: BinaryFetcher + Sync,
{
    async fn street_view_image(&self, at: LatLon) -> Result<Option<Vec<u8>>> {
        if !self.street_view.has_imagery(at).await? {
            return Ok(None);
        }
        let bytes = self.street_view.image(at).await?;
        Ok((bytes.len() >= MIN_IMAGE_BYTES).then_some(bytes))
    }

    async fn approved(&self, building: &BuildingLocation, source: &str, bytes: &[u8]) -> bool {
        match self.judge.is_exterior(&building.label(), bytes).await {
            Ok(approved) => {
                debug!(building = %building.building_id, %source, approved, "image reviewed");
                approved
            }
            Err(e) => {
                debug!(building = %building.building_id, %source, error = %e, "image review failed");
                false
            }
        }
    }

    async fn save(&self, building: &BuildingLocation, source: &str, bytes: &[u8]) -> ImageResult {
        let path = image_path(self.images_dir, &building.building_id);
        match tokio::fs::write(&path, bytes).await {
            Ok(()) => ImageResult {
                source: source.to_string(),
                file: Some(path),
                ..ImageResult::new(building, ImageStatus::Success)
            },
            Err(e) => ImageResult {
                source: source.to_string(),
                error: format!("Failed to write {}: {}", path.display(), e),
                ..ImageResult::new(building, ImageStatus::Failed)
            },
        }
    }

    /// Reviews up to a few downloadable search hits; returns how many were reviewed.
    async fn search_fallback(&self, building: &BuildingLocation, query: &str) -> Result<(usize, Option<ImageResult>)> {
        let results = self.searcher.image_search(query).await?;
        let mut reviewed = 0;
        for result in results.iter().filter(|r| usable_search_result(r)) {
            if reviewed >= MAX_SEARCH_CANDIDATES {
                break;
            }
            let download = match self.downloader.download(&result.original).await {
                Ok(download) if acceptable_download(&download) => download,
                Ok(download) => {
                    debug!(url = %result.original, status = download.status, bytes = download.bytes.len(), "candidate rejected");
                    continue;
                }
                Err(e) => {
                    debug!(url = %result.original, error = %e, "candidate download failed");
                    continue;
                }
            };
            reviewed += 1;
            let source = format!("serpapi:{}", result.source);
            if self.approved(building, &source, &download.bytes).await {
                return Ok((reviewed, Some(self.save(building, &source, &download.bytes).await)));
            }
        }
        Ok((reviewed, None))
    }

    pub async fn fetch(&self, building: &BuildingLocation) -> ImageResult {
        let mut reviewed = 0;
        let mut errors: Vec<String> = Vec::new();

        if let Some(at) = building.location {
            match self.street_view_image(at).await {
                Ok(Some(bytes)) => {
                    reviewed += 1;
                    if self.approved(building, STREET_VIEW_SOURCE, &bytes).await {
                        return self.save(building, STREET_VIEW_SOURCE, &bytes).await;
                    }
                }
                Ok(None) => {}
                Err(e) => errors.push(e.to_string()),
            }
        }

        if let Some(query) = building.search_query() {
            match self.search_fallback(building, &query).await {
                Ok((_, Some(saved))) => return saved,
                Ok((n, None)) => reviewed += n,
                Err(e) => errors.push(e.to_string()),
            }
        }

        if reviewed > 0 {
            ImageResult::new(building, ImageStatus::Rejected)
        } else if !errors.is_empty() {
            ImageResult {
                error: errors.join("; "),
                ..ImageResult::new(building, ImageStatus::Failed)
            }
        } else {
            ImageResult::new(building, ImageStatus::NoImagery)
        }
    }

    pub async fn fetch_all(&self, buildings: &[BuildingLocation], max_concurrent: usize) -> Result<Vec<ImageResult>> {
        tokio::fs::create_dir_all(self.images_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.images_dir.display()))?;

        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        info!(buildings = buildings.len(), max_concurrent, "fetching building images");

        let tasks = buildings.iter().map(|building| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.ok();
                let result = self.fetch(building).await;
                if result.status == ImageStatus::Failed {
                    warn!(building = %result.building_id, error = %result.error, "image fetch failed");
                }
                result
            }
        });
        Ok(futures::future::join_all(tasks).await)
    }
}

pub fn write_results(results: &[ImageResult], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(RESULT_HEADERS)?;
    for result in results {
        let file = result
            .file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        writer.write_record([
            result.building_id.as_str(),
            result.status.as_str(),
            result.source.as_str(),
            file.as_str(),
            result.error.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
