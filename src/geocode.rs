//! Fills missing store coordinates with the Google Geocoding API.

use crate::address::{format_address, parse_full_address};
use crate::geo::LatLon;
use crate::table::{fmt_value, Table};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub const GEOCODE_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";
pub const STATUS_COLUMN: &str = "geocode_status";

#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeOutcome {
    Found(LatLon),
    /// The API answered with a non-OK status such as `ZERO_RESULTS`.
    NotFound(String),
}

pub trait Geocoder {
    fn geocode(&self, address: &str) -> impl Future<Output = Result<GeocodeOutcome>> + Send;
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

fn outcome_of(response: GeocodeResponse) -> GeocodeOutcome {
    match response.results.first() {
        Some(first) if response.status == "OK" => {
            let loc = &first.geometry.location;
            GeocodeOutcome::Found(LatLon::new(loc.lat, loc.lng))
        }
        _ => GeocodeOutcome::NotFound(response.status),
    }
}

#[derive(Clone)]
pub struct GoogleGeocoder {
    client: reqwest::Client,
    api_key: String,
}

impl GoogleGeocoder {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
        }
    }
}

impl Geocoder for GoogleGeocoder {
    fn geocode(&self, address: &str) -> impl Future<Output = Result<GeocodeOutcome>> + Send {
        let request = self
            .client
            .get(GEOCODE_ENDPOINT)
            .query(&[("address", address), ("key", self.api_key.as_str())]);
        let address = address.to_string();
        async move {
            let response: GeocodeResponse = request
                .send()
                .await
                .with_context(|| format!("Geocoding request failed for {}", address))?
                .json()
                .await
                .with_context(|| format!("Invalid geocoding response for {}", address))?;
            Ok(outcome_of(response))
        }
    }
}

/// Cleaned-up `Street, City, ST, 12345` for a store row.
///
/// Rows without a `street` fall back to splitting a combined `address` column.
pub fn store_address(table: &Table, row: usize) -> String {
    let street = table.get(row, "street").trim();
    if street.is_empty() {
        let parts = parse_full_address(table.get(row, "address"));
        return format_address(&parts.street, &parts.city, &parts.state, &parts.zip);
    }
    format_address(
        street,
        table.get(row, "city"),
        table.get(row, "state"),
        table.get(row, "zip"),
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeocodeStats {
    pub attempted: usize,
    pub found: usize,
    pub failed: usize,
}

/// Geocodes rows without `lat`/`lon` and records each row's status.
pub async fn geocode_missing<G: Geocoder + Sync>(
    geocoder: &G,
    table: &mut Table,
    max_concurrent: usize,
) -> GeocodeStats {
    let pending: Vec<(usize, String)> = (0..table.len())
        .filter(|&row| table.get_f64(row, "lat").is_none() || table.get_f64(row, "lon").is_none())
        .map(|row| (row, store_address(table, row)))
        .filter(|(_, address)| !address.is_empty())
        .collect();
    info!(pending = pending.len(), "geocoding stores without coordinates");

    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let tasks = pending.iter().map(|(row, address)| {
        let semaphore = Arc::clone(&semaphore);
        async move {
            let _permit = semaphore.acquire().await.ok();
            (*row, geocoder.geocode(address).await)
        }
    });
    let outcomes = futures::future::join_all(tasks).await;

    let mut stats = GeocodeStats {
        attempted: outcomes.len(),
        ..Default::default()
    };
    for (row, outcome) in outcomes {
        match outcome {
            Ok(GeocodeOutcome::Found(at)) => {
                table.set(row, "lat", fmt_value(at.lat, 6));
                table.set(row, "lon", fmt_value(at.lon, 6));
                table.set(row, STATUS_COLUMN, "OK");
                stats.found += 1;
            }
            Ok(GeocodeOutcome::NotFound(status)) => {
                table.set(row, STATUS_COLUMN, status);
                stats.failed += 1;
            }
            Err(e) => {
                warn!(row, error = %e, "geocoding failed");
                table.set(row, STATUS_COLUMN, format!("ERROR: {}", crate::http::short_error(&e)));
                stats.failed += 1;
            }
        }
    }
    stats
}
