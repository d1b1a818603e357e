//! Building to retail store matching.
//!
//! Buildings and stores are bucketed by (normalized city, state) and each
//! building is compared against every store in its bucket. The nearest store
//! wins; a match is kept only when it is close enough and, beyond 25 m, when
//! the street addresses also agree.

use crate::address::address_similarity;
use crate::geo::{haversine_m, normalize_city, LatLon};
use crate::table::{fmt_value, round_to, safe_float, Table};
use anyhow::{Context, Result};
use csv::Writer;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

const LOOSE_DISTANCE_M: f64 = 25.0;
const LOOSE_MIN_ADDRESS_SCORE: f64 = 0.5;
const DISTANCE_WEIGHT: f64 = 0.6;
const ADDRESS_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, Deserialize)]
pub struct Store {
    #[serde(default)]
    pub retailer: String,
    #[serde(default)]
    pub store_name: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub lat: String,
    #[serde(default)]
    pub lon: String,
}

impl Store {
    pub fn location(&self) -> Option<LatLon> {
        Some(LatLon::new(safe_float(&self.lat)?, safe_float(&self.lon)?))
    }
}

#[derive(Debug, Clone)]
pub struct Building {
    pub building_id: String,
    pub address: String,
    pub building_type: String,
    pub tenant: String,
    pub square_footage: f64,
    pub city: String,
    pub state: String,
    pub location: LatLon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TenantIssue {
    MissingTenant,
    WrongTenant,
    Correct,
}

impl TenantIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantIssue::MissingTenant => "MISSING_TENANT",
            TenantIssue::WrongTenant => "WRONG_TENANT",
            TenantIssue::Correct => "CORRECT",
        }
    }

    pub fn classify(tenant: &str, retailer: &str) -> Self {
        let tenant = tenant.trim().to_lowercase();
        let retailer = retailer.trim().to_lowercase();
        if tenant.is_empty() {
            TenantIssue::MissingTenant
        } else if !tenant.contains(&retailer) && !retailer.contains(&tenant) {
            TenantIssue::WrongTenant
        } else {
            TenantIssue::Correct
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreMatch {
    pub building: Building,
    pub store: Store,
    pub store_location: LatLon,
    pub distance_m: f64,
    pub address_score: f64,
    pub confidence: f64,
    pub issue: TenantIssue,
}

#[derive(Debug, Clone, Default)]
pub struct MatchReport {
    pub matches: Vec<StoreMatch>,
    pub comparisons: usize,
    pub buildings_considered: usize,
}

impl MatchReport {
    pub fn issue_counts(&self) -> Vec<(TenantIssue, usize)> {
        let mut counts: HashMap<TenantIssue, usize> = HashMap::new();
        for m in &self.matches {
            *counts.entry(m.issue).or_insert(0) += 1;
        }
        let mut counts: Vec<_> = counts.into_iter().collect();
        counts.sort();
        counts
    }

    /// Matches per retailer, most frequent first.
    pub fn retailer_counts(&self) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for m in &self.matches {
            *counts.entry(m.store.retailer.as_str()).or_insert(0) += 1;
        }
        let mut counts: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts
    }
}

type BucketKey = (String, String);

fn bucket_key(city: &str, state: &str) -> BucketKey {
    (normalize_city(city), state.trim().to_uppercase())
}

pub fn load_stores(path: impl AsRef<Path>) -> Result<Vec<Store>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open stores CSV: {}", path.display()))?;
    let mut stores = Vec::new();
    for record in reader.deserialize::<Store>() {
        match record {
            Ok(store) => stores.push(store),
            Err(e) => warn!(error = %e, "skipping malformed store row"),
        }
    }
    Ok(stores)
}

/// Reads buildings from a portfolio-style table.
///
/// Rows without coordinates are skipped. When `target_types` is non-empty
/// only those building types are returned.
pub fn buildings_from_table(table: &Table, target_types: &[String]) -> Vec<Building> {
    let mut buildings = Vec::new();
    for row in 0..table.len() {
        let pick = |names: &[&str]| -> String {
            names
                .iter()
                .map(|n| table.get(row, n))
                .find(|v| !v.trim().is_empty())
                .unwrap_or("")
                .trim()
                .to_string()
        };

        let building_type = pick(&["bldg_type", "building_type"]);
        if !target_types.is_empty() && !target_types.iter().any(|t| *t == building_type) {
            continue;
        }

        let lat = safe_float(&pick(&["loc_lat", "latitude", "lat"]));
        let lon = safe_float(&pick(&["loc_lon", "longitude", "lon"]));
        let (Some(lat), Some(lon)) = (lat, lon) else {
            continue;
        };

        buildings.push(Building {
            building_id: pick(&["id_building", "building_id"]),
            address: pick(&["loc_address", "address"]),
            building_type,
            tenant: pick(&["org_tenant", "tenant"]),
            square_footage: safe_float(&pick(&["bldg_sqft", "square_footage"])).unwrap_or(0.0),
            city: pick(&["loc_city", "city"]),
            state: pick(&["loc_state", "state"]).to_uppercase(),
            location: LatLon::new(lat, lon),
        });
    }
    buildings
}

pub fn find_matches(buildings: &[Building], stores: &[Store], threshold_m: f64) -> MatchReport {
    let mut stores_by_city: HashMap<BucketKey, Vec<(&Store, LatLon)>> = HashMap::new();
    for store in stores {
        if let Some(location) = store.location() {
            stores_by_city
                .entry(bucket_key(&store.city, &store.state))
                .or_default()
                .push((store, location));
        }
    }

    let mut report = MatchReport {
        buildings_considered: buildings.len(),
        ..Default::default()
    };

    for building in buildings {
        let Some(candidates) = stores_by_city.get(&bucket_key(&building.city, &building.state))
        else {
            continue;
        };

        let mut best: Option<(&Store, LatLon, f64)> = None;
        for (store, location) in candidates {
            report.comparisons += 1;
            let distance = haversine_m(building.location, *location);
            if best.map_or(true, |(_, _, d)| distance < d) {
                best = Some((store, *location, distance));
            }
        }

        let Some((store, store_location, distance)) = best else {
            continue;
        };
        if distance > threshold_m {
            continue;
        }

        let address_score = address_similarity(&building.address, &store.street);
        if distance > LOOSE_DISTANCE_M && address_score < LOOSE_MIN_ADDRESS_SCORE {
            continue;
        }

        let distance_score = (1.0 - distance / threshold_m).max(0.0);
        let confidence = distance_score * DISTANCE_WEIGHT + address_score * ADDRESS_WEIGHT;

        report.matches.push(StoreMatch {
            building: building.clone(),
            store: store.clone(),
            store_location,
            distance_m: round_to(distance, 2),
            address_score: round_to(address_score, 2),
            confidence: round_to(confidence, 2),
            issue: TenantIssue::classify(&building.tenant, &store.retailer),
        });
    }

    report.matches.sort_by(|a, b| {
        a.distance_m
            .partial_cmp(&b.distance_m)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    info!(
        buildings = report.buildings_considered,
        comparisons = report.comparisons,
        matches = report.matches.len(),
        "store matching finished"
    );
    report
}

pub fn write_matches(report: &MatchReport, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer.write_record([
        "building_id",
        "building_address",
        "building_type",
        "square_footage",
        "current_tenant",
        "matched_retailer",
        "store_name",
        "distance_meters",
        "address_match_score",
        "confidence",
        "issue",
        "building_lat",
        "building_lon",
        "store_lat",
        "store_lon",
        "store_address",
    ])?;

    for m in &report.matches {
        let tenant = if m.building.tenant.is_empty() {
            "(MISSING)"
        } else {
            m.building.tenant.as_str()
        };
        writer.write_record([
            m.building.building_id.as_str(),
            m.building.address.as_str(),
            m.building.building_type.as_str(),
            &m.building.square_footage.to_string(),
            tenant,
            m.store.retailer.as_str(),
            m.store.store_name.as_str(),
            &fmt_value(m.distance_m, 2),
            &fmt_value(m.address_score, 2),
            &fmt_value(m.confidence, 2),
            m.issue.as_str(),
            &m.building.location.lat.to_string(),
            &m.building.location.lon.to_string(),
            &m.store_location.lat.to_string(),
            &m.store_location.lon.to_string(),
            m.store.street.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
