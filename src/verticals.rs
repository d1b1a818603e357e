//! Building type to market vertical (`bldg_vertical`).
//!
//! Runs before every other populate step; the reports colour and group
//! buildings by vertical.

use crate::table::Table;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{info, warn};

const BUNDLED_VERTICALS: &str = include_str!("../data/verticals.csv");

#[derive(Debug, Deserialize)]
struct MappingRow {
    building_type: String,
    vertical: String,
}

#[derive(Debug, Clone, Default)]
pub struct VerticalMap {
    by_type: HashMap<String, String>,
}

impl VerticalMap {
    pub fn bundled() -> Result<Self> {
        Self::parse(BUNDLED_VERTICALS).context("Bundled vertical mapping is invalid")
    }

    /// Reads a `building_type,vertical` CSV.
    pub fn parse(content: &str) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(content.as_bytes());
        let mut by_type = HashMap::new();
        for row in reader.deserialize::<MappingRow>() {
            let row = row?;
            by_type.insert(row.building_type.trim().to_string(), row.vertical.trim().to_string());
        }
        Ok(Self { by_type })
    }

    pub fn vertical(&self, building_type: &str) -> Option<&str> {
        self.by_type.get(building_type.trim()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlignStats {
    pub updated: usize,
    pub unmapped: BTreeSet<String>,
}

/// Rows whose type is not in the map keep their current vertical.
pub fn align_verticals(table: &mut Table, map: &VerticalMap) -> AlignStats {
    let mut stats = AlignStats::default();
    table.ensure_column("bldg_vertical");

    for row in 0..table.len() {
        let building_type = table.get(row, "bldg_type").trim().to_string();
        if building_type.is_empty() {
            continue;
        }
        match map.vertical(&building_type) {
            Some(vertical) if table.get(row, "bldg_vertical") != vertical => {
                let vertical = vertical.to_string();
                table.set(row, "bldg_vertical", vertical);
                stats.updated += 1;
            }
            Some(_) => {}
            None => {
                stats.unmapped.insert(building_type);
            }
        }
    }

    if !stats.unmapped.is_empty() {
        let sample: Vec<&str> = stats.unmapped.iter().take(10).map(String::as_str).collect();
        warn!(count = stats.unmapped.len(), types = ?sample, "building types without a vertical");
    }
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for row in 0..table.len() {
        *counts.entry(table.get(row, "bldg_vertical")).or_default() += 1;
    }
    for (vertical, count) in &counts {
        info!(vertical = %vertical, count, "vertical distribution");
    }
    info!(updated = stats.updated, mappings = map.len(), "verticals aligned");
    stats
}
