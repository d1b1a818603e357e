//! ODCV HVAC savings percentage per building.
//!
//! The estimate starts from a per-type floor and ceiling and moves within
//! that band according to how much of the building sits empty (opportunity)
//! and how likely it is to have controls that can act on it (automation).
//! Efficiency and climate modifiers then scale the result.

use crate::table::{round_to, Table};
use std::collections::HashMap;
use tracing::info;

const DEFAULT_BOUNDS: (f64, f64) = (0.15, 0.35);
const GLOBAL_BOUNDS: (f64, f64) = (0.20, 0.50);
const SAVINGS_UPLIFT: f64 = 1.20;

const DEFAULT_VACANCY: f64 = 0.15;
const DEFAULT_UTILIZATION: f64 = 0.60;
const DEFAULT_YEAR_BUILT: f64 = 1982.0;
const DEFAULT_SQFT: f64 = 89_000.0;

const DATA_CENTER: &str = "Data Center";

const BUILDING_TYPE_BOUNDS: &[(&str, (f64, f64))] = &[
    ("Office", (0.20, 0.40)),
    ("Medical Office", (0.20, 0.40)),
    ("Mixed Use", (0.18, 0.38)),
    ("Strip Mall", (0.15, 0.35)),
    ("K-12 School", (0.20, 0.45)),
    ("Higher Ed", (0.20, 0.45)),
    ("Preschool/Daycare", (0.18, 0.38)),
    ("Retail Store", (0.15, 0.35)),
    ("Supermarket/Grocery", (0.10, 0.25)),
    ("Wholesale Club", (0.10, 0.25)),
    ("Enclosed Mall", (0.12, 0.30)),
    ("Hotel", (0.15, 0.35)),
    ("Restaurant/Bar", (0.10, 0.25)),
    ("Gym", (0.15, 0.35)),
    ("Event Space", (0.20, 0.45)),
    ("Venue", (0.20, 0.45)),
    ("Theater", (0.18, 0.40)),
    ("Arts & Culture", (0.15, 0.35)),
    ("Library", (0.12, 0.28)),
    ("Library/Museum", (0.12, 0.28)),
    ("Bank Branch", (0.12, 0.28)),
    ("Vehicle Dealership", (0.15, 0.35)),
    ("Courthouse", (0.10, 0.25)),
    ("Public Service", (0.10, 0.25)),
    ("Outpatient Clinic", (0.15, 0.32)),
    ("Sports/Gaming Center", (0.18, 0.40)),
    ("Inpatient Hospital", (0.05, 0.15)),
    ("Specialty Hospital", (0.05, 0.15)),
    ("Residential Care Facility", (0.05, 0.15)),
    ("Residential Care", (0.05, 0.15)),
    ("Laboratory", (0.05, 0.15)),
    ("Police Station", (0.05, 0.15)),
    ("Fire Station", (0.05, 0.15)),
    ("Public Transit", (0.05, 0.15)),
    (DATA_CENTER, (0.0, 0.0)),
];

/// Multi-tenant types where leasable vacancy adds to the opportunity.
const VACANCY_PLUS_UTIL_TYPES: [&str; 4] = ["Office", "Medical Office", "Mixed Use", "Strip Mall"];

/// Code-driven ventilation leaves little room for occupancy control.
const LOW_OPPORTUNITY_TYPES: [&str; 7] = [
    "Inpatient Hospital",
    "Specialty Hospital",
    "Residential Care Facility",
    "Laboratory",
    "Police Station",
    "Fire Station",
    "Public Transit",
];

pub fn type_bounds(building_type: &str) -> (f64, f64) {
    BUILDING_TYPE_BOUNDS
        .iter()
        .find(|(t, _)| *t == building_type)
        .map(|(_, b)| *b)
        .unwrap_or(DEFAULT_BOUNDS)
}

pub fn opportunity_score(building_type: &str, vacancy: f64, utilization: f64) -> f64 {
    if building_type == DATA_CENTER {
        0.0
    } else if VACANCY_PLUS_UTIL_TYPES.contains(&building_type) {
        vacancy + (1.0 - vacancy) * (1.0 - utilization)
    } else if LOW_OPPORTUNITY_TYPES.contains(&building_type) {
        (1.0 - utilization) * 0.3
    } else {
        1.0 - utilization
    }
}

pub fn year_score(year_built: Option<f64>) -> f64 {
    match year_built {
        None => 0.5,
        Some(y) if y < 1970.0 => 0.0,
        Some(y) if y < 1990.0 => 0.25,
        Some(y) if y < 2005.0 => 0.50,
        Some(y) if y < 2015.0 => 0.75,
        Some(_) => 1.0,
    }
}

pub fn size_score(sqft: Option<f64>) -> f64 {
    match sqft {
        None => 0.5,
        Some(s) if s < 50_000.0 => 0.25,
        Some(s) if s < 100_000.0 => 0.50,
        Some(s) if s < 250_000.0 => 0.75,
        Some(_) => 1.0,
    }
}

/// Newer and larger buildings are more likely to have a BMS.
pub fn automation_score(year_built: Option<f64>, sqft: Option<f64>) -> f64 {
    (year_score(year_built) + size_score(sqft)) / 2.0
}

pub fn energy_star_modifier(score: f64) -> f64 {
    if score >= 90.0 {
        0.85
    } else if score >= 75.0 {
        0.95
    } else if score >= 50.0 {
        1.00
    } else if score >= 25.0 {
        1.05
    } else {
        1.10
    }
}

pub fn eui_modifier(eui: Option<f64>, peer_median: Option<f64>) -> f64 {
    let (Some(eui), Some(median)) = (eui, peer_median) else {
        return 1.0;
    };
    if median == 0.0 {
        return 1.0;
    }
    let ratio = eui / median;
    if ratio > 1.5 {
        1.10
    } else if ratio > 1.2 {
        1.05
    } else if ratio > 0.85 {
        1.00
    } else if ratio > 0.70 {
        0.95
    } else {
        0.90
    }
}

pub fn climate_modifier(zone: &str) -> f64 {
    match zone.trim() {
        "Northern" => 1.10,
        "North-Central" => 1.05,
        "South-Central" => 1.00,
        "Southern" => 0.95,
        _ => 1.00,
    }
}

#[derive(Debug, Clone, Default)]
pub struct SavingsInputs {
    pub building_type: String,
    pub vacancy: Option<f64>,
    pub utilization: Option<f64>,
    pub year_built: Option<f64>,
    pub sqft: Option<f64>,
    pub energy_star: Option<f64>,
    pub site_eui: Option<f64>,
    pub climate_zone: String,
}

#[derive(Debug, Clone, Default)]
pub struct PeerStats {
    median_eui: HashMap<String, f64>,
    median_year: HashMap<String, f64>,
}

impl PeerStats {
    pub fn from_table(table: &Table) -> Self {
        let mut eui: HashMap<String, Vec<f64>> = HashMap::new();
        let mut year: HashMap<String, Vec<f64>> = HashMap::new();
        for row in 0..table.len() {
            let ty = table.get(row, "bldg_type").to_string();
            if let Some(v) = table.get_f64(row, "energy_site_eui") {
                eui.entry(ty.clone()).or_default().push(v);
            }
            if let Some(v) = table.get_f64(row, "bldg_year_built") {
                year.entry(ty).or_default().push(v);
            }
        }
        let medians = |groups: HashMap<String, Vec<f64>>| {
            groups
                .into_iter()
                .filter_map(|(k, v)| median(v).map(|m| (k, m)))
                .collect()
        };
        Self {
            median_eui: medians(eui),
            median_year: medians(year),
        }
    }

    pub fn median_eui(&self, building_type: &str) -> Option<f64> {
        self.median_eui.get(building_type).copied()
    }

    pub fn median_year(&self, building_type: &str) -> Option<f64> {
        self.median_year.get(building_type).copied()
    }
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

pub fn odcv_savings_pct(inputs: &SavingsInputs, peers: &PeerStats) -> f64 {
    let ty = inputs.building_type.as_str();
    if ty == DATA_CENTER {
        return 0.0;
    }
    let (floor, ceiling) = type_bounds(ty);

    let vacancy = inputs.vacancy.unwrap_or(DEFAULT_VACANCY);
    let utilization = inputs.utilization.unwrap_or(DEFAULT_UTILIZATION);
    let year = inputs
        .year_built
        .or_else(|| peers.median_year(ty))
        .unwrap_or(DEFAULT_YEAR_BUILT);
    let sqft = inputs.sqft.unwrap_or(DEFAULT_SQFT);

    let opportunity = opportunity_score(ty, vacancy, utilization);
    let automation = automation_score(Some(year), Some(sqft));
    let efficiency = match inputs.energy_star {
        Some(score) => energy_star_modifier(score),
        None => eui_modifier(inputs.site_eui, peers.median_eui(ty)),
    };
    let climate = climate_modifier(&inputs.climate_zone);

    let base = floor + opportunity * automation * (ceiling - floor);
    let pct = base * efficiency * climate * SAVINGS_UPLIFT;
    let pct = pct.clamp(floor, ceiling);
    let pct = pct.clamp(GLOBAL_BOUNDS.0, GLOBAL_BOUNDS.1);
    round_to(pct, 4)
}

fn inputs_for_row(table: &Table, row: usize) -> SavingsInputs {
    SavingsInputs {
        building_type: table.get(row, "bldg_type").trim().to_string(),
        vacancy: table.get_f64(row, "occ_vacancy_rate"),
        utilization: table.get_f64(row, "occ_utilization_rate"),
        year_built: table.get_f64(row, "bldg_year_built"),
        sqft: table.get_f64(row, "bldg_sqft"),
        energy_star: table.get_f64(row, "energy_star_score"),
        site_eui: table.get_f64(row, "energy_site_eui"),
        climate_zone: table.get(row, "energy_climate_zone").to_string(),
    }
}

pub fn calculate_odcv_savings(table: &mut Table) -> usize {
    let peers = PeerStats::from_table(table);
    let mut by_type: HashMap<String, (usize, f64)> = HashMap::new();

    for row in 0..table.len() {
        let inputs = inputs_for_row(table, row);
        let pct = odcv_savings_pct(&inputs, &peers);
        table.set_f64(row, "odcv_hvac_savings_pct", Some(pct), 4);

        let entry = by_type.entry(inputs.building_type).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += pct;
    }

    let mut summary: Vec<_> = by_type.into_iter().collect();
    summary.sort_by(|a, b| b.1 .0.cmp(&a.1 .0));
    for (ty, (count, total)) in summary.iter().take(10) {
        info!(building_type = %ty, count, mean_pct = total / *count as f64, "ODCV savings by type");
    }
    table.len()
}
