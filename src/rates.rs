//! Occupancy, utilization and vacancy lookup tables per building type.

use crate::table::{round_to, Table};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::info;

const BUNDLED_RATES: &str = include_str!("../data/rates.toml");

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RateValue {
    Utilization(f64),
    VacancyAndUtilization(f64, f64),
}

impl RateValue {
    fn utilization(&self) -> f64 {
        match *self {
            RateValue::Utilization(u) => u,
            RateValue::VacancyAndUtilization(_, u) => u,
        }
    }

    fn vacancy(&self) -> Option<f64> {
        match *self {
            RateValue::Utilization(_) => None,
            RateValue::VacancyAndUtilization(v, _) => Some(v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VacancyPolicy {
    /// Leave `occ_vacancy_rate` as it is.
    Keep,
    /// Single-operator buildings have no leasable vacancy.
    Zero,
    /// Vacancy comes from the table alongside utilization.
    Table,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerticalRates {
    pub building_type: String,
    pub vacancy: VacancyPolicy,
    pub default: RateValue,
    #[serde(default)]
    pub presence_factor: Option<f64>,
    #[serde(default)]
    pub city: HashMap<String, RateValue>,
    #[serde(default)]
    pub state: HashMap<String, RateValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateSource {
    City,
    State,
    Default,
}

impl fmt::Display for RateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RateSource::City => "city",
            RateSource::State => "state",
            RateSource::Default => "default",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLookup {
    pub vacancy: Option<f64>,
    pub utilization: f64,
    pub source: RateSource,
}

impl VerticalRates {
    pub fn lookup(&self, city: &str, state: &str) -> RateLookup {
        let city = city.trim();
        let state = state.trim().to_uppercase();
        let (value, source) = if let Some(v) = self.city.get(city) {
            (*v, RateSource::City)
        } else if let Some(v) = self.state.get(&state) {
            (*v, RateSource::State)
        } else {
            (self.default, RateSource::Default)
        };

        let utilization = value.utilization() * self.presence_factor.unwrap_or(1.0);
        let vacancy = match self.vacancy {
            VacancyPolicy::Keep => None,
            VacancyPolicy::Zero => Some(0.0),
            VacancyPolicy::Table => value.vacancy(),
        };
        RateLookup {
            vacancy,
            utilization,
            source,
        }
    }

    fn validate(&self) -> Result<()> {
        let all = std::iter::once(&self.default)
            .chain(self.city.values())
            .chain(self.state.values());
        for value in all {
            let in_range = |x: f64| (0.0..=1.0).contains(&x);
            if !in_range(value.utilization()) || !value.vacancy().map_or(true, in_range) {
                bail!("{}: rate {:?} outside [0, 1]", self.building_type, value);
            }
            if self.vacancy == VacancyPolicy::Table && value.vacancy().is_none() {
                bail!("{}: table vacancy requires [vacancy, utilization] pairs", self.building_type);
            }
        }
        if let Some(factor) = self.presence_factor {
            if !(0.0..=1.0).contains(&factor) {
                bail!("{}: presence_factor {} outside [0, 1]", self.building_type, factor);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateTables {
    #[serde(rename = "vertical")]
    pub verticals: Vec<VerticalRates>,
}

impl RateTables {
    pub fn bundled() -> Result<Self> {
        Self::parse(BUNDLED_RATES).context("Bundled rate tables are invalid")
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rate tables: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid rate tables: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let tables: RateTables = toml::from_str(content)?;
        for vertical in &tables.verticals {
            vertical.validate()?;
        }
        Ok(tables)
    }

    pub fn vertical(&self, building_type: &str) -> Option<&VerticalRates> {
        self.verticals
            .iter()
            .find(|v| v.building_type.eq_ignore_ascii_case(building_type.trim()))
    }

    pub fn building_types(&self) -> impl Iterator<Item = &str> {
        self.verticals.iter().map(|v| v.building_type.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RateUpdateStats {
    pub building_type: String,
    pub updated: usize,
    pub by_source: HashMap<RateSource, usize>,
}

impl RateUpdateStats {
    pub fn count(&self, source: RateSource) -> usize {
        self.by_source.get(&source).copied().unwrap_or(0)
    }
}

/// Writes utilization (and vacancy per policy) for every row of the vertical.
pub fn apply_rates(table: &mut Table, rates: &VerticalRates) -> RateUpdateStats {
    let mut stats = RateUpdateStats {
        building_type: rates.building_type.clone(),
        ..Default::default()
    };

    for row in 0..table.len() {
        if !table.get(row, "bldg_type").trim().eq_ignore_ascii_case(&rates.building_type) {
            continue;
        }
        let city = table.get(row, "loc_city").to_string();
        let state = table.get(row, "loc_state").to_string();
        let lookup = rates.lookup(&city, &state);

        table.set_f64(row, "occ_utilization_rate", Some(round_to(lookup.utilization, 4)), 4);
        if let Some(vacancy) = lookup.vacancy {
            table.set_f64(row, "occ_vacancy_rate", Some(vacancy), 4);
        }

        stats.updated += 1;
        *stats.by_source.entry(lookup.source).or_insert(0) += 1;
    }

    info!(
        building_type = %rates.building_type,
        updated = stats.updated,
        city = stats.count(RateSource::City),
        state = stats.count(RateSource::State),
        default = stats.count(RateSource::Default),
        "occupancy rates applied"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[(&str, &str, &str)]) -> Table {
        let mut t = Table::new(vec![
            "bldg_type".to_string(),
            "loc_city".to_string(),
            "loc_state".to_string(),
            "occ_vacancy_rate".to_string(),
        ]);
        for (ty, city, state) in rows {
            t.push_row(vec![ty.to_string(), city.to_string(), state.to_string(), "0.3".to_string()]);
        }
        t
    }

    #[test]
    fn bundled_tables_load() {
        let tables = RateTables::bundled().unwrap();
        let types: Vec<&str> = tables.building_types().collect();
        for expected in ["Office", "Medical Office", "Hotel", "Retail Store", "Supermarket/Grocery", "K-12 School", "Restaurant/Bar"] {
            assert!(types.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn every_researched_building_type_resolves() {
        let tables = RateTables::bundled().unwrap();
        for building_type in [
            "Wholesale Club",
            "Outpatient Clinic",
            "Inpatient Hospital",
            "Specialty Hospital",
            "Library/Museum",
            "Theater",
            "Venue",
            "Mixed Use",
            "Enclosed Mall",
            "Higher Ed",
            "Residential Care",
        ] {
            let rates = tables
                .vertical(building_type)
                .unwrap_or_else(|| panic!("no rates for {building_type}"));
            let lookup = rates.lookup("Nowhere", "ZZ");
            assert_eq!(lookup.source, RateSource::Default, "{building_type}");
            assert!(lookup.utilization > 0.0 && lookup.utilization <= 1.0, "{building_type}");
        }

        let mall = tables.vertical("Enclosed Mall").unwrap().lookup("Boston", "MA");
        assert_eq!(mall.vacancy, Some(0.15));
        assert_eq!(mall.utilization, 0.44);

        let mixed = tables.vertical("Mixed Use").unwrap().lookup("Austin", "tx");
        assert_eq!(mixed.source, RateSource::State);
        assert_eq!(mixed.vacancy, Some(0.23));

        let care = tables.vertical("Residential Care").unwrap().lookup("Boston", "MA");
        assert!((care.utilization - 0.91 * 0.95).abs() < 1e-12);
        assert_eq!(care.vacancy, Some(0.0));

        let higher_ed = tables.vertical("Higher Ed").unwrap().lookup("Berkeley", "CA");
        assert_eq!(higher_ed.source, RateSource::State);
        assert_eq!(higher_ed.utilization, 0.30);
    }

    #[test]
    fn lookup_falls_back_city_state_default() {
        let tables = RateTables::bundled().unwrap();
        let medical = tables.vertical("Medical Office").unwrap();

        let city = medical.lookup("New York", "NY");
        assert_eq!(city.source, RateSource::City);
        assert_eq!(city.vacancy, Some(0.08));
        assert_eq!(city.utilization, 0.58);

        let state = medical.lookup("Buffalo", "ny");
        assert_eq!(state.source, RateSource::State);
        assert_eq!(state.utilization, 0.56);

        let default = medical.lookup("Boise", "ID");
        assert_eq!(default.source, RateSource::Default);
        assert_eq!(default.vacancy, Some(0.095));
    }

    #[test]
    fn hotel_occupancy_is_scaled_by_guest_presence() {
        let tables = RateTables::bundled().unwrap();
        let hotel = tables.vertical("hotel").unwrap();
        let lookup = hotel.lookup("New York", "NY");
        assert!((lookup.utilization - 0.87 * 0.45).abs() < 1e-12);
        assert_eq!(lookup.vacancy, Some(0.0));
    }

    #[test]
    fn apply_rates_updates_only_matching_type() {
        let tables = RateTables::bundled().unwrap();
        let retail = tables.vertical("Retail Store").unwrap();
        let mut t = table(&[("Retail Store", "Chicago", "IL"), ("Office", "Chicago", "IL"), ("Retail Store", "Austin", "TX")]);

        let stats = apply_rates(&mut t, retail);
        assert_eq!(stats.updated, 2);
        assert_eq!(stats.count(RateSource::City), 1);
        assert_eq!(stats.count(RateSource::State), 1);
        assert_eq!(t.get(0, "occ_utilization_rate"), "0.4500");
        assert_eq!(t.get(0, "occ_vacancy_rate"), "0.3");
        assert_eq!(t.get(1, "occ_utilization_rate"), "");
        assert_eq!(t.get(2, "occ_utilization_rate"), "0.3800");
    }

    #[test]
    fn k12_is_state_only_and_zeroes_vacancy() {
        let tables = RateTables::bundled().unwrap();
        let k12 = tables.vertical("K-12 School").unwrap();
        let mut t = table(&[("K-12 School", "Los Angeles", "CA")]);
        apply_rates(&mut t, k12);
        assert_eq!(t.get(0, "occ_utilization_rate"), "0.2800");
        assert_eq!(t.get(0, "occ_vacancy_rate"), "0.0000");
    }

    #[test]
    fn out_of_range_rates_are_rejected() {
        let bad = r#"
            [[vertical]]
            building_type = "Office"
            vacancy = "keep"
            default = 1.4
        "#;
        assert!(RateTables::parse(bad).is_err());

        let missing_pair = r#"
            [[vertical]]
            building_type = "Office"
            vacancy = "table"
            default = 0.4
        "#;
        assert!(RateTables::parse(missing_pair).is_err());
    }
}
