//! Carbon emissions and Building Performance Standard fines.

use crate::energy::Fuel;
use crate::table::{round_to, Table};
use tracing::info;

/// tCO2e per kBtu, ordered as electricity, gas, steam, fuel oil.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionFactors([f64; 4]);

impl EmissionFactors {
    pub fn factor(&self, fuel: Fuel) -> f64 {
        match fuel {
            Fuel::Electricity => self.0[0],
            Fuel::Gas => self.0[1],
            Fuel::Steam => self.0[2],
            Fuel::FuelOil => self.0[3],
        }
    }
}

const GAS: f64 = 0.00005311;
const STEAM: f64 = 0.00004493;
const FUEL_OIL: f64 = 0.00007315;

/// eGRID 2023 electricity factors by city; other fuels use NYC LL97 values.
const CITY_EMISSION_FACTORS: &[(&str, EmissionFactors)] = &[
    ("New York", EmissionFactors([0.0000847, GAS, STEAM, FUEL_OIL])),
    ("Boston", EmissionFactors([0.0000717, GAS, STEAM, FUEL_OIL])),
    ("Cambridge", EmissionFactors([0.0000717, GAS, STEAM, FUEL_OIL])),
    ("Washington", EmissionFactors([0.0000794, GAS, STEAM, FUEL_OIL])),
    ("Denver", EmissionFactors([0.0001378, GAS, STEAM, FUEL_OIL])),
    ("Seattle", EmissionFactors([0.0000029, 0.000053, 0.000081, FUEL_OIL])),
    ("San Francisco", EmissionFactors([0.0000570, GAS, STEAM, FUEL_OIL])),
    ("St. Louis", EmissionFactors([0.0001649, GAS, STEAM, FUEL_OIL])),
    ("Los Angeles", EmissionFactors([0.0000570, GAS, STEAM, FUEL_OIL])),
    ("Chicago", EmissionFactors([0.0001649, GAS, STEAM, FUEL_OIL])),
    ("Portland", EmissionFactors([0.0000595, GAS, STEAM, FUEL_OIL])),
    ("Atlanta", EmissionFactors([0.0000988, GAS, STEAM, FUEL_OIL])),
    ("Berkeley", EmissionFactors([0.0000570, GAS, STEAM, FUEL_OIL])),
];

const DEFAULT_FACTORS: EmissionFactors = EmissionFactors([0.0000922, GAS, STEAM, FUEL_OIL]);

pub fn emission_factors(city: &str) -> EmissionFactors {
    let city = city.trim();
    CITY_EMISSION_FACTORS
        .iter()
        .find(|(c, _)| *c == city)
        .map(|(_, f)| *f)
        .unwrap_or(DEFAULT_FACTORS)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarbonResult {
    pub emissions_mt: f64,
    pub reduction_mt: f64,
}

pub fn carbon_for_row(table: &Table, row: usize) -> CarbonResult {
    let factors = emission_factors(table.get(row, "loc_city"));
    let odcv = table.get_f64(row, "odcv_hvac_savings_pct").unwrap_or(0.0);

    let mut emissions = 0.0;
    let mut reduction = 0.0;
    for fuel in Fuel::ALL {
        let kbtu = table.get_f64(row, fuel.usage_column()).unwrap_or(0.0);
        let pct = table.get_f64(row, fuel.hvac_pct_column()).unwrap_or(0.0);
        emissions += kbtu * factors.factor(fuel);
        reduction += kbtu * pct * odcv * factors.factor(fuel);
    }
    CarbonResult {
        emissions_mt: round_to(emissions, 4),
        reduction_mt: round_to(reduction, 4),
    }
}

pub fn calculate_carbon(table: &mut Table) -> usize {
    let mut nonzero = 0;
    for row in 0..table.len() {
        let result = carbon_for_row(table, row);
        table.set_f64(row, "carbon_emissions_total_mt", Some(result.emissions_mt), 4);
        table.set_f64(row, "odcv_carbon_reduction_yr1_mt", Some(result.reduction_mt), 4);
        if result.emissions_mt > 0.0 {
            nonzero += 1;
        }
    }
    info!(rows = table.len(), nonzero, "carbon emissions calculated");
    nonzero
}

/// How a city's performance standard measures compliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BpsMethod {
    EmissionCap,
    BaselineReduction,
    EnergyStarTarget,
    EuiTarget,
}

#[derive(Debug, Clone, Copy)]
pub struct BpsLaw {
    pub city: &'static str,
    pub law: &'static str,
    pub method: BpsMethod,
    pub penalty: &'static str,
    pub cap: &'static str,
    pub min_sqft: f64,
    pub source_url: &'static str,
    pub exempt_types: &'static [&'static str],
    /// Dollars per tCO2e over the cap; only for emission-cap laws.
    pub fine_per_tco2e: Option<f64>,
    /// tCO2e per square foot.
    pub cap_per_sqft: Option<f64>,
}

pub const BPS_LAWS: &[BpsLaw] = &[
    BpsLaw {
        city: "New York",
        law: "NYC Local Law 97",
        method: BpsMethod::EmissionCap,
        penalty: "$268/tCO2e over cap",
        cap: "0.00758 tCO2e/sqft",
        min_sqft: 25_000.0,
        source_url: "https://www.nyc.gov/site/buildings/codes/ll97-greenhouse-gas-emissions-reductions.page",
        exempt_types: &["K-12 School", "Government"],
        fine_per_tco2e: Some(268.0),
        cap_per_sqft: Some(0.00758),
    },
    BpsLaw {
        city: "Boston",
        law: "BERDO 2.0",
        method: BpsMethod::EmissionCap,
        penalty: "$234/tCO2e over cap",
        cap: "0.0053 tCO2e/sqft",
        min_sqft: 20_000.0,
        source_url: "https://www.boston.gov/departments/environment/berdo",
        exempt_types: &[],
        fine_per_tco2e: Some(234.0),
        cap_per_sqft: Some(0.0053),
    },
    BpsLaw {
        city: "Cambridge",
        law: "Cambridge BEUDO",
        method: BpsMethod::BaselineReduction,
        penalty: "$234/tCO2e over target",
        cap: "20% below baseline",
        min_sqft: 25_000.0,
        source_url: "https://www.cambridgema.gov/beudo",
        exempt_types: &["Multifamily"],
        fine_per_tco2e: None,
        cap_per_sqft: None,
    },
    BpsLaw {
        city: "Washington",
        law: "DC BEPS",
        method: BpsMethod::EnergyStarTarget,
        penalty: "$10/sqft (prorated)",
        cap: "By type (ES targets)",
        min_sqft: 50_000.0,
        source_url: "https://doee.dc.gov/service/building-energy-performance-standards",
        exempt_types: &[],
        fine_per_tco2e: None,
        cap_per_sqft: None,
    },
    BpsLaw {
        city: "Denver",
        law: "Energize Denver",
        method: BpsMethod::EuiTarget,
        penalty: "$0.15/kBtu over target",
        cap: "By type (glide path to 2032)",
        min_sqft: 25_000.0,
        source_url: "https://www.denvergov.org/Government/Agencies-Departments-Offices/Agencies-Departments-Offices-Directory/Climate-Action-Sustainability-and-Resiliency/Energize-Denver",
        exempt_types: &["K-12 School"],
        fine_per_tco2e: None,
        cap_per_sqft: None,
    },
    BpsLaw {
        city: "Seattle",
        law: "Seattle BEPS",
        method: BpsMethod::EmissionCap,
        penalty: "$10/sqft per 5yr cycle",
        cap: "0.00081 tCO2e/sqft",
        min_sqft: 20_000.0,
        source_url: "https://www.seattle.gov/environment/climate-change/buildings-and-energy/building-performance-standards",
        exempt_types: &[],
        fine_per_tco2e: None,
        cap_per_sqft: None,
    },
    BpsLaw {
        city: "St. Louis",
        law: "St. Louis BEPS",
        method: BpsMethod::EuiTarget,
        penalty: "$500/day non-compliance",
        cap: "71.7 kBtu/sqft EUI",
        min_sqft: 50_000.0,
        source_url: "https://www.stlouis-mo.gov/government/departments/public-safety/building/",
        exempt_types: &[],
        fine_per_tco2e: None,
        cap_per_sqft: None,
    },
];

pub fn bps_law(city: &str) -> Option<&'static BpsLaw> {
    let city = city.trim();
    BPS_LAWS.iter().find(|law| law.city == city)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BpsFine {
    pub baseline_usd: f64,
    pub post_odcv_usd: f64,
    pub avoided_usd: f64,
}

/// Year-one fines under a per-tonne emission cap.
///
/// Returns `None` when no per-tonne law applies to the building.
pub fn bps_fine(
    city: &str,
    building_type: &str,
    sqft: Option<f64>,
    emissions_mt: f64,
    reduction_mt: f64,
) -> Option<BpsFine> {
    let law = bps_law(city)?;
    let (rate, cap_per_sqft) = (law.fine_per_tco2e?, law.cap_per_sqft?);
    let sqft = sqft.filter(|s| *s >= law.min_sqft)?;
    if law.exempt_types.contains(&building_type.trim()) {
        return None;
    }

    let cap = cap_per_sqft * sqft;
    let baseline = (emissions_mt - cap).max(0.0) * rate;
    let post = (emissions_mt - reduction_mt - cap).max(0.0) * rate;
    Some(BpsFine {
        baseline_usd: round_to(baseline, 2),
        post_odcv_usd: round_to(post, 2),
        avoided_usd: round_to(baseline - post, 2),
    })
}

pub fn calculate_bps_fines(table: &mut Table) -> usize {
    let mut fined = 0;
    for row in 0..table.len() {
        let fine = bps_fine(
            table.get(row, "loc_city"),
            table.get(row, "bldg_type"),
            table.get_f64(row, "bldg_sqft"),
            table.get_f64(row, "carbon_emissions_total_mt").unwrap_or(0.0),
            table.get_f64(row, "odcv_carbon_reduction_yr1_mt").unwrap_or(0.0),
        )
        .unwrap_or_default();

        table.set_f64(row, "bps_fine_baseline_yr1_usd", Some(fine.baseline_usd), 2);
        table.set_f64(row, "bps_fine_post_odcv_yr1_usd", Some(fine.post_odcv_usd), 2);
        table.set_f64(row, "bps_fine_avoided_yr1_usd", Some(fine.avoided_usd), 2);
        if fine.baseline_usd > 0.0 {
            fined += 1;
        }
    }
    info!(rows = table.len(), fined, "BPS fines calculated");
    fined
}
