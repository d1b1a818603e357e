//! Utility cost and energy formulas for the portfolio table.

use crate::table::{round_to, Table};
use tracing::info;

pub const KBTU_PER_THERM: f64 = 100.0;
pub const KBTU_PER_MLB_STEAM: f64 = 909.0;
pub const KBTU_PER_MMBTU: f64 = 1000.0;
pub const HOURS_PER_YEAR: f64 = 8760.0;
/// Taxes, fees and distribution charges.
pub const ENERGY_CHARGE_MULTIPLIER: f64 = 1.10;
/// Ratchet clauses and seasonal peaks.
pub const DEMAND_CHARGE_MULTIPLIER: f64 = 1.265;
pub const MONTHS_PER_YEAR: f64 = 12.0;
pub const DEFAULT_LOAD_FACTOR: f64 = 0.45;
pub const FUEL_OIL_HVAC_PCT: f64 = 0.93;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fuel {
    Electricity,
    Gas,
    Steam,
    FuelOil,
}

impl Fuel {
    pub const ALL: [Fuel; 4] = [Fuel::Electricity, Fuel::Gas, Fuel::Steam, Fuel::FuelOil];

    pub fn label(&self) -> &'static str {
        match self {
            Fuel::Electricity => "Electricity",
            Fuel::Gas => "Natural Gas",
            Fuel::Steam => "District Steam",
            Fuel::FuelOil => "Fuel Oil",
        }
    }

    pub fn usage_column(&self) -> &'static str {
        match self {
            Fuel::Electricity => "energy_elec_kbtu",
            Fuel::Gas => "energy_gas_kbtu",
            Fuel::Steam => "energy_steam_kbtu",
            Fuel::FuelOil => "energy_fuel_oil_kbtu",
        }
    }

    pub fn post_odcv_column(&self) -> &'static str {
        match self {
            Fuel::Electricity => "energy_elec_kbtu_post_odcv",
            Fuel::Gas => "energy_gas_kbtu_post_odcv",
            Fuel::Steam => "energy_steam_kbtu_post_odcv",
            Fuel::FuelOil => "energy_fuel_oil_kbtu_post_odcv",
        }
    }

    pub fn hvac_pct_column(&self) -> &'static str {
        match self {
            Fuel::Electricity => "hvac_pct_elec",
            Fuel::Gas => "hvac_pct_gas",
            Fuel::Steam => "hvac_pct_steam",
            Fuel::FuelOil => "hvac_pct_fuel_oil",
        }
    }

    pub fn cost_column(&self) -> &'static str {
        match self {
            Fuel::Electricity => "cost_elec_total_annual",
            Fuel::Gas => "cost_gas_annual",
            Fuel::Steam => "cost_steam_annual",
            Fuel::FuelOil => "cost_fuel_oil_annual",
        }
    }

    pub fn post_odcv_cost_column(&self) -> &'static str {
        match self {
            Fuel::Electricity => "cost_elec_total_annual_post_odcv",
            Fuel::Gas => "cost_gas_annual_post_odcv",
            Fuel::Steam => "cost_steam_annual_post_odcv",
            Fuel::FuelOil => "cost_fuel_oil_annual_post_odcv",
        }
    }

    fn rate_column(&self) -> &'static str {
        match self {
            Fuel::Electricity => "cost_elec_rate_kwh",
            Fuel::Gas => "cost_gas_rate_therm",
            Fuel::Steam => "cost_steam_rate_mlb",
            Fuel::FuelOil => "cost_fuel_oil_rate_mmbtu",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElectricityCosts {
    pub peak_kw: f64,
    pub energy_annual: f64,
    pub demand_annual: f64,
    pub total_annual: f64,
}

pub fn electricity_costs(
    kwh: Option<f64>,
    rate_kwh: Option<f64>,
    rate_demand_kw: Option<f64>,
    load_factor: Option<f64>,
) -> Option<ElectricityCosts> {
    let kwh = kwh.filter(|k| *k > 0.0)?;
    let rate_kwh = rate_kwh?;
    let load_factor = load_factor.filter(|lf| *lf > 0.0).unwrap_or(DEFAULT_LOAD_FACTOR);

    let peak_kw = kwh / (HOURS_PER_YEAR * load_factor);
    let energy_annual = kwh * rate_kwh * ENERGY_CHARGE_MULTIPLIER;
    let demand_annual = match rate_demand_kw {
        Some(rate) if rate > 0.0 => {
            peak_kw * rate * MONTHS_PER_YEAR * DEMAND_CHARGE_MULTIPLIER
        }
        _ => 0.0,
    };

    Some(ElectricityCosts {
        peak_kw: round_to(peak_kw, 2),
        energy_annual: round_to(energy_annual, 2),
        demand_annual: round_to(demand_annual, 2),
        total_annual: round_to(energy_annual + demand_annual, 2),
    })
}

/// Annual cost of a non-electric fuel from kBtu usage and its tariff.
pub fn fuel_cost(fuel: Fuel, kbtu: Option<f64>, rate: Option<f64>) -> Option<f64> {
    let kbtu = kbtu.filter(|k| *k > 0.0)?;
    let rate = rate?;
    let cost = match fuel {
        Fuel::Gas => kbtu / KBTU_PER_THERM * rate * ENERGY_CHARGE_MULTIPLIER,
        Fuel::Steam => kbtu / KBTU_PER_MLB_STEAM * rate,
        Fuel::FuelOil => kbtu / KBTU_PER_MMBTU * rate * ENERGY_CHARGE_MULTIPLIER,
        Fuel::Electricity => return None,
    };
    Some(round_to(cost, 2))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepStats {
    pub rows: usize,
    pub updated: usize,
}

/// Fuel-oil systems are almost entirely space heating.
pub fn fix_fuel_oil_hvac_pct(table: &mut Table) -> StepStats {
    let mut stats = StepStats {
        rows: table.len(),
        ..Default::default()
    };
    for row in 0..table.len() {
        if table.get_f64(row, "energy_fuel_oil_kbtu").unwrap_or(0.0) > 0.0 {
            table.set_f64(row, "hvac_pct_fuel_oil", Some(FUEL_OIL_HVAC_PCT), 2);
            stats.updated += 1;
        }
    }
    info!(updated = stats.updated, "fuel oil HVAC share set");
    stats
}

fn write_costs(table: &mut Table, row: usize, usage: [Option<f64>; 4], post_odcv: bool) -> bool {
    let mut wrote = false;
    let elec = electricity_costs(
        usage[0],
        table.get_f64(row, Fuel::Electricity.rate_column()),
        table.get_f64(row, "cost_elec_rate_demand_kw"),
        table.get_f64(row, "cost_elec_load_factor"),
    );
    if let Some(elec) = elec {
        let suffix = if post_odcv { "_post_odcv" } else { "" };
        if !post_odcv {
            table.set_f64(row, "cost_elec_peak_kw", Some(elec.peak_kw), 2);
        }
        table.set_f64(row, &format!("cost_elec_energy_annual{}", suffix), Some(elec.energy_annual), 2);
        table.set_f64(row, &format!("cost_elec_demand_annual{}", suffix), Some(elec.demand_annual), 2);
        table.set_f64(row, &format!("cost_elec_total_annual{}", suffix), Some(elec.total_annual), 2);
        wrote = true;
    }

    for (i, fuel) in [Fuel::Gas, Fuel::Steam, Fuel::FuelOil].into_iter().enumerate() {
        let cost = fuel_cost(fuel, usage[i + 1], table.get_f64(row, fuel.rate_column()));
        if cost.is_some() {
            let column = if post_odcv {
                fuel.post_odcv_cost_column()
            } else {
                fuel.cost_column()
            };
            table.set_f64(row, column, cost, 2);
            wrote = true;
        }
    }
    wrote
}

/// Rows without usage or tariffs keep whatever cost they already had.
pub fn calculate_energy_costs(table: &mut Table) -> StepStats {
    let mut stats = StepStats {
        rows: table.len(),
        ..Default::default()
    };
    for row in 0..table.len() {
        let usage = [
            table.get_f64(row, "energy_elec_kwh"),
            table.get_f64(row, Fuel::Gas.usage_column()),
            table.get_f64(row, Fuel::Steam.usage_column()),
            table.get_f64(row, Fuel::FuelOil.usage_column()),
        ];
        if write_costs(table, row, usage, false) {
            stats.updated += 1;
        }
    }
    info!(updated = stats.updated, "energy costs calculated");
    stats
}

pub fn calculate_post_odcv_costs(table: &mut Table) -> StepStats {
    let mut stats = StepStats {
        rows: table.len(),
        ..Default::default()
    };
    for row in 0..table.len() {
        let usage = [
            table.get_f64(row, "energy_elec_kwh_post_odcv"),
            table.get_f64(row, Fuel::Gas.post_odcv_column()),
            table.get_f64(row, Fuel::Steam.post_odcv_column()),
            table.get_f64(row, Fuel::FuelOil.post_odcv_column()),
        ];
        if write_costs(table, row, usage, true) {
            stats.updated += 1;
        }
    }
    info!(updated = stats.updated, "post-ODCV costs calculated");
    stats
}

/// HVAC share of energy use and spend, treating missing cells as zero.
pub fn hvac_totals(table: &Table, row: usize) -> (f64, f64) {
    let pct = |fuel: Fuel| table.get_f64(row, fuel.hvac_pct_column()).unwrap_or(0.0);
    let energy = Fuel::ALL
        .iter()
        .map(|f| table.get_f64(row, f.usage_column()).unwrap_or(0.0) * pct(*f))
        .sum::<f64>();
    let cost = Fuel::ALL
        .iter()
        .map(|f| table.get_f64(row, f.cost_column()).unwrap_or(0.0) * pct(*f))
        .sum::<f64>();
    (round_to(energy, 2), round_to(cost, 2))
}

pub fn calculate_hvac_totals(table: &mut Table) -> StepStats {
    let mut stats = StepStats {
        rows: table.len(),
        ..Default::default()
    };
    for row in 0..table.len() {
        let (energy, cost) = hvac_totals(table, row);
        table.set_f64(row, "hvac_energy_total_kbtu", Some(energy), 2);
        table.set_f64(row, "hvac_cost_total_annual", Some(cost), 2);
        if energy > 0.0 || cost > 0.0 {
            stats.updated += 1;
        }
    }
    info!(nonzero = stats.updated, "HVAC totals calculated");
    stats
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostOdcvEnergy {
    pub elec_kwh: Option<f64>,
    pub kbtu: [Option<f64>; 4],
    pub total_kbtu: Option<f64>,
}

/// Usage after ODCV: `current × (1 − hvac_pct × odcv_pct)` per fuel.
pub fn post_odcv_energy(table: &Table, row: usize) -> PostOdcvEnergy {
    let odcv = table.get_f64(row, "odcv_hvac_savings_pct").unwrap_or(0.0);
    let elec_pct = table.get_f64(row, Fuel::Electricity.hvac_pct_column()).unwrap_or(0.0);

    // unrounded; only the written cells are rounded
    let reduce = |value: Option<f64>, pct: f64| -> Option<f64> {
        if odcv == 0.0 {
            return value;
        }
        value.filter(|v| *v > 0.0).map(|v| v * (1.0 - pct * odcv))
    };

    let mut result = PostOdcvEnergy {
        elec_kwh: reduce(table.get_f64(row, "energy_elec_kwh"), elec_pct).map(|v| round_to(v, 2)),
        ..Default::default()
    };
    let mut total = 0.0;
    for (i, fuel) in Fuel::ALL.iter().enumerate() {
        let pct = table.get_f64(row, fuel.hvac_pct_column()).unwrap_or(0.0);
        let post = reduce(table.get_f64(row, fuel.usage_column()), pct);
        total += post.unwrap_or(0.0);
        result.kbtu[i] = post.map(|v| round_to(v, 2));
    }
    result.total_kbtu = (total > 0.0).then(|| round_to(total, 2));
    result
}

pub fn calculate_post_odcv_energy(table: &mut Table) -> StepStats {
    let mut stats = StepStats {
        rows: table.len(),
        ..Default::default()
    };
    for row in 0..table.len() {
        let post = post_odcv_energy(table, row);
        table.set_f64(row, "energy_elec_kwh_post_odcv", post.elec_kwh, 2);
        for (i, fuel) in Fuel::ALL.iter().enumerate() {
            table.set_f64(row, fuel.post_odcv_column(), post.kbtu[i], 2);
        }
        table.set_f64(row, "energy_total_kbtu_post_odcv", post.total_kbtu, 2);
        if post.total_kbtu.is_some() {
            stats.updated += 1;
        }
    }
    info!(updated = stats.updated, "post-ODCV energy calculated");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(cols: &[(&str, &str)]) -> Table {
        let mut t = Table::new(cols.iter().map(|(c, _)| c.to_string()).collect());
        t.push_row(cols.iter().map(|(_, v)| v.to_string()).collect());
        t
    }

    #[test]
    fn electricity_with_demand_charge() {
        let costs = electricity_costs(Some(1_000_000.0), Some(0.15), Some(20.0), Some(0.5)).unwrap();
        // 1e6 / (8760 * 0.5)
        assert_eq!(costs.peak_kw, 228.31);
        assert_eq!(costs.energy_annual, 165_000.0);
        let demand = 1_000_000.0 / 4380.0 * 20.0 * 12.0 * 1.265;
        assert_eq!(costs.demand_annual, round_to(demand, 2));
        assert_eq!(costs.total_annual, round_to(165_000.0 + demand, 2));
    }

    #[test]
    fn electricity_without_demand_rate_has_zero_demand() {
        let costs = electricity_costs(Some(10_000.0), Some(0.2), None, None).unwrap();
        assert_eq!(costs.demand_annual, 0.0);
        assert_eq!(costs.total_annual, 2_200.0);
        assert_eq!(costs.peak_kw, round_to(10_000.0 / (8760.0 * 0.45), 2));
    }

    #[test]
    fn electricity_needs_usage_and_rate() {
        assert!(electricity_costs(Some(0.0), Some(0.2), None, None).is_none());
        assert!(electricity_costs(Some(100.0), None, None, None).is_none());
    }

    #[test]
    fn fuel_costs_use_unit_conversions() {
        assert_eq!(fuel_cost(Fuel::Gas, Some(10_000.0), Some(1.5)), Some(165.0));
        assert_eq!(fuel_cost(Fuel::Steam, Some(9_090.0), Some(30.0)), Some(300.0));
        assert_eq!(fuel_cost(Fuel::FuelOil, Some(5_000.0), Some(20.0)), Some(110.0));
        assert_eq!(fuel_cost(Fuel::Gas, Some(-1.0), Some(1.5)), None);
    }

    #[test]
    fn fuel_oil_share_only_where_fuel_oil_used() {
        let mut t = table_with(&[("energy_fuel_oil_kbtu", "500"), ("hvac_pct_fuel_oil", "0.5")]);
        t.push_row(vec!["0".into(), "0.5".into()]);
        let stats = fix_fuel_oil_hvac_pct(&mut t);
        assert_eq!(stats.updated, 1);
        assert_eq!(t.get(0, "hvac_pct_fuel_oil"), "0.93");
        assert_eq!(t.get(1, "hvac_pct_fuel_oil"), "0.5");
    }

    #[test]
    fn hvac_totals_treat_missing_as_zero() {
        let t = table_with(&[
            ("energy_elec_kbtu", "1000"),
            ("hvac_pct_elec", "0.4"),
            ("energy_gas_kbtu", "2000"),
            ("hvac_pct_gas", ""),
            ("cost_elec_total_annual", "500"),
        ]);
        assert_eq!(hvac_totals(&t, 0), (400.0, 200.0));
    }

    #[test]
    fn post_odcv_energy_reduces_each_fuel() {
        let t = table_with(&[
            ("odcv_hvac_savings_pct", "0.25"),
            ("energy_elec_kwh", "1000"),
            ("energy_elec_kbtu", "3412"),
            ("hvac_pct_elec", "0.4"),
            ("energy_gas_kbtu", "1000"),
            ("hvac_pct_gas", "0.8"),
        ]);
        let post = post_odcv_energy(&t, 0);
        assert_eq!(post.elec_kwh, Some(900.0));
        assert_eq!(post.kbtu[0], Some(3070.8));
        assert_eq!(post.kbtu[1], Some(800.0));
        assert_eq!(post.kbtu[2], None);
        assert_eq!(post.total_kbtu, Some(3870.8));
    }

    #[test]
    fn total_is_rounded_after_summing_fuels() {
        let t = table_with(&[
            ("odcv_hvac_savings_pct", "0"),
            ("energy_gas_kbtu", "0.004"),
            ("energy_steam_kbtu", "0.004"),
        ]);
        let post = post_odcv_energy(&t, 0);
        assert_eq!(post.kbtu[1], Some(0.0));
        assert_eq!(post.kbtu[2], Some(0.0));
        assert_eq!(post.total_kbtu, Some(0.01));

        let t = table_with(&[
            ("odcv_hvac_savings_pct", "0.5"),
            ("energy_elec_kbtu", "10.005"),
            ("hvac_pct_elec", "0.5"),
            ("energy_gas_kbtu", "10.005"),
            ("hvac_pct_gas", "0.5"),
        ]);
        let post = post_odcv_energy(&t, 0);
        // 7.50375 twice: 15.0075 summed, versus 7.50 + 7.50 rounded first
        assert_eq!(post.total_kbtu, Some(15.01));
    }

    #[test]
    fn zero_odcv_copies_current_usage() {
        let t = table_with(&[("odcv_hvac_savings_pct", "0"), ("energy_gas_kbtu", "1234.5")]);
        let post = post_odcv_energy(&t, 0);
        assert_eq!(post.kbtu[1], Some(1234.5));
        assert_eq!(post.total_kbtu, Some(1234.5));
    }

    #[test]
    fn post_odcv_costs_write_suffixed_columns() {
        let mut t = table_with(&[
            ("energy_elec_kwh_post_odcv", "10000"),
            ("cost_elec_rate_kwh", "0.2"),
            ("energy_gas_kbtu_post_odcv", "10000"),
            ("cost_gas_rate_therm", "1.5"),
        ]);
        calculate_post_odcv_costs(&mut t);
        assert_eq!(t.get(0, "cost_elec_total_annual_post_odcv"), "2200.00");
        assert_eq!(t.get(0, "cost_gas_annual_post_odcv"), "165.00");
        assert!(!t.has_column("cost_elec_peak_kw"));
    }
}
