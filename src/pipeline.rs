//! Ordered population of the derived portfolio columns.

use crate::carbon::{calculate_bps_fines, calculate_carbon};
use crate::energy::{
    calculate_energy_costs, calculate_hvac_totals, calculate_post_odcv_costs,
    calculate_post_odcv_energy, fix_fuel_oil_hvac_pct,
};
use crate::energy_star::calculate_energy_star_post_odcv;
use crate::savings::calculate_odcv_savings;
use crate::table::{create_backup, Table};
use crate::valuation::calculate_valuation;
use crate::verticals::{align_verticals, VerticalMap};
use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;
use tracing::{info, info_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    AlignVerticals,
    HvacPct,
    EnergyCosts,
    OdcvSavings,
    HvacTotals,
    PostOdcvEnergy,
    PostOdcvCosts,
    Carbon,
    BpsFines,
    Valuation,
    EnergyStarPostOdcv,
}

impl Step {
    /// Each step reads columns written by the ones before it.
    pub const ORDER: [Step; 11] = [
        Step::AlignVerticals,
        Step::HvacPct,
        Step::EnergyCosts,
        Step::OdcvSavings,
        Step::HvacTotals,
        Step::PostOdcvEnergy,
        Step::PostOdcvCosts,
        Step::Carbon,
        Step::BpsFines,
        Step::Valuation,
        Step::EnergyStarPostOdcv,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Step::AlignVerticals => "align-verticals",
            Step::HvacPct => "hvac-pct",
            Step::EnergyCosts => "energy-costs",
            Step::OdcvSavings => "odcv-savings",
            Step::HvacTotals => "hvac-totals",
            Step::PostOdcvEnergy => "post-odcv-energy",
            Step::PostOdcvCosts => "post-odcv-costs",
            Step::Carbon => "carbon",
            Step::BpsFines => "bps-fines",
            Step::Valuation => "valuation",
            Step::EnergyStarPostOdcv => "energy-star",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Step::AlignVerticals => "Building type to vertical",
            Step::HvacPct => "HVAC percentages by fuel type",
            Step::EnergyCosts => "Annual energy costs from usage and tariffs",
            Step::OdcvSavings => "ODCV savings percentage",
            Step::HvacTotals => "HVAC energy and cost totals",
            Step::PostOdcvEnergy => "Energy use after ODCV",
            Step::PostOdcvCosts => "Energy costs after ODCV",
            Step::Carbon => "City-specific carbon emissions",
            Step::BpsFines => "BPS fine avoidance",
            Step::Valuation => "Valuation impact",
            Step::EnergyStarPostOdcv => "Estimated ENERGY STAR score after ODCV",
        }
    }

    fn required_columns(&self) -> &'static [&'static str] {
        match self {
            Step::PostOdcvEnergy => &["odcv_hvac_savings_pct", "hvac_pct_elec"],
            Step::PostOdcvCosts => &["energy_elec_kwh_post_odcv"],
            Step::BpsFines => &["carbon_emissions_total_mt"],
            Step::EnergyStarPostOdcv => &["odcv_hvac_savings_pct"],
            _ => &["bldg_type"],
        }
    }

    pub fn run(&self, table: &mut Table) -> Result<usize> {
        let missing: Vec<&str> = self
            .required_columns()
            .iter()
            .copied()
            .filter(|c| !table.has_column(c))
            .collect();
        if !missing.is_empty() {
            bail!("missing required columns: {}", missing.join(", "));
        }

        let updated = match self {
            Step::AlignVerticals => align_verticals(table, &VerticalMap::bundled()?).updated,
            Step::HvacPct => fix_fuel_oil_hvac_pct(table).updated,
            Step::EnergyCosts => calculate_energy_costs(table).updated,
            Step::OdcvSavings => calculate_odcv_savings(table),
            Step::HvacTotals => calculate_hvac_totals(table).updated,
            Step::PostOdcvEnergy => calculate_post_odcv_energy(table).updated,
            Step::PostOdcvCosts => calculate_post_odcv_costs(table).updated,
            Step::Carbon => calculate_carbon(table),
            Step::BpsFines => calculate_bps_fines(table),
            Step::Valuation => calculate_valuation(table),
            Step::EnergyStarPostOdcv => calculate_energy_star_post_odcv(table),
        };
        Ok(updated)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Step {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Step::ORDER
            .iter()
            .copied()
            .find(|step| step.name() == wanted)
            .with_context(|| {
                let names: Vec<&str> = Step::ORDER.iter().map(|s| s.name()).collect();
                format!("unknown step '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub backup: PathBuf,
    pub steps: Vec<(Step, usize)>,
    pub rows: usize,
}

/// Backs up the portfolio once, then runs the steps in order.
///
/// The table is only written back when every step succeeds.
pub fn run_pipeline(
    portfolio: impl AsRef<Path>,
    backup_dir: impl AsRef<Path>,
    only: Option<Step>,
) -> Result<PipelineReport> {
    let portfolio = portfolio.as_ref();
    let started = Instant::now();

    let backup = create_backup(portfolio, backup_dir)?;
    let mut table = Table::load(portfolio)?;
    info!(rows = table.len(), file = %portfolio.display(), "portfolio loaded");

    let steps: Vec<Step> = match only {
        Some(step) => vec![step],
        None => Step::ORDER.to_vec(),
    };

    let mut report = PipelineReport {
        backup: backup.clone(),
        steps: Vec::new(),
        rows: table.len(),
    };

    for step in steps {
        let span = info_span!("step", name = step.name());
        let _guard = span.enter();
        info!(purpose = step.description(), "running");

        let updated = step.run(&mut table).with_context(|| {
            format!(
                "step '{}' failed; backup available at {}",
                step,
                backup.display()
            )
        })?;
        report.steps.push((step, updated));
    }

    table.save(portfolio)?;
    info!(
        steps = report.steps.len(),
        seconds = started.elapsed().as_secs_f64(),
        "pipeline finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_names_parse() {
        assert_eq!("post_odcv_energy".parse::<Step>().unwrap(), Step::PostOdcvEnergy);
        assert_eq!("Valuation".parse::<Step>().unwrap(), Step::Valuation);
        assert_eq!("energy_star".parse::<Step>().unwrap(), Step::EnergyStarPostOdcv);
        assert_eq!(Step::ORDER[0], Step::AlignVerticals);
        assert!("nyc-update".parse::<Step>().is_err());
    }

    #[test]
    fn missing_columns_fail_the_step() {
        let mut table = Table::new(vec!["bldg_type".to_string()]);
        table.push_row(vec!["Office".to_string()]);
        let err = Step::PostOdcvEnergy.run(&mut table).unwrap_err();
        assert!(err.to_string().contains("odcv_hvac_savings_pct"));
    }
}
