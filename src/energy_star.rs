//! Estimated ENERGY STAR score after ODCV.
//!
//! A score maps to an efficiency ratio (actual over predicted source EUI)
//! through a per-type gamma distribution. ODCV lowers the EUI, which lowers
//! the ratio by the same factor, and the new ratio maps back to a score.

use crate::energy::Fuel;
use crate::table::Table;
use statrs::distribution::{ContinuousCDF, Gamma};
use tracing::info;

/// `(shape, scale)` of the efficiency ratio distribution per building type.
const GAMMA_PARAMS: &[(&str, (f64, f64))] = &[
    ("Office", (2.0, 0.42)),
    ("Medical Office", (2.1, 0.40)),
    ("Bank Branch", (2.0, 0.42)),
    ("Courthouse", (2.0, 0.45)),
    ("Hotel", (1.8, 0.48)),
    ("K-12 School", (2.2, 0.38)),
    ("Higher Ed", (2.0, 0.45)),
    ("Retail Store", (1.9, 0.45)),
    ("Supermarket/Grocery", (1.8, 0.50)),
    ("Inpatient Hospital", (2.3, 0.38)),
    ("Outpatient Clinic", (2.1, 0.40)),
    ("Data Center", (1.5, 0.55)),
    ("Warehouse", (1.7, 0.52)),
];
const DEFAULT_GAMMA: (f64, f64) = (2.0, 0.43);

/// HVAC share of total energy when no per-fuel split is known.
const FALLBACK_HVAC_SHARE: f64 = 0.45;

pub fn gamma_params(building_type: &str) -> (f64, f64) {
    GAMMA_PARAMS
        .iter()
        .find(|(ty, _)| *ty == building_type.trim())
        .map(|(_, params)| *params)
        .unwrap_or(DEFAULT_GAMMA)
}

fn distribution((shape, scale): (f64, f64)) -> Option<Gamma> {
    Gamma::new(shape, 1.0 / scale).ok()
}

/// A score of X beats X% of peers, so it sits at the (100 - X)th
/// percentile of the ratio distribution.
pub fn score_to_ratio(score: f64, params: (f64, f64)) -> Option<f64> {
    if score <= 0.0 || score >= 100.0 {
        return None;
    }
    let gamma = distribution(params)?;
    Some(gamma.inverse_cdf((100.0 - score) / 100.0))
}

/// Scores are whole numbers in 1..=99.
pub fn ratio_to_score(ratio: f64, params: (f64, f64)) -> Option<f64> {
    if ratio <= 0.0 {
        return None;
    }
    let gamma = distribution(params)?;
    let score = (1.0 - gamma.cdf(ratio)) * 100.0;
    Some(score.round().clamp(1.0, 99.0))
}

/// HVAC share of the building's energy, weighted by each fuel's use.
pub fn weighted_hvac_share(table: &Table, row: usize) -> Option<f64> {
    let mut total = 0.0;
    let mut hvac = 0.0;
    for fuel in Fuel::ALL {
        let kbtu = table.get_f64(row, fuel.usage_column()).unwrap_or(0.0);
        let pct = table.get_f64(row, fuel.hvac_pct_column()).unwrap_or(0.0);
        total += kbtu;
        hvac += kbtu * pct;
    }
    (total > 0.0).then(|| hvac / total)
}

pub fn post_odcv_score(table: &Table, row: usize) -> Option<f64> {
    let score = table.get_f64(row, "energy_star_score")?;
    let eui = table.get_f64(row, "energy_site_eui").filter(|e| *e > 0.0)?;
    let odcv = match table.get_f64(row, "odcv_hvac_savings_pct") {
        Some(pct) if pct > 0.0 => pct,
        _ => return Some(score),
    };

    let hvac_share = weighted_hvac_share(table, row)
        .filter(|s| *s > 0.0)
        .unwrap_or(FALLBACK_HVAC_SHARE);
    let new_eui = eui * (1.0 - odcv * hvac_share);

    let params = gamma_params(table.get(row, "bldg_type"));
    let ratio = score_to_ratio(score, params)?;
    ratio_to_score(ratio * new_eui / eui, params)
}

pub fn calculate_energy_star_post_odcv(table: &mut Table) -> usize {
    let mut estimated = 0;
    let mut improved = 0;
    let mut new_certified = 0;

    for row in 0..table.len() {
        let post = post_odcv_score(table, row);
        if let (Some(before), Some(after)) = (table.get_f64(row, "energy_star_score"), post) {
            estimated += 1;
            improved += usize::from(after > before);
            new_certified += usize::from(before < 75.0 && after >= 75.0);
        }
        table.set_f64(row, "energy_star_score_post_odcv", post, 0);
    }

    info!(estimated, improved, new_certified, "post-ODCV ENERGY STAR scores estimated");
    estimated
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
    fn score_and_ratio_are_inverse() {
        let params = gamma_params("Office");
        for score in [10.0, 50.0, 75.0, 92.0] {
            let ratio = score_to_ratio(score, params).unwrap();
            assert_eq!(ratio_to_score(ratio, params), Some(score));
        }
        assert_eq!(score_to_ratio(100.0, params), None);
        assert_eq!(ratio_to_score(0.0, params), None);
        assert_eq!(gamma_params("Spaceport"), DEFAULT_GAMMA);
    }

    #[test]
    fn odcv_raises_the_score() {
        let t = table_with(&[
            ("bldg_type", "Office"),
            ("energy_star_score", "50"),
            ("energy_site_eui", "80"),
            ("odcv_hvac_savings_pct", "0.3"),
            ("energy_elec_kbtu", "1000"),
            ("hvac_pct_elec", "0.5"),
        ]);
        let after = post_odcv_score(&t, 0).unwrap();
        assert!(after > 50.0 && after <= 99.0, "{after}");
        assert_eq!(after.fract(), 0.0);
    }

    #[test]
    fn no_savings_keeps_score_and_missing_eui_gives_none() {
        let kept = table_with(&[
            ("energy_star_score", "64"),
            ("energy_site_eui", "90"),
            ("odcv_hvac_savings_pct", "0"),
        ]);
        assert_eq!(post_odcv_score(&kept, 0), Some(64.0));

        let no_eui = table_with(&[("energy_star_score", "64"), ("odcv_hvac_savings_pct", "0.3")]);
        assert_eq!(post_odcv_score(&no_eui, 0), None);
    }

    #[test]
    fn fallback_share_applies_without_fuel_split() {
        let t = table_with(&[("energy_gas_kbtu", "0")]);
        assert_eq!(weighted_hvac_share(&t, 0), None);

        let t = table_with(&[
            ("energy_elec_kbtu", "300"),
            ("hvac_pct_elec", "0.4"),
            ("energy_gas_kbtu", "100"),
            ("hvac_pct_gas", "0.8"),
        ]);
        assert!((weighted_hvac_share(&t, 0).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn step_writes_whole_number_scores() {
        let mut t = table_with(&[
            ("bldg_type", "Hotel"),
            ("energy_star_score", "70"),
            ("energy_site_eui", "120"),
            ("odcv_hvac_savings_pct", "0.25"),
        ]);
        assert_eq!(calculate_energy_star_post_odcv(&mut t), 1);
        let written = t.get(0, "energy_star_score_post_odcv");
        assert!(!written.is_empty() && !written.contains('.'), "{written}");
    }
}
