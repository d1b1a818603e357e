use crate::energy::Fuel;
use crate::table::{fmt_value, Table};
use std::collections::HashMap;
use tracing::info;

/// Income-producing types that are valued on NOI and a cap rate.
pub const COMMERCIAL_TYPES: [&str; 17] = [
    "Office",
    "Medical Office",
    "Mixed Use",
    "Retail Store",
    "Strip Mall",
    "Hotel",
    "Supermarket/Grocery",
    "Enclosed Mall",
    "Outlet Mall",
    "Restaurant/Bar",
    "Gym",
    "Vehicle Dealership",
    "Wholesale Club",
    "Bank Branch",
    "Venue",
    "Theater",
    "Sports/Gaming Center",
];

/// Energy spend as a share of gross income.
const ENERGY_SHARE_OF_INCOME: f64 = 0.12;
const NOI_MARGIN: f64 = 0.60;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Valuation {
    pub odcv_savings_usd: f64,
    pub opex_avoided_usd: f64,
    /// Only for commercial types with a cap rate.
    pub property: Option<PropertyValue>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertyValue {
    pub current_usd: f64,
    pub post_odcv_usd: f64,
    pub impact_usd: f64,
}

pub fn is_commercial(building_type: &str) -> bool {
    COMMERCIAL_TYPES.contains(&building_type.trim())
}

pub fn valuation_for_row(table: &Table, row: usize) -> Valuation {
    let cost = |fuel: Fuel| table.get_f64(row, fuel.cost_column()).unwrap_or(0.0);
    let pct = |fuel: Fuel| table.get_f64(row, fuel.hvac_pct_column()).unwrap_or(0.0);

    let hvac_cost: f64 = Fuel::ALL.iter().map(|f| cost(*f) * pct(*f)).sum();
    let total_energy_cost: f64 = Fuel::ALL.iter().map(|f| cost(*f)).sum();

    let odcv = table.get_f64(row, "odcv_hvac_savings_pct").unwrap_or(0.0);
    let odcv_savings_usd = hvac_cost * odcv;
    let fine_avoided = table.get_f64(row, "bps_fine_avoided_yr1_usd").unwrap_or(0.0);
    let opex_avoided_usd = odcv_savings_usd + fine_avoided;

    let cap_rate = table.get_f64(row, "val_cap_rate_pct").unwrap_or(0.0);
    let property = (is_commercial(table.get(row, "bldg_type")) && cap_rate > 0.0).then(|| {
        let impact_usd = opex_avoided_usd / cap_rate;
        let noi = total_energy_cost / ENERGY_SHARE_OF_INCOME * NOI_MARGIN;
        let current_usd = noi / cap_rate;
        PropertyValue {
            current_usd,
            post_odcv_usd: current_usd + impact_usd,
            impact_usd,
        }
    });

    Valuation {
        odcv_savings_usd,
        opex_avoided_usd,
        property,
    }
}

pub fn calculate_valuation(table: &mut Table) -> usize {
    let mut valued = 0;
    let mut impact_by_type: HashMap<String, (usize, f64)> = HashMap::new();

    for row in 0..table.len() {
        let v = valuation_for_row(table, row);
        let money = |x: f64| fmt_value(x, 2);

        table.set(row, "odcv_hvac_savings_annual_usd", money(v.odcv_savings_usd));
        table.set(row, "savings_opex_avoided_annual_usd", money(v.opex_avoided_usd));
        match v.property {
            Some(p) => {
                table.set(row, "val_current_usd", money(p.current_usd));
                table.set(row, "val_post_odcv_usd", money(p.post_odcv_usd));
                table.set(row, "val_odcv_impact_usd", money(p.impact_usd));
                valued += 1;

                let entry = impact_by_type
                    .entry(table.get(row, "bldg_type").to_string())
                    .or_insert((0, 0.0));
                entry.0 += 1;
                entry.1 += p.impact_usd;
            }
            None => {
                table.set(row, "val_current_usd", "");
                table.set(row, "val_post_odcv_usd", "");
                table.set(row, "val_odcv_impact_usd", "");
            }
        }
    }

    let mut by_type: Vec<_> = impact_by_type.into_iter().collect();
    by_type.sort_by(|a, b| b.1 .1.partial_cmp(&a.1 .1).unwrap_or(std::cmp::Ordering::Equal));
    for (ty, (count, total)) in &by_type {
        info!(building_type = %ty, count, total_impact_usd = *total, "valuation impact by type");
    }
    valued
}
