//! Static HTML reports: one page per building plus a sortable index.

use crate::carbon::{bps_law, BpsLaw, BpsMethod};
use crate::energy::Fuel;
use crate::format::{
    attr_escape, display_building_type, format_carbon, format_currency, format_number, format_sqft,
    html_escape, slugify, vertical_color,
};
use crate::logos::logo_filename;
use crate::table::Table;
use anyhow::{Context, Result};
use serde_json::json;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.27.0.min.js";
const CURRENT_COLOR: &str = "#94a3b8";
const POST_ODCV_COLOR: &str = "#16a34a";
const ORG_COLUMNS: [&str; 3] = ["org_owner", "org_manager", "org_tenant"];

const STYLE: &str = r#"
body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; margin: 0; background: #f8fafc; color: #0f172a; }
header { background: #0f172a; color: #fff; padding: 24px 32px; display: flex; align-items: center; gap: 24px; }
header h1 { margin: 0 0 4px 0; font-size: 26px; }
header .sub { color: #cbd5e1; }
header img.logo { height: 56px; background: #fff; padding: 6px; border-radius: 6px; }
main { padding: 24px 32px; }
.kpis { display: grid; grid-template-columns: repeat(auto-fit, minmax(180px, 1fr)); gap: 16px; margin-bottom: 24px; }
.kpi { background: #fff; border-radius: 8px; padding: 16px; box-shadow: 0 1px 3px rgba(0,0,0,.08); }
.kpi .label { font-size: 12px; text-transform: uppercase; color: #64748b; }
.kpi .value { font-size: 24px; font-weight: 600; margin-top: 6px; }
.panel { background: #fff; border-radius: 8px; padding: 16px; margin-bottom: 24px; box-shadow: 0 1px 3px rgba(0,0,0,.08); }
.badge { display: inline-block; padding: 2px 8px; border-radius: 10px; color: #fff; font-size: 12px; }
img.building { max-width: 100%; border-radius: 8px; }
table { border-collapse: collapse; width: 100%; }
th, td { text-align: left; padding: 8px 10px; border-bottom: 1px solid #e2e8f0; }
th { background: #f1f5f9; font-size: 12px; text-transform: uppercase; color: #475569; }
tfoot td { font-weight: 600; }
a { color: #0066cc; }
"#;

#[derive(Debug, Clone, PartialEq)]
pub struct FuelEnergy {
    pub label: &'static str,
    pub current_kbtu: f64,
    pub post_odcv_kbtu: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildingSummary {
    pub id: String,
    /// File stem of the page and image asset, unique within one report run.
    pub slug: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub building_type: String,
    pub vertical: String,
    pub organization: String,
    pub sqft: Option<f64>,
    pub odcv_pct: Option<f64>,
    pub savings_usd: f64,
    pub opex_avoided_usd: f64,
    pub valuation_impact_usd: Option<f64>,
    pub emissions_mt: f64,
    pub carbon_reduction_mt: f64,
    pub fine_baseline_usd: f64,
    pub fine_avoided_usd: f64,
    pub energy: Vec<FuelEnergy>,
}

impl BuildingSummary {
    pub fn page_path(&self) -> String {
        format!("buildings/{}.html", self.slug)
    }

    fn title(&self) -> &str {
        if self.name.is_empty() {
            &self.address
        } else {
            &self.name
        }
    }
}

/// Reads one portfolio row; rows without an id have no page.
pub fn building_from_row(table: &Table, row: usize) -> Option<BuildingSummary> {
    let text = |column: &str| table.get(row, column).trim().to_string();
    let money = |column: &str| table.get_f64(row, column).unwrap_or(0.0);

    let id = text("id_building");
    let slug = slugify(&id);
    if slug.is_empty() {
        return None;
    }
    let organization = ORG_COLUMNS
        .iter()
        .map(|c| text(*c))
        .find(|v| !v.is_empty())
        .unwrap_or_default();
    let energy = Fuel::ALL
        .iter()
        .filter_map(|fuel| {
            let current = table.get_f64(row, fuel.usage_column())?;
            let post = table.get_f64(row, fuel.post_odcv_column()).unwrap_or(current);
            (current > 0.0).then_some(FuelEnergy {
                label: fuel.label(),
                current_kbtu: current,
                post_odcv_kbtu: post,
            })
        })
        .collect();

    Some(BuildingSummary {
        id,
        slug,
        name: text("id_property_name"),
        address: text("loc_address"),
        city: text("loc_city"),
        state: text("loc_state"),
        building_type: display_building_type(&text("bldg_type")).to_string(),
        vertical: text("bldg_vertical"),
        organization,
        sqft: table.get_f64(row, "bldg_sqft"),
        odcv_pct: table.get_f64(row, "odcv_hvac_savings_pct"),
        savings_usd: money("odcv_hvac_savings_annual_usd"),
        opex_avoided_usd: money("savings_opex_avoided_annual_usd"),
        valuation_impact_usd: table.get_f64(row, "val_odcv_impact_usd"),
        emissions_mt: money("carbon_emissions_total_mt"),
        carbon_reduction_mt: money("odcv_carbon_reduction_yr1_mt"),
        fine_baseline_usd: money("bps_fine_baseline_yr1_usd"),
        fine_avoided_usd: money("bps_fine_avoided_yr1_usd"),
        energy,
    })
}

/// Plotly `data` and `layout` for the current vs post-ODCV energy bars.
pub fn energy_chart(building: &BuildingSummary) -> serde_json::Value {
    let labels: Vec<&str> = building.energy.iter().map(|e| e.label).collect();
    let current: Vec<f64> = building.energy.iter().map(|e| e.current_kbtu).collect();
    let post: Vec<f64> = building.energy.iter().map(|e| e.post_odcv_kbtu).collect();
    json!({
        "data": [
            { "type": "bar", "name": "Current", "x": labels, "y": current, "marker": { "color": CURRENT_COLOR } },
            { "type": "bar", "name": "With ODCV", "x": labels, "y": post, "marker": { "color": POST_ODCV_COLOR } }
        ],
        "layout": {
            "barmode": "group",
            "title": { "text": "Annual Energy Use (kBtu)" },
            "yaxis": { "title": { "text": "kBtu" } },
            "margin": { "t": 48, "r": 16, "b": 48, "l": 72 }
        }
    })
}

/// JSON for an inline `<script>`; `</` must not close the tag early.
fn script_json(value: &serde_json::Value) -> String {
    value.to_string().replace("</", "<\\/")
}

fn kpi(label: &str, value: &str) -> String {
    format!(
        r#"<div class="kpi"><div class="label">{}</div><div class="value">{}</div></div>"#,
        html_escape(label),
        html_escape(value)
    )
}

fn bps_method_text(method: BpsMethod) -> &'static str {
    match method {
        BpsMethod::EmissionCap => "Emissions cap per square foot",
        BpsMethod::BaselineReduction => "Reduction from baseline",
        BpsMethod::EnergyStarTarget => "ENERGY STAR score target",
        BpsMethod::EuiTarget => "Site EUI target",
    }
}

fn bps_section(law: &BpsLaw, building: &BuildingSummary) -> String {
    let mut rows = vec![
        ("Law", html_escape(law.law)),
        ("Compliance", bps_method_text(law.method).to_string()),
        ("Penalty", html_escape(law.penalty)),
        ("Target", html_escape(law.cap)),
        ("Covered buildings", format!("{} sq ft and larger", format_number(Some(law.min_sqft), 0))),
    ];
    if law.fine_per_tco2e.is_some() {
        rows.push(("Year 1 fine", format_currency(Some(building.fine_baseline_usd))));
        rows.push(("Fine avoided with ODCV", format_currency(Some(building.fine_avoided_usd))));
    }
    let body: String = rows
        .iter()
        .map(|(k, v)| format!("<tr><th>{}</th><td>{}</td></tr>", k, v))
        .collect();
    format!(
        r#"<section class="panel"><h2>Building Performance Standard</h2><table>{}</table><p><a href="{}" target="_blank" rel="noopener">Source</a></p></section>"#,
        body,
        attr_escape(law.source_url)
    )
}

/// Asset paths are relative to the page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageAssets {
    pub image: Option<String>,
    pub logo: Option<String>,
}

pub fn render_building_page(building: &BuildingSummary, assets: &PageAssets) -> String {
    let title = building.title();
    let location = [building.address.as_str(), building.city.as_str(), building.state.as_str()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    let logo = assets
        .logo
        .as_ref()
        .map(|src| {
            format!(
                r#"<img class="logo" src="{}" alt="{}">"#,
                attr_escape(src),
                attr_escape(&building.organization)
            )
        })
        .unwrap_or_default();
    let image = assets
        .image
        .as_ref()
        .map(|src| {
            format!(
                r#"<section class="panel"><img class="building" src="{}" alt="{}"></section>"#,
                attr_escape(src),
                attr_escape(title)
            )
        })
        .unwrap_or_default();

    let mut kpis = vec![
        kpi("Annual HVAC Savings", &format_currency(Some(building.savings_usd))),
        kpi("OpEx Avoided / yr", &format_currency(Some(building.opex_avoided_usd))),
        kpi("Valuation Impact", &format_currency(building.valuation_impact_usd)),
        kpi("Carbon Reduction (tCO2e/yr)", &format_carbon(building.carbon_reduction_mt)),
    ];
    if building.fine_avoided_usd > 0.0 {
        kpis.push(kpi("BPS Fine Avoided", &format_currency(Some(building.fine_avoided_usd))));
    }

    let chart = if building.energy.is_empty() {
        String::new()
    } else {
        let chart = energy_chart(building);
        format!(
            r#"<section class="panel"><div id="energy-chart" style="height:380px"></div>
<script>
const chart = {};
Plotly.newPlot('energy-chart', chart.data, chart.layout, {{ responsive: true, displayModeBar: false }});
</script></section>"#,
            script_json(&chart)
        )
    };

    let bps = bps_law(&building.city)
        .map(|law| bps_section(law, building))
        .unwrap_or_default();

    let odcv = building
        .odcv_pct
        .map(|p| format!("{:.0}%", p * 100.0))
        .unwrap_or_else(|| crate::format::MISSING.to_string());
    let sqft = building.sqft.map(format_sqft).unwrap_or_else(|| crate::format::MISSING.to_string());

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} | ODCV Prospector</title>
<script src="{plotly}"></script>
<style>{style}</style>
</head>
<body>
<header>{logo}<div><h1>{title}</h1><div class="sub">{location}</div>
<div class="sub"><span class="badge" style="background:{color}">{building_type}</span> {sqft} sq ft · ODCV HVAC savings {odcv}</div></div></header>
<main>
<div class="kpis">{kpis}</div>
{image}
{chart}
{bps}
<p><a href="../index.html">All buildings</a></p>
</main>
</body>
</html>
"#,
        title = html_escape(title),
        plotly = PLOTLY_CDN,
        style = STYLE,
        logo = logo,
        location = html_escape(&location),
        color = vertical_color(&building.vertical),
        building_type = html_escape(&building.building_type),
        sqft = sqft,
        odcv = odcv,
        kpis = kpis.join(""),
        image = image,
        chart = chart,
        bps = bps,
    )
}

/// Buildings are listed by annual OpEx avoided, largest first.
pub fn render_index(buildings: &[BuildingSummary]) -> String {
    let mut sorted: Vec<&BuildingSummary> = buildings.iter().collect();
    sorted.sort_by(|a, b| {
        b.opex_avoided_usd
            .partial_cmp(&a.opex_avoided_usd)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let rows: String = sorted
        .iter()
        .map(|b| {
            format!(
                r#"<tr data-opex="{opex}"><td><a href="{href}">{title}</a></td><td>{city}</td><td>{ty}</td><td>{sqft}</td><td>{valuation}</td><td>{carbon}</td><td>{savings}</td></tr>"#,
                opex = b.opex_avoided_usd,
                href = attr_escape(&b.page_path()),
                title = html_escape(b.title()),
                city = html_escape(&b.city),
                ty = html_escape(&b.building_type),
                sqft = b.sqft.map(format_sqft).unwrap_or_default(),
                valuation = format_currency(b.valuation_impact_usd),
                carbon = format_carbon(b.carbon_reduction_mt),
                savings = format_currency(Some(b.opex_avoided_usd)),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let total_sqft: f64 = buildings.iter().filter_map(|b| b.sqft).sum();
    let total_valuation: f64 = buildings.iter().filter_map(|b| b.valuation_impact_usd).sum();
    let total_carbon: f64 = buildings.iter().map(|b| b.carbon_reduction_mt).sum();
    let total_opex: f64 = buildings.iter().map(|b| b.opex_avoided_usd).sum();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Nationwide ODCV Prospector</title>
<style>{style}</style>
</head>
<body>
<header><div><h1>Nationwide ODCV Prospector</h1><div class="sub">{count} buildings</div></div></header>
<main>
<div class="kpis">{kpis}</div>
<section class="panel"><table>
<thead><tr><th>Building</th><th>City</th><th>Type</th><th>Sq Ft</th><th>Val. Impact</th><th>tCO2e/yr</th><th>Savings/yr</th></tr></thead>
<tbody>
{rows}
</tbody>
<tfoot><tr><td>Total</td><td></td><td></td><td>{sqft}</td><td>{valuation}</td><td>{carbon}</td><td>{opex}</td></tr></tfoot>
</table></section>
</main>
</body>
</html>
"#,
        style = STYLE,
        count = format_number(Some(buildings.len() as f64), 0),
        kpis = [
            kpi("Total Savings / yr", &format_currency(Some(total_opex))),
            kpi("Total Valuation Impact", &format_currency(Some(total_valuation))),
            kpi("Carbon Reduction (tCO2e/yr)", &format_carbon(total_carbon)),
            kpi("Total Sq Ft", &format_sqft(total_sqft)),
        ]
        .join(""),
        rows = rows,
        sqft = format_sqft(total_sqft),
        valuation = format_currency(Some(total_valuation)),
        carbon = format_carbon(total_carbon),
        opex = format_currency(Some(total_opex)),
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportStats {
    pub pages: usize,
    pub with_image: usize,
    pub with_logo: usize,
}

/// Ids that slugify alike ("NYC 1", "nyc-1") get `-2`, `-3`, ... in row order.
pub fn dedupe_slugs(buildings: &mut [BuildingSummary]) {
    let mut taken: HashSet<String> = buildings.iter().map(|b| b.slug.clone()).collect();
    let mut seen: HashSet<String> = HashSet::new();
    for building in buildings.iter_mut() {
        if seen.insert(building.slug.clone()) {
            continue;
        }
        let base = building.slug.clone();
        let unique = (2..)
            .map(|n| format!("{}-{}", base, n))
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or(base);
        taken.insert(unique.clone());
        seen.insert(unique.clone());
        building.slug = unique;
    }
}

/// Copies an asset under `<html_dir>/assets/` and returns its page-relative path.
fn copy_asset(source: &Path, assets_dir: &Path, file_name: &str) -> Result<Option<String>> {
    if !source.is_file() {
        return Ok(None);
    }
    let target: PathBuf = assets_dir.join(file_name);
    fs::copy(source, &target)
        .with_context(|| format!("Failed to copy {} to {}", source.display(), target.display()))?;
    Ok(Some(format!("../assets/{}", file_name)))
}

pub fn generate_reports(
    table: &Table,
    html_dir: &Path,
    images_dir: &Path,
    logos_dir: &Path,
) -> Result<ReportStats> {
    let pages_dir = html_dir.join("buildings");
    let assets_dir = html_dir.join("assets");
    for dir in [&pages_dir, &assets_dir] {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let mut buildings: Vec<BuildingSummary> = (0..table.len())
        .filter_map(|row| building_from_row(table, row))
        .collect();
    dedupe_slugs(&mut buildings);

    let mut stats = ReportStats::default();
    for building in &buildings {
        let image = copy_asset(
            &images_dir.join(format!("{}.jpg", building.id)),
            &assets_dir,
            &format!("{}.jpg", building.slug),
        )?;
        let logo = if building.organization.is_empty() {
            None
        } else {
            let file = logo_filename(&building.organization);
            copy_asset(&logos_dir.join(&file), &assets_dir, &file)?
        };
        stats.with_image += usize::from(image.is_some());
        stats.with_logo += usize::from(logo.is_some());

        let html = render_building_page(building, &PageAssets { image, logo });
        let path = html_dir.join(building.page_path());
        fs::write(&path, html).with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(page = %path.display(), "building page written");
        stats.pages += 1;
    }

    let index = html_dir.join("index.html");
    fs::write(&index, render_index(&buildings))
        .with_context(|| format!("Failed to write {}", index.display()))?;
    info!(pages = stats.pages, images = stats.with_image, logos = stats.with_logo, "reports generated");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn building(id: &str, city: &str, opex: f64) -> BuildingSummary {
        BuildingSummary {
            id: id.to_string(),
            slug: slugify(id),
            name: format!("Tower {}", id),
            address: "1 Main St".to_string(),
            city: city.to_string(),
            state: "NY".to_string(),
            building_type: "Office".to_string(),
            vertical: "Commercial".to_string(),
            organization: "Acme Realty".to_string(),
            sqft: Some(250_000.0),
            odcv_pct: Some(0.22),
            savings_usd: opex * 0.8,
            opex_avoided_usd: opex,
            valuation_impact_usd: Some(opex / 0.06),
            emissions_mt: 1_500.0,
            carbon_reduction_mt: 120.0,
            fine_baseline_usd: 50_000.0,
            fine_avoided_usd: 30_000.0,
            energy: vec![FuelEnergy {
                label: "Electricity",
                current_kbtu: 1_000_000.0,
                post_odcv_kbtu: 900_000.0,
            }],
        }
    }

    #[test]
    fn chart_json_has_both_series() {
        let chart = energy_chart(&building("A", "Boston", 1.0));
        assert_eq!(chart["data"][0]["name"], "Current");
        assert_eq!(chart["data"][1]["y"][0], 900_000.0);
        assert_eq!(chart["layout"]["barmode"], "group");
    }

    #[test]
    fn page_includes_kpis_and_bps_details() {
        let b = building("NYC/1", "New York", 250_000.0);
        let html = render_building_page(&b, &PageAssets::default());
        assert!(html.contains("Tower NYC/1"));
        assert!(html.contains("$250K"));
        assert!(html.contains("NYC Local Law 97"));
        assert!(html.contains("BPS Fine Avoided"));
        assert!(html.contains("Plotly.newPlot"));
        assert_eq!(b.page_path(), "buildings/nyc1.html");
    }

    #[test]
    fn script_json_cannot_close_the_tag() {
        let mut b = building("X", "Denver", 1.0);
        b.energy[0].label = "</script>";
        let html = render_building_page(&b, &PageAssets::default());
        assert!(!html.contains("\"</script>\""));
    }

    #[test]
    fn index_is_sorted_by_savings_with_totals() {
        let buildings = vec![
            building("small", "Denver", 10_000.0),
            building("big", "Denver", 900_000.0),
        ];
        let html = render_index(&buildings);
        let big = html.find("Tower big").unwrap();
        let small = html.find("Tower small").unwrap();
        assert!(big < small);
        assert!(html.contains("$910K"));
    }

    #[test]
    fn colliding_ids_get_distinct_pages() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        fs::create_dir_all(&images).unwrap();
        fs::write(images.join("NYC 1.jpg"), b"first").unwrap();
        fs::write(images.join("nyc-1.jpg"), b"second").unwrap();

        let mut table = Table::new(vec!["id_building".to_string(), "id_property_name".to_string()]);
        for (id, name) in [("NYC 1", "First Tower"), ("nyc-1", "Second Tower"), ("nyc-1-2", "Third Tower")] {
            table.push_row(vec![id.to_string(), name.to_string()]);
        }

        let html = dir.path().join("html");
        let stats = generate_reports(&table, &html, &images, &dir.path().join("logos")).unwrap();
        assert_eq!(stats.pages, 3);
        assert_eq!(stats.with_image, 2);

        let page = |slug: &str| fs::read_to_string(html.join(format!("buildings/{}.html", slug))).unwrap();
        assert!(page("nyc-1").contains("First Tower"));
        assert!(page("nyc-1-3").contains("Second Tower"));
        assert!(page("nyc-1-2").contains("Third Tower"));
        assert_eq!(fs::read(html.join("assets/nyc-1-3.jpg")).unwrap(), b"second");

        let index = fs::read_to_string(html.join("index.html")).unwrap();
        for slug in ["nyc-1", "nyc-1-2", "nyc-1-3"] {
            assert!(index.contains(&format!("href=\"buildings/{}.html\"", slug)), "{slug}");
        }
    }
}
