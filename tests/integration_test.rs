//! End-to-end runs of the CSV tools on temporary files.

use anyhow::Result;
use odcv_prospector::fixer::{self, Action, FixerOptions};
use odcv_prospector::http::{FetchOutcome, PageFetcher};
use odcv_prospector::links::{self, LinkStatus, OrgLink};
use odcv_prospector::matcher::{buildings_from_table, find_matches, load_stores, write_matches, TenantIssue};
use odcv_prospector::pipeline::run_pipeline;
use odcv_prospector::rates::{apply_rates, RateTables};
use odcv_prospector::report::generate_reports;
use odcv_prospector::search::{OrganicResult, WebSearcher};
use odcv_prospector::table::Table;
use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

fn write_csv(path: &Path, rows: &[&[&str]]) {
    let mut writer = csv::Writer::from_path(path).unwrap();
    for row in rows {
        writer.write_record(*row).unwrap();
    }
    writer.flush().unwrap();
}

const PORTFOLIO_HEADERS: &[&str] = &[
    "id_building",
    "id_property_name",
    "bldg_type",
    "bldg_sqft",
    "bldg_year_built",
    "loc_address",
    "loc_city",
    "loc_state",
    "occ_vacancy_rate",
    "occ_utilization_rate",
    "energy_elec_kwh",
    "energy_elec_kbtu",
    "energy_gas_kbtu",
    "hvac_pct_elec",
    "hvac_pct_gas",
    "cost_elec_rate_kwh",
    "cost_gas_rate_therm",
    "val_cap_rate_pct",
    "org_owner",
    "bldg_vertical",
    "energy_star_score",
    "energy_site_eui",
];

fn write_portfolio(path: &Path) {
    write_csv(
        path,
        &[
            PORTFOLIO_HEADERS,
            &[
                "NYC_100", "Harbor Tower", "Office", "200000", "1985", "100 Water St", "New York", "NY",
                "0.2", "0.5", "2000000", "6824000", "3000000", "0.4", "0.9", "0.2", "1.2", "0.06",
                "Acme Realty", "", "55", "85",
            ],
            &[
                "DEN_7", "", "K-12 School", "80000", "", "7 Pine St", "Denver", "CO",
                "", "", "", "", "1500000", "0.0", "0.8", "", "1.0", "", "", "Commercial", "", "",
            ],
        ],
    );
}

#[test]
fn populate_fills_every_derived_column() {
    let dir = tempfile::tempdir().unwrap();
    let portfolio = dir.path().join("portfolio.csv");
    let backups = dir.path().join("backups");
    write_portfolio(&portfolio);

    let report = run_pipeline(&portfolio, &backups, None).unwrap();
    assert_eq!(report.rows, 2);
    assert_eq!(report.steps.len(), 11);
    assert_eq!(fs::read_dir(&backups).unwrap().count(), 1);

    let table = Table::load(&portfolio).unwrap();
    assert_eq!(table.get(0, "bldg_vertical"), "Commercial");
    assert_eq!(table.get(1, "bldg_vertical"), "Education");
    assert_eq!(table.get(0, "cost_elec_total_annual"), "440000.00");
    assert_eq!(table.get(0, "cost_gas_annual"), "39600.00");

    let pct = table.get_f64(0, "odcv_hvac_savings_pct").unwrap();
    assert!((0.20..=0.50).contains(&pct));

    let savings = table.get_f64(0, "odcv_hvac_savings_annual_usd").unwrap();
    assert!((savings - (440_000.0 * 0.4 + 39_600.0 * 0.9) * pct).abs() < 0.02);

    let before = table.get_f64(0, "energy_elec_kbtu").unwrap();
    let after = table.get_f64(0, "energy_elec_kbtu_post_odcv").unwrap();
    assert!(after < before);

    assert!(table.get_f64(0, "carbon_emissions_total_mt").unwrap() > 0.0);
    assert!(!table.get(0, "bps_fine_baseline_yr1_usd").is_empty());
    assert!(table.get_f64(0, "val_odcv_impact_usd").unwrap() > 0.0);

    let star = table.get_f64(0, "energy_star_score_post_odcv").unwrap();
    assert!(star > 55.0 && star <= 99.0);
    assert_eq!(table.get(1, "energy_star_score_post_odcv"), "");

    // schools are never valued
    assert_eq!(table.get(1, "val_current_usd"), "");
    assert_eq!(table.get(1, "bps_fine_avoided_yr1_usd"), "0.00");
}

#[test]
fn failed_step_leaves_portfolio_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let portfolio = dir.path().join("portfolio.csv");
    write_csv(&portfolio, &[&["id_building", "loc_city"], &["X1", "Boston"]]);
    let original = fs::read_to_string(&portfolio).unwrap();

    let err = run_pipeline(&portfolio, dir.path().join("backups"), None).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("align-verticals"));
    assert!(message.contains("backup available"));
    assert_eq!(fs::read_to_string(&portfolio).unwrap(), original);
}

#[test]
fn bundled_rates_update_matching_rows_only() {
    let tables = RateTables::bundled().unwrap();
    let hotel = tables.vertical("hotel").unwrap();

    let mut table = Table::new(vec!["bldg_type".into(), "loc_city".into(), "loc_state".into()]);
    table.push_row(vec!["Hotel".into(), "Nowhere".into(), "ZZ".into()]);
    table.push_row(vec!["Office".into(), "Boston".into(), "MA".into()]);

    let stats = apply_rates(&mut table, hotel);
    assert_eq!(stats.updated, 1);
    assert_eq!(table.get(0, "occ_vacancy_rate"), "0.0000");
    let util = table.get_f64(0, "occ_utilization_rate").unwrap();
    assert!(util > 0.0 && util <= 1.0);
    assert_eq!(table.get(1, "occ_utilization_rate"), "");
}

#[test]
fn stores_are_matched_and_written() {
    let dir = tempfile::tempdir().unwrap();
    let stores_path = dir.path().join("stores.csv");
    write_csv(
        &stores_path,
        &[
            &["retailer", "store_name", "street", "city", "state", "zip", "lat", "lon"],
            &["Target", "Target Fenway", "1341 Boylston St", "Boston", "MA", "02215", "42.3453", "-71.0977"],
            &["Costco", "Costco Dorchester", "7 Allstate Rd", "Boston", "MA", "02125", "", ""],
        ],
    );

    let mut portfolio = Table::new(
        ["id_building", "bldg_type", "loc_address", "loc_city", "loc_state", "loc_lat", "loc_lon", "org_tenant"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    );
    portfolio.push_row(
        ["B1", "Retail Store", "1341 Boylston Street", "Boston", "MA", "42.34532", "-71.09771", "Walgreens"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    );

    let stores = load_stores(&stores_path).unwrap();
    let buildings = buildings_from_table(&portfolio, &["Retail Store".to_string()]);
    let report = find_matches(&buildings, &stores, 50.0);
    assert_eq!(report.matches.len(), 1);
    assert_eq!(report.matches[0].issue, TenantIssue::WrongTenant);

    let output = dir.path().join("matches.csv");
    write_matches(&report, &output).unwrap();
    let written = Table::load(&output).unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written.get(0, "matched_retailer"), "Target");
    assert_eq!(written.get(0, "issue"), "WRONG_TENANT");
}

struct FakeWeb {
    pages: HashMap<String, FetchOutcome>,
}

impl PageFetcher for FakeWeb {
    fn fetch(&self, url: &str) -> impl Future<Output = FetchOutcome> + Send {
        let outcome = self
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| FetchOutcome::ConnectFailed("dns error".to_string()));
        async move { outcome }
    }
}

struct FakeSearch;

impl WebSearcher for FakeSearch {
    fn web_search(&self, query: &str) -> impl Future<Output = Result<Vec<OrganicResult>>> + Send {
        let results = if query.starts_with("Gone Holdings") {
            vec![OrganicResult {
                title: "Gone Holdings".to_string(),
                link: "https://www.goneholdings.net/about".to_string(),
            }]
        } else {
            Vec::new()
        };
        async move { Ok(results) }
    }
}

fn page(status: u16, body: &str) -> FetchOutcome {
    FetchOutcome::Response {
        status,
        body: Some(body.to_string()),
    }
}

#[tokio::test]
async fn dead_links_are_found_and_fixed() {
    let dir = tempfile::tempdir().unwrap();
    let web = FakeWeb {
        pages: HashMap::from([
            ("https://healthy.com".to_string(), page(200, "<h1>Welcome</h1>")),
            ("https://parked.com".to_string(), page(200, "This domain is for sale at HugeDomains")),
            ("https://gone.com".to_string(), page(404, "not here")),
            ("https://www.goneholdings.net".to_string(), page(200, "<h1>Gone Holdings</h1>")),
        ]),
    };
    let org_links = vec![
        OrgLink { organization: "Healthy Co".into(), url: "healthy.com".into() },
        OrgLink { organization: "Parked LLC".into(), url: "https://parked.com".into() },
        OrgLink { organization: "Gone Holdings".into(), url: "https://gone.com".into() },
        OrgLink { organization: "Vanished Inc".into(), url: "https://vanished.com".into() },
    ];

    let dead_csv = dir.path().join("dead_urls.csv");
    let summary = links::check_links(&web, &org_links, 2, 10, &dead_csv).await.unwrap();
    assert_eq!(summary.checked, 4);
    assert_eq!(summary.count(LinkStatus::Ok), 1);
    assert_eq!(summary.count(LinkStatus::ForSale), 1);
    assert_eq!(summary.count(LinkStatus::Dead), 2);

    let dead = fixer::load_dead_links(&dead_csv).unwrap();
    assert_eq!(dead.len(), 3);

    let options = FixerOptions {
        search_concurrency: 2,
        validate_concurrency: 2,
        search_delay: Duration::from_millis(0),
    };
    let progress = dir.path().join("progress.csv");
    let fixes = fixer::fix_dead_links(&FakeSearch, &web, &dead, options, &progress).await.unwrap();
    let by_org: HashMap<&str, Action> = fixes
        .iter()
        .map(|f| (f.link.organization.as_str(), f.action()))
        .collect();
    assert_eq!(by_org["Gone Holdings"], Action::Replace);
    assert_eq!(by_org["Vanished Inc"], Action::NeedsResearch);
    assert_eq!(by_org["Parked LLC"], Action::NeedsResearch);
    assert_eq!(Table::load(&progress).unwrap().len(), 3);

    let recommendations = dir.path().join("recommendations.csv");
    fixer::write_recommendations(&fixes, &recommendations).unwrap();
    let written = Table::load(&recommendations).unwrap();
    let replace_row = (0..written.len())
        .find(|&r| written.get(r, "organization") == "Gone Holdings")
        .unwrap();
    assert_eq!(written.get(replace_row, "new_url"), "https://www.goneholdings.net");
    assert_eq!(written.get(replace_row, "action"), "REPLACE");
}

#[test]
fn reports_are_generated_for_populated_portfolio() {
    let dir = tempfile::tempdir().unwrap();
    let portfolio = dir.path().join("portfolio.csv");
    write_portfolio(&portfolio);
    run_pipeline(&portfolio, dir.path().join("backups"), None).unwrap();

    let images = dir.path().join("images");
    let logos = dir.path().join("logos");
    fs::create_dir_all(&images).unwrap();
    fs::create_dir_all(&logos).unwrap();
    fs::write(images.join("NYC_100.jpg"), b"jpeg").unwrap();
    fs::write(logos.join("Acme_Realty.png"), b"png").unwrap();

    let html = dir.path().join("html");
    let table = Table::load(&portfolio).unwrap();
    let stats = generate_reports(&table, &html, &images, &logos).unwrap();
    assert_eq!(stats.pages, 2);
    assert_eq!(stats.with_image, 1);
    assert_eq!(stats.with_logo, 1);

    let page = fs::read_to_string(html.join("buildings/nyc_100.html")).unwrap();
    assert!(page.contains("Harbor Tower"));
    assert!(page.contains("../assets/nyc_100.jpg"));
    assert!(page.contains("NYC Local Law 97"));

    let index = fs::read_to_string(html.join("index.html")).unwrap();
    let tower = index.find("Harbor Tower").unwrap();
    let school = index.find("7 Pine St").unwrap();
    assert!(tower < school);
}
