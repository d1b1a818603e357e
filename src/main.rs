use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Arg, ArgAction, ArgMatches, Command};
use odcv_prospector::fixer::{self, FixerOptions};
use odcv_prospector::geocode::{geocode_missing, GoogleGeocoder};
use odcv_prospector::http::build_client;
use odcv_prospector::images::{self, ImageFetcher, StreetView};
use odcv_prospector::links::{self, LinkStatus};
use odcv_prospector::logos::{self, LogoFetcher, LogoStatus};
use odcv_prospector::matcher::{buildings_from_table, find_matches, load_stores, write_matches};
use odcv_prospector::models::{api_key, Config, GOOGLE_KEY_VAR, OPENAI_KEY_VAR, SERPAPI_KEY_VAR};
use odcv_prospector::openai::OpenAiClient;
use odcv_prospector::pipeline::{run_pipeline, Step};
use odcv_prospector::rates::{apply_rates, RateSource, RateTables};
use odcv_prospector::report::generate_reports;
use odcv_prospector::search::SerpApi;
use odcv_prospector::table::{create_backup, Table};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn cli() -> Command {
    Command::new("odcv-prospector")
        .version("0.1.0")
        .about("Data tooling for the Nationwide Prospector ODCV opportunity analysis")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("prospector.toml")
                .global(true),
        )
        .subcommand(Command::new("init-config").about("Write a default configuration file"))
        .subcommand(
            Command::new("rates")
                .about("Assign occupancy and utilization rates by building type and city")
                .arg(
                    Arg::new("type")
                        .short('t')
                        .long("type")
                        .value_name("BUILDING_TYPE")
                        .help("Only update this building type (default: every type in the tables)"),
                )
                .arg(
                    Arg::new("list")
                        .long("list")
                        .action(ArgAction::SetTrue)
                        .help("List the building types with rate tables"),
                ),
        )
        .subcommand(
            Command::new("populate")
                .about("Populate derived energy, savings, carbon and valuation columns")
                .arg(
                    Arg::new("only")
                        .long("only")
                        .value_name("STEP")
                        .help("Run a single step, e.g. post-odcv-energy"),
                ),
        )
        .subcommand(
            Command::new("match-stores")
                .about("Match retail buildings to known store locations")
                .arg(
                    Arg::new("all")
                        .long("all")
                        .action(ArgAction::SetTrue)
                        .help("Consider every building type, not just retail targets"),
                )
                .arg(
                    Arg::new("threshold")
                        .long("threshold")
                        .value_name("METRES")
                        .value_parser(clap::value_parser!(f64))
                        .help("Maximum building to store distance"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Match CSV path (default: <output_dir>/store_matches.csv)"),
                ),
        )
        .subcommand(Command::new("geocode").about("Fill missing store coordinates via Google Geocoding"))
        .subcommand(
            Command::new("check-urls")
                .about("Find dead and parked organization websites")
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Dead URL CSV path (default: <output_dir>/dead_urls.csv)"),
                ),
        )
        .subcommand(
            Command::new("fix-urls")
                .about("Search replacement websites for dead organization URLs")
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .value_name("FILE")
                        .help("Dead URL CSV (default: <output_dir>/dead_urls.csv)"),
                ),
        )
        .subcommand(
            Command::new("fetch-logos")
                .about("Find, validate and save logos for organizations without one")
                .arg(limit_arg()),
        )
        .subcommand(
            Command::new("fetch-images")
                .about("Fetch and vision-check exterior images for buildings without one")
                .arg(limit_arg()),
        )
        .subcommand(Command::new("report").about("Generate the HTML building reports"))
}

fn limit_arg() -> Arg {
    Arg::new("limit")
        .short('n')
        .long("limit")
        .value_name("COUNT")
        .value_parser(clap::value_parser!(usize))
        .help("Process at most this many items")
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let matches = cli().get_matches();
    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("prospector.toml");

    if let Some(("init-config", _)) = matches.subcommand() {
        if Path::new(config_file).exists() {
            println!("📋 {} already exists, leaving it untouched", config_file);
        } else {
            Config::default().save_to_file(config_file)?;
            println!("📝 Wrote default configuration to {}", config_file);
        }
        return Ok(());
    }

    let config = if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)?
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        Config::default().save_to_file(config_file)?;
        println!("⚠️  Please review the paths in {}, then run the command again.", config_file);
        return Ok(());
    };

    let started = Instant::now();
    match matches.subcommand() {
        Some(("rates", args)) => rates(&config, args)?,
        Some(("populate", args)) => populate(&config, args)?,
        Some(("match-stores", args)) => match_stores(&config, args)?,
        Some(("geocode", _)) => geocode(&config).await?,
        Some(("check-urls", args)) => check_urls(&config, args).await?,
        Some(("fix-urls", args)) => fix_urls(&config, args).await?,
        Some(("fetch-logos", args)) => fetch_logos(&config, args).await?,
        Some(("fetch-images", args)) => fetch_images(&config, args).await?,
        Some(("report", _)) => report(&config)?,
        _ => bail!("unknown command"),
    }
    info!(seconds = started.elapsed().as_secs_f64(), "done");
    Ok(())
}

fn output_path(config: &Config, args: &ArgMatches, id: &str, default_name: &str) -> PathBuf {
    args.get_one::<String>(id)
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(&config.paths.output_dir).join(default_name))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

fn rate_tables(config: &Config) -> Result<RateTables> {
    match &config.rates_file {
        Some(path) => RateTables::load_from_file(path),
        None => RateTables::bundled(),
    }
}

fn rates(config: &Config, args: &ArgMatches) -> Result<()> {
    let tables = rate_tables(config)?;
    if args.get_flag("list") {
        println!("📋 Building types with rate tables:");
        for building_type in tables.building_types() {
            println!("   • {}", building_type);
        }
        return Ok(());
    }

    let verticals = match args.get_one::<String>("type") {
        Some(wanted) => vec![tables
            .vertical(wanted)
            .with_context(|| format!("No rate table for building type '{}'", wanted))?],
        None => tables.verticals.iter().collect(),
    };

    let portfolio = &config.paths.portfolio;
    let backup = create_backup(portfolio, &config.paths.backup_dir)?;
    let mut table = Table::load(portfolio)?;
    println!("🏢 Loaded {} buildings from {}", table.len(), portfolio);

    for vertical in verticals {
        let stats = apply_rates(&mut table, vertical);
        println!(
            "   ✅ {}: {} updated (city {}, state {}, default {})",
            stats.building_type,
            stats.updated,
            stats.count(RateSource::City),
            stats.count(RateSource::State),
            stats.count(RateSource::Default)
        );
    }
    table.save(portfolio)?;
    println!("💾 Saved {} (backup: {})", portfolio, backup.display());
    Ok(())
}

fn populate(config: &Config, args: &ArgMatches) -> Result<()> {
    let only = args
        .get_one::<String>("only")
        .map(|s| s.parse::<Step>())
        .transpose()?;
    let report = run_pipeline(&config.paths.portfolio, &config.paths.backup_dir, only)?;

    println!("\n📊 POPULATE SUMMARY");
    println!("===================");
    println!("🏢 Buildings: {}", report.rows);
    for (step, updated) in &report.steps {
        println!("   ✅ {:<18} {} rows: {}", step.name(), updated, step.description());
    }
    println!("💾 Backup: {}", report.backup.display());
    Ok(())
}

fn match_stores(config: &Config, args: &ArgMatches) -> Result<()> {
    let threshold = args
        .get_one::<f64>("threshold")
        .copied()
        .unwrap_or(config.matching.distance_threshold_m);
    let target_types: &[String] = if args.get_flag("all") {
        &[]
    } else {
        &config.matching.target_types
    };

    let table = Table::load(&config.paths.portfolio)?;
    let buildings = buildings_from_table(&table, target_types);
    let stores = load_stores(&config.paths.stores)?;
    println!("🏢 {} buildings with coordinates, 🏬 {} stores", buildings.len(), stores.len());

    let report = find_matches(&buildings, &stores, threshold);
    let output = output_path(config, args, "output", "store_matches.csv");
    ensure_parent(&output)?;
    write_matches(&report, &output)?;

    println!("\n📊 MATCH SUMMARY");
    println!("================");
    println!("🔍 Comparisons: {}", report.comparisons);
    println!("✅ Matches within {:.0} m: {}", threshold, report.matches.len());
    for (issue, count) in report.issue_counts() {
        println!("   {:<16} {}", issue.as_str(), count);
    }
    println!("🏬 By retailer:");
    for (retailer, count) in report.retailer_counts().iter().take(15) {
        println!("   {:<30} {}", retailer, count);
    }
    println!("💾 Saved: {}", output.display());
    Ok(())
}

async fn geocode(config: &Config) -> Result<()> {
    let key = api_key(GOOGLE_KEY_VAR)?;
    let client = build_client(&config.http)?;
    let geocoder = GoogleGeocoder::new(client, key);

    let stores = &config.paths.stores;
    let backup = create_backup(stores, &config.paths.backup_dir)?;
    let mut table = Table::load(stores)?;
    let stats = geocode_missing(&geocoder, &mut table, config.http.search_concurrency).await;
    table.save(stores)?;

    println!("📍 Geocoded {} of {} stores ({} failed)", stats.found, stats.attempted, stats.failed);
    println!("💾 Saved {} (backup: {})", stores, backup.display());
    Ok(())
}

async fn check_urls(config: &Config, args: &ArgMatches) -> Result<()> {
    let client = build_client(&config.http)?;
    let org_links = links::load_org_links(&config.paths.organizations)?;
    let output = output_path(config, args, "output", "dead_urls.csv");
    ensure_parent(&output)?;
    println!("🌐 Checking {} organization URLs...", org_links.len());

    let summary = links::check_links(
        &client,
        &org_links,
        config.http.max_concurrent,
        config.http.timeout_secs,
        &output,
    )
    .await?;

    println!("\n📊 URL CHECK SUMMARY");
    println!("====================");
    for status in [LinkStatus::Ok, LinkStatus::ForSale, LinkStatus::Dead, LinkStatus::Timeout, LinkStatus::Error] {
        println!("   {:<9} {}", status.as_str(), summary.count(status));
    }
    println!("💾 Problems saved to: {}", output.display());
    Ok(())
}

async fn fix_urls(config: &Config, args: &ArgMatches) -> Result<()> {
    let serp = SerpApi::new(build_client(&config.http)?, api_key(SERPAPI_KEY_VAR)?);
    let client = build_client(&config.http)?;

    let input = output_path(config, args, "input", "dead_urls.csv");
    if !input.exists() {
        bail!("{} not found; run check-urls first", input.display());
    }
    let dead = fixer::load_dead_links(&input)?;
    println!("🔍 {} genuinely dead or parked URLs", dead.len());
    if dead.is_empty() {
        return Ok(());
    }

    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let out_dir = Path::new(&config.paths.output_dir);
    std::fs::create_dir_all(out_dir)?;
    let progress = out_dir.join(format!("url_fix_progress_{}.csv", stamp));
    let recommendations = out_dir.join(format!("url_fix_recommendations_{}.csv", stamp));

    let options = FixerOptions {
        search_concurrency: config.http.search_concurrency,
        validate_concurrency: config.http.validate_concurrency,
        search_delay: Duration::from_millis(config.http.search_delay_ms),
    };
    let fixes = fixer::fix_dead_links(&serp, &client, &dead, options, &progress).await?;
    fixer::write_recommendations(&fixes, &recommendations)?;

    let found = fixes.iter().filter(|f| f.new_url.is_some()).count();
    let valid = fixes.iter().filter(|f| f.validated).count();
    println!("\n📊 URL FIX SUMMARY");
    println!("==================");
    println!("Dead URLs:          {}", dead.len());
    println!("Replacements found: {}", found);
    println!("Validated:          {}", valid);
    println!("Needs research:     {}", dead.len() - found);
    println!("💾 Progress:        {}", progress.display());
    println!("💾 Recommendations: {}", recommendations.display());
    println!("⚠️  Review the recommendations before applying any change.");
    Ok(())
}

async fn fetch_logos(config: &Config, args: &ArgMatches) -> Result<()> {
    let serp = SerpApi::new(build_client(&config.http)?, api_key(SERPAPI_KEY_VAR)?);
    let openai = OpenAiClient::new(build_client(&config.http)?, api_key(OPENAI_KEY_VAR)?, &config.openai);
    let downloader = build_client(&config.http)?;

    let mut orgs = logos::orgs_without_logos(&config.paths.organizations)?;
    if let Some(limit) = args.get_one::<usize>("limit") {
        orgs.truncate(*limit);
    }
    println!("🎯 {} organizations need logos", orgs.len());

    let logos_dir = Path::new(&config.paths.logos_dir);
    let progress = logos_dir.join("logo_fetch_progress.csv");
    std::fs::create_dir_all(logos_dir)?;
    let fetcher = LogoFetcher {
        searcher: &serp,
        judge: &openai,
        downloader: &downloader,
        config: &config.logos,
        logos_dir,
    };

    let (mut success, mut failed) = (0, 0);
    for (i, org) in orgs.iter().enumerate() {
        println!("[{}/{}] {}", i + 1, orgs.len(), org.name);
        let outcome = fetcher.fetch(org).await?;
        logos::append_progress(&progress, &outcome)?;
        match outcome.status {
            LogoStatus::Success => {
                success += 1;
                println!("   ✅ {} (attempt {})", outcome.source, outcome.attempts);
            }
            LogoStatus::Failed => {
                failed += 1;
                println!("   ❌ {}", outcome.error);
            }
        }
    }
    println!("\n🏁 Done: ✅ {} | ❌ {}", success, failed);
    Ok(())
}

async fn fetch_images(config: &Config, args: &ArgMatches) -> Result<()> {
    let street_view = StreetView::new(build_client(&config.http)?, api_key(GOOGLE_KEY_VAR)?);
    let serp = SerpApi::new(build_client(&config.http)?, api_key(SERPAPI_KEY_VAR)?);
    let openai = OpenAiClient::new(build_client(&config.http)?, api_key(OPENAI_KEY_VAR)?, &config.openai);
    let downloader = build_client(&config.http)?;
    let images_dir = Path::new(&config.paths.images_dir);

    let table = Table::load(&config.paths.portfolio)?;
    let mut buildings = images::buildings_needing_images(&table, images_dir);
    if let Some(limit) = args.get_one::<usize>("limit") {
        buildings.truncate(*limit);
    }
    println!("📷 {} buildings need images", buildings.len());

    let fetcher = ImageFetcher {
        street_view: &street_view,
        searcher: &serp,
        judge: &openai,
        downloader: &downloader,
        images_dir,
    };
    let results = fetcher.fetch_all(&buildings, config.http.search_concurrency).await?;
    let output = Path::new(&config.paths.output_dir).join("image_fetch_results.csv");
    ensure_parent(&output)?;
    images::write_results(&results, &output)?;

    let count = |status: images::ImageStatus| results.iter().filter(|r| r.status == status).count();
    println!(
        "🏁 Done: ✅ {} | 🚫 {} no imagery | 👎 {} rejected | ❌ {} failed",
        count(images::ImageStatus::Success),
        count(images::ImageStatus::NoImagery),
        count(images::ImageStatus::Rejected),
        count(images::ImageStatus::Failed)
    );
    println!("💾 Results: {}", output.display());
    Ok(())
}

fn report(config: &Config) -> Result<()> {
    let table = Table::load(&config.paths.portfolio)?;
    let html_dir = Path::new(&config.paths.html_dir);
    let stats = generate_reports(
        &table,
        html_dir,
        Path::new(&config.paths.images_dir),
        Path::new(&config.paths.logos_dir),
    )?;
    println!(
        "📄 Wrote {} building pages ({} with images, {} with logos)",
        stats.pages, stats.with_image, stats.with_logo
    );
    println!("🌐 Open {}", html_dir.join("index.html").display());
    Ok(())
}
