use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const SERPAPI_KEY_VAR: &str = "SERPAPI_KEY";
pub const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";
pub const GOOGLE_KEY_VAR: &str = "GOOGLE_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Replacement for the bundled occupancy tables.
    pub rates_file: Option<String>,
    pub paths: PathsConfig,
    pub http: HttpConfig,
    pub matching: MatchingConfig,
    pub openai: OpenAiConfig,
    pub logos: LogoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub portfolio: String,
    pub organizations: String,
    pub stores: String,
    pub backup_dir: String,
    pub output_dir: String,
    pub html_dir: String,
    pub images_dir: String,
    pub logos_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub max_concurrent: usize,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub search_concurrency: usize,
    pub validate_concurrency: usize,
    /// Pause between consecutive SerpAPI calls.
    pub search_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub distance_threshold_m: f64,
    pub target_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub chat_model: String,
    pub vision_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoConfig {
    /// `{domain}` is replaced with the organization's host.
    pub direct_url_template: Option<String>,
    pub max_candidates: usize,
    pub min_bytes: usize,
    pub max_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rates_file: None,
            paths: PathsConfig {
                portfolio: "data/source/portfolio_data.csv".to_string(),
                organizations: "data/source/portfolio_organizations.csv".to_string(),
                stores: "data/source/store_locations.csv".to_string(),
                backup_dir: "BACKUPS_GO_HERE/csv_backups".to_string(),
                output_dir: "output".to_string(),
                html_dir: "output/html".to_string(),
                images_dir: "output/images".to_string(),
                logos_dir: "output/logos".to_string(),
            },
            http: HttpConfig {
                max_concurrent: 100,
                timeout_secs: 10,
                user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36".to_string(),
                search_concurrency: 5,
                validate_concurrency: 30,
                search_delay_ms: 300,
            },
            matching: MatchingConfig {
                distance_threshold_m: 50.0,
                target_types: vec![
                    "Retail Store".to_string(),
                    "Wholesale Club".to_string(),
                    "Supermarket/Grocery".to_string(),
                ],
            },
            openai: OpenAiConfig {
                chat_model: "gpt-4o-mini".to_string(),
                vision_model: "gpt-4o".to_string(),
            },
            logos: LogoConfig {
                direct_url_template: Some("https://logo.clearbit.com/{domain}".to_string()),
                max_candidates: 8,
                min_bytes: 3_000,
                max_bytes: 2_000_000,
            },
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read config: {}", file_path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config: {}", file_path))?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }
}

/// Reads a required API key from the environment.
pub fn api_key(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(anyhow::anyhow!("{} is not set", var)),
    }
}
