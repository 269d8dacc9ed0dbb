use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::cache::FileCache;
use crate::packing::DEFAULT_MAX_VISIBLE_ROWS;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub calendar: CalendarConfig,
    pub quote: QuoteConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    /// Only the commands that touch the store need it.
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CalendarConfig {
    pub max_visible_rows: usize,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            max_visible_rows: DEFAULT_MAX_VISIBLE_ROWS,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QuoteConfig {
    pub tax_rate_percent: f64,
    pub currency_symbol: String,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            tax_rate_percent: 18.0,
            currency_symbol: "Rs.".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CacheConfig {
    pub dir: Option<PathBuf>,
}

impl CacheConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(FileCache::default_dir)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // Load .env file (silently ignore if not present)
        let _ = dotenvy::dotenv();

        // DATABASE_URL seeds the store location; the CATERING__ variables
        // below still take precedence.
        let database_url = std::env::var("DATABASE_URL").ok();

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("catering-quotes");

        let builder = Config::builder()
            // 1. Defaults
            .set_default("database.url", database_url)?
            .set_default("calendar.max_visible_rows", DEFAULT_MAX_VISIBLE_ROWS as u64)?
            .set_default("quote.tax_rate_percent", 18.0)?
            .set_default("quote.currency_symbol", "Rs.")?
            .set_default("cache.dir", None::<String>)?
            // 2. Local config file (optional, lowest priority)
            .add_source(File::from(PathBuf::from("config.toml")).required(false))
            // 3. User config directory (optional, overrides local)
            .add_source(File::from(config_dir.join("config.toml")).required(false))
            // 4. Environment variables (CATERING__QUOTE__TAX_RATE_PERCENT=...)
            .add_source(Environment::with_prefix("CATERING").separator("__"));

        let s = builder.build()?;
        Ok(s.try_deserialize()?)
    }

    /// Connection string for the store, or an error explaining how to set it.
    pub fn database_url(&self) -> Result<&str> {
        self.database
            .url
            .as_deref()
            .context("DATABASE_URL must be set (via .env file or environment variable)")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache.resolved_dir()
    }
}
