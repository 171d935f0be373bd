use crate::error::{Result, ScraperError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_3_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    pub fetch: FetchConfig,
    pub rate_limit: RateLimitConfig,
    pub scheduler: SchedulerConfig,
    pub database: DatabaseConfig,
    pub cloudinary: CloudinaryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub base_url: String,
    pub referer: String,
    pub user_agents: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub max_attempts: u32,
    /// Page fetch back-off base; attempt `n` waits `base * 2^n`.
    pub base_delay_ms: u64,
    pub image_base_delay_ms: u64,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub default_retry_after_secs: u64,
    /// Cap on consecutive 429 waits for one download. `None` waits forever.
    pub max_rate_limit_waits: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub max_concurrent_chapters: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_base_url: String,
    pub delivery_base_url: String,
}

impl Config {
    /// Layers compiled defaults, an optional TOML file, `COMICLOADER__*`
    /// variables and the legacy `.env` names, in that order.
    pub fn load(path: &str) -> Result<Self> {
        dotenv::dotenv().ok();

        let defaults = config::Config::try_from(&Config::default())?;
        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("COMICLOADER")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("cloudinary.cloud_name", std::env::var("CLOUDINARY_NAME").ok())?
            .set_override_option("cloudinary.api_key", std::env::var("CLOUDINARY_API_KEY").ok())?
            .set_override_option("cloudinary.api_secret", std::env::var("CLOUDINARY_SECRET_KEY").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.max_attempts == 0 {
            return Err(ScraperError::invalid_config("fetch.max_attempts must be at least 1"));
        }
        if self.scheduler.max_concurrent_chapters == 0 {
            return Err(ScraperError::invalid_config(
                "scheduler.max_concurrent_chapters must be at least 1",
            ));
        }
        if self.rate_limit.min_delay_ms > self.rate_limit.max_delay_ms {
            return Err(ScraperError::invalid_config(format!(
                "rate_limit.min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.rate_limit.min_delay_ms, self.rate_limit.max_delay_ms
            )));
        }
        if self.site.user_agents.is_empty() {
            return Err(ScraperError::invalid_config("site.user_agents must not be empty"));
        }
        url::Url::parse(&self.site.base_url)?;
        Ok(())
    }
}

impl FetchConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn image_base_delay(&self) -> Duration {
        Duration::from_millis(self.image_base_delay_ms)
    }
}

impl RateLimitConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn default_retry_after(&self) -> Duration {
        Duration::from_secs(self.default_retry_after_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            site: SiteConfig {
                base_url: "https://komikcast.cz/".to_string(),
                referer: "https://komikcast.cz/".to_string(),
                user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            },
            fetch: FetchConfig {
                max_attempts: 3,
                base_delay_ms: 2000,
                image_base_delay_ms: 1000,
                timeout_secs: 30,
                connect_timeout_secs: 10,
            },
            rate_limit: RateLimitConfig {
                min_delay_ms: 2000,
                max_delay_ms: 5000,
                default_retry_after_secs: 60,
                max_rate_limit_waits: None,
            },
            scheduler: SchedulerConfig {
                max_concurrent_chapters: 3,
            },
            database: DatabaseConfig {
                url: "sqlite:data/comicloader.db".to_string(),
                max_connections: 5,
            },
            cloudinary: CloudinaryConfig {
                cloud_name: String::new(),
                api_key: String::new(),
                api_secret: String::new(),
                api_base_url: "https://api.cloudinary.com".to_string(),
                delivery_base_url: "https://res.cloudinary.com".to_string(),
            },
        }
    }
}
