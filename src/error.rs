use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Rate limited by {url} after {waits} waits")]
    RateLimited { url: String, waits: u32 },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ScraperError {
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// True for failures the fetcher's retry loop should try again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, ScraperError>;
