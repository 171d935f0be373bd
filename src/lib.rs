// Library interface for comicloader
// Exposes the scraper components to the binary and to integration tests

pub mod config;
pub mod database;
pub mod error;
pub mod http;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod publisher;
pub mod rate_limit;
pub mod scanner;
pub mod scheduler;
pub mod storage;
pub mod traits;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{Result, ScraperError};
pub use orchestrator::{Orchestrator, StartChapter};
