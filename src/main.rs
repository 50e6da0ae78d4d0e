use std::process::ExitCode;

mod config;
mod crawl;
mod models;
mod page;
mod transform;

use config::CrawlConfig;
use crawl::Crawler;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = match CrawlConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let crawler = match Crawler::new(config) {
        Ok(crawler) => crawler,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match crawler.run().await {
        Ok(summary) => {
            tracing::debug!(
                "summary: {}",
                serde_json::to_string(&summary).unwrap_or_default()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
