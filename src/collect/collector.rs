//! Scrape orchestration: fan out over portals and queries, score, dedupe

use crate::collect::adapters::PortalAdapter;
use crate::collect::posting::{dedupe_postings, Posting};
use crate::collect::scoring::TitleScorer;
use crate::config::Config;
use crate::error::Result;
use indicatif::ProgressBar;
use log::{info, warn};
use reqwest::Client;
use std::path::Path;
use std::time::Duration;

/// Fetch postings from every adapter for every keyword/location pair.
/// A failing portal logs a warning and contributes nothing.
pub async fn collect_jobs(
    config: &Config,
    client: &Client,
    adapters: &[Box<dyn PortalAdapter>],
) -> Result<Vec<Posting>> {
    let scorer = TitleScorer::new(&config.positive_terms(), &config.search.negative_keywords)?;
    let limit = match config.search.limit_per_site {
        0 => None,
        n => Some(n),
    };
    let delay = Duration::from_millis(config.search.request_delay_ms);

    let total_requests =
        adapters.len() * config.search.keywords.len() * config.search.locations.len();
    let progress = ProgressBar::new(total_requests as u64);

    let mut postings = Vec::new();
    for adapter in adapters {
        for keyword in &config.search.keywords {
            for location in &config.search.locations {
                match adapter.fetch(client, keyword, location, limit).await {
                    Ok(mut batch) => {
                        for posting in &mut batch {
                            let (score, label) = scorer.score(&posting.title);
                            posting.score = score;
                            posting.match_label = label;
                        }
                        postings.extend(batch);
                    }
                    Err(err) => {
                        warn!("{}: fetch failed for '{}': {}", adapter.name(), keyword, err)
                    }
                }
                progress.inc(1);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    progress.finish_and_clear();

    let scraped_total = postings.len();
    let mut unique = dedupe_postings(postings);
    if config.search.max_total > 0 {
        unique.truncate(config.search.max_total);
    }
    info!(
        "Collected {} postings ({} after dedupe)",
        scraped_total,
        unique.len()
    );
    Ok(unique)
}

/// Export the scraped batch as JSON for downstream tooling.
pub fn export_json(postings: &[Posting], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let payload = serde_json::to_string_pretty(postings)?;
    std::fs::write(path, payload)?;
    Ok(())
}

pub fn build_client() -> Result<Client> {
    let client = Client::builder()
        .user_agent(crate::collect::adapters::USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()?;
    Ok(client)
}
