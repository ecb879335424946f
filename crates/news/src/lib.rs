//! The news source stage: a live CryptoPanic-style poller with
//! published-at watermark dedupe, grounded on
//! `rustrade::infrastructure::news::rss`'s poll-loop/dedupe shape and the
//! original's `CryptoPanicOutlet` (stateful `last` watermark, produce then
//! advance), plus a historical CSV replay source for backfill runs.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use messagebus::Bus;
use pipeline_domain::news::{NewsOutlet, NewsStory};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Live,
    Historical,
}

pub struct Settings {
    pub mode: Mode,
    pub api_url: String,
    pub poll_interval_secs: u64,
    pub csv_path: String,
    pub output_topic: String,
    pub health_port: u16,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        const PREFIX: &str = "NEWS_";
        let mode = match pipeline_config::env_var(PREFIX, "MODE", "live").as_str() {
            "live" => Mode::Live,
            "historical" => Mode::Historical,
            other => bail!("NEWS_MODE must be 'live' or 'historical', got '{other}'"),
        };
        Ok(Self {
            mode,
            api_url: pipeline_config::env_var(PREFIX, "API_URL", "https://cryptopanic.com/api/v1/posts/"),
            poll_interval_secs: pipeline_config::env_parse(PREFIX, "POLL_INTERVAL_SECS", "10")
                .context("NEWS_POLL_INTERVAL_SECS")?,
            csv_path: pipeline_config::env_var(PREFIX, "CSV_PATH", "news_history.csv"),
            output_topic: pipeline_config::env_var(PREFIX, "OUTPUT_TOPIC", "news"),
            health_port: pipeline_config::env_parse(PREFIX, "HEALTH_PORT", "8084")
                .context("NEWS_HEALTH_PORT")?,
        })
    }
}

#[derive(Debug, serde::Deserialize)]
struct RawStory {
    title: String,
    source: String,
    url: String,
    published_at: String,
}

#[derive(Debug, serde::Deserialize)]
struct Page {
    #[serde(default)]
    results: Vec<RawStory>,
    #[serde(default)]
    next: Option<String>,
}

/// Fetches every page starting at `url`, following `next` until exhausted.
/// A transport error mid-page waits 1s and retries the same URL (bounded, to
/// keep a single poll cycle from hanging forever); an empty/malformed page
/// simply ends the cycle with whatever was already collected.
async fn fetch_all_pages(client: &reqwest::Client, url: &str) -> Vec<NewsStory> {
    let mut stories = Vec::new();
    let mut next = Some(url.to_string());
    let mut retries_left = 3u8;

    while let Some(page_url) = next.take() {
        match client.get(&page_url).send().await {
            Ok(resp) => match resp.json::<Page>().await {
                Ok(page) => {
                    stories.extend(page.results.into_iter().map(|r| NewsStory {
                        outlet: NewsOutlet::CryptoPanic,
                        title: r.title,
                        source: r.source,
                        url: r.url,
                        published_at: r.published_at,
                        timestamp: Utc::now().timestamp_millis(),
                    }));
                    next = page.next;
                }
                Err(e) => {
                    warn!("news: malformed page from {}: {}", page_url, e);
                    break;
                }
            },
            Err(e) => {
                if retries_left == 0 {
                    warn!("news: giving up on {} after repeated transport errors: {}", page_url, e);
                    break;
                }
                retries_left -= 1;
                warn!("news: transport error fetching {}, retrying in 1s: {}", page_url, e);
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                next = Some(page_url);
            }
        }
    }
    stories
}

/// Parses a story's `published_at` into a comparable instant, accepting
/// either RFC3339 or a bare `YYYY-MM-DD HH:MM:SS` legacy form (the two
/// formats a CSV historical export and a live API response are expected to
/// carry).
pub fn parse_published_at(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Sorts a fetched batch ascending by `published_at`, keeps only stories
/// newer than `watermark`, and returns the new watermark (the maximum
/// `published_at` seen across the *whole* batch, not just the filtered
/// subset) so a batch containing only already-seen stories still holds the
/// watermark steady rather than regressing it.
pub fn apply_watermark(
    mut stories: Vec<NewsStory>,
    watermark: Option<DateTime<Utc>>,
) -> (Vec<NewsStory>, Option<DateTime<Utc>>) {
    stories.sort_by_key(|s| parse_published_at(&s.published_at).unwrap_or_default());

    let new_watermark = stories
        .iter()
        .filter_map(|s| parse_published_at(&s.published_at))
        .max()
        .or(watermark);

    let fresh: Vec<NewsStory> = stories
        .into_iter()
        .filter(|s| match (parse_published_at(&s.published_at), watermark) {
            (Some(ts), Some(wm)) => ts > wm,
            (Some(_), None) => true,
            (None, _) => false,
        })
        .collect();

    (fresh, new_watermark)
}

/// One poll cycle: fetch every page, then apply the watermark filter.
async fn poll_once(
    client: &reqwest::Client,
    api_url: &str,
    watermark: Option<DateTime<Utc>>,
) -> (Vec<NewsStory>, Option<DateTime<Utc>>) {
    let stories = fetch_all_pages(client, api_url).await;
    apply_watermark(stories, watermark)
}

pub async fn run(settings: &Settings, bus: Bus, shutdown: Arc<AtomicBool>) -> Result<()> {
    match settings.mode {
        Mode::Live => run_live(settings, bus, shutdown).await,
        Mode::Historical => run_historical(settings, bus, shutdown).await,
    }
}

async fn run_live(settings: &Settings, bus: Bus, shutdown: Arc<AtomicBool>) -> Result<()> {
    let client = reqwest::Client::new();
    let producer = bus.producer();
    let mut watermark: Option<DateTime<Utc>> = None;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            info!("news source stopping on shutdown signal");
            return Ok(());
        }

        let (fresh, new_watermark) = poll_once(&client, &settings.api_url, watermark).await;
        info!(count = fresh.len(), ?watermark, "news: poll cycle complete");
        for story in &fresh {
            if let Err(e) = producer.send(&settings.output_topic, "news", story).await {
                warn!("news: failed to publish story: {}", e);
            }
        }
        watermark = new_watermark;

        tokio::time::sleep(std::time::Duration::from_secs(settings.poll_interval_secs)).await;
    }
}

async fn run_historical(settings: &Settings, bus: Bus, shutdown: Arc<AtomicBool>) -> Result<()> {
    let producer = bus.producer();
    let mut reader = csv::Reader::from_path(&settings.csv_path)
        .with_context(|| format!("opening historical news CSV at {}", settings.csv_path))?;

    for result in reader.deserialize::<CsvRow>() {
        if shutdown.load(Ordering::SeqCst) {
            info!("news source stopping on shutdown signal");
            return Ok(());
        }
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                warn!("news: skipping malformed CSV row: {}", e);
                continue;
            }
        };
        let timestamp = parse_published_at(&row.published_at)
            .map(|dt| dt.timestamp_millis())
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        let story = NewsStory {
            outlet: NewsOutlet::CryptoPanic,
            title: row.title,
            source: row.source,
            url: row.url,
            published_at: row.published_at,
            timestamp,
        };
        if let Err(e) = producer.send(&settings.output_topic, "news", &story).await {
            warn!("news: failed to publish historical story: {}", e);
        }
    }
    Ok(())
}

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    title: String,
    source: String,
    url: String,
    published_at: String,
}
