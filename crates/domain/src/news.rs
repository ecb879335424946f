use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NewsOutlet {
    CryptoPanic,
}

/// A single news story pulled from a live poller or a historical CSV replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsStory {
    pub outlet: NewsOutlet,
    pub title: String,
    pub source: String,
    pub url: String,
    /// ISO 8601 publish time as reported by the outlet.
    pub published_at: String,
    /// Message time in milliseconds, used for bus ordering and watermarks.
    #[serde(default = "now_ms")]
    pub timestamp: i64,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl NewsStory {
    pub fn key(&self) -> &str {
        &self.url
    }
}
