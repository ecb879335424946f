use crate::asset::Asset;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentSignal {
    Bullish,
    Bearish,
}

impl SentimentSignal {
    pub fn encoded(&self) -> i8 {
        match self {
            SentimentSignal::Bullish => 1,
            SentimentSignal::Bearish => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSentiment {
    pub asset: String,
    pub sentiment: SentimentSignal,
}

/// The LLM's raw per-story output, filtered down to entries naming an asset
/// from the allowed list with a recognized sentiment label. Invalid entries
/// are dropped individually — one bad entry never discards the whole story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsStorySentimentAnalysis {
    pub story: String,
    pub timestamp: i64,
    pub llm_name: String,
    pub asset_sentiments: Vec<AssetSentiment>,
}

impl NewsStorySentimentAnalysis {
    pub fn new(story: String, timestamp: i64, llm_name: String, raw: Vec<AssetSentiment>) -> Self {
        let asset_sentiments = raw
            .into_iter()
            .filter(|s| Asset::from_str_opt(&s.asset).is_some())
            .collect();
        Self {
            story,
            timestamp,
            llm_name,
            asset_sentiments,
        }
    }

    /// Flatten to `{story, timestamp, llm_name, <ASSET>: ±1, ...}`. Assets
    /// with no sentiment opinion are simply absent as keys.
    pub fn encoded(&self) -> Value {
        let mut map = Map::new();
        map.insert("story".into(), Value::String(self.story.clone()));
        map.insert("timestamp".into(), Value::Number(self.timestamp.into()));
        map.insert("llm_name".into(), Value::String(self.llm_name.clone()));
        for s in &self.asset_sentiments {
            map.insert(s.asset.clone(), Value::Number(s.sentiment.encoded().into()));
        }
        Value::Object(map)
    }
}
