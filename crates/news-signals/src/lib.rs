//! The sentiment operator: classifies each news story into per-asset
//! bullish/bearish labels via an LLM. Grounded on the original's
//! `SentimentAnalyzer.analyze` (fixed prompt ingredients: allowed-asset
//! list, fixed label set, story title; parse-or-empty-on-failure) and
//! `get_sentiment_analyzer`'s provider dispatch, generalized here into a
//! `LlmClient` trait so the concrete provider is swappable.

use anyhow::{Context, Result};
use async_trait::async_trait;
use messagebus::{Bus, OffsetReset};
use pipeline_domain::asset::Asset;
use pipeline_domain::errors::SentimentError;
use pipeline_domain::news::NewsStory;
use pipeline_domain::sentiment::{AssetSentiment, NewsStorySentimentAnalysis};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct Settings {
    pub input_topic: String,
    pub output_topic: String,
    pub consumer_group: String,
    pub offset_reset: OffsetReset,
    pub llm_name: String,
    pub llm_api_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub health_port: u16,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        const PREFIX: &str = "NEWS_SIGNALS_";
        let live = pipeline_config::env_var(PREFIX, "INGESTION_MODE", "live") == "live";
        Ok(Self {
            input_topic: pipeline_config::env_var(PREFIX, "INPUT_TOPIC", "news"),
            output_topic: pipeline_config::env_var(PREFIX, "OUTPUT_TOPIC", "news_signals"),
            consumer_group: pipeline_config::env_var(PREFIX, "CONSUMER_GROUP", "news-signals"),
            offset_reset: if live { OffsetReset::Latest } else { OffsetReset::Earliest },
            llm_name: pipeline_config::env_var(PREFIX, "LLM_NAME", "claude"),
            llm_api_url: pipeline_config::env_var(PREFIX, "LLM_API_URL", "https://api.anthropic.com/v1/messages"),
            llm_api_key: pipeline_config::env_var(PREFIX, "LLM_API_KEY", ""),
            llm_model: pipeline_config::env_var(PREFIX, "LLM_MODEL", "claude-3-haiku-20240307"),
            health_port: pipeline_config::env_parse(PREFIX, "HEALTH_PORT", "8085")
                .context("NEWS_SIGNALS_HEALTH_PORT")?,
        })
    }
}

/// A swappable chat-completion backend. `complete` must return the raw
/// response text; parsing and validation happen at the call site.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, SentimentError>;
}

pub struct AnthropicClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, prompt: &str) -> Result<String, SentimentError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 256,
            "messages": [{"role": "user", "content": prompt}],
        });
        let resp = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;
        let value: serde_json::Value = resp.json().await?;
        Ok(value["content"][0]["text"].as_str().unwrap_or("[]").to_string())
    }
}

/// Builds the prompt the original's `SentimentAnalyzer` sends: the fixed
/// allowed-asset list, the fixed `{BULLISH, BEARISH}` label set, and the
/// story title.
pub fn build_prompt(title: &str) -> String {
    let assets = Asset::all().iter().map(|a| a.as_str()).collect::<Vec<_>>().join(", ");
    format!(
        "You are an expert crypto financial analyst. Analyze the following news \
         story and determine its impact ONLY on these assets: {assets}. Ignore any \
         other asset entirely; if none of the listed assets are impacted, return []. \
         Respond with a JSON array of objects `{{\"asset\": <one of {assets}>, \
         \"sentiment\": \"BULLISH\" or \"BEARISH\"}}` and nothing else.\n\n\
         News story: \"{title}\"\n\nResponse (JSON array only):"
    )
}

#[derive(Debug, serde::Deserialize)]
struct RawAssetSentiment {
    asset: String,
    sentiment: pipeline_domain::sentiment::SentimentSignal,
}

pub struct SentimentAnalyzer {
    client: Box<dyn LlmClient>,
    llm_name: String,
}

impl SentimentAnalyzer {
    pub fn new(client: Box<dyn LlmClient>, llm_name: impl Into<String>) -> Self {
        Self { client, llm_name: llm_name.into() }
    }

    /// Never propagates an error: a failed request or an unparsable response
    /// yields an analysis with an empty asset-sentiment list, matching the
    /// original's catch-and-empty fallback.
    pub async fn analyze(&self, story: &NewsStory) -> NewsStorySentimentAnalysis {
        let prompt = build_prompt(&story.title);
        let raw: Vec<RawAssetSentiment> = match self.client.complete(&prompt).await {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(parsed) => parsed,
                Err(e) => {
                    error!(llm = %self.llm_name, "invalid sentiment response: {}: {}", e, text);
                    Vec::new()
                }
            },
            Err(e) => {
                error!(llm = %self.llm_name, "sentiment request failed: {}", e);
                Vec::new()
            }
        };
        let asset_sentiments: Vec<AssetSentiment> = raw
            .into_iter()
            .map(|r| AssetSentiment { asset: r.asset, sentiment: r.sentiment })
            .collect();
        NewsStorySentimentAnalysis::new(story.title.clone(), story.timestamp, self.llm_name.clone(), asset_sentiments)
    }
}

pub async fn run(settings: &Settings, bus: Bus, shutdown: Arc<AtomicBool>) -> Result<()> {
    let mut consumer = bus
        .consumer(vec![settings.input_topic.clone()], &settings.consumer_group, settings.offset_reset)
        .await?;
    let producer = bus.producer();
    let analyzer = SentimentAnalyzer::new(
        Box::new(AnthropicClient::new(
            settings.llm_api_url.clone(),
            settings.llm_api_key.clone(),
            settings.llm_model.clone(),
        )),
        settings.llm_name.clone(),
    );

    loop {
        if shutdown.load(Ordering::SeqCst) {
            info!("news-signals stopping on shutdown signal");
            return Ok(());
        }

        let next = tokio::select! {
            item = consumer.poll() => item,
            _ = tokio::time::sleep(std::time::Duration::from_millis(200)) => continue,
        };

        let Some((_key, value)) = next else {
            info!("news-signals: input exhausted");
            return Ok(());
        };

        let story: NewsStory = match serde_json::from_value(value) {
            Ok(s) => s,
            Err(e) => {
                warn!("news-signals: dropping malformed story record: {}", e);
                continue;
            }
        };

        let analysis = analyzer.analyze(&story).await;
        let key = story.key().to_string();
        if let Err(e) = producer.send(&settings.output_topic, &key, &analysis.encoded()).await {
            warn!("news-signals: failed to publish analysis: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClient(&'static str);

    #[async_trait]
    impl LlmClient for FixedClient {
        async fn complete(&self, _prompt: &str) -> Result<String, SentimentError> {
            Ok(self.0.to_string())
        }
    }

    fn story(title: &str) -> NewsStory {
        NewsStory {
            outlet: pipeline_domain::news::NewsOutlet::CryptoPanic,
            title: title.into(),
            source: "test".into(),
            url: "https://example.com/1".into(),
            published_at: "2024-01-01T00:00:00Z".into(),
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn parses_valid_response_into_asset_sentiments() {
        let analyzer = SentimentAnalyzer::new(
            Box::new(FixedClient(r#"[{"asset":"BTC","sentiment":"BULLISH"}]"#)),
            "claude",
        );
        let analysis = analyzer.analyze(&story("BTC surges")).await;
        assert_eq!(analysis.asset_sentiments.len(), 1);
        assert_eq!(analysis.asset_sentiments[0].asset, "BTC");
    }

    #[tokio::test]
    async fn malformed_response_yields_empty_list_not_an_error() {
        let analyzer = SentimentAnalyzer::new(Box::new(FixedClient("not json")), "claude");
        let analysis = analyzer.analyze(&story("headline")).await;
        assert!(analysis.asset_sentiments.is_empty());
    }

    #[test]
    fn prompt_includes_allowed_assets_and_title() {
        let prompt = build_prompt("ETF approval news");
        assert!(prompt.contains("BTC"));
        assert!(prompt.contains("ETF approval news"));
        assert!(prompt.contains("BULLISH"));
    }
}
