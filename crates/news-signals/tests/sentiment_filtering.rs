use async_trait::async_trait;
use pipeline_domain::errors::SentimentError;
use pipeline_domain::news::{NewsOutlet, NewsStory};
use stage_news_signals::{LlmClient, SentimentAnalyzer};

struct FixedClient(&'static str);

#[async_trait]
impl LlmClient for FixedClient {
    async fn complete(&self, _prompt: &str) -> Result<String, SentimentError> {
        Ok(self.0.to_string())
    }
}

struct FailingClient;

#[async_trait]
impl LlmClient for FailingClient {
    async fn complete(&self, _prompt: &str) -> Result<String, SentimentError> {
        let err = serde_json::from_str::<i32>("not json").unwrap_err();
        Err(SentimentError::InvalidJson(err))
    }
}

fn story(title: &str) -> NewsStory {
    NewsStory {
        outlet: NewsOutlet::CryptoPanic,
        title: title.into(),
        source: "test".into(),
        url: "https://example.com/story".into(),
        published_at: "2024-01-01T00:00:00Z".into(),
        timestamp: 0,
    }
}

/// An asset the LLM names that isn't in the allowed list is dropped from
/// the analysis rather than passed through.
#[tokio::test]
async fn disallowed_asset_is_filtered_out_of_the_analysis() {
    let analyzer = SentimentAnalyzer::new(
        Box::new(FixedClient(
            r#"[{"asset":"BTC","sentiment":"BULLISH"},{"asset":"NOTACOIN","sentiment":"BEARISH"}]"#,
        )),
        "claude",
    );
    let analysis = analyzer.analyze(&story("market update")).await;

    assert!(analysis.asset_sentiments.iter().any(|s| s.asset == "BTC"));
    assert!(!analysis.asset_sentiments.iter().any(|s| s.asset == "NOTACOIN"));
}

/// A request-level failure never propagates as an error — it degrades to
/// an analysis with an empty asset-sentiment list.
#[tokio::test]
async fn a_failed_request_degrades_to_an_empty_analysis_not_an_error() {
    let analyzer = SentimentAnalyzer::new(Box::new(FailingClient), "claude");
    let analysis = analyzer.analyze(&story("headline")).await;

    assert!(analysis.asset_sentiments.is_empty());
}
