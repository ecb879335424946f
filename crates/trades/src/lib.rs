//! The trade producer stage: wires an exchange adapter's trade stream to the
//! bus. Grounded on the original's `consume_trades_from_kraken_ws` (produce
//! loop with a structured log line per trade) and the teacher's
//! task-spawn/shutdown idiom in `bin/server.rs`.

use anyhow::{bail, Context, Result};
use exchanges::kraken::{KrakenRestClient, KrakenWsClient};
use exchanges::{ExchangeRestClient, ExchangeWsClient};
use futures::StreamExt;
use messagebus::Bus;
use pipeline_domain::trade::Trade;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct Settings {
    pub exchange: String,
    pub symbols: Vec<String>,
    pub ws_url: String,
    pub rest_url: String,
    pub mode: Mode,
    pub since_ms: i64,
    pub job_id: String,
    pub health_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Live,
    Historical,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        const PREFIX: &str = "TRADES_";
        let mode = match pipeline_config::env_var(PREFIX, "MODE", "live").as_str() {
            "live" => Mode::Live,
            "historical" => Mode::Historical,
            other => bail!("TRADES_MODE must be 'live' or 'historical', got '{other}'"),
        };
        Ok(Self {
            exchange: pipeline_config::env_var(PREFIX, "EXCHANGE", "kraken"),
            symbols: pipeline_config::env_list(PREFIX, "SYMBOLS", "BTCUSD,ETHUSD"),
            ws_url: pipeline_config::env_var(PREFIX, "WS_URL", "wss://ws.kraken.com/v2"),
            rest_url: pipeline_config::env_var(PREFIX, "REST_URL", "https://api.kraken.com"),
            mode,
            since_ms: pipeline_config::env_parse(PREFIX, "SINCE_MS", "0")
                .context("TRADES_SINCE_MS")?,
            job_id: pipeline_config::env_var(PREFIX, "JOB_ID", "backfill-0"),
            health_port: pipeline_config::env_parse(PREFIX, "HEALTH_PORT", "8081")
                .context("TRADES_HEALTH_PORT")?,
        })
    }

    /// The topic this run publishes to: `trades` for a live feed, a
    /// per-job historical topic for a backfill run.
    pub fn output_topic(&self) -> String {
        match self.mode {
            Mode::Live => "trades".to_string(),
            Mode::Historical => format!("trades_historical_{}", self.job_id),
        }
    }
}

/// Runs the configured ingestion loop until `shutdown` is requested or the
/// upstream stream ends. Each received trade is published keyed by symbol.
pub async fn run(settings: &Settings, bus: Bus, shutdown: Arc<std::sync::atomic::AtomicBool>) -> Result<()> {
    if settings.exchange != "kraken" {
        bail!("unsupported exchange: {}", settings.exchange);
    }

    let producer = bus.producer();
    let topic = settings.output_topic();

    let mut stream = match settings.mode {
        Mode::Live => {
            let mut client = KrakenWsClient::new(settings.ws_url.clone(), settings.symbols.clone());
            client.connect().await.context("connecting to kraken websocket")?;
            Box::new(client).stream_trades()
        }
        Mode::Historical => {
            let stop_ns = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
            let client = KrakenRestClient::new(settings.rest_url.clone(), settings.symbols.clone());
            client.stream_trades(settings.since_ms, stop_ns)
        }
    };

    loop {
        if shutdown.load(Ordering::SeqCst) {
            info!("trade producer stopping on shutdown signal");
            return Ok(());
        }

        let next = tokio::select! {
            item = stream.next() => item,
            _ = tokio::time::sleep(std::time::Duration::from_millis(200)) => continue,
        };

        match next {
            Some(Ok(trade)) => publish(&producer, &topic, &trade).await,
            Some(Err(e)) => {
                error!("trade stream error: {}", e);
                return Err(e.into());
            }
            None => {
                info!("trade stream ended");
                return Ok(());
            }
        }
    }
}

async fn publish(producer: &messagebus::Producer, topic: &str, trade: &Trade) {
    if !trade.is_valid() {
        warn!(?trade, "dropping invalid trade");
        return;
    }
    match producer.send(topic, &trade.symbol, trade).await {
        Ok(()) => info!(
            exchange = %trade.exchange,
            symbol = %trade.symbol,
            price = %trade.price,
            "trade ({}): {} at {}",
            trade.exchange,
            trade.symbol,
            trade.price
        ),
        Err(e) => warn!("failed to publish trade: {}", e),
    }
}
