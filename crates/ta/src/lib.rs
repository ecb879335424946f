//! The technical-analysis operator: a per-(symbol, timeframe) bounded ring
//! of finalized candles, decorated into a `TechnicalAnalysis` record on
//! every incoming candle. Compatibility/same-window/ring-eviction rules and
//! the indicator bundle itself live on `pipeline_domain::ta`; this stage
//! wires that pure logic to the bus, grounded on the same consumer/producer
//! shape as the candle operator.

use anyhow::{Context, Result};
use messagebus::{Bus, OffsetReset};
use pipeline_domain::candle::Candle;
use pipeline_domain::ta::TechnicalAnalysis;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Settings {
    pub input_topic: String,
    pub output_topic: String,
    pub consumer_group: String,
    pub offset_reset: OffsetReset,
    pub ring_capacity: usize,
    pub health_port: u16,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        const PREFIX: &str = "TA_";
        let live = pipeline_config::env_var(PREFIX, "INGESTION_MODE", "live") == "live";
        Ok(Self {
            input_topic: pipeline_config::env_var(PREFIX, "INPUT_TOPIC", "candles"),
            output_topic: pipeline_config::env_var(PREFIX, "OUTPUT_TOPIC", "ta"),
            consumer_group: pipeline_config::env_var(PREFIX, "CONSUMER_GROUP", "ta-operator"),
            offset_reset: if live { OffsetReset::Latest } else { OffsetReset::Earliest },
            ring_capacity: pipeline_config::env_parse(PREFIX, "RING_CAPACITY", "60")
                .context("TA_RING_CAPACITY")?,
            health_port: pipeline_config::env_parse(PREFIX, "HEALTH_PORT", "8083")
                .context("TA_HEALTH_PORT")?,
        })
    }
}

/// Per-key ring of finalized candles plus the compatibility/eviction rules
/// applied on every incoming candle.
#[derive(Default)]
pub struct Ring {
    pub candles: VecDeque<Candle>,
}

impl Ring {
    /// Folds `c` into the ring per spec, returning the window to compute the
    /// indicator bundle over, or `None` if `c` was dropped as incompatible.
    pub fn fold(&mut self, c: Candle, capacity: usize) -> Option<&VecDeque<Candle>> {
        if let Some(last) = self.candles.back() {
            if !last.is_compatible(&c) {
                warn!(symbol = %c.symbol, timeframe = %c.timeframe, "ta operator: dropping incompatible candle");
                return None;
            }
            if c.is_same_window(last) {
                *self.candles.back_mut().unwrap() = c;
                return Some(&self.candles);
            }
        }
        self.candles.push_back(c);
        while self.candles.len() > capacity {
            self.candles.pop_front();
        }
        Some(&self.candles)
    }
}

pub async fn run(settings: &Settings, bus: Bus, shutdown: Arc<AtomicBool>) -> Result<()> {
    let mut consumer = bus
        .consumer(vec![settings.input_topic.clone()], &settings.consumer_group, settings.offset_reset)
        .await?;
    let producer = bus.producer();
    let mut rings: HashMap<String, Ring> = HashMap::new();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            info!("ta operator stopping on shutdown signal");
            return Ok(());
        }

        let next = tokio::select! {
            item = consumer.poll() => item,
            _ = tokio::time::sleep(std::time::Duration::from_millis(200)) => continue,
        };

        let Some((_key, value)) = next else {
            info!("ta operator: input exhausted");
            return Ok(());
        };

        let candle: Candle = match serde_json::from_value(value) {
            Ok(c) => c,
            Err(e) => {
                warn!("ta operator: dropping malformed candle record: {}", e);
                continue;
            }
        };

        let ring_key = format!("{}-{}", candle.symbol, candle.timeframe);
        let ring = rings.entry(ring_key).or_default();
        let last_candle = candle.clone();
        let Some(window) = ring.fold(candle, settings.ring_capacity) else {
            continue;
        };

        let window_vec: Vec<Candle> = window.iter().cloned().collect();
        let ta = TechnicalAnalysis::compute(&last_candle, &window_vec);
        if let Err(e) = producer.send(&settings.output_topic, &ta.key(), &ta).await {
            warn!("ta operator: failed to publish technical analysis: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::timeframe::Timeframe;
    use pipeline_domain::trade::Trade;
    use rust_decimal_macros::dec;

    fn candle(ts: i64, close: rust_decimal::Decimal) -> Candle {
        let trade = Trade::new("kraken", "BTC", close, dec!(1), ts);
        let mut c = Candle::init(Timeframe::OneMin, &trade);
        c.close_window(ts, ts + 60_000);
        c
    }

    #[test]
    fn warm_up_leaves_long_period_indicators_null_until_enough_history() {
        let mut ring = Ring::default();
        let closes = [1.0, 2.0, 3.0, 4.0, 5.0];
        let mut last_ta = None;
        for (i, &close) in closes.iter().enumerate() {
            let c = candle(i as i64 * 60_000, rust_decimal::Decimal::try_from(close).unwrap());
            let window = ring.fold(c.clone(), 60).unwrap();
            let window_vec: Vec<Candle> = window.iter().cloned().collect();
            last_ta = Some(TechnicalAnalysis::compute(&c, &window_vec));
        }
        let ta = last_ta.unwrap();
        assert!(ta.sma_7.is_none());
        assert!(ta.sma_14.is_none());
        assert!(ta.macd.is_none());
        assert!(ta.rsi_14.is_none());
    }

    #[test]
    fn incompatible_candle_is_dropped() {
        let mut ring = Ring::default();
        ring.fold(candle(0, dec!(10)), 60).unwrap();

        let mut other = candle(60_000, dec!(11));
        other.symbol = "ETH".into();
        assert!(ring.fold(other, 60).is_none());
        assert_eq!(ring.candles.len(), 1);
    }

    #[test]
    fn ring_evicts_oldest_beyond_capacity() {
        let mut ring = Ring::default();
        for i in 0..5 {
            ring.fold(candle(i * 60_000, dec!(1)), 3);
        }
        assert_eq!(ring.candles.len(), 3);
    }
}
