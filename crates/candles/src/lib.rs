//! The candle operator: a tumbling-window reducer keyed by
//! `(exchange, symbol, timeframe)`, grounded on
//! `rustrade::application::market_data::candle_aggregator`'s builder map
//! generalized from per-symbol-only to per-(exchange,symbol,timeframe), and
//! on `domain::market::timeframe::{period_start, is_period_start}`
//! generalized to the full tumbling-window math every configured timeframe
//! needs.

use anyhow::{bail, Context, Result};
use messagebus::{Bus, OffsetReset};
use pipeline_domain::candle::Candle;
use pipeline_domain::timeframe::Timeframe;
use pipeline_domain::trade::Trade;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmissionMode {
    Live,
    Full,
}

pub struct Settings {
    pub input_topic: String,
    pub output_topic: String,
    pub consumer_group: String,
    pub timeframes: Vec<Timeframe>,
    pub emission_mode: EmissionMode,
    pub offset_reset: OffsetReset,
    pub health_port: u16,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        const PREFIX: &str = "CANDLES_";
        let mode = match pipeline_config::env_var(PREFIX, "INGESTION_MODE", "live").as_str() {
            "live" => "live",
            "historical" => "historical",
            other => bail!("CANDLES_INGESTION_MODE must be 'live' or 'historical', got '{other}'"),
        };
        let emission_mode = match pipeline_config::env_var(PREFIX, "EMISSION_MODE", "live").as_str() {
            "live" => EmissionMode::Live,
            "full" => EmissionMode::Full,
            other => bail!("CANDLES_EMISSION_MODE must be 'live' or 'full', got '{other}'"),
        };
        let timeframes_raw = pipeline_config::env_list(PREFIX, "TIMEFRAMES", "1m");
        let timeframes = timeframes_raw
            .iter()
            .map(|s| Timeframe::from_str(s).map_err(|e| anyhow::anyhow!("{e}")))
            .collect::<Result<Vec<_>>>()
            .context("CANDLES_TIMEFRAMES")?;
        let job_id = pipeline_config::env_var(PREFIX, "JOB_ID", "backfill-0");
        let default_input_topic = if mode == "live" {
            "trades".to_string()
        } else {
            format!("trades_historical_{job_id}")
        };
        let input_topic = pipeline_config::env_var(PREFIX, "INPUT_TOPIC", &default_input_topic);
        Ok(Self {
            input_topic,
            output_topic: pipeline_config::env_var(PREFIX, "OUTPUT_TOPIC", "candles"),
            consumer_group: pipeline_config::env_var(PREFIX, "CONSUMER_GROUP", "candle-operator"),
            timeframes,
            emission_mode,
            offset_reset: if mode == "live" { OffsetReset::Latest } else { OffsetReset::Earliest },
            health_port: pipeline_config::env_parse(PREFIX, "HEALTH_PORT", "8082")
                .context("CANDLES_HEALTH_PORT")?,
        })
    }
}

/// Per-(exchange, symbol, timeframe) window state: the candle currently
/// accumulating trades for its window.
pub struct WindowState {
    window_start: i64,
    window_end: i64,
    candle: Candle,
}

/// Folds one trade into `states`, returning every candle that should be
/// published for this trade under `mode` (zero, one, or — when a FULL-mode
/// window boundary is crossed — the finalized previous window plus nothing
/// for the just-opened one).
pub fn fold_trade(
    states: &mut HashMap<String, WindowState>,
    tf: Timeframe,
    trade: &Trade,
    mode: EmissionMode,
) -> Option<Candle> {
    let key = format!("{}-{}-{}", trade.exchange, trade.symbol, tf);
    let window_start = tf.window_start(trade.timestamp);
    let window_end = tf.window_end(trade.timestamp);

    match states.get_mut(&key) {
        Some(state) if state.window_start == window_start => {
            state.candle.update(trade);
            state.candle.close_window(state.window_start, state.window_end);
            match mode {
                EmissionMode::Live => Some(state.candle.clone()),
                EmissionMode::Full => None,
            }
        }
        Some(state) => {
            // Window boundary crossed: the buffered candle is now final.
            let finished = state.candle.clone();
            let mut candle = Candle::init(tf, trade);
            candle.close_window(window_start, window_end);
            *state = WindowState { window_start, window_end, candle: candle.clone() };
            match mode {
                EmissionMode::Live => Some(candle),
                EmissionMode::Full => Some(finished),
            }
        }
        None => {
            let mut candle = Candle::init(tf, trade);
            candle.close_window(window_start, window_end);
            states.insert(key, WindowState { window_start, window_end, candle: candle.clone() });
            match mode {
                EmissionMode::Live => Some(candle),
                EmissionMode::Full => None,
            }
        }
    }
}

pub async fn run(settings: &Settings, bus: Bus, shutdown: Arc<AtomicBool>) -> Result<()> {
    let mut consumer = bus
        .consumer(vec![settings.input_topic.clone()], &settings.consumer_group, settings.offset_reset)
        .await?;
    let producer = bus.producer();
    let mut states: HashMap<String, WindowState> = HashMap::new();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            info!("candle operator stopping on shutdown signal");
            return Ok(());
        }

        let next = tokio::select! {
            item = consumer.poll() => item,
            _ = tokio::time::sleep(std::time::Duration::from_millis(200)) => continue,
        };

        let Some((_key, value)) = next else {
            info!("candle operator: input exhausted");
            return Ok(());
        };

        let trade: Trade = match serde_json::from_value(value) {
            Ok(t) => t,
            Err(e) => {
                warn!("candle operator: dropping malformed trade record: {}", e);
                continue;
            }
        };

        for tf in &settings.timeframes {
            let Some(candle) = fold_trade(&mut states, *tf, &trade, settings.emission_mode) else {
                continue;
            };
            if let Err(e) = producer.send(&settings.output_topic, &candle.key(), &candle).await {
                warn!("candle operator: failed to publish candle: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(ts: i64, price: rust_decimal::Decimal, volume: rust_decimal::Decimal) -> Trade {
        Trade::new("kraken", "BTC", price, volume, ts)
    }

    #[test]
    fn live_mode_emits_on_every_update_within_one_window() {
        let mut states = HashMap::new();
        let tf = Timeframe::OneMin;
        let emissions: Vec<Candle> = [
            trade(1000, dec!(10), dec!(1)),
            trade(5000, dec!(12), dec!(2)),
            trade(59000, dec!(11), dec!(3)),
        ]
        .iter()
        .filter_map(|t| fold_trade(&mut states, tf, t, EmissionMode::Live))
        .collect();

        assert_eq!(emissions.len(), 3);
        let last = emissions.last().unwrap();
        assert_eq!(last.open, dec!(10));
        assert_eq!(last.high, dec!(12));
        assert_eq!(last.low, dec!(10));
        assert_eq!(last.close, dec!(11));
        assert_eq!(last.volume, dec!(6));
        assert_eq!(last.start, Some(0));
        assert_eq!(last.end, Some(60_000));
        assert_eq!(last.timestamp, 59000);
    }

    #[test]
    fn full_mode_emits_once_at_window_close() {
        let mut states = HashMap::new();
        let tf = Timeframe::OneMin;
        let mut emissions = Vec::new();
        for t in [
            trade(1000, dec!(10), dec!(1)),
            trade(5000, dec!(12), dec!(2)),
            trade(59000, dec!(11), dec!(3)),
        ] {
            if let Some(c) = fold_trade(&mut states, tf, &t, EmissionMode::Full) {
                emissions.push(c);
            }
        }
        assert!(emissions.is_empty());

        // A trade in the next window finalizes the prior one and does not
        // enter it.
        if let Some(c) = fold_trade(&mut states, tf, &trade(60_000, dec!(20), dec!(5)), EmissionMode::Full) {
            emissions.push(c);
        }

        assert_eq!(emissions.len(), 1);
        let finished = &emissions[0];
        assert_eq!(finished.open, dec!(10));
        assert_eq!(finished.high, dec!(12));
        assert_eq!(finished.low, dec!(10));
        assert_eq!(finished.close, dec!(11));
        assert_eq!(finished.volume, dec!(6));
        assert_eq!(finished.start, Some(0));
        assert_eq!(finished.end, Some(60_000));
    }

    #[test]
    fn window_boundary_trade_does_not_enter_prior_candle() {
        let mut states = HashMap::new();
        let tf = Timeframe::OneMin;
        fold_trade(&mut states, tf, &trade(1000, dec!(10), dec!(1)), EmissionMode::Live);
        fold_trade(&mut states, tf, &trade(60_000, dec!(999), dec!(1)), EmissionMode::Live);

        let state = states.get("kraken-BTC-1m").unwrap();
        assert_eq!(state.candle.open, dec!(999));
        assert_eq!(state.candle.high, dec!(999));
        assert_eq!(state.candle.low, dec!(999));
    }
}
