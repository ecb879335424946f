use crate::asset::Symbol;
use crate::candle::Candle;
use crate::timeframe::Timeframe;
use serde::{Deserialize, Serialize};

/// A candle decorated with the full technical-indicator bundle. Every
/// indicator field is `None` until its buffer has enough history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalAnalysis {
    pub exchange: String,
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub open: rust_decimal::Decimal,
    pub high: rust_decimal::Decimal,
    pub low: rust_decimal::Decimal,
    pub close: rust_decimal::Decimal,
    pub volume: rust_decimal::Decimal,
    pub timestamp: i64,

    pub rsi_9: Option<f64>,
    pub rsi_14: Option<f64>,
    pub rsi_21: Option<f64>,
    pub rsi_28: Option<f64>,

    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_hist: Option<f64>,

    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,

    pub stoch_rsi_fast_k: Option<f64>,
    pub stoch_rsi_fast_d: Option<f64>,

    pub adx_14: Option<f64>,

    pub volume_ema_10: Option<f64>,

    pub ichimoku_conv: Option<f64>,
    pub ichimoku_base: Option<f64>,
    pub ichimoku_span_a: Option<f64>,
    pub ichimoku_span_b: Option<f64>,

    pub mfi_14: Option<f64>,
    pub atr_10: Option<f64>,
    pub price_roc_6: Option<f64>,

    pub sma_7: Option<f64>,
    pub sma_14: Option<f64>,
    pub sma_21: Option<f64>,
    pub sma_28: Option<f64>,
}

impl TechnicalAnalysis {
    pub fn key(&self) -> String {
        format!("{}-{}-{}", self.symbol, self.timeframe, self.timestamp)
    }

    /// Compute the indicator bundle from a candle and the buffered window
    /// that ends with it (most-recent-last). `candle` must be `window`'s
    /// last element.
    pub fn compute(candle: &Candle, window: &[Candle]) -> Self {
        let closes: Vec<f64> = window.iter().map(|c| to_f64(c.close)).collect();
        let highs: Vec<f64> = window.iter().map(|c| to_f64(c.high)).collect();
        let lows: Vec<f64> = window.iter().map(|c| to_f64(c.low)).collect();
        let volumes: Vec<f64> = window.iter().map(|c| to_f64(c.volume)).collect();

        let (macd, macd_signal, macd_hist) = match crate::indicators::macd(&closes, 12, 26, 9) {
            Some((m, s, h)) => (Some(m), Some(s), Some(h)),
            None => (None, None, None),
        };
        let (bb_upper, bb_middle, bb_lower) = match crate::indicators::bollinger_bands(&closes, 20, 2.0) {
            Some((u, m, l)) => (Some(u), Some(m), Some(l)),
            None => (None, None, None),
        };
        let (stoch_rsi_fast_k, stoch_rsi_fast_d) =
            match crate::indicators::stochastic_rsi(&closes, 10, 5, 3) {
                Some((k, d)) => (Some(k), Some(d)),
                None => (None, None),
            };
        let (ichimoku_conv, ichimoku_base, ichimoku_span_a, ichimoku_span_b) =
            match crate::indicators::ichimoku(&highs, &lows, 9, 20, 40) {
                Some((conv, base, span_a, span_b)) => {
                    (Some(conv), Some(base), Some(span_a), Some(span_b))
                }
                None => (None, None, None, None),
            };

        Self {
            exchange: candle.exchange.clone(),
            symbol: candle.symbol.clone(),
            timeframe: candle.timeframe,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            timestamp: candle.timestamp,

            rsi_9: crate::indicators::rsi(&closes, 9),
            rsi_14: crate::indicators::rsi(&closes, 14),
            rsi_21: crate::indicators::rsi(&closes, 21),
            rsi_28: crate::indicators::rsi(&closes, 28),

            macd,
            macd_signal,
            macd_hist,

            bb_upper,
            bb_middle,
            bb_lower,

            stoch_rsi_fast_k,
            stoch_rsi_fast_d,

            adx_14: crate::indicators::adx(&highs, &lows, &closes, 14),

            volume_ema_10: crate::indicators::ema(&volumes, 10),

            ichimoku_conv,
            ichimoku_base,
            ichimoku_span_a,
            ichimoku_span_b,

            mfi_14: crate::indicators::mfi(&highs, &lows, &closes, &volumes, 14),
            atr_10: crate::indicators::atr(&highs, &lows, &closes, 10),
            price_roc_6: crate::indicators::roc(&closes, 6),

            sma_7: crate::indicators::sma(&closes, 7),
            sma_14: crate::indicators::sma(&closes, 14),
            sma_21: crate::indicators::sma(&closes, 21),
            sma_28: crate::indicators::sma(&closes, 28),
        }
    }
}

fn to_f64(d: rust_decimal::Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    d.to_f64().unwrap_or(0.0)
}
