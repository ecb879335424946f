//! Pure scalar indicator functions over a buffered candle window.
//!
//! Each function recomputes its indicator over the whole window and returns
//! the value "as of" the last element — the TA operator's ring buffer is
//! replayed through the indicator on every emission rather than carrying
//! incremental indicator state across emissions, so a null is simply "not
//! enough history yet" with no separate warm-up bookkeeping to get wrong.
//!
//! RSI/MACD/Bollinger/EMA/SMA/ATR/MFI/ROC are computed with the `ta` crate's
//! incremental indicators fed one value at a time. ADX, Ichimoku, and
//! Stochastic RSI have no `ta` crate equivalent and are hand-rolled below.

use ta::indicators::{
    AverageTrueRange, BollingerBands, ExponentialMovingAverage, MoneyFlowIndex,
    MovingAverageConvergenceDivergence, RelativeStrengthIndex, SimpleMovingAverage,
};
use ta::{DataItem, Next};

pub fn sma(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period {
        return None;
    }
    let mut ind = SimpleMovingAverage::new(period).ok()?;
    let mut last = 0.0;
    for &c in closes {
        last = ind.next(c);
    }
    Some(last)
}

pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if values.len() < period {
        return None;
    }
    let mut ind = ExponentialMovingAverage::new(period).ok()?;
    let mut last = 0.0;
    for &v in values {
        last = ind.next(v);
    }
    Some(last)
}

pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period + 1 {
        return None;
    }
    let mut ind = RelativeStrengthIndex::new(period).ok()?;
    let mut last = 0.0;
    for &c in closes {
        last = ind.next(c);
    }
    Some(last)
}

pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<(f64, f64, f64)> {
    if closes.len() < slow + signal {
        return None;
    }
    let mut ind = MovingAverageConvergenceDivergence::new(fast, slow, signal).ok()?;
    let mut last = None;
    for &c in closes {
        last = Some(ind.next(c));
    }
    last.map(|o| (o.macd, o.signal, o.histogram))
}

pub fn bollinger_bands(closes: &[f64], period: usize, multiplier: f64) -> Option<(f64, f64, f64)> {
    if closes.len() < period {
        return None;
    }
    let mut ind = BollingerBands::new(period, multiplier).ok()?;
    let mut last = None;
    for &c in closes {
        last = Some(ind.next(c));
    }
    last.map(|o| (o.upper, o.average, o.lower))
}

pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period {
        return None;
    }
    let mut ind = AverageTrueRange::new(period).ok()?;
    let mut last = 0.0;
    for i in 0..closes.len() {
        let item = DataItem::builder()
            .open(closes[i])
            .high(highs[i])
            .low(lows[i])
            .close(closes[i])
            .volume(0.0)
            .build()
            .ok()?;
        last = ind.next(&item);
    }
    Some(last)
}

pub fn mfi(highs: &[f64], lows: &[f64], closes: &[f64], volumes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period {
        return None;
    }
    let mut ind = MoneyFlowIndex::new(period).ok()?;
    let mut last = 0.0;
    for i in 0..closes.len() {
        let item = DataItem::builder()
            .open(closes[i])
            .high(highs[i])
            .low(lows[i])
            .close(closes[i])
            .volume(volumes[i])
            .build()
            .ok()?;
        last = ind.next(&item);
    }
    Some(last)
}

pub fn roc(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period + 1 {
        return None;
    }
    let n = closes.len();
    let past = closes[n - 1 - period];
    let now = closes[n - 1];
    if past == 0.0 {
        return None;
    }
    Some((now - past) / past * 100.0)
}

/// Wilder's ADX — no `ta` crate equivalent, hand-rolled from +DM/-DM/TR.
pub fn adx(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Option<f64> {
    let n = closes.len();
    if n < period * 2 + 1 {
        return None;
    }

    let mut plus_dm = Vec::with_capacity(n);
    let mut minus_dm = Vec::with_capacity(n);
    let mut tr = Vec::with_capacity(n);

    for i in 1..n {
        let up_move = highs[i] - highs[i - 1];
        let down_move = lows[i - 1] - lows[i];
        plus_dm.push(if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 });
        minus_dm.push(if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 });

        let range = (highs[i] - lows[i])
            .max((highs[i] - closes[i - 1]).abs())
            .max((lows[i] - closes[i - 1]).abs());
        tr.push(range);
    }

    let smooth = |series: &[f64], period: usize| -> Vec<f64> {
        if series.len() < period {
            return vec![];
        }
        let mut out = Vec::with_capacity(series.len());
        let mut prev: f64 = series[..period].iter().sum();
        out.push(prev);
        for &v in &series[period..] {
            prev = prev - (prev / period as f64) + v;
            out.push(prev);
        }
        out
    };

    let tr_s = smooth(&tr, period);
    let plus_s = smooth(&plus_dm, period);
    let minus_s = smooth(&minus_dm, period);
    if tr_s.is_empty() {
        return None;
    }

    let dx: Vec<f64> = tr_s
        .iter()
        .zip(plus_s.iter())
        .zip(minus_s.iter())
        .map(|((&tr, &p), &m)| {
            // A flat window (no high/low/close movement at all) makes `tr`
            // zero along with both DMs; treat it as no directional movement
            // rather than dividing by zero into NaN.
            if tr == 0.0 {
                return 0.0;
            }
            let plus_di = 100.0 * p / tr;
            let minus_di = 100.0 * m / tr;
            let sum = plus_di + minus_di;
            if sum == 0.0 { 0.0 } else { 100.0 * (plus_di - minus_di).abs() / sum }
        })
        .collect();

    if dx.len() < period {
        return None;
    }
    Some(dx[dx.len() - period..].iter().sum::<f64>() / period as f64)
}

/// Ichimoku conversion/base/span lines — no `ta` crate equivalent.
pub fn ichimoku(highs: &[f64], lows: &[f64], conv: usize, base: usize, span_b_period: usize) -> Option<(f64, f64, f64, f64)> {
    let midpoint = |highs: &[f64], lows: &[f64], period: usize| -> Option<f64> {
        if highs.len() < period {
            return None;
        }
        let h = highs[highs.len() - period..].iter().cloned().fold(f64::MIN, f64::max);
        let l = lows[lows.len() - period..].iter().cloned().fold(f64::MAX, f64::min);
        Some((h + l) / 2.0)
    };

    let conv_line = midpoint(highs, lows, conv)?;
    let base_line = midpoint(highs, lows, base)?;
    let span_a = (conv_line + base_line) / 2.0;
    let span_b = midpoint(highs, lows, span_b_period)?;
    Some((conv_line, base_line, span_a, span_b))
}

/// Stochastic RSI: a %K/%D stochastic oscillator computed over an RSI series.
pub fn stochastic_rsi(closes: &[f64], rsi_period: usize, fast_k: usize, fast_d: usize) -> Option<(f64, f64)> {
    if closes.len() < rsi_period + fast_k + fast_d {
        return None;
    }
    let mut rsi_ind = RelativeStrengthIndex::new(rsi_period).ok()?;
    let rsi_series: Vec<f64> = closes.iter().map(|&c| rsi_ind.next(c)).collect();

    if rsi_series.len() < fast_k {
        return None;
    }

    let stoch_k_series: Vec<f64> = (fast_k - 1..rsi_series.len())
        .map(|i| {
            let window = &rsi_series[i + 1 - fast_k..=i];
            let lo = window.iter().cloned().fold(f64::MAX, f64::min);
            let hi = window.iter().cloned().fold(f64::MIN, f64::max);
            if (hi - lo).abs() < f64::EPSILON {
                50.0
            } else {
                100.0 * (rsi_series[i] - lo) / (hi - lo)
            }
        })
        .collect();

    if stoch_k_series.len() < fast_d {
        return None;
    }
    let fast_k_val = *stoch_k_series.last()?;
    let fast_d_val = stoch_k_series[stoch_k_series.len() - fast_d..].iter().sum::<f64>() / fast_d as f64;
    Some((fast_k_val, fast_d_val))
}
