use crate::asset::Symbol;
use crate::timeframe::Timeframe;
use crate::trade::Trade;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An OHLCV candle built by folding trades into a tumbling window.
///
/// `start`/`end` are only `Some` once [`Candle::close_window`] has stamped the
/// window bounds; a candle still accumulating updates carries `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub exchange: String,
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub timestamp: i64,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl Candle {
    /// Seed a new window from its first trade.
    pub fn init(timeframe: Timeframe, trade: &Trade) -> Self {
        Self {
            exchange: trade.exchange.clone(),
            symbol: trade.symbol.clone(),
            timeframe,
            open: trade.price,
            high: trade.price,
            low: trade.price,
            close: trade.price,
            volume: trade.volume,
            timestamp: trade.timestamp,
            start: None,
            end: None,
        }
    }

    /// Fold one more trade into this window. `open` never changes once set;
    /// `close`/`timestamp` are overwritten so the candle reflects the most
    /// recently observed trade.
    pub fn update(&mut self, trade: &Trade) {
        self.high = self.high.max(trade.price);
        self.low = self.low.min(trade.price);
        self.close = trade.price;
        self.volume += trade.volume;
        self.timestamp = trade.timestamp;
    }

    /// Stamp the window bounds. Idempotent: calling this twice with the same
    /// bounds is a no-op, calling it with different bounds simply re-stamps.
    pub fn close_window(&mut self, start: i64, end: i64) {
        self.start = Some(start);
        self.end = Some(end);
    }

    pub fn is_compatible(&self, other: &Candle) -> bool {
        self.symbol == other.symbol && self.timeframe == other.timeframe
    }

    pub fn is_same_window(&self, other: &Candle) -> bool {
        self.is_compatible(other) && self.start == other.start && self.end == other.end
    }

    pub fn key(&self) -> String {
        format!("{}-{}-{}", self.exchange, self.symbol, self.timeframe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(price: Decimal, volume: Decimal, ts: i64) -> Trade {
        Trade::new("kraken", "BTC", price, volume, ts)
    }

    #[test]
    fn init_seeds_ohlcv_from_first_trade() {
        let c = Candle::init(Timeframe::OneMin, &trade(dec!(100), dec!(2), 1000));
        assert_eq!(c.open, dec!(100));
        assert_eq!(c.high, dec!(100));
        assert_eq!(c.low, dec!(100));
        assert_eq!(c.close, dec!(100));
        assert_eq!(c.volume, dec!(2));
        assert!(c.start.is_none());
    }

    #[test]
    fn update_widens_high_low_and_sums_volume() {
        let mut c = Candle::init(Timeframe::OneMin, &trade(dec!(100), dec!(1), 1000));
        c.update(&trade(dec!(105), dec!(1), 1500));
        c.update(&trade(dec!(95), dec!(2), 2000));
        assert_eq!(c.open, dec!(100));
        assert_eq!(c.high, dec!(105));
        assert_eq!(c.low, dec!(95));
        assert_eq!(c.close, dec!(95));
        assert_eq!(c.volume, dec!(4));
        assert_eq!(c.timestamp, 2000);
        assert!(c.low <= c.open && c.open <= c.high);
        assert!(c.low <= c.close && c.close <= c.high);
    }

    #[test]
    fn high_low_volume_are_order_independent() {
        let mut a = Candle::init(Timeframe::OneMin, &trade(dec!(100), dec!(1), 1000));
        a.update(&trade(dec!(105), dec!(1), 1500));
        a.update(&trade(dec!(95), dec!(2), 2000));

        let mut b = Candle::init(Timeframe::OneMin, &trade(dec!(100), dec!(1), 1000));
        b.update(&trade(dec!(95), dec!(2), 2000));
        b.update(&trade(dec!(105), dec!(1), 1500));

        assert_eq!(a.high, b.high);
        assert_eq!(a.low, b.low);
        assert_eq!(a.volume, b.volume);
    }

    #[test]
    fn close_window_is_idempotent() {
        let mut c = Candle::init(Timeframe::OneMin, &trade(dec!(100), dec!(1), 1000));
        c.close_window(0, 60_000);
        c.close_window(0, 60_000);
        assert_eq!(c.start, Some(0));
        assert_eq!(c.end, Some(60_000));
    }

    #[test]
    fn compatibility_requires_same_symbol_and_timeframe() {
        let c1 = Candle::init(Timeframe::OneMin, &trade(dec!(100), dec!(1), 0));
        let mut c2 = Candle::init(Timeframe::OneMin, &trade(dec!(100), dec!(1), 0));
        c2.symbol = "ETH".into();
        assert!(!c1.is_compatible(&c2));
    }
}
