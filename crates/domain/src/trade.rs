use crate::asset::{Asset, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single executed trade pulled off an exchange's WS or REST feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub exchange: String,
    pub symbol: Symbol,
    pub price: Decimal,
    pub volume: Decimal,
    /// Message time in milliseconds since the epoch — the timestamp every
    /// downstream window and watermark is keyed on, never broker-assigned time.
    pub timestamp: i64,
}

impl Trade {
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>, price: Decimal, volume: Decimal, timestamp: i64) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
            price,
            volume,
            timestamp,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.price > Decimal::ZERO
            && self.volume > Decimal::ZERO
            && self.timestamp >= 0
            && Asset::base_of(&self.symbol).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_non_positive_price_or_volume() {
        let t = Trade::new("kraken", "BTC", dec!(0), dec!(1), 0);
        assert!(!t.is_valid());
        let t = Trade::new("kraken", "BTC", dec!(1), dec!(0), 0);
        assert!(!t.is_valid());
    }

    #[test]
    fn accepts_a_symbol_with_a_recognized_base_asset() {
        let t = Trade::new("kraken", "BTCUSD", dec!(1), dec!(1), 0);
        assert!(t.is_valid());
    }

    #[test]
    fn rejects_a_symbol_with_no_recognized_base_asset() {
        let t = Trade::new("kraken", "SHIBUSD", dec!(1), dec!(1), 0);
        assert!(!t.is_valid());
    }

    #[test]
    fn json_round_trip() {
        let t = Trade::new("kraken", "BTC", dec!(42000.5), dec!(0.1), 1_704_067_200_000);
        let encoded = serde_json::to_string(&t).unwrap();
        let decoded: Trade = serde_json::from_str(&encoded).unwrap();
        assert_eq!(t, decoded);
    }
}
