use std::collections::HashMap;

use pipeline_domain::candle::Candle;
use pipeline_domain::timeframe::Timeframe;
use pipeline_domain::trade::Trade;
use rust_decimal_macros::dec;
use stage_candles::{fold_trade, EmissionMode};

fn trade(ts: i64, price: rust_decimal::Decimal, volume: rust_decimal::Decimal) -> Trade {
    Trade::new("kraken", "BTC", price, volume, ts)
}

/// LIVE mode re-emits the in-progress candle on every trade that lands in
/// the same window, with OHLCV updated so far and no window-close event.
#[test]
fn emits_an_updated_candle_on_every_trade_in_the_window() {
    let mut states = HashMap::new();
    let tf = Timeframe::OneMin;

    let emissions: Vec<Candle> = [
        trade(1_000, dec!(100), dec!(1)),
        trade(10_000, dec!(105), dec!(2)),
        trade(59_999, dec!(95), dec!(1)),
    ]
    .iter()
    .filter_map(|t| fold_trade(&mut states, tf, t, EmissionMode::Live))
    .collect();

    assert_eq!(emissions.len(), 3);
    let last = emissions.last().unwrap();
    assert_eq!(last.open, dec!(100));
    assert_eq!(last.high, dec!(105));
    assert_eq!(last.low, dec!(95));
    assert_eq!(last.close, dec!(95));
    assert_eq!(last.volume, dec!(4));
    assert_eq!(last.start, Some(0));
    assert_eq!(last.end, Some(60_000));
}
