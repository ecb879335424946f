use std::collections::HashMap;

use pipeline_domain::timeframe::Timeframe;
use pipeline_domain::trade::Trade;
use rust_decimal_macros::dec;
use stage_candles::{fold_trade, EmissionMode};

fn trade(ts: i64, price: rust_decimal::Decimal, volume: rust_decimal::Decimal) -> Trade {
    Trade::new("kraken", "BTC", price, volume, ts)
}

/// FULL mode holds everything back until the window boundary is crossed,
/// then emits exactly the just-finished (not the newly-opened) candle.
#[test]
fn emits_only_once_when_the_window_boundary_is_crossed() {
    let mut states = HashMap::new();
    let tf = Timeframe::OneMin;

    let mut emissions = Vec::new();
    for t in [trade(1_000, dec!(100), dec!(1)), trade(50_000, dec!(110), dec!(2))] {
        if let Some(c) = fold_trade(&mut states, tf, &t, EmissionMode::Full) {
            emissions.push(c);
        }
    }
    assert!(emissions.is_empty(), "no emission before the window closes");

    if let Some(c) = fold_trade(&mut states, tf, &trade(60_000, dec!(999), dec!(5)), EmissionMode::Full) {
        emissions.push(c);
    }

    assert_eq!(emissions.len(), 1);
    let finished = &emissions[0];
    assert_eq!(finished.open, dec!(100));
    assert_eq!(finished.high, dec!(110));
    assert_eq!(finished.close, dec!(110));
    assert_eq!(finished.start, Some(0));
    assert_eq!(finished.end, Some(60_000));
    // The boundary trade opened a new window and must not appear in it.
    assert_ne!(finished.open, dec!(999));
}
