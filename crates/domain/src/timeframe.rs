use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid timeframe: '{0}'. Valid options: 1m, 5m, 15m, 30m, 1h, 4h, 1D, 1W, 1M")]
pub struct ParseTimeframeError(String);

/// Tumbling window sizes supported by the candle and TA operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    OneMin,
    FiveMin,
    FifteenMin,
    ThirtyMin,
    OneHour,
    FourHour,
    OneDay,
    OneWeek,
    OneMonth,
}

impl Timeframe {
    pub fn to_minutes(&self) -> i64 {
        match self {
            Timeframe::OneMin => 1,
            Timeframe::FiveMin => 5,
            Timeframe::FifteenMin => 15,
            Timeframe::ThirtyMin => 30,
            Timeframe::OneHour => 60,
            Timeframe::FourHour => 240,
            Timeframe::OneDay => 1440,
            Timeframe::OneWeek => 1440 * 7,
            // Treated as a fixed 30-day window; calendar-month alignment is not
            // needed by anything downstream.
            Timeframe::OneMonth => 1440 * 30,
        }
    }

    pub fn to_millis(&self) -> i64 {
        self.to_minutes() * 60 * 1000
    }

    pub fn to_wire_string(&self) -> &'static str {
        match self {
            Timeframe::OneMin => "1m",
            Timeframe::FiveMin => "5m",
            Timeframe::FifteenMin => "15m",
            Timeframe::ThirtyMin => "30m",
            Timeframe::OneHour => "1h",
            Timeframe::FourHour => "4h",
            Timeframe::OneDay => "1D",
            Timeframe::OneWeek => "1W",
            Timeframe::OneMonth => "1M",
        }
    }

    pub fn all() -> Vec<Timeframe> {
        vec![
            Timeframe::OneMin,
            Timeframe::FiveMin,
            Timeframe::FifteenMin,
            Timeframe::ThirtyMin,
            Timeframe::OneHour,
            Timeframe::FourHour,
            Timeframe::OneDay,
            Timeframe::OneWeek,
            Timeframe::OneMonth,
        ]
    }

    /// Epoch-aligned window start containing `timestamp_ms`, per message time.
    pub fn window_start(&self, timestamp_ms: i64) -> i64 {
        let period = self.to_millis();
        timestamp_ms - timestamp_ms.rem_euclid(period)
    }

    pub fn window_end(&self, timestamp_ms: i64) -> i64 {
        self.window_start(timestamp_ms) + self.to_millis()
    }

    pub fn is_window_start(&self, timestamp_ms: i64) -> bool {
        timestamp_ms.rem_euclid(self.to_millis()) == 0
    }
}

impl FromStr for Timeframe {
    type Err = ParseTimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The spec's wire tokens are case-sensitive ("1m" vs "1M" name
        // different timeframes) and must be matched before falling back to
        // the case-insensitive long-form aliases below.
        match s {
            "1m" => return Ok(Timeframe::OneMin),
            "5m" => return Ok(Timeframe::FiveMin),
            "15m" => return Ok(Timeframe::FifteenMin),
            "30m" => return Ok(Timeframe::ThirtyMin),
            "1h" => return Ok(Timeframe::OneHour),
            "4h" => return Ok(Timeframe::FourHour),
            "1D" => return Ok(Timeframe::OneDay),
            "1W" => return Ok(Timeframe::OneWeek),
            "1M" => return Ok(Timeframe::OneMonth),
            _ => {}
        }
        match s.to_lowercase().as_str() {
            "1min" => Ok(Timeframe::OneMin),
            "5min" => Ok(Timeframe::FiveMin),
            "15min" => Ok(Timeframe::FifteenMin),
            "30min" => Ok(Timeframe::ThirtyMin),
            "1hour" => Ok(Timeframe::OneHour),
            "4hour" => Ok(Timeframe::FourHour),
            "1day" => Ok(Timeframe::OneDay),
            "1week" => Ok(Timeframe::OneWeek),
            "1month" => Ok(Timeframe::OneMonth),
            _ => Err(ParseTimeframeError(s.to_string())),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire_string())
    }
}
