use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of assets the pipeline is willing to reason about — the same
/// allowed-asset list the sentiment prompt and `AssetSentiment` validation use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    BTC,
    ETH,
    XRP,
    SOL,
    ADA,
    DOGE,
}

impl Asset {
    pub fn all() -> &'static [Asset] {
        &[
            Asset::BTC,
            Asset::ETH,
            Asset::XRP,
            Asset::SOL,
            Asset::ADA,
            Asset::DOGE,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Asset::BTC => "BTC",
            Asset::ETH => "ETH",
            Asset::XRP => "XRP",
            Asset::SOL => "SOL",
            Asset::ADA => "ADA",
            Asset::DOGE => "DOGE",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Asset> {
        Self::all().iter().copied().find(|a| a.as_str() == s)
    }

    /// Resolves a trade symbol (e.g. "BTCUSD", or a bare base like "BTC")
    /// to the one closed-set asset it names, matching on the base prefix.
    pub fn base_of(symbol: &str) -> Option<Asset> {
        Self::all().iter().copied().find(|a| symbol.starts_with(a.as_str()))
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A trading pair's base symbol, e.g. "BTC" out of "BTC/USD". Exchange wire
/// formats are normalized into this before a `Trade` is constructed.
pub type Symbol = String;
