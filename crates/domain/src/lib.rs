pub mod asset;
pub mod candle;
pub mod errors;
pub mod indicators;
pub mod news;
pub mod sentiment;
pub mod ta;
pub mod timeframe;
pub mod trade;

pub use asset::{Asset, Symbol};
pub use candle::Candle;
pub use news::{NewsOutlet, NewsStory};
pub use sentiment::{AssetSentiment, NewsStorySentimentAnalysis, SentimentSignal};
pub use ta::TechnicalAnalysis;
pub use timeframe::Timeframe;
pub use trade::Trade;
