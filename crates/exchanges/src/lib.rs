//! Exchange WS/REST ingestion adapters.
//!
//! Generalizes `rustrade::infrastructure::binance::websocket`'s
//! channel-mediated writer/ping-task/read-loop shape into a trait two
//! exchanges implement: a live WebSocket client and a cursor-paginated REST
//! historical client, matching the wire contracts of the original Kraken
//! client this was distilled from.

pub mod http_client;
pub mod kraken;

use async_trait::async_trait;
use futures::stream::BoxStream;
use pipeline_domain::errors::ExchangeError;
use pipeline_domain::trade::Trade;

#[async_trait]
pub trait ExchangeWsClient: Send + Sync {
    /// Connects and subscribes to the configured symbols' trade channel.
    async fn connect(&mut self) -> Result<(), ExchangeError>;

    /// The live trade stream. Ends on a normal close; ends with a surfaced
    /// `ExchangeError::ConnectionLost` on an abnormal close.
    fn stream_trades(self: Box<Self>) -> BoxStream<'static, Result<Trade, ExchangeError>>;
}

#[async_trait]
pub trait ExchangeRestClient: Send + Sync {
    /// Streams historical trades from `since_ms` up to `stop_ns` (a
    /// wall-clock cutoff captured at stream start), paginating on an
    /// opaque nanosecond cursor with a rate-limit sleep between pages.
    fn stream_trades(
        &self,
        since_ms: i64,
        stop_ns: i64,
    ) -> BoxStream<'static, Result<Trade, ExchangeError>>;
}
