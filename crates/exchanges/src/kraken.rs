use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use futures_util::SinkExt;
use pipeline_domain::asset::Asset;
use pipeline_domain::errors::ExchangeError;
use pipeline_domain::trade::Trade;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::VecDeque;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{error, info, warn};

use crate::http_client::{build_client, url_with_query};
use crate::{ExchangeRestClient, ExchangeWsClient};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Splits a concatenated pair symbol (e.g. "DOGEUSD") into Kraken's
/// slash-separated form ("DOGE/USD"), splitting on the closed asset set's
/// base rather than assuming a fixed 3-letter base — a 3-letter split would
/// mangle a 4-letter base like DOGE into "DOG/EUSD".
fn to_kraken_symbol(symbol: &str) -> String {
    match Asset::base_of(symbol) {
        Some(base) if symbol.len() > base.as_str().len() => {
            format!("{}/{}", base.as_str(), &symbol[base.as_str().len()..])
        }
        _ => symbol.to_string(),
    }
}

fn from_kraken_symbol(symbol: &str) -> String {
    symbol.replace('/', "")
}

#[derive(Debug, Deserialize)]
struct KrakenTradeRecord {
    symbol: String,
    price: f64,
    qty: f64,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct KrakenWsMessage {
    channel: Option<String>,
    #[serde(default)]
    data: Vec<KrakenTradeRecord>,
}

pub struct KrakenWsClient {
    url: String,
    symbols: Vec<String>,
    ws: Option<WsStream>,
}

impl KrakenWsClient {
    pub fn new(url: impl Into<String>, symbols: Vec<String>) -> Self {
        Self {
            url: url.into(),
            symbols,
            ws: None,
        }
    }

    fn parse_message(text: &str) -> Result<Vec<Trade>, ExchangeError> {
        let msg: KrakenWsMessage = serde_json::from_str(text).map_err(|e| ExchangeError::Malformed {
            reason: format!("invalid frame: {e}"),
        })?;

        match msg.channel.as_deref() {
            Some("trade") => Ok(msg
                .data
                .into_iter()
                .filter_map(|t| {
                    let ts = chrono::DateTime::parse_from_rfc3339(&t.timestamp)
                        .map(|dt| dt.timestamp_millis())
                        .unwrap_or(0);
                    let price = Decimal::try_from(t.price).ok()?;
                    let qty = Decimal::try_from(t.qty).ok()?;
                    Some(Trade::new("kraken", from_kraken_symbol(&t.symbol), price, qty, ts))
                })
                .collect()),
            Some("heartbeat") => Ok(vec![]),
            other => {
                info!(channel = ?other, "kraken: unrecognized channel message");
                Ok(vec![])
            }
        }
    }
}

#[async_trait]
impl ExchangeWsClient for KrakenWsClient {
    async fn connect(&mut self) -> Result<(), ExchangeError> {
        let (ws, _) = connect_async(&self.url).await.map_err(|e| ExchangeError::ConnectionLost {
            reason: e.to_string(),
        })?;
        let mut ws = ws;

        let kraken_symbols: Vec<String> = self.symbols.iter().map(|s| to_kraken_symbol(s)).collect();
        let subscribe = serde_json::json!({
            "method": "subscribe",
            "params": {
                "channel": "trade",
                "symbol": kraken_symbols,
                "snapshot": true,
            }
        });
        ws.send(Message::Text(subscribe.to_string().into()))
            .await
            .map_err(|e| ExchangeError::ConnectionLost { reason: e.to_string() })?;
        info!(symbols = ?self.symbols, "kraken: subscribed");

        self.ws = Some(ws);
        Ok(())
    }

    fn stream_trades(self: Box<Self>) -> BoxStream<'static, Result<Trade, ExchangeError>> {
        let ws = self.ws.expect("connect() must be called before stream_trades()");
        let state = (ws, VecDeque::<Trade>::new());
        stream::unfold(state, |(mut ws, mut buffer)| async move {
            loop {
                if let Some(trade) = buffer.pop_front() {
                    return Some((Ok(trade), (ws, buffer)));
                }

                match ws.next().await {
                    Some(Ok(Message::Text(text))) => match KrakenWsClient::parse_message(&text) {
                        Ok(trades) => {
                            buffer.extend(trades);
                            continue;
                        }
                        Err(e) => {
                            warn!("kraken: skipping malformed frame: {}", e);
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "kraken: websocket closed normally");
                        return None;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        error!("kraken: websocket closed with error: {}", e);
                        return Some((
                            Err(ExchangeError::ConnectionLost { reason: e.to_string() }),
                            (ws, buffer),
                        ));
                    }
                    None => return None,
                }
            }
        })
        .boxed()
    }
}

pub struct KrakenRestClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base_url: String,
    symbols: Vec<String>,
}

impl KrakenRestClient {
    pub fn new(base_url: impl Into<String>, symbols: Vec<String>) -> Self {
        Self {
            client: build_client(),
            base_url: base_url.into(),
            symbols,
        }
    }
}

/// Maps a `ClientWithMiddleware` failure onto the domain's typed exchange
/// error: a genuine transport failure surfaces as `Transport` (retries
/// already exhausted by the middleware), anything else as `Fatal`.
fn to_exchange_error(e: reqwest_middleware::Error) -> ExchangeError {
    match e {
        reqwest_middleware::Error::Reqwest(e) => ExchangeError::Transport(e),
        reqwest_middleware::Error::Middleware(e) => ExchangeError::Fatal { reason: e.to_string() },
    }
}

#[derive(Debug, Deserialize)]
struct KrakenRestResponse {
    #[serde(default)]
    error: Vec<String>,
    result: Option<serde_json::Value>,
}

/// One page's worth of trades for `symbol` plus the cursor to use next.
struct Page {
    trades: Vec<Result<Trade, ExchangeError>>,
    /// The `last` cursor (ns) to pass as `since` on the next call, or the
    /// error that ends the stream.
    next_cursor: Result<i64, ()>,
}

/// Parses one Kraken REST page into trades and the next pagination cursor.
/// An API error array, a missing/malformed `result`, or an empty page are
/// all fatal per the historical-backfill contract — the API guarantees a
/// non-empty page up to `stop_ns`, so an empty one means something is wrong
/// rather than "no more history yet".
fn parse_page(parsed: KrakenRestResponse, symbol: &str, cursor_ns: i64) -> Page {
    let fatal = |reason: String| Page {
        trades: vec![Err(ExchangeError::Fatal { reason })],
        next_cursor: Err(()),
    };

    if !parsed.error.is_empty() {
        return fatal(parsed.error.join(", "));
    }

    let Some(result) = parsed.result else {
        return fatal("missing result field".into());
    };

    let Some(pair_key) = result.as_object().and_then(|m| m.keys().find(|k| k.as_str() != "last")).cloned() else {
        return fatal("result carried no pair key".into());
    };

    let rows = result[&pair_key].as_array().cloned().unwrap_or_default();
    let last: i64 = result["last"].as_str().and_then(|s| s.parse().ok()).unwrap_or(cursor_ns);

    if rows.is_empty() {
        return fatal("empty page before stop cursor reached".into());
    }

    let trades: Vec<Result<Trade, ExchangeError>> = rows
        .iter()
        .filter_map(|row| {
            let arr = row.as_array()?;
            let price: Decimal = arr.first()?.as_str()?.parse().ok()?;
            let volume: Decimal = arr.get(1)?.as_str()?.parse().ok()?;
            let ts_secs = arr.get(2)?.as_f64()?;
            let ts_ms = (ts_secs * 1000.0) as i64;
            Some(Ok(Trade::new("kraken", symbol.to_string(), price, volume, ts_ms)))
        })
        .collect();

    Page { trades, next_cursor: Ok(last) }
}

impl ExchangeRestClient for KrakenRestClient {
    fn stream_trades(&self, since_ms: i64, stop_ns: i64) -> BoxStream<'static, Result<Trade, ExchangeError>> {
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let symbols = self.symbols.clone();

        // Concurrent per-symbol cursors, each independently replayed through
        // `fetch_page`; flattened into a single stream in `Trade` order per
        // symbol (cross-symbol ordering is not guaranteed, matching the
        // original's per-symbol `fetch_all_trades` gather-then-flatten).
        let streams: Vec<_> = symbols
            .into_iter()
            .map(|symbol| {
                let client = client.clone();
                let base_url = base_url.clone();
                let kraken_symbol = to_kraken_symbol(&symbol);
                stream::unfold(
                    (client, base_url, kraken_symbol, symbol, since_ms * 1_000_000, false),
                    move |(client, base_url, kraken_symbol, symbol, cursor_ns, done)| async move {
                        if done || cursor_ns >= stop_ns {
                            return None;
                        }
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;

                        let url = url_with_query(
                            &format!("{base_url}/0/public/Trades"),
                            &[("pair", kraken_symbol.as_str()), ("since", &cursor_ns.to_string())],
                        );
                        let resp = match client.get(&url).send().await {
                            Ok(r) => r,
                            Err(e) => {
                                return Some((
                                    vec![Err(to_exchange_error(e))],
                                    (client, base_url, kraken_symbol, symbol, cursor_ns, true),
                                ))
                            }
                        };

                        let parsed: KrakenRestResponse = match resp.json().await {
                            Ok(p) => p,
                            Err(e) => {
                                return Some((
                                    vec![Err(ExchangeError::Transport(e))],
                                    (client, base_url, kraken_symbol, symbol, cursor_ns, true),
                                ))
                            }
                        };

                        let page = parse_page(parsed, &symbol, cursor_ns);
                        let (next_cursor, done) = match page.next_cursor {
                            Ok(last) => (last, last >= stop_ns),
                            Err(()) => (cursor_ns, true),
                        };
                        Some((page.trades, (client, base_url, kraken_symbol, symbol, next_cursor, done)))
                    },
                )
                .flat_map(stream::iter)
                .boxed()
            })
            .collect();

        stream::select_all(streams).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_round_trips_through_kraken_format() {
        assert_eq!(to_kraken_symbol("BTCUSD"), "BTC/USD");
        assert_eq!(from_kraken_symbol("BTC/USD"), "BTCUSD");
    }

    #[test]
    fn symbol_splits_on_a_four_letter_base_asset() {
        assert_eq!(to_kraken_symbol("DOGEUSD"), "DOGE/USD");
        assert_eq!(from_kraken_symbol("DOGE/USD"), "DOGEUSD");
    }

    #[test]
    fn parse_message_skips_unrecognized_channel() {
        let trades = KrakenWsClient::parse_message(r#"{"channel":"status"}"#).unwrap();
        assert!(trades.is_empty());
    }

    #[test]
    fn parse_message_rejects_malformed_json() {
        assert!(KrakenWsClient::parse_message("not json").is_err());
    }

    #[test]
    fn parse_message_decodes_trade_batch() {
        let text = r#"{"channel":"trade","data":[{"symbol":"BTC/USD","price":42000.5,"qty":0.1,"timestamp":"2024-01-01T00:00:00.000000Z"}]}"#;
        let trades = KrakenWsClient::parse_message(text).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].symbol, "BTCUSD");
    }

    fn rest_response(pair_rows: serde_json::Value, last: &str) -> KrakenRestResponse {
        let mut result = serde_json::Map::new();
        result.insert("XBTUSD".into(), pair_rows);
        result.insert("last".into(), serde_json::Value::String(last.into()));
        KrakenRestResponse { error: vec![], result: Some(serde_json::Value::Object(result)) }
    }

    #[test]
    fn parse_page_advances_cursor_to_returned_last() {
        let rows = serde_json::json!([
            ["42000.1", "0.5", 1704067200.0, "b", "m", "", "1"],
            ["42001.2", "0.3", 1704067201.0, "s", "m", "", "2"],
            ["42002.3", "0.1", 1704067202.0, "b", "m", "", "3"],
        ]);
        let page = parse_page(rest_response(rows, "1704067201000000000"), "BTCUSD", 0);
        assert_eq!(page.trades.len(), 3);
        assert_eq!(page.next_cursor, Ok(1704067201000000000));
        assert!(page.trades.iter().all(|t| t.is_ok()));
    }

    #[test]
    fn parse_page_is_fatal_on_empty_rows() {
        let page = parse_page(rest_response(serde_json::json!([]), "123"), "BTCUSD", 0);
        assert!(page.next_cursor.is_err());
        assert_eq!(page.trades.len(), 1);
        assert!(page.trades[0].is_err());
    }

    #[test]
    fn parse_page_is_fatal_on_api_error_array() {
        let parsed = KrakenRestResponse { error: vec!["EQuery:Unknown asset pair".into()], result: None };
        let page = parse_page(parsed, "BTCUSD", 0);
        assert!(page.next_cursor.is_err());
        assert!(matches!(page.trades[0], Err(ExchangeError::Fatal { .. })));
    }
}
