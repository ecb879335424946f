//! Retrying HTTP client factory for REST-based exchange adapters, generalizing
//! the teacher's `infrastructure::core::http_client_factory::HttpClientFactory`.

use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::time::Duration;

/// Builds a client wrapping transient failures (timeouts, 5xx, connect
/// resets) in exponential-backoff retries, capped at 3 attempts.
pub fn build_client() -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);

    let client = Client::builder()
        .pool_max_idle_per_host(5)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new());

    ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}

/// Appends `params` to `base_url` as a query string. `reqwest-middleware`
/// 0.5's request builder doesn't expose `.query()`, so the URL is built by
/// hand instead, matching the teacher's `build_url_with_query`.
pub fn url_with_query<K, V>(base_url: &str, params: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    if params.is_empty() {
        return base_url.to_string();
    }

    let query_string: String = params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k.as_ref()), percent_encode(v.as_ref())))
        .collect::<Vec<_>>()
        .join("&");

    if base_url.contains('?') {
        format!("{base_url}&{query_string}")
    } else {
        format!("{base_url}?{query_string}")
    }
}

fn percent_encode(s: &str) -> String {
    let mut encoded = String::new();
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => encoded.push(c),
            _ => {
                for byte in c.to_string().as_bytes() {
                    encoded.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_with_query_appends_encoded_params() {
        let url = url_with_query("https://api.kraken.com/0/public/Trades", &[("pair", "BTC/USD"), ("since", "0")]);
        assert_eq!(url, "https://api.kraken.com/0/public/Trades?pair=BTC%2FUSD&since=0");
    }

    #[test]
    fn url_with_query_is_identity_when_empty() {
        let url = url_with_query::<&str, &str>("https://api.kraken.com/0/public/Trades", &[]);
        assert_eq!(url, "https://api.kraken.com/0/public/Trades");
    }
}
