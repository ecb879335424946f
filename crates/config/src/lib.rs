//! Env-var configuration helpers shared by every stage binary, generalizing
//! the `env::var(...).unwrap_or_else(...).parse().context(...)` idiom into a
//! small set of prefix-aware helpers so each stage's `Settings::from_env`
//! reads like a flat list of fields instead of repeating the boilerplate.

use anyhow::Result;
use pipeline_domain::errors::ConfigError;
use std::env;
use std::str::FromStr;

/// Loads a `.env` file if present, exactly as the teacher's entrypoints do
/// before reading any environment variable.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

pub fn env_var(prefix: &str, key: &str, default: &str) -> String {
    env::var(format!("{prefix}{key}")).unwrap_or_else(|_| default.to_string())
}

pub fn env_parse<T>(prefix: &str, key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env_var(prefix, key, default);
    raw.parse::<T>().map_err(|e| {
        ConfigError::InvalidVar {
            name: format!("{prefix}{key}"),
            reason: format!("'{raw}': {e}"),
        }
        .into()
    })
}

pub fn env_list(prefix: &str, key: &str, default: &str) -> Vec<String> {
    env_var(prefix, key, default)
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_falls_back_to_default_when_unset() {
        let v: u64 = env_parse("NONEXISTENT_PREFIX_", "POLL_INTERVAL_SECS", "10").unwrap();
        assert_eq!(v, 10);
    }

    #[test]
    fn env_list_splits_and_trims() {
        let v = env_list("NONEXISTENT_PREFIX_", "SYMBOLS", "BTC, ETH ,SOL");
        assert_eq!(v, vec!["BTC", "ETH", "SOL"]);
    }

    #[test]
    fn env_parse_surfaces_config_error_on_bad_value() {
        // SAFETY: test-only, single-threaded access to this specific var.
        unsafe { env::set_var("NONEXISTENT_PREFIX_PORT", "not-a-number") };
        let err = env_parse::<u16>("NONEXISTENT_PREFIX_", "PORT", "8080").unwrap_err();
        unsafe { env::remove_var("NONEXISTENT_PREFIX_PORT") };
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }
}
