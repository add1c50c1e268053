use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::bank::RetryPolicy;
use crate::conversion::DEFAULT_CACHE_TTL;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3030";

/// Runtime settings, read from the environment (and a `.env` file if present)
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
	pub database_url: String,
	pub bind_addr: SocketAddr,
	pub retry: RetryPolicy,
	pub currency_cache_ttl: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
	Missing(&'static str),
	Invalid { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			ConfigError::Missing(key) => write!(f, "{} must be set", key),
			ConfigError::Invalid { key, value } => write!(f, "{} has an invalid value: {:?}", key, value),
		}
	}
}

impl std::error::Error for ConfigError {}

impl Config {
	pub fn from_env() -> Result<Config, ConfigError> {
		dotenv::dotenv().ok();
		Config::from_lookup(|key| env::var(key).ok())
	}

	pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
		let bind_addr = parse_or(&lookup, "BIND_ADDR", || DEFAULT_BIND_ADDR.parse().ok())?;

		let defaults = RetryPolicy::default();
		let attempts = parse_or(&lookup, "RETRY_ATTEMPTS", || Some(defaults.max_attempts))?;
		let backoff_ms = parse_or(&lookup, "RETRY_BACKOFF_MS", || Some(defaults.backoff.as_millis() as u64))?;
		let ttl_secs = parse_or(&lookup, "CURRENCY_CACHE_TTL_SECS", || Some(DEFAULT_CACHE_TTL.as_secs()))?;

		Ok(Config {
			database_url,
			bind_addr,
			retry: RetryPolicy::new(attempts, Duration::from_millis(backoff_ms)),
			currency_cache_ttl: Duration::from_secs(ttl_secs),
		})
	}
}

fn parse_or<T, F, D>(lookup: &F, key: &'static str, default: D) -> Result<T, ConfigError>
where
	T: FromStr,
	F: Fn(&str) -> Option<String>,
	D: FnOnce() -> Option<T>,
{
	match lookup(key) {
		Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { key, value }),
		None => default().ok_or(ConfigError::Missing(key)),
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
		move |key| vars.get(key).cloned()
	}

	#[test]
	fn defaults() {
		let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/bank")])).unwrap();
		assert_eq!(config.database_url, "postgres://localhost/bank");
		assert_eq!(config.bind_addr, "127.0.0.1:3030".parse().unwrap());
		assert_eq!(config.retry, RetryPolicy::default());
		assert_eq!(config.currency_cache_ttl, Duration::from_secs(120));
	}

	#[test]
	fn overrides() {
		let config = Config::from_lookup(lookup(&[
			("DATABASE_URL", "postgres://db/bank"),
			("BIND_ADDR", "0.0.0.0:8080"),
			("RETRY_ATTEMPTS", "5"),
			("RETRY_BACKOFF_MS", "25"),
			("CURRENCY_CACHE_TTL_SECS", "30"),
		])).unwrap();
		assert_eq!(config.bind_addr.port(), 8080);
		assert_eq!(config.retry, RetryPolicy::new(5, Duration::from_millis(25)));
		assert_eq!(config.currency_cache_ttl, Duration::from_secs(30));
	}

	#[test]
	fn missing_and_invalid() {
		assert_eq!(Config::from_lookup(lookup(&[])).unwrap_err(), ConfigError::Missing("DATABASE_URL"));

		let err = Config::from_lookup(lookup(&[("DATABASE_URL", "x"), ("RETRY_ATTEMPTS", "many")])).unwrap_err();
		assert_eq!(err, ConfigError::Invalid { key: "RETRY_ATTEMPTS", value: "many".to_string() });
	}
}
