//! Runtime configuration read from the environment.

use std::{str::FromStr, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub requests: usize,
    pub window: Duration,
}

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub from: String,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub max_recipients: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub rate_limit: RateLimitSettings,
    pub duplicate_cache_ttl: Duration,
    pub email: EmailSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://canopy.db?mode=rwc".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3001,
            rate_limit: RateLimitSettings {
                requests: 120,
                window: Duration::from_secs(60),
            },
            duplicate_cache_ttl: Duration::from_secs(300),
            email: EmailSettings {
                api_url: "https://api.resend.com/emails".to_string(),
                api_key: None,
                from: "Canopy <no-reply@canopy.work>".to_string(),
                batch_size: 50,
                batch_delay: Duration::from_millis(1000),
                max_recipients: 500,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset or blank keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Config::default();

        if let Some(url) = get("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(host) = get("HOST") {
            config.host = host;
        }
        if let Some(port) = parse(&get, "PORT")? {
            config.port = port;
        }

        if let Some(requests) = parse::<usize, _>(&get, "RATE_LIMIT_REQUESTS")? {
            config.rate_limit.requests = at_least_one("RATE_LIMIT_REQUESTS", requests)?;
        }
        if let Some(secs) = parse::<u64, _>(&get, "RATE_LIMIT_WINDOW_SECS")? {
            config.rate_limit.window =
                Duration::from_secs(at_least_one("RATE_LIMIT_WINDOW_SECS", secs)?);
        }
        if let Some(secs) = parse(&get, "DUPLICATE_CACHE_TTL_SECS")? {
            config.duplicate_cache_ttl = Duration::from_secs(secs);
        }

        if let Some(url) = get("EMAIL_API_URL") {
            config.email.api_url = url;
        }
        config.email.api_key = get("EMAIL_API_KEY");
        if let Some(from) = get("EMAIL_FROM") {
            config.email.from = from;
        }
        if let Some(size) = parse::<usize, _>(&get, "EMAIL_BATCH_SIZE")? {
            config.email.batch_size = at_least_one("EMAIL_BATCH_SIZE", size)?;
        }
        if let Some(ms) = parse(&get, "EMAIL_BATCH_DELAY_MS")? {
            config.email.batch_delay = Duration::from_millis(ms);
        }
        if let Some(max) = parse::<usize, _>(&get, "EMAIL_MAX_RECIPIENTS")? {
            config.email.max_recipients = at_least_one("EMAIL_MAX_RECIPIENTS", max)?;
        }

        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T, G>(get: &G, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

fn at_least_one<T>(key: &'static str, value: T) -> Result<T, ConfigError>
where
    T: PartialOrd + From<u8> + ToString,
{
    if value < T::from(1) {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.rate_limit.requests, 120);
        assert_eq!(config.email.batch_size, 50);
        assert!(config.email.api_key.is_none());
        assert_eq!(config.bind_address(), "127.0.0.1:3001");
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("RATE_LIMIT_REQUESTS", "10"),
            ("RATE_LIMIT_WINDOW_SECS", "5"),
            ("EMAIL_API_KEY", "re_test"),
            ("EMAIL_BATCH_DELAY_MS", "0"),
            ("HOST", "  "),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.rate_limit.requests, 10);
        assert_eq!(config.rate_limit.window, Duration::from_secs(5));
        assert_eq!(config.email.api_key.as_deref(), Some("re_test"));
        assert_eq!(config.email.batch_delay, Duration::ZERO);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_unparseable_numbers_are_errors() {
        let err = Config::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));

        let err = Config::from_lookup(lookup(&[("EMAIL_BATCH_SIZE", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "EMAIL_BATCH_SIZE", .. }));
    }
}
