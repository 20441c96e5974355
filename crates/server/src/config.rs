//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use event_bus::{ConsumerConfig, KafkaConfig};
use saga::{HttpClientConfig, RetryPolicy};

use crate::error::ConfigError;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Worker configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: ops listener (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json`
/// - `DATABASE_URL`: Postgres payment store; in-memory when unset
/// - `PROFILE_SERVICE_URL`, `IDENTITY_SERVICE_URL`, `ORDER_SERVICE_URL`,
///   `CARD_SERVICE_URL`, `AUTHORIZATION_URL`: remote collaborators
/// - `HTTP_CONNECT_TIMEOUT_MS`, `HTTP_REQUEST_TIMEOUT_MS`
/// - `AUTH_RETRY_MAX_ATTEMPTS`, `AUTH_RETRY_INITIAL_DELAY_MS`
/// - `KAFKA_BROKERS`, `KAFKA_AUTO_OFFSET_RESET`, `KAFKA_MESSAGE_TIMEOUT_MS`
/// - `SETTLEMENT_CONSUMER_GROUP`, `SETTLEMENT_REDELIVERY_DELAY_MS`
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub profile_service_url: String,
    pub identity_service_url: String,
    pub order_service_url: String,
    pub card_service_url: String,
    pub authorization_url: String,
    pub http_connect_timeout: Duration,
    pub http_request_timeout: Duration,
    pub auth_retry_max_attempts: u32,
    pub auth_retry_initial_delay: Duration,
    pub kafka_brokers: String,
    pub kafka_auto_offset_reset: String,
    pub kafka_message_timeout: Duration,
    pub settlement_consumer_group: String,
    pub settlement_redelivery_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            profile_service_url: "http://localhost:8081".to_string(),
            identity_service_url: "http://localhost:8082".to_string(),
            order_service_url: "http://localhost:8083".to_string(),
            // Cards are served by the profile service.
            card_service_url: "http://localhost:8081".to_string(),
            authorization_url: "http://localhost:8090/authorize".to_string(),
            http_connect_timeout: Duration::from_secs(2),
            http_request_timeout: Duration::from_secs(5),
            auth_retry_max_attempts: 3,
            auth_retry_initial_delay: Duration::from_millis(200),
            kafka_brokers: "localhost:9092".to_string(),
            kafka_auto_offset_reset: "earliest".to_string(),
            kafka_message_timeout: Duration::from_secs(5),
            settlement_consumer_group: "payment-service".to_string(),
            settlement_redelivery_delay: Duration::from_millis(500),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults for anything unset or malformed.
    pub fn from_env() -> Self {
        let lenient = Self::load(|key| std::env::var(key).ok(), false);
        lenient.unwrap_or_default()
    }

    /// Loads configuration from environment variables, rejecting malformed
    /// values.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        Self::load(|key| std::env::var(key).ok(), true)
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Self::load(lookup, true)
    }

    fn load(lookup: impl Fn(&str) -> Option<String>, strict: bool) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let vars = Vars { lookup, strict };

        Ok(Self {
            host: vars.string("HOST", defaults.host),
            port: vars.parse("PORT", defaults.port)?,
            log_level: vars.string("RUST_LOG", defaults.log_level),
            log_format: vars.parse("LOG_FORMAT", defaults.log_format)?,
            database_url: (vars.lookup)("DATABASE_URL").filter(|url| !url.is_empty()),
            profile_service_url: vars.string("PROFILE_SERVICE_URL", defaults.profile_service_url),
            identity_service_url: vars
                .string("IDENTITY_SERVICE_URL", defaults.identity_service_url),
            order_service_url: vars.string("ORDER_SERVICE_URL", defaults.order_service_url),
            card_service_url: vars.string("CARD_SERVICE_URL", defaults.card_service_url),
            authorization_url: vars.string("AUTHORIZATION_URL", defaults.authorization_url),
            http_connect_timeout: vars
                .millis("HTTP_CONNECT_TIMEOUT_MS", defaults.http_connect_timeout)?,
            http_request_timeout: vars
                .millis("HTTP_REQUEST_TIMEOUT_MS", defaults.http_request_timeout)?,
            auth_retry_max_attempts: vars
                .positive("AUTH_RETRY_MAX_ATTEMPTS", defaults.auth_retry_max_attempts)?,
            auth_retry_initial_delay: vars
                .millis("AUTH_RETRY_INITIAL_DELAY_MS", defaults.auth_retry_initial_delay)?,
            kafka_brokers: vars.string("KAFKA_BROKERS", defaults.kafka_brokers),
            kafka_auto_offset_reset: vars
                .string("KAFKA_AUTO_OFFSET_RESET", defaults.kafka_auto_offset_reset),
            kafka_message_timeout: vars
                .millis("KAFKA_MESSAGE_TIMEOUT_MS", defaults.kafka_message_timeout)?,
            settlement_consumer_group: vars
                .string("SETTLEMENT_CONSUMER_GROUP", defaults.settlement_consumer_group),
            settlement_redelivery_delay: vars.millis(
                "SETTLEMENT_REDELIVERY_DELAY_MS",
                defaults.settlement_redelivery_delay,
            )?,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            connect_timeout: self.http_connect_timeout,
            request_timeout: self.http_request_timeout,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.auth_retry_max_attempts, self.auth_retry_initial_delay)
    }

    pub fn kafka_config(&self) -> KafkaConfig {
        KafkaConfig {
            brokers: self.kafka_brokers.clone(),
            auto_offset_reset: self.kafka_auto_offset_reset.clone(),
            message_timeout: self.kafka_message_timeout,
        }
    }

    /// Consumer settings for the settlement saga on `order-created`.
    pub fn settlement_consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig::new(
            domain::topics::ORDER_CREATED,
            self.settlement_consumer_group.clone(),
        )
        .with_redelivery_delay(self.settlement_redelivery_delay)
    }
}

struct Vars<F> {
    lookup: F,
    strict: bool,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn string(&self, key: &str, default: String) -> String {
        (self.lookup)(key).unwrap_or(default)
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = (self.lookup)(key) else {
            return Ok(default);
        };
        match raw.trim().parse() {
            Ok(value) => Ok(value),
            Err(_) if !self.strict => Ok(default),
            Err(err) => Err(ConfigError::Invalid {
                key,
                value: raw,
                reason: err.to_string(),
            }),
        }
    }

    fn positive(&self, key: &'static str, default: u32) -> Result<u32, ConfigError> {
        let value = self.parse(key, default)?;
        if value > 0 {
            return Ok(value);
        }
        if !self.strict {
            return Ok(default);
        }
        Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        })
    }

    fn millis(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.parse(key, default_ms).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.auth_retry_max_attempts, 3);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        assert_eq!(Config::from_lookup(lookup(&[])).unwrap(), Config::default());
    }

    #[test]
    fn test_values_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/payments"),
            ("AUTHORIZATION_URL", "http://auth/authorize"),
            ("HTTP_REQUEST_TIMEOUT_MS", "750"),
            ("AUTH_RETRY_MAX_ATTEMPTS", "5"),
            ("KAFKA_BROKERS", "kafka-1:9092,kafka-2:9092"),
            ("SETTLEMENT_CONSUMER_GROUP", "settlement"),
            ("SETTLEMENT_REDELIVERY_DELAY_MS", "50"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/payments")
        );
        assert_eq!(config.authorization_url, "http://auth/authorize");
        assert_eq!(config.http_request_timeout, Duration::from_millis(750));
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(config.kafka_config().brokers, "kafka-1:9092,kafka-2:9092");
        assert_eq!(config.kafka_config().auto_offset_reset, "earliest");
        assert_eq!(config.settlement_consumer_config().group, "settlement");
        assert_eq!(
            config.settlement_consumer_config().redelivery_delay,
            Duration::from_millis(50)
        );
        assert_eq!(
            config.settlement_consumer_config().topic,
            domain::topics::ORDER_CREATED
        );
    }

    #[test]
    fn test_malformed_number_is_rejected() {
        let err = Config::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }

    #[test]
    fn test_zero_retry_attempts_is_rejected() {
        let err = Config::from_lookup(lookup(&[("AUTH_RETRY_MAX_ATTEMPTS", "0")])).unwrap_err();
        assert!(err.to_string().contains("AUTH_RETRY_MAX_ATTEMPTS"));
    }

    #[test]
    fn test_lenient_load_falls_back_per_key() {
        let config = Config::load(lookup(&[("PORT", "eighty"), ("HOST", "127.0.0.1")]), false)
            .unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_empty_database_url_means_in_memory() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "")])).unwrap();
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
