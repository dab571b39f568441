//! Process configuration read from the environment.

use std::net::SocketAddr;

use anyhow::Context;
use chrono::Duration;

use shepherd_auth::LockoutPolicy;
use shepherd_infra::AddressThrottlePolicy;
use shepherd_observability::LogFormat;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub bind_addr: SocketAddr,
    pub lockout: LockoutPolicy,
    pub address_throttle: AddressThrottlePolicy,
    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`. Only
    /// safe behind a proxy that overwrites those headers.
    pub trust_proxy_headers: bool,
    pub access_token_ttl: Duration,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            lockout: LockoutPolicy::default(),
            address_throttle: AddressThrottlePolicy::default(),
            trust_proxy_headers: false,
            access_token_ttl: Duration::minutes(15),
            log_format: LogFormat::Json,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys fall back to defaults;
    /// set-but-invalid keys are an error. Nothing is logged here: loading runs
    /// before tracing is installed, see [`AppConfig::warnings`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let jwt_secret = match lookup("JWT_SECRET") {
            Some(secret) if !secret.is_empty() => secret,
            _ => defaults.jwt_secret,
        };

        let bind_addr = match lookup("BIND_ADDR") {
            Some(raw) => raw
                .parse::<SocketAddr>()
                .with_context(|| format!("BIND_ADDR is not a socket address: {raw}"))?,
            None => defaults.bind_addr,
        };

        let max_failed_attempts = parse_or(&lookup, "LOCKOUT_MAX_ATTEMPTS", defaults.lockout.max_failed_attempts)?;
        if max_failed_attempts == 0 {
            anyhow::bail!("LOCKOUT_MAX_ATTEMPTS must be at least 1");
        }
        let lock_minutes = parse_or(&lookup, "LOCKOUT_DURATION_MINUTES", 15_i64)?;
        let ttl_minutes = parse_or(&lookup, "ACCESS_TOKEN_TTL_MINUTES", 15_i64)?;
        if lock_minutes <= 0 || ttl_minutes <= 0 {
            anyhow::bail!("LOCKOUT_DURATION_MINUTES and ACCESS_TOKEN_TTL_MINUTES must be positive");
        }

        let ip_max_failures = parse_or(&lookup, "LOGIN_IP_MAX_FAILURES", defaults.address_throttle.max_failures)?;
        let ip_window_minutes = parse_or(&lookup, "LOGIN_IP_WINDOW_MINUTES", 15_i64)?;
        if ip_max_failures == 0 || ip_window_minutes <= 0 {
            anyhow::bail!("LOGIN_IP_MAX_FAILURES and LOGIN_IP_WINDOW_MINUTES must be positive");
        }
        let trust_proxy_headers = parse_or(&lookup, "TRUST_PROXY_HEADERS", defaults.trust_proxy_headers)?;

        let log_format = match lookup("LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>()?,
            None => defaults.log_format,
        };

        Ok(Self {
            jwt_secret,
            bind_addr,
            lockout: LockoutPolicy {
                max_failed_attempts,
                lock_duration: Duration::minutes(lock_minutes),
                ..defaults.lockout
            },
            address_throttle: AddressThrottlePolicy {
                max_failures: ip_max_failures,
                window: Duration::minutes(ip_window_minutes),
            },
            trust_proxy_headers,
            access_token_ttl: Duration::minutes(ttl_minutes),
            log_format,
        })
    }

    /// Problems worth reporting once logging is up.
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();
        if self.jwt_secret == DEV_JWT_SECRET {
            warnings.push("JWT_SECRET not set; using insecure dev default");
        }
        if self.trust_proxy_headers {
            warnings.push("TRUST_PROXY_HEADERS is on; client addresses come from X-Forwarded-For");
        }
        warnings
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        None => Ok(default),
    }
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
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.lockout, LockoutPolicy::default());
        assert_eq!(config.access_token_ttl, Duration::minutes(15));
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(config.address_throttle, AddressThrottlePolicy::default());
        assert!(!config.trust_proxy_headers);
    }

    #[test]
    fn dev_secret_is_reported_as_a_warning() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.warnings(), vec!["JWT_SECRET not set; using insecure dev default"]);

        let config = AppConfig::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert!(config.warnings().is_empty());
    }

    #[test]
    fn reads_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("LOCKOUT_MAX_ATTEMPTS", "3"),
            ("LOCKOUT_DURATION_MINUTES", "30"),
            ("LOG_FORMAT", "pretty"),
            ("LOGIN_IP_MAX_FAILURES", "20"),
            ("LOGIN_IP_WINDOW_MINUTES", "5"),
            ("TRUST_PROXY_HEADERS", "true"),
        ]))
        .unwrap();
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.lockout.max_failed_attempts, 3);
        assert_eq!(config.lockout.lock_duration, Duration::minutes(30));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.lockout.idle_retention, LockoutPolicy::default().idle_retention);
        assert_eq!(config.address_throttle.max_failures, 20);
        assert_eq!(config.address_throttle.window, Duration::minutes(5));
        assert!(config.trust_proxy_headers);
    }

    #[test]
    fn invalid_numbers_are_errors() {
        assert!(AppConfig::from_lookup(lookup(&[("LOCKOUT_MAX_ATTEMPTS", "five")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("LOCKOUT_MAX_ATTEMPTS", "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("ACCESS_TOKEN_TTL_MINUTES", "-1")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("LOG_FORMAT", "xml")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("TRUST_PROXY_HEADERS", "yes")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("LOGIN_IP_MAX_FAILURES", "0")])).is_err());
    }
}
