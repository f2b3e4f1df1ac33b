//! Configuration from environment variables (port, CORS origin, auth, room expiry).

use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use rand::RngCore;

use crate::auth::Credentials;

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: SocketAddr,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Allowed browser origin for CORS.
    pub client_origin: String,
    pub hmac_key: [u8; 32],
    pub users: Credentials,
    pub token_max_age: Duration,
    /// How long a finished room stays around for late rejoins.
    pub room_finished_ttl: Duration,
    /// Rooms untouched for this long are dropped whatever their status.
    pub room_idle_ttl: Duration,
    pub room_sweep_interval: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid server address: {0}")]
    InvalidAddress(String),
    #[error("{0} must be 64 hex characters")]
    InvalidKey(&'static str),
    #[error("{0} must be a whole number of seconds, got {1:?}")]
    InvalidSeconds(&'static str, String),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            log_level: "info,tower_http=info,axum=info".to_string(),
            client_origin: "http://localhost:5173".to_string(),
            hmac_key: random_key(),
            users: Credentials::dev_defaults(),
            token_max_age: Duration::from_secs(24 * 60 * 60),
            room_finished_ttl: Duration::from_secs(10 * 60),
            room_idle_ttl: Duration::from_secs(24 * 60 * 60),
            room_sweep_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup; unset keys fall back to
    /// [`Config::default`].
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        // PORT wins (hosting platforms set it), then SERVER_ADDR.
        let server_addr = match (get("PORT"), get("SERVER_ADDR")) {
            (Some(port), _) => port
                .parse::<u16>()
                .map(|p| SocketAddr::from((Ipv4Addr::UNSPECIFIED, p)))
                .map_err(|_| ConfigError::InvalidAddress(port))?,
            (None, Some(addr)) => addr.parse().map_err(|_| ConfigError::InvalidAddress(addr))?,
            (None, None) => defaults.server_addr,
        };

        let hmac_key = match get("TICTACTOE_HMAC_KEY") {
            Some(hex_key) => hex::decode(hex_key.trim())
                .ok()
                .and_then(|v| <[u8; 32]>::try_from(v).ok())
                .ok_or(ConfigError::InvalidKey("TICTACTOE_HMAC_KEY"))?,
            None => defaults.hmac_key,
        };

        let seconds = |key: &'static str, fallback: Duration| -> Result<Duration, ConfigError> {
            match get(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError::InvalidSeconds(key, raw)),
                None => Ok(fallback),
            }
        };

        Ok(Self {
            server_addr,
            log_level: get("LOG_LEVEL").unwrap_or(defaults.log_level),
            client_origin: get("CLIENT_ORIGIN").unwrap_or(defaults.client_origin),
            hmac_key,
            users: get("TICTACTOE_USERS").map(|s| Credentials::parse(&s)).unwrap_or(defaults.users),
            token_max_age: seconds("TOKEN_MAX_AGE_SECS", defaults.token_max_age)?,
            room_finished_ttl: seconds("ROOM_FINISHED_TTL_SECS", defaults.room_finished_ttl)?,
            room_idle_ttl: seconds("ROOM_IDLE_TTL_SECS", defaults.room_idle_ttl)?,
            room_sweep_interval: seconds("ROOM_SWEEP_SECS", defaults.room_sweep_interval)?,
        })
    }
}

fn random_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.server_addr.port(), 8080);
        assert_eq!(cfg.client_origin, "http://localhost:5173");
        assert!(cfg.users.check("player1", "pass123"));
        assert_eq!(cfg.room_finished_ttl, Duration::from_secs(600));
    }

    #[test]
    fn port_overrides_server_addr() {
        let cfg = Config::from_lookup(lookup(&[("PORT", "3001"), ("SERVER_ADDR", "127.0.0.1:9000")])).unwrap();
        assert_eq!(cfg.server_addr, SocketAddr::from((Ipv4Addr::UNSPECIFIED, 3001)));

        let cfg = Config::from_lookup(lookup(&[("SERVER_ADDR", "127.0.0.1:9000")])).unwrap();
        assert_eq!(cfg.server_addr.to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn reads_key_users_and_ttls() {
        let key = "ab".repeat(32);
        let cfg = Config::from_lookup(lookup(&[
            ("TICTACTOE_HMAC_KEY", key.as_str()),
            ("TICTACTOE_USERS", "zed:pw"),
            ("ROOM_FINISHED_TTL_SECS", "5"),
            ("ROOM_SWEEP_SECS", "1"),
        ]))
        .unwrap();
        assert_eq!(cfg.hmac_key, [0xab; 32]);
        assert!(cfg.users.check("zed", "pw"));
        assert!(!cfg.users.check("player1", "pass123"));
        assert_eq!(cfg.room_finished_ttl, Duration::from_secs(5));
        assert_eq!(cfg.room_sweep_interval, Duration::from_secs(1));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("PORT", "http")])),
            Err(ConfigError::InvalidAddress(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("TICTACTOE_HMAC_KEY", "abcd")])),
            Err(ConfigError::InvalidKey(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("ROOM_IDLE_TTL_SECS", "-1")])),
            Err(ConfigError::InvalidSeconds("ROOM_IDLE_TTL_SECS", _))
        ));
    }
}
