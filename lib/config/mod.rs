use std::env;
use std::net::SocketAddr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

pub struct Config {
    /// Socket the HTTP surface binds to. Default: `0.0.0.0:3000`.
    pub bind_addr: SocketAddr,
    /// PIN that grants a staff session. Required.
    pub staff_pin: String,
    /// Optional PIN that grants an admin session.
    pub admin_pin: Option<String>,
    /// Session lifetime in hours. Default: 12.
    pub session_ttl_hours: i64,
    /// Broadcast buffer for change events. Default: 64.
    pub event_buffer: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = parse_env("BIND_ADDR", "0.0.0.0:3000")?;
        let staff_pin = env::var("STAFF_PIN")
            .map_err(|_| ConfigError::MissingEnvVar("STAFF_PIN".to_string()))?;
        let admin_pin = env::var("ADMIN_PIN").ok();
        let session_ttl_hours = validate_session_ttl(parse_env("SESSION_TTL_HOURS", "12")?)?;
        let event_buffer = parse_env("EVENT_BUFFER", "64")?;

        Ok(Self {
            bind_addr,
            staff_pin,
            admin_pin,
            session_ttl_hours,
            event_buffer,
        })
    }
}

/// A zero or negative TTL would mint sessions that are already expired, so
/// it is a configuration error rather than a logged-out surprise.
fn validate_session_ttl(hours: i64) -> Result<i64, ConfigError> {
    if hours <= 0 {
        return Err(ConfigError::InvalidValue {
            name: "SESSION_TTL_HOURS".to_string(),
            value: hours.to_string(),
        });
    }
    Ok(hours)
}

fn parse_env<T: std::str::FromStr>(name: &str, default: &str) -> Result<T, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: raw,
    })
}
