use std::{net::SocketAddr, time::Duration};

use anyhow::{bail, Context};

/// Minimum HS256 key length accepted for session assertions.
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    /// Redis URL for the shared session cache; the in-process cache is used when unset.
    pub cache_url: Option<String>,
    pub cache_capacity: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub public_addr: SocketAddr,
    pub internal_addr: SocketAddr,
    pub session: SessionConfig,
    pub dependency_timeout: Duration,
    pub health_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, validating every field.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> anyhow::Result<String> {
            match lookup(key) {
                Some(v) if !v.trim().is_empty() => Ok(v),
                _ => bail!("{key} must be set"),
            }
        };
        let or_default = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let database_url = required("DATABASE_URL")?;

        let secret = required("SESSION_SECRET")?;
        if secret.len() < MIN_SECRET_LEN {
            bail!("SESSION_SECRET must be at least {MIN_SECRET_LEN} bytes");
        }

        let host = or_default("APP_HOST", "0.0.0.0");
        let public_port: u16 = parse_var("APP_PORT", &or_default("APP_PORT", "8080"))?;
        let internal_port: u16 =
            parse_var("INTERNAL_PORT", &or_default("INTERNAL_PORT", "8081"))?;
        if public_port == internal_port {
            bail!("APP_PORT and INTERNAL_PORT must differ");
        }

        let public_addr: SocketAddr = parse_var("APP_HOST", &format!("{host}:{public_port}"))?;
        let internal_addr: SocketAddr =
            parse_var("APP_HOST", &format!("{host}:{internal_port}"))?;

        let db_max_connections: u32 = parse_var(
            "DB_MAX_CONNECTIONS",
            &or_default("DB_MAX_CONNECTIONS", "10"),
        )?;
        let cache_capacity: u64 = parse_var(
            "SESSION_CACHE_CAPACITY",
            &or_default("SESSION_CACHE_CAPACITY", "100000"),
        )?;
        let dependency_timeout_ms: u64 = parse_var(
            "DEPENDENCY_TIMEOUT_MS",
            &or_default("DEPENDENCY_TIMEOUT_MS", "3000"),
        )?;
        let health_timeout_ms: u64 = parse_var(
            "HEALTH_TIMEOUT_MS",
            &or_default("HEALTH_TIMEOUT_MS", "2000"),
        )?;
        if db_max_connections == 0 || cache_capacity == 0 {
            bail!("DB_MAX_CONNECTIONS and SESSION_CACHE_CAPACITY must be positive");
        }
        if dependency_timeout_ms == 0 || health_timeout_ms == 0 {
            bail!("DEPENDENCY_TIMEOUT_MS and HEALTH_TIMEOUT_MS must be positive");
        }

        Ok(Self {
            database_url,
            db_max_connections,
            public_addr,
            internal_addr,
            session: SessionConfig {
                secret,
                issuer: or_default("SESSION_ISSUER", "identity"),
                audience: or_default("SESSION_AUDIENCE", "identity-internal"),
                cache_url: lookup("CACHE_URL").filter(|v| !v.trim().is_empty()),
                cache_capacity,
            },
            dependency_timeout: Duration::from_millis(dependency_timeout_ms),
            health_timeout: Duration::from_millis(health_timeout_ms),
        })
    }
}

fn parse_var<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("invalid value for {key}: {raw:?}"))
}
