//! Environment-driven application configuration.

use std::env;
use std::net::SocketAddr;

use tracing::warn;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_REDIS_URL: &str = "redis://localhost:6379/0";
const DEFAULT_REDIS_POOL_SIZE: u32 = 20;
const DEFAULT_DB_POOL_SIZE: u32 = 10;

/// Runtime configuration assembled from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP server binds to (`BIND_ADDR`).
    pub bind_addr: SocketAddr,
    /// Cache backend URL (`REDIS_URL`).
    pub redis_url: String,
    /// Cache connection pool size (`REDIS_POOL_SIZE`).
    pub redis_pool_size: u32,
    /// Durable store URL (`DATABASE_URL`); absent means the in-memory,
    /// non-durable store for database-less development runs.
    pub database_url: Option<String>,
    /// Durable store pool size (`DB_POOL_SIZE`).
    pub db_pool_size: u32,
}

impl AppConfig {
    /// Read configuration from the environment, falling back to defaults
    /// with a warning on malformed values.
    pub fn from_env() -> Self {
        Self {
            bind_addr: parsed_env("BIND_ADDR", DEFAULT_BIND_ADDR.parse().unwrap_or_else(|_| {
                SocketAddr::from(([0, 0, 0, 0], 8080))
            })),
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_owned()),
            redis_pool_size: parsed_env("REDIS_POOL_SIZE", DEFAULT_REDIS_POOL_SIZE),
            database_url: env::var("DATABASE_URL").ok(),
            db_pool_size: parsed_env("DB_POOL_SIZE", DEFAULT_DB_POOL_SIZE),
        }
    }
}

fn parsed_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    let Ok(raw) = env::var(name) else {
        return default;
    };
    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring malformed environment value");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn defaults_apply_without_environment() {
        // Only inspect the parsed defaults; the process environment is not
        // mutated so this stays safe under parallel tests.
        assert_eq!(
            DEFAULT_BIND_ADDR.parse::<SocketAddr>().expect("valid default"),
            SocketAddr::from(([0, 0, 0, 0], 8080))
        );
        assert_eq!(parsed_env("INKBOARD_UNSET_VAR", 7_u32), 7);
    }
}
