use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;

/// Builds the pool without connecting; the first query opens a connection.
/// A service key, when given, replaces any password embedded in the URL.
pub fn connect_lazy(store_url: &str, service_key: Option<&str>) -> Result<PgPool> {
    let mut options =
        PgConnectOptions::from_str(store_url).context("Failed to parse store URL")?;
    if let Some(key) = service_key {
        options = options.password(key);
    }
    Ok(PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(8))
        .connect_lazy_with(options))
}
