use anyhow::{Context, Result};
use url::Url;

const DEFAULT_ADMIN_EMAIL: &str = "admin@localhost";
const DEFAULT_RESET_REDIRECT_URL: &str = "http://localhost:3000/reset-password";
const DEFAULT_TOKEN_TTL_HOURS: u64 = 24;
const MAX_TOKEN_TTL_HOURS: u64 = 24 * 365;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `None` only when running against the in-memory store.
    pub store_url: Option<String>,
    pub store_service_key: Option<String>,
    pub admin_email: String,
    pub reset_redirect_url: Url,
    pub token_ttl_hours: i64,
    pub bootstrap_admin_password: Option<String>,
}

impl ServerConfig {
    pub fn from_env(memory_store: bool) -> Result<Self> {
        let store_url = env_optional_string("CARBON_STORE_URL")
            .or_else(|| env_optional_string("DATABASE_URL"));
        let store_url = if memory_store {
            store_url
        } else {
            Some(store_url.context(
                "CARBON_STORE_URL (or DATABASE_URL) is required unless --memory-store is set",
            )?)
        };

        let reset_redirect_url = parse_redirect_url(&env_string(
            "PASSWORD_RESET_REDIRECT_URL",
            DEFAULT_RESET_REDIRECT_URL,
        ))?;

        let token_ttl_hours =
            env_u64("CARBON_TOKEN_TTL_HOURS", DEFAULT_TOKEN_TTL_HOURS).clamp(1, MAX_TOKEN_TTL_HOURS);

        Ok(Self {
            store_url,
            store_service_key: env_optional_string("CARBON_STORE_SERVICE_KEY"),
            admin_email: env_string("CARBON_ADMIN_EMAIL", DEFAULT_ADMIN_EMAIL).to_lowercase(),
            reset_redirect_url,
            token_ttl_hours: token_ttl_hours as i64,
            bootstrap_admin_password: env_optional_string("CARBON_BOOTSTRAP_ADMIN_PASSWORD"),
        })
    }

    /// Link mailed to a user asking for a password reset.
    pub fn reset_link(&self, token: &str) -> Url {
        let mut link = self.reset_redirect_url.clone();
        link.query_pairs_mut().append_pair("token", token);
        link
    }
}

fn parse_redirect_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .with_context(|| format!("PASSWORD_RESET_REDIRECT_URL is not a valid URL: {raw}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("PASSWORD_RESET_REDIRECT_URL must use http or https: {raw}");
    }
    Ok(url)
}

fn env_string(key: &str, default: &str) -> String {
    env_optional_string(key).unwrap_or_else(|| default.to_string())
}

fn env_optional_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}
