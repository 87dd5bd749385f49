//! Bearer sessions and password reset tokens.
//!
//! Both live only in process memory: a restart signs everyone out and
//! invalidates outstanding reset links.

mod password;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::Store;

pub use password::{check_new_password, hash_password, verify_password};

const RESET_TTL_MINUTES: i64 = 60;
const INVALID_TOKEN: &str = "Missing or invalid token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug)]
struct TokenEntry {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

impl TokenEntry {
    fn live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug)]
pub struct AuthManager {
    sessions: RwLock<HashMap<String, TokenEntry>>,
    resets: RwLock<HashMap<String, TokenEntry>>,
    session_ttl: ChronoDuration,
    reset_ttl: ChronoDuration,
}

fn random_token() -> String {
    let mut buf = [0u8; 32];
    OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

fn prune(table: &mut HashMap<String, TokenEntry>, now: DateTime<Utc>) -> usize {
    let before = table.len();
    table.retain(|_, entry| entry.live(now));
    before - table.len()
}

impl AuthManager {
    pub fn new(token_ttl_hours: i64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            resets: RwLock::new(HashMap::new()),
            session_ttl: ChronoDuration::hours(token_ttl_hours),
            reset_ttl: ChronoDuration::minutes(RESET_TTL_MINUTES),
        }
    }

    pub async fn issue_session(&self, user_id: Uuid) -> String {
        let token = random_token();
        let entry = TokenEntry {
            user_id,
            expires_at: Utc::now() + self.session_ttl,
        };
        self.sessions.write().await.insert(token.clone(), entry);
        token
    }

    pub async fn resolve_session(&self, token: &str) -> Option<Uuid> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get(token)?;
        if !entry.live(Utc::now()) {
            sessions.remove(token);
            return None;
        }
        Some(entry.user_id)
    }

    pub async fn issue_reset(&self, user_id: Uuid) -> String {
        let token = random_token();
        let entry = TokenEntry {
            user_id,
            expires_at: Utc::now() + self.reset_ttl,
        };
        self.resets.write().await.insert(token.clone(), entry);
        token
    }

    /// Consumes a reset token. A token redeems at most once.
    pub async fn redeem_reset(&self, token: &str) -> Option<Uuid> {
        let entry = self.resets.write().await.remove(token)?;
        entry.live(Utc::now()).then_some(entry.user_id)
    }

    /// Drops expired sessions and reset tokens, returning how many went.
    pub async fn prune_expired(&self) -> usize {
        let now = Utc::now();
        let sessions = prune(&mut *self.sessions.write().await, now);
        let resets = prune(&mut *self.resets.write().await, now);
        sessions + resets
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone)]
pub struct AuthUser(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for AuthUser
where
    Arc<AuthManager>: FromRef<S>,
    Arc<dyn Store>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let manager = Arc::<AuthManager>::from_ref(state);
        let store = Arc::<dyn Store>::from_ref(state);
        let token = bearer_token(parts);

        async move {
            let token = token.ok_or_else(|| AppError::unauthorized(INVALID_TOKEN))?;
            let user_id = manager
                .resolve_session(&token)
                .await
                .ok_or_else(|| AppError::unauthorized(INVALID_TOKEN))?;
            // The account may have gone away while the session was live.
            let user = store
                .find_user(user_id)
                .await?
                .ok_or_else(|| AppError::unauthorized(INVALID_TOKEN))?;
            Ok(AuthUser(AuthenticatedUser {
                id: user.id,
                email: user.email,
            }))
        }
    }
}

pub fn require_admin(user: &AuthenticatedUser, admin_email: &str) -> AppResult<()> {
    if user.email.eq_ignore_ascii_case(admin_email) {
        return Ok(());
    }
    Err(AppError::forbidden("Only the administrator can register users."))
}

/// Creates the administrator account when it does not exist yet.
pub async fn bootstrap_admin(store: &dyn Store, email: &str, password: &str) -> anyhow::Result<()> {
    if store.find_user_by_email(email).await?.is_some() {
        tracing::debug!(email, "admin account already present");
        return Ok(());
    }
    check_new_password(password).map_err(anyhow::Error::msg)?;
    let password_hash = hash_password(password)?;
    let user = store.insert_user(email, &password_hash).await?;
    tracing::info!(user_id = %user.id, email, "created admin account");
    Ok(())
}
