use crate::auth::hash_password;
use crate::config::ServerConfig;
use crate::state::AppState;
use crate::store::MemoryStore;
use std::sync::Arc;
use url::Url;

pub const ADMIN_EMAIL: &str = "admin@campus.test";
pub const ADMIN_PASSWORD: &str = "admin-pass";

pub fn test_config() -> ServerConfig {
    ServerConfig {
        store_url: None,
        store_service_key: None,
        admin_email: ADMIN_EMAIL.to_string(),
        reset_redirect_url: Url::parse("http://localhost:3000/reset-password").expect("url"),
        token_ttl_hours: 24,
        bootstrap_admin_password: None,
    }
}

pub fn test_state() -> AppState {
    AppState::new(test_config(), Arc::new(MemoryStore::new()))
}

/// Adds an account straight to the store, bypassing the admin gate.
pub async fn create_user(state: &AppState, email: &str, password: &str) {
    let hash = hash_password(password).expect("hash");
    state
        .store
        .insert_user(email, &hash)
        .await
        .expect("insert user");
}

/// Session token for the configured administrator, creating the account.
pub async fn admin_token(state: &AppState) -> String {
    create_user(state, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    session_for(state, ADMIN_EMAIL).await
}

pub async fn session_for(state: &AppState, email: &str) -> String {
    let user = state
        .store
        .find_user_by_email(email)
        .await
        .expect("lookup")
        .expect("user exists");
    state.auth.issue_session(user.id).await
}
