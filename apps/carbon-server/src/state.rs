use crate::auth::AuthManager;
use crate::config::ServerConfig;
use crate::store::Store;
use axum::extract::FromRef;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<dyn Store>,
    pub auth: Arc<AuthManager>,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Arc<dyn Store>) -> Self {
        let auth = Arc::new(AuthManager::new(config.token_ttl_hours));
        Self {
            config,
            store,
            auth,
        }
    }
}

impl FromRef<AppState> for Arc<AuthManager> {
    fn from_ref(state: &AppState) -> Arc<AuthManager> {
        state.auth.clone()
    }
}

impl FromRef<AppState> for Arc<dyn Store> {
    fn from_ref(state: &AppState) -> Arc<dyn Store> {
        state.store.clone()
    }
}
