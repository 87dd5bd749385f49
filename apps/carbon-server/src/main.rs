use anyhow::{Context, Result};
use carbon_server::store::{MemoryStore, PgStore, Store};
use carbon_server::{auth, cli, config, db, openapi, routes, state};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const SESSION_PRUNE_INTERVAL: Duration = Duration::from_secs(10 * 60);

async fn bind_listener(addr: &str) -> Result<TcpListener> {
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Failed to bind carbon-server on {addr}: port already in use. Stop the other service or re-run with --port (or PORT) to choose another port.",
            );
        }
        Err(err) => Err(err).with_context(|| format!("failed to bind carbon-server on {addr}")),
    }
}

fn build_store(config: &config::ServerConfig, memory_store: bool) -> Result<Arc<dyn Store>> {
    if memory_store {
        tracing::warn!("using the in-memory store; data is lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let url = config
        .store_url
        .as_deref()
        .context("store URL missing from configuration")?;
    let pool = db::connect_lazy(url, config.store_service_key.as_deref())?;
    Ok(Arc::new(PgStore::new(pool)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    if args.print_openapi {
        println!(
            "{}",
            serde_json::to_string_pretty(&openapi::openapi_json())?
        );
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config::ServerConfig::from_env(args.memory_store)?;
    let store = build_store(&config, args.memory_store)?;

    if let Some(password) = config.bootstrap_admin_password.as_deref() {
        if let Err(err) = auth::bootstrap_admin(store.as_ref(), &config.admin_email, password).await
        {
            tracing::warn!("failed to bootstrap admin account: {err:#}");
        }
    }

    let state = state::AppState::new(config, store);

    let sessions = state.auth.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            let pruned = sessions.prune_expired().await;
            if pruned > 0 {
                tracing::debug!(pruned, "pruned expired tokens");
            }
        }
    });

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(20)
            .burst_size(60)
            .methods(vec![
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::DELETE,
            ])
            .use_headers()
            .finish()
            .context("failed to build rate limiter config")?,
    );

    let governor_limiter = governor_conf.limiter().clone();
    std::thread::spawn(move || loop {
        std::thread::sleep(Duration::from_secs(60));
        governor_limiter.retain_recent();
    });

    let app = routes::router(state)
        .layer(GovernorLayer::new(governor_conf))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());
    let addr = format!("{}:{}", args.host, args.port);
    let listener = bind_listener(&addr).await?;
    tracing::info!(%addr, "carbon-server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::bind_listener;
    use anyhow::Result;

    #[tokio::test]
    async fn reports_port_in_use_with_actionable_message() -> Result<()> {
        let listener = match std::net::TcpListener::bind("127.0.0.1:0") {
            Ok(listener) => listener,
            Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let addr = listener.local_addr()?;

        let err = bind_listener(&addr.to_string()).await.unwrap_err();
        let message = err.to_string().to_lowercase();
        if message.contains("operation not permitted") {
            return Ok(());
        }

        assert!(message.contains(&addr.to_string()));
        assert!(message.contains("port already in use"));
        assert!(message.contains("--port"));

        drop(listener);
        Ok(())
    }
}
