mod error;
mod extract;
mod routes;
mod state;

use miette::IntoDiagnostic;
use refrain_auth::{AuthDb, TokenCipher};
use refrain_core::config::AppConfig;
use std::time::Duration;
use tracing::{info, warn};

use crate::state::AppState;

#[tokio::main]
async fn main() -> miette::Result<()> {
    if dotenv::dotenv().is_err() {
        // Running without a .env file is fine in production.
    }

    init_tracing();

    let config = AppConfig::from_env()?;

    let cipher = match std::env::var("TOKEN_ENCRYPTION_KEY") {
        Ok(key) => TokenCipher::new(key.as_bytes())?,
        Err(_) => {
            return Err(miette::miette!(
                "TOKEN_ENCRYPTION_KEY is not set; refusing to store credentials in plaintext"
            ));
        }
    };

    let db_path =
        std::env::var("DATABASE_PATH").unwrap_or_else(|_| "data/refrain.db".to_string());
    let db = AuthDb::open(&db_path, Some(cipher)).await?;

    // Lookup-time checks make the sweeper optional; it just keeps the
    // tables tidy.
    tokio::spawn(sweep_expired(db.clone()));

    let state = AppState::new(config, db.clone());
    let app = routes::router(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .into_diagnostic()?;
    info!("refrain listening on port {port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    db.close().await;
    info!("shut down cleanly");
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("refrain=info,refrain_server=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

async fn sweep_expired(db: AuthDb) {
    let mut interval = tokio::time::interval(Duration::from_secs(600));
    loop {
        interval.tick().await;
        if let Err(error) = db.cleanup_expired_attempts().await {
            warn!(%error, "link attempt sweep failed");
        }
        if let Err(error) = db.delete_expired_sessions().await {
            warn!(%error, "session sweep failed");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
