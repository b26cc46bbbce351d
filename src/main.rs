use std::sync::Arc;

use anyhow::{Context, Result};
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use home_finance_server::config::Config;
use home_finance_server::database::{init_db, seed_admin_user};
use home_finance_server::{AppState, app};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("home_finance_server=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    let db = init_db(&config.data_path)
        .await
        .context("failed to initialize database")?;
    seed_admin_user(
        &db,
        &config.admin_user,
        &config.admin_password,
        config.admin_email.as_deref(),
    )
    .await
    .context("failed to seed admin account")?;

    let address = config.bind_address();
    let state = AppState {
        db,
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    tracing::info!(%address, "server listening");

    axum::serve(listener, app(state))
        .await
        .context("server error")?;
    Ok(())
}
