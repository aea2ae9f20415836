use std::sync::Arc;

use ophub_server::app;
use ophub_server::config::Config;
use ophub_server::state::AppState;
use ophub_server::users;
use sea_orm_migration::MigratorTrait;

async fn init_db_and_migrate(config: &Config) -> anyhow::Result<AppState> {
    let db = ophub_db::connect(&config.database_url).await?;

    // Apply migrations on boot (idempotent).
    ophub_migration::Migrator::up(&db, None).await?;

    // Without at least one admin nobody could create users through the API.
    users::ensure_admin(&db, &config.admin_email).await?;

    Ok(AppState { db: Arc::new(db) })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    let state = init_db_and_migrate(&config).await?;
    let app = app::router(state, &config);

    tracing::info!(addr = %config.bind_addr, "ophub-server HTTP listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
