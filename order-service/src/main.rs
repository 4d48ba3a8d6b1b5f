use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use order_service::{handlers, state::AppState};
use redis::aio::ConnectionManager;
use saga_config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,order_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting order-service");

    let settings = Settings::load().context("Failed to load settings")?;

    let pool = saga_store::connect(&settings.database)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let redis_client =
        redis::Client::open(settings.redis.url.clone()).context("Invalid redis URL")?;
    let redis = ConnectionManager::new(redis_client)
        .await
        .context("Failed to connect to redis")?;

    let state = web::Data::new(AppState::new(pool, redis));

    tracing::info!(
        "HTTP server listening on {}:{}",
        settings.http.host,
        settings.http.port
    );

    HttpServer::new(move || App::new().app_data(state.clone()).configure(handlers::configure))
        .bind((settings.http.host.as_str(), settings.http.port))
        .context("Failed to bind HTTP server")?
        .shutdown_timeout(5)
        .run()
        .await
        .context("HTTP server error")
}
