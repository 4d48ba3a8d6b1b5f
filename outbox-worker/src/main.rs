use actix_web::{web, App, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use outbox_relay::{OutboxRelay, RelayConfig};
use prometheus::{Encoder, TextEncoder};
use saga_config::Settings;
use saga_store::OutboxRepository;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,outbox_worker=debug,outbox_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting outbox-worker");

    let settings = Settings::load().context("Failed to load settings")?;

    let pool = saga_store::connect(&settings.database)
        .await
        .context("Failed to create database pool")?;

    let relay = OutboxRelay::new(
        OutboxRepository::new(pool),
        &settings.kafka,
        RelayConfig::from_env(),
    )
    .context("Failed to create outbox relay")?;

    let shutdown = CancellationToken::new();
    let relay_task = {
        let token = shutdown.clone();
        tokio::spawn(async move { relay.run(token).await })
    };

    let metrics_port = settings.metrics.port;
    tracing::info!("Metrics listening on 0.0.0.0:{}", metrics_port);

    HttpServer::new(|| {
        App::new()
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(metrics))
    })
    .bind(("0.0.0.0", metrics_port))
    .context("Failed to bind metrics server")?
    .run()
    .await
    .context("Metrics server error")?;

    // The metrics server returned: a shutdown signal arrived.
    shutdown.cancel();
    relay_task.await.ok();

    tracing::info!("outbox-worker exiting");
    Ok(())
}

async fn metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return HttpResponse::InternalServerError().body(format!("encode error: {e}"));
    }
    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
