mod handler;

use actix_web::{web, App, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use consumer_runtime::EventConsumer;
use handler::OrderStatusHandler;
use prometheus::{Encoder, TextEncoder};
use saga_config::Settings;
use saga_store::OrderRepository;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const GROUP_ID: &str = "order-service";

#[actix_web::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,order_consumer=debug,consumer_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting order-consumer");

    let settings = Settings::load().context("Failed to load settings")?;

    let pool = saga_store::connect(&settings.database)
        .await
        .context("Failed to create database pool")?;

    let handler = OrderStatusHandler::new(OrderRepository::new(pool.clone()));

    let consumer = EventConsumer::new(
        pool,
        &settings.kafka,
        settings.kafka.group_id_or(GROUP_ID),
        handler,
    )
    .context("Failed to create consumer")?;

    let shutdown = CancellationToken::new();
    let consumer_task = {
        let token = shutdown.clone();
        tokio::spawn(async move { consumer.run(token).await })
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

    shutdown.cancel();
    consumer_task.await.ok();

    tracing::info!("order-consumer exiting");
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
